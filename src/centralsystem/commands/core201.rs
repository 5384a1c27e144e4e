//! Operations that only exist in OCPP 2.0.1
//!
//! GetVariables/SetVariables replace the 1.6 configuration operations;
//! GetBaseReport has no 1.6 counterpart.

use tracing::info;

use rust_ocpp::v2_0_1::datatypes::component_type::ComponentType;
use rust_ocpp::v2_0_1::datatypes::get_variable_data_type::GetVariableDataType;
use rust_ocpp::v2_0_1::datatypes::set_variable_data_type::SetVariableDataType;
use rust_ocpp::v2_0_1::datatypes::variable_type::VariableType;
use rust_ocpp::v2_0_1::enumerations::report_base_enum_type::ReportBaseEnumType;
use rust_ocpp::v2_0_1::messages::get_base_report::{GetBaseReportRequest, GetBaseReportResponse};
use rust_ocpp::v2_0_1::messages::get_variables::{GetVariablesRequest, GetVariablesResponse};
use rust_ocpp::v2_0_1::messages::set_variables::{SetVariablesRequest, SetVariablesResponse};

use super::{GetVariablesResult, SetVariableStatus, SetVariablesResult, VariableResult};
use crate::centralsystem::session::ChargePointSession;
use crate::messages::OcppVersion;
use crate::rpc::RpcError;

impl ChargePointSession {
    /// GetVariables — `variables` is a list of (component, variable) pairs.
    pub async fn get_variables(
        &self,
        variables: Vec<(String, String)>,
    ) -> Result<GetVariablesResult, RpcError> {
        if self.ocpp_version() != OcppVersion::V201 {
            return Err(self.unsupported("GetVariables"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            count = variables.len(),
            "GetVariables"
        );
        let get_variable_data: Vec<GetVariableDataType> = variables
            .into_iter()
            .map(|(component, variable)| GetVariableDataType {
                attribute_type: None,
                component: ComponentType {
                    name: component,
                    instance: None,
                    evse: None,
                },
                variable: VariableType {
                    name: variable,
                    instance: None,
                },
            })
            .collect();
        let request = GetVariablesRequest { get_variable_data };
        let response: GetVariablesResponse = self.call_typed("GetVariables", &request).await?;
        Ok(GetVariablesResult {
            results: response
                .get_variable_result
                .into_iter()
                .map(|r| VariableResult {
                    component: r.component.name,
                    variable: r.variable.name,
                    attribute_status: format!("{:?}", r.attribute_status),
                    attribute_value: r.attribute_value,
                })
                .collect(),
        })
    }

    /// SetVariables — `variables` is a list of (component, variable, value).
    pub async fn set_variables(
        &self,
        variables: Vec<(String, String, String)>,
    ) -> Result<SetVariablesResult, RpcError> {
        if self.ocpp_version() != OcppVersion::V201 {
            return Err(self.unsupported("SetVariables"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            count = variables.len(),
            "SetVariables"
        );
        let set_variable_data: Vec<SetVariableDataType> = variables
            .into_iter()
            .map(|(component, variable, value)| SetVariableDataType {
                attribute_type: None,
                attribute_value: value,
                component: ComponentType {
                    name: component,
                    instance: None,
                    evse: None,
                },
                variable: VariableType {
                    name: variable,
                    instance: None,
                },
            })
            .collect();
        let request = SetVariablesRequest { set_variable_data };
        let response: SetVariablesResponse = self.call_typed("SetVariables", &request).await?;
        Ok(SetVariablesResult {
            results: response
                .set_variable_result
                .into_iter()
                .map(|r| SetVariableStatus {
                    component: r.component.name,
                    variable: r.variable.name,
                    status: format!("{:?}", r.attribute_status),
                })
                .collect(),
        })
    }

    /// GetBaseReport — `report_base` is one of `ConfigurationInventory`,
    /// `FullInventory`, `SummaryInventory`.
    pub async fn get_base_report(&self, report_base: &str) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V201 {
            return Err(self.unsupported("GetBaseReport"));
        }
        let request_id = self.next_request_id();
        info!(
            charge_point_id = self.charge_point_id(),
            request_id, report_base, "GetBaseReport"
        );
        let request = GetBaseReportRequest {
            request_id,
            report_base: match report_base {
                "ConfigurationInventory" => ReportBaseEnumType::ConfigurationInventory,
                "SummaryInventory" => ReportBaseEnumType::SummaryInventory,
                _ => ReportBaseEnumType::FullInventory,
            },
        };
        let response: GetBaseReportResponse = self.call_typed("GetBaseReport", &request).await?;
        Ok(format!("{:?}", response.status))
    }
}
