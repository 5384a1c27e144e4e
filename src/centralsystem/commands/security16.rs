//! Security-extension operations on a charge point session
//!
//! These use the extension records from
//! [`messages::security`](crate::messages::security) on 1.6 sessions.
//! `get_log` also maps onto the native 2.0.1 message.

use chrono::{DateTime, Utc};
use tracing::info;

use rust_ocpp::v2_0_1::datatypes::log_parameters_type::LogParametersType;
use rust_ocpp::v2_0_1::enumerations::log_enum_type::LogEnumType;
use rust_ocpp::v2_0_1::messages::get_log as get_log_20;

use super::{GetLogResult, LogKind};
use crate::centralsystem::session::ChargePointSession;
use crate::messages::security::{
    CertificateHashData, CertificateSignedRequest, CertificateSignedResponse, CertificateUse,
    DeleteCertificateRequest, DeleteCertificateResponse, ExtendedTriggerMessageRequest,
    ExtendedTriggerMessageResponse, FirmwareType, GetInstalledCertificateIdsRequest,
    GetInstalledCertificateIdsResponse, GetLogRequest, GetLogResponse, InstallCertificateRequest,
    InstallCertificateResponse, LogParameters, LogType, MessageTriggerExtended,
    SignedUpdateFirmwareRequest, SignedUpdateFirmwareResponse,
};
use crate::messages::OcppVersion;
use crate::rpc::RpcError;

impl ChargePointSession {
    /// Deliver a signed certificate chain to the charge point.
    pub async fn certificate_signed(&self, certificate_chain: &str) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("CertificateSigned"));
        }
        info!(charge_point_id = self.charge_point_id(), "CertificateSigned");
        let request = CertificateSignedRequest {
            certificate_chain: certificate_chain.to_string(),
        };
        let response: CertificateSignedResponse =
            self.call_typed("CertificateSigned", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn delete_certificate(
        &self,
        certificate_hash_data: CertificateHashData,
    ) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("DeleteCertificate"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            serial_number = certificate_hash_data.serial_number.as_str(),
            "DeleteCertificate"
        );
        let request = DeleteCertificateRequest {
            certificate_hash_data,
        };
        let response: DeleteCertificateResponse =
            self.call_typed("DeleteCertificate", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn extended_trigger_message(
        &self,
        requested: MessageTriggerExtended,
        connector_id: Option<u32>,
    ) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("ExtendedTriggerMessage"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            ?requested,
            ?connector_id,
            "ExtendedTriggerMessage"
        );
        let request = ExtendedTriggerMessageRequest {
            requested_message: requested,
            connector_id,
        };
        let response: ExtendedTriggerMessageResponse =
            self.call_typed("ExtendedTriggerMessage", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn get_installed_certificate_ids(
        &self,
        certificate_type: CertificateUse,
    ) -> Result<Vec<CertificateHashData>, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("GetInstalledCertificateIds"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            ?certificate_type,
            "GetInstalledCertificateIds"
        );
        let request = GetInstalledCertificateIdsRequest { certificate_type };
        let response: GetInstalledCertificateIdsResponse = self
            .call_typed("GetInstalledCertificateIds", &request)
            .await?;
        Ok(response.certificate_hash_data.unwrap_or_default())
    }

    /// Request a diagnostics or security log upload.
    pub async fn get_log(
        &self,
        kind: LogKind,
        remote_location: &str,
        retries: Option<u32>,
        retry_interval: Option<u32>,
        oldest_timestamp: Option<DateTime<Utc>>,
        latest_timestamp: Option<DateTime<Utc>>,
    ) -> Result<GetLogResult, RpcError> {
        let request_id = self.next_request_id();
        info!(
            charge_point_id = self.charge_point_id(),
            ?kind,
            remote_location,
            request_id,
            "GetLog"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = GetLogRequest {
                    log_type: match kind {
                        LogKind::DiagnosticsLog => LogType::DiagnosticsLog,
                        LogKind::SecurityLog => LogType::SecurityLog,
                    },
                    request_id,
                    retries,
                    retry_interval,
                    log: LogParameters {
                        remote_location: remote_location.to_string(),
                        oldest_timestamp,
                        latest_timestamp,
                    },
                };
                let response: GetLogResponse = self.call_typed("GetLog", &request).await?;
                Ok(GetLogResult {
                    status: format!("{:?}", response.status),
                    filename: response.filename,
                    request_id,
                })
            }
            OcppVersion::V201 => {
                let request = get_log_20::GetLogRequest {
                    log_type: match kind {
                        LogKind::DiagnosticsLog => LogEnumType::DiagnosticsLog,
                        LogKind::SecurityLog => LogEnumType::SecurityLog,
                    },
                    request_id,
                    retries: retries.map(|r| r as i32),
                    retry_interval: retry_interval.map(|r| r as i32),
                    log: LogParametersType {
                        remote_location: remote_location.to_string(),
                        oldest_timestamp,
                        latest_timestamp,
                    },
                };
                let response: get_log_20::GetLogResponse =
                    self.call_typed("GetLog", &request).await?;
                Ok(GetLogResult {
                    status: format!("{:?}", response.status),
                    filename: response.filename,
                    request_id,
                })
            }
        }
    }

    pub async fn install_certificate(
        &self,
        certificate_type: CertificateUse,
        certificate_pem: &str,
    ) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("InstallCertificate"));
        }
        info!(
            charge_point_id = self.charge_point_id(),
            ?certificate_type,
            "InstallCertificate"
        );
        let request = InstallCertificateRequest {
            certificate_type,
            certificate: certificate_pem.to_string(),
        };
        let response: InstallCertificateResponse =
            self.call_typed("InstallCertificate", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    /// Firmware update with signature verification on the charge point.
    #[allow(clippy::too_many_arguments)]
    pub async fn signed_update_firmware(
        &self,
        location: &str,
        retrieve_date_time: DateTime<Utc>,
        install_date_time: Option<DateTime<Utc>>,
        signing_certificate: &str,
        signature: &str,
        retries: Option<u32>,
        retry_interval: Option<u32>,
    ) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("SignedUpdateFirmware"));
        }
        let request_id = self.next_request_id();
        info!(
            charge_point_id = self.charge_point_id(),
            location, request_id, "SignedUpdateFirmware"
        );
        let request = SignedUpdateFirmwareRequest {
            retries,
            retry_interval,
            request_id,
            firmware: FirmwareType {
                location: location.to_string(),
                retrieve_date_time,
                install_date_time,
                signing_certificate: signing_certificate.to_string(),
                signature: signature.to_string(),
            },
        };
        let response: SignedUpdateFirmwareResponse =
            self.call_typed("SignedUpdateFirmware", &request).await?;
        Ok(format!("{:?}", response.status))
    }
}
