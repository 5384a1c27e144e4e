//! Core-profile operations on a charge point session
//!
//! Each operation builds the wire record for the session's negotiated
//! version and issues a single call. Status enums are reported as their
//! debug rendering, which matches the wire spelling.

use chrono::{DateTime, Utc};
use tracing::info;

use rust_ocpp::v1_6::messages as v16;
use rust_ocpp::v1_6::types as types16;
use rust_ocpp::v2_0_1::datatypes as dt201;
use rust_ocpp::v2_0_1::enumerations as en201;
use rust_ocpp::v2_0_1::messages as v201;

use super::{
    Availability, CompositeScheduleResult, ConfigurationResult, DataTransferResult, KeyValue,
    LocalAuthEntry, ResetKind, TriggerType, UpdateKind,
};
use crate::centralsystem::session::ChargePointSession;
use crate::messages::OcppVersion;
use crate::rpc::RpcError;

impl ChargePointSession {
    // ── Reset ──────────────────────────────────────────────

    pub async fn reset(&self, kind: ResetKind) -> Result<String, RpcError> {
        info!(charge_point_id = self.charge_point_id(), ?kind, "Reset");
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::reset::ResetRequest {
                    kind: match kind {
                        ResetKind::Soft => types16::ResetRequestStatus::Soft,
                        ResetKind::Hard => types16::ResetRequestStatus::Hard,
                    },
                };
                let response: v16::reset::ResetResponse =
                    self.call_typed("Reset", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::reset::ResetRequest {
                    request_type: match kind {
                        ResetKind::Hard => en201::reset_enum_type::ResetEnumType::Immediate,
                        ResetKind::Soft => en201::reset_enum_type::ResetEnumType::OnIdle,
                    },
                    evse_id: None,
                };
                let response: v201::reset::ResetResponse =
                    self.call_typed("Reset", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── ChangeAvailability ─────────────────────────────────

    pub async fn change_availability(
        &self,
        connector_id: u32,
        availability: Availability,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            connector_id,
            ?availability,
            "ChangeAvailability"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::change_availability::ChangeAvailabilityRequest {
                    connector_id,
                    kind: match availability {
                        Availability::Operative => types16::AvailabilityType::Operative,
                        Availability::Inoperative => types16::AvailabilityType::Inoperative,
                    },
                };
                let response: v16::change_availability::ChangeAvailabilityResponse =
                    self.call_typed("ChangeAvailability", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let operational_status = match availability {
                    Availability::Operative => {
                        en201::operational_status_enum_type::OperationalStatusEnumType::Operative
                    }
                    Availability::Inoperative => {
                        en201::operational_status_enum_type::OperationalStatusEnumType::Inoperative
                    }
                };
                // EVSE 0 addresses the whole station.
                let evse = if connector_id > 0 {
                    Some(dt201::evse_type::EVSEType {
                        id: connector_id as i32,
                        connector_id: None,
                    })
                } else {
                    None
                };
                let request = v201::change_availability::ChangeAvailabilityRequest {
                    operational_status,
                    evse,
                };
                let response: v201::change_availability::ChangeAvailabilityResponse =
                    self.call_typed("ChangeAvailability", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── ChangeConfiguration / GetConfiguration (1.6 only) ──

    pub async fn change_configuration(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<String, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("ChangeConfiguration"));
        }
        let request = v16::change_configuration::ChangeConfigurationRequest {
            key: key.into(),
            value: value.into(),
        };
        info!(
            charge_point_id = self.charge_point_id(),
            key = request.key.as_str(),
            "ChangeConfiguration"
        );
        let response: v16::change_configuration::ChangeConfigurationResponse =
            self.call_typed("ChangeConfiguration", &request).await?;
        Ok(format!("{:?}", response.status))
    }

    pub async fn get_configuration(
        &self,
        keys: Option<Vec<String>>,
    ) -> Result<ConfigurationResult, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("GetConfiguration"));
        }
        info!(charge_point_id = self.charge_point_id(), ?keys, "GetConfiguration");
        let request = v16::get_configuration::GetConfigurationRequest { key: keys };
        let response: v16::get_configuration::GetConfigurationResponse =
            self.call_typed("GetConfiguration", &request).await?;
        Ok(ConfigurationResult {
            configuration_key: response
                .configuration_key
                .unwrap_or_default()
                .into_iter()
                .map(|kv| KeyValue {
                    key: kv.key,
                    readonly: kv.readonly,
                    value: kv.value,
                })
                .collect(),
            unknown_key: response.unknown_key.unwrap_or_default(),
        })
    }

    // ── UnlockConnector ────────────────────────────────────

    pub async fn unlock_connector(&self, connector_id: u32) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            connector_id, "UnlockConnector"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::unlock_connector::UnlockConnectorRequest { connector_id };
                let response: v16::unlock_connector::UnlockConnectorResponse =
                    self.call_typed("UnlockConnector", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::unlock_connector::UnlockConnectorRequest {
                    evse_id: connector_id as i32,
                    connector_id: 1,
                };
                let response: v201::unlock_connector::UnlockConnectorResponse =
                    self.call_typed("UnlockConnector", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── RemoteStart / RemoteStop ───────────────────────────

    pub async fn remote_start_transaction(
        &self,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            id_tag,
            ?connector_id,
            "RemoteStartTransaction"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::remote_start_transaction::RemoteStartTransactionRequest {
                    connector_id,
                    id_tag: id_tag.to_string(),
                    charging_profile: None,
                };
                let response: v16::remote_start_transaction::RemoteStartTransactionResponse =
                    self.call_typed("RemoteStartTransaction", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::request_start_transaction::RequestStartTransactionRequest {
                    evse_id: connector_id.map(|c| c as i32),
                    remote_start_id: self.next_request_id(),
                    id_token: dt201::id_token_type::IdTokenType {
                        id_token: id_tag.to_string(),
                        kind: en201::id_token_enum_type::IdTokenEnumType::Central,
                        additional_info: None,
                    },
                    charging_profile: None,
                    group_id_token: None,
                };
                let response: v201::request_start_transaction::RequestStartTransactionResponse =
                    self.call_typed("RequestStartTransaction", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    pub async fn remote_stop_transaction(&self, transaction_id: i32) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            transaction_id, "RemoteStopTransaction"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::remote_stop_transaction::RemoteStopTransactionRequest {
                    transaction_id,
                };
                let response: v16::remote_stop_transaction::RemoteStopTransactionResponse =
                    self.call_typed("RemoteStopTransaction", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::request_stop_transaction::RequestStopTransactionRequest {
                    transaction_id: transaction_id.to_string(),
                };
                let response: v201::request_stop_transaction::RequestStopTransactionResponse =
                    self.call_typed("RequestStopTransaction", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── Reservations ───────────────────────────────────────

    pub async fn reserve_now(
        &self,
        reservation_id: i32,
        connector_id: i32,
        id_tag: &str,
        parent_id_tag: Option<&str>,
        expiry_date: DateTime<Utc>,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            reservation_id, connector_id, id_tag, "ReserveNow"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::reserve_now::ReserveNowRequest {
                    connector_id: connector_id as u32,
                    expiry_date,
                    id_tag: id_tag.to_string(),
                    parent_id_tag: parent_id_tag.map(str::to_string),
                    reservation_id,
                };
                let response: v16::reserve_now::ReserveNowResponse =
                    self.call_typed("ReserveNow", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::reserve_now::ReserveNowRequest {
                    id: reservation_id,
                    expiry_date_time: expiry_date,
                    connector_type: None,
                    evse_id: (connector_id > 0).then_some(connector_id),
                    id_token: dt201::id_token_type::IdTokenType {
                        id_token: id_tag.to_string(),
                        kind: en201::id_token_enum_type::IdTokenEnumType::Central,
                        additional_info: None,
                    },
                    group_id_token: None,
                };
                let response: v201::reserve_now::ReserveNowResponse =
                    self.call_typed("ReserveNow", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    pub async fn cancel_reservation(&self, reservation_id: i32) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            reservation_id, "CancelReservation"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request =
                    v16::cancel_reservation::CancelReservationRequest { reservation_id };
                let response: v16::cancel_reservation::CancelReservationResponse =
                    self.call_typed("CancelReservation", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request =
                    v201::cancel_reservation::CancelReservationRequest { reservation_id };
                let response: v201::cancel_reservation::CancelReservationResponse =
                    self.call_typed("CancelReservation", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── TriggerMessage ─────────────────────────────────────

    pub async fn trigger_message(
        &self,
        requested: TriggerType,
        connector_id: Option<u32>,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            ?requested,
            ?connector_id,
            "TriggerMessage"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::trigger_message::TriggerMessageRequest {
                    requested_message: match requested {
                        TriggerType::BootNotification => {
                            types16::MessageTrigger::BootNotification
                        }
                        TriggerType::DiagnosticsStatusNotification => {
                            types16::MessageTrigger::DiagnosticsStatusNotification
                        }
                        TriggerType::FirmwareStatusNotification => {
                            types16::MessageTrigger::FirmwareStatusNotification
                        }
                        TriggerType::Heartbeat => types16::MessageTrigger::Heartbeat,
                        TriggerType::MeterValues => types16::MessageTrigger::MeterValues,
                        TriggerType::StatusNotification => {
                            types16::MessageTrigger::StatusNotification
                        }
                    },
                    connector_id,
                };
                let response: v16::trigger_message::TriggerMessageResponse =
                    self.call_typed("TriggerMessage", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                use en201::message_trigger_enum_type::MessageTriggerEnumType;
                let request = v201::trigger_message::TriggerMessageRequest {
                    requested_message: match requested {
                        TriggerType::BootNotification => MessageTriggerEnumType::BootNotification,
                        TriggerType::Heartbeat => MessageTriggerEnumType::Heartbeat,
                        TriggerType::MeterValues => MessageTriggerEnumType::MeterValues,
                        TriggerType::StatusNotification => {
                            MessageTriggerEnumType::StatusNotification
                        }
                        TriggerType::FirmwareStatusNotification => {
                            MessageTriggerEnumType::FirmwareStatusNotification
                        }
                        TriggerType::DiagnosticsStatusNotification => {
                            MessageTriggerEnumType::LogStatusNotification
                        }
                    },
                    evse: connector_id.map(|id| dt201::evse_type::EVSEType {
                        id: id as i32,
                        connector_id: None,
                    }),
                };
                let response: v201::trigger_message::TriggerMessageResponse =
                    self.call_typed("TriggerMessage", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── Local authorization list ───────────────────────────

    pub async fn send_local_list(
        &self,
        list_version: i32,
        update_type: UpdateKind,
        entries: Option<Vec<LocalAuthEntry>>,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            list_version,
            ?update_type,
            "SendLocalList"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let local_authorization_list = entries.map(|list| {
                    list.into_iter()
                        .map(|entry| types16::AuthorizationData {
                            id_tag: entry.id_tag,
                            id_tag_info: entry.status.map(|status| types16::IdTagInfo {
                                status: parse_auth_status_16(&status),
                                expiry_date: entry
                                    .expiry_date
                                    .as_deref()
                                    .and_then(parse_rfc3339),
                                parent_id_tag: entry.parent_id_tag,
                            }),
                        })
                        .collect()
                });
                let request = v16::send_local_list::SendLocalListRequest {
                    list_version,
                    local_authorization_list,
                    update_type: match update_type {
                        UpdateKind::Full => types16::UpdateType::Full,
                        UpdateKind::Differential => types16::UpdateType::Differential,
                    },
                };
                let response: v16::send_local_list::SendLocalListResponse =
                    self.call_typed("SendLocalList", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                use en201::authorization_status_enum_type::AuthorizationStatusEnumType;
                let local_authorization_list = entries.map(|list| {
                    list.into_iter()
                        .map(|entry| dt201::authorization_data::AuthorizationData {
                            id_token: dt201::id_token_type::IdTokenType {
                                id_token: entry.id_tag,
                                kind: en201::id_token_enum_type::IdTokenEnumType::Central,
                                additional_info: None,
                            },
                            id_token_info: entry.status.map(|status| {
                                dt201::id_token_info_type::IdTokenInfoType {
                                    status: match status.to_lowercase().as_str() {
                                        "accepted" => AuthorizationStatusEnumType::Accepted,
                                        "blocked" => AuthorizationStatusEnumType::Blocked,
                                        "expired" => AuthorizationStatusEnumType::Expired,
                                        "concurrenttx" => {
                                            AuthorizationStatusEnumType::ConcurrentTx
                                        }
                                        _ => AuthorizationStatusEnumType::Invalid,
                                    },
                                    cache_expiry_date_time: entry
                                        .expiry_date
                                        .as_deref()
                                        .and_then(parse_rfc3339),
                                    charging_priority: None,
                                    language1: None,
                                    evse_id: None,
                                    language2: None,
                                    group_id_token: None,
                                    personal_message: None,
                                }
                            }),
                        })
                        .collect()
                });
                let request = v201::send_local_list::SendLocalListRequest {
                    version_number: list_version,
                    local_authorization_list,
                    update_type: match update_type {
                        UpdateKind::Full => en201::update_enum_type::UpdateEnumType::Full,
                        UpdateKind::Differential => {
                            en201::update_enum_type::UpdateEnumType::Differential
                        }
                    },
                };
                let response: v201::send_local_list::SendLocalListResponse =
                    self.call_typed("SendLocalList", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    pub async fn get_local_list_version(&self) -> Result<i32, RpcError> {
        info!(charge_point_id = self.charge_point_id(), "GetLocalListVersion");
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::get_local_list_version::GetLocalListVersionRequest {};
                let response: v16::get_local_list_version::GetLocalListVersionResponse =
                    self.call_typed("GetLocalListVersion", &request).await?;
                Ok(response.list_version)
            }
            OcppVersion::V201 => {
                let request = v201::get_local_list_version::GetLocalListVersionRequest {};
                let response: v201::get_local_list_version::GetLocalListVersionResponse =
                    self.call_typed("GetLocalListVersion", &request).await?;
                Ok(response.version_number)
            }
        }
    }

    // ── Charging profiles ──────────────────────────────────

    /// Send a charging profile. `charging_profile` is the version-specific
    /// profile JSON; it is validated against the negotiated version here.
    pub async fn set_charging_profile(
        &self,
        connector_id: i32,
        charging_profile: serde_json::Value,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            connector_id, "SetChargingProfile"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let profile: types16::ChargingProfile = serde_json::from_value(charging_profile)
                    .map_err(|e| {
                        RpcError::InvalidResponse(format!("invalid 1.6 ChargingProfile: {}", e))
                    })?;
                let request = v16::set_charging_profile::SetChargingProfileRequest {
                    connector_id,
                    cs_charging_profiles: profile,
                };
                let response: v16::set_charging_profile::SetChargingProfileResponse =
                    self.call_typed("SetChargingProfile", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let profile: dt201::charging_profile_type::ChargingProfileType =
                    serde_json::from_value(charging_profile).map_err(|e| {
                        RpcError::InvalidResponse(format!("invalid 2.0.1 ChargingProfile: {}", e))
                    })?;
                let request = v201::set_charging_profile::SetChargingProfileRequest {
                    evse_id: connector_id,
                    charging_profile: profile,
                };
                let response: v201::set_charging_profile::SetChargingProfileResponse =
                    self.call_typed("SetChargingProfile", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    pub async fn clear_charging_profile(
        &self,
        criteria: super::ClearChargingProfileCriteria,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            ?criteria,
            "ClearChargingProfile"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let purpose = criteria.charging_profile_purpose.as_deref().map(|p| match p {
                    "ChargePointMaxProfile" | "ChargingStationMaxProfile" => {
                        types16::ChargingProfilePurposeType::ChargePointMaxProfile
                    }
                    "TxProfile" => types16::ChargingProfilePurposeType::TxProfile,
                    _ => types16::ChargingProfilePurposeType::TxDefaultProfile,
                });
                let request = v16::clear_charging_profile::ClearChargingProfileRequest {
                    id: criteria.charging_profile_id,
                    connector_id: criteria.evse_id,
                    charging_profile_purpose: purpose,
                    stack_level: criteria.stack_level,
                };
                let response: v16::clear_charging_profile::ClearChargingProfileResponse =
                    self.call_typed("ClearChargingProfile", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                use en201::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;
                let purpose = criteria.charging_profile_purpose.as_deref().map(|p| match p {
                    "ChargePointMaxProfile" | "ChargingStationMaxProfile" => {
                        ChargingProfilePurposeEnumType::ChargingStationMaxProfile
                    }
                    "TxProfile" => ChargingProfilePurposeEnumType::TxProfile,
                    _ => ChargingProfilePurposeEnumType::TxDefaultProfile,
                });
                let charging_profile_criteria = (criteria.evse_id.is_some()
                    || purpose.is_some()
                    || criteria.stack_level.is_some())
                .then_some(
                    dt201::clear_charging_profile_type::ClearChargingProfileType {
                        evse_id: criteria.evse_id,
                        charging_profile_purpose: purpose,
                        stack_level: criteria.stack_level,
                    },
                );
                let request = v201::clear_charging_profile::ClearChargingProfileRequest {
                    charging_profile_id: criteria.charging_profile_id,
                    charging_profile_criteria,
                };
                let response: v201::clear_charging_profile::ClearChargingProfileResponse =
                    self.call_typed("ClearChargingProfile", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    pub async fn get_composite_schedule(
        &self,
        connector_id: i32,
        duration: i32,
        charging_rate_unit: Option<&str>,
    ) -> Result<CompositeScheduleResult, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            connector_id, duration, "GetCompositeSchedule"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let rate_unit = charging_rate_unit.map(|u| match u.to_uppercase().as_str() {
                    "A" => types16::ChargingRateUnitType::A,
                    _ => types16::ChargingRateUnitType::W,
                });
                let request = v16::get_composite_schedule::GetCompositeScheduleRequest {
                    connector_id,
                    duration,
                    charging_rate_unit: rate_unit,
                };
                let response: v16::get_composite_schedule::GetCompositeScheduleResponse =
                    self.call_typed("GetCompositeSchedule", &request).await?;
                Ok(CompositeScheduleResult {
                    status: format!("{:?}", response.status),
                    schedule: response
                        .charging_schedule
                        .map(|s| serde_json::to_value(&s).unwrap_or_default()),
                    connector_id: response.connector_id,
                    schedule_start: response.schedule_start.map(|dt| dt.to_rfc3339()),
                })
            }
            OcppVersion::V201 => {
                use en201::charging_rate_unit_enum_type::ChargingRateUnitEnumType;
                let rate_unit = charging_rate_unit.map(|u| match u.to_uppercase().as_str() {
                    "A" => ChargingRateUnitEnumType::A,
                    _ => ChargingRateUnitEnumType::W,
                });
                let request = v201::get_composite_schedule::GetCompositeScheduleRequest {
                    duration,
                    charging_rate_unit: rate_unit,
                    evse_id: connector_id,
                };
                let response: v201::get_composite_schedule::GetCompositeScheduleResponse =
                    self.call_typed("GetCompositeSchedule", &request).await?;
                Ok(CompositeScheduleResult {
                    status: format!("{:?}", response.status),
                    schedule: response
                        .schedule
                        .map(|s| serde_json::to_value(&s).unwrap_or_default()),
                    connector_id: None,
                    schedule_start: None,
                })
            }
        }
    }

    // ── DataTransfer ───────────────────────────────────────

    pub async fn data_transfer(
        &self,
        vendor_id: impl Into<String>,
        message_id: Option<String>,
        data: Option<String>,
    ) -> Result<DataTransferResult, RpcError> {
        let vendor_id = vendor_id.into();
        info!(
            charge_point_id = self.charge_point_id(),
            vendor_id = vendor_id.as_str(),
            ?message_id,
            "DataTransfer"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::data_transfer::DataTransferRequest {
                    vendor_string: vendor_id,
                    message_id,
                    data,
                };
                let response: v16::data_transfer::DataTransferResponse =
                    self.call_typed("DataTransfer", &request).await?;
                Ok(DataTransferResult {
                    status: format!("{:?}", response.status),
                    data: response.data,
                })
            }
            OcppVersion::V201 => {
                let request = v201::datatransfer::DataTransferRequest {
                    vendor_id,
                    message_id,
                    data,
                };
                let response: v201::datatransfer::DataTransferResponse =
                    self.call_typed("DataTransfer", &request).await?;
                Ok(DataTransferResult {
                    status: format!("{:?}", response.status),
                    data: response.data,
                })
            }
        }
    }

    // ── ClearCache ─────────────────────────────────────────

    pub async fn clear_cache(&self) -> Result<String, RpcError> {
        info!(charge_point_id = self.charge_point_id(), "ClearCache");
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::clear_cache::ClearCacheRequest {};
                let response: v16::clear_cache::ClearCacheResponse =
                    self.call_typed("ClearCache", &request).await?;
                Ok(format!("{:?}", response.status))
            }
            OcppVersion::V201 => {
                let request = v201::clear_cache::ClearCacheRequest {};
                let response: v201::clear_cache::ClearCacheResponse =
                    self.call_typed("ClearCache", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }

    // ── Diagnostics and firmware (1.6 forms) ───────────────

    /// GetDiagnostics (1.6 only). Returns the file name the charge point
    /// will upload, when one is available.
    pub async fn get_diagnostics(
        &self,
        location: &str,
        retries: Option<i32>,
        retry_interval: Option<i32>,
        start_time: Option<DateTime<Utc>>,
        stop_time: Option<DateTime<Utc>>,
    ) -> Result<Option<String>, RpcError> {
        if self.ocpp_version() != OcppVersion::V16 {
            return Err(self.unsupported("GetDiagnostics"));
        }
        info!(charge_point_id = self.charge_point_id(), location, "GetDiagnostics");
        let request = v16::get_diagnostics::GetDiagnosticsRequest {
            location: location.to_string(),
            retries,
            retry_interval,
            start_time,
            stop_time,
        };
        let response: v16::get_diagnostics::GetDiagnosticsResponse =
            self.call_typed("GetDiagnostics", &request).await?;
        Ok(response.file_name)
    }

    /// UpdateFirmware. The 1.6 response is empty; a successful exchange
    /// reports `Accepted`.
    pub async fn update_firmware(
        &self,
        location: &str,
        retrieve_date: DateTime<Utc>,
        retries: Option<i32>,
        retry_interval: Option<i32>,
    ) -> Result<String, RpcError> {
        info!(
            charge_point_id = self.charge_point_id(),
            location,
            %retrieve_date,
            "UpdateFirmware"
        );
        match self.ocpp_version() {
            OcppVersion::V16 => {
                let request = v16::update_firmware::UpdateFirmwareRequest {
                    location: location.to_string(),
                    retries,
                    retrieve_date,
                    retry_interval,
                };
                let _: serde_json::Value = self.call_typed("UpdateFirmware", &request).await?;
                Ok("Accepted".to_string())
            }
            OcppVersion::V201 => {
                let request = v201::update_firmware::UpdateFirmwareRequest {
                    retries,
                    retry_interval,
                    request_id: self.next_request_id(),
                    firmware: dt201::firmware_type::FirmwareType {
                        location: location.to_string(),
                        retrieve_date_time: retrieve_date,
                        install_date_time: None,
                        signing_certificate: None,
                        signature: None,
                    },
                };
                let response: v201::update_firmware::UpdateFirmwareResponse =
                    self.call_typed("UpdateFirmware", &request).await?;
                Ok(format!("{:?}", response.status))
            }
        }
    }
}

fn parse_auth_status_16(status: &str) -> types16::AuthorizationStatus {
    match status.to_lowercase().as_str() {
        "accepted" => types16::AuthorizationStatus::Accepted,
        "blocked" => types16::AuthorizationStatus::Blocked,
        "expired" => types16::AuthorizationStatus::Expired,
        "concurrenttx" | "concurrent_tx" => types16::AuthorizationStatus::ConcurrentTx,
        _ => types16::AuthorizationStatus::Invalid,
    }
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
