//! Per-peer inbound call dispatch
//!
//! One `ChargePointHandler` per session, wired as the session endpoint's
//! [`RpcListener`]. It decodes payloads into typed records, applies the
//! registration gating, invokes [`CentralSystemEvents`] and encodes the
//! decision back onto the negotiated protocol version.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatResponse;
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, DataTransferStatus, IdTagInfo, RegistrationStatus,
};

use super::events::{
    AuthorizationVerdict, BootInfo, CentralSystemEvents, DataTransferVerdict, IdTagDecision,
    MeterValuesInfo, RegistrationVerdict, StartTransactionInfo, StatusNotificationInfo,
    StopTransactionInfo, TransactionEventInfo,
};
use super::session::ChargePointSession;
use crate::config::CentralSystemConfig;
use crate::messages::iso15118::{self, PNC_VENDOR_ID};
use crate::messages::{originates_while_pending, security, OcppVersion};
use crate::rpc::{decode_payload, encode_payload, CallError, ErrorCode, RpcListener};

/// Inbound call handler for one charge point session.
pub struct ChargePointHandler {
    session: Arc<ChargePointSession>,
    events: Arc<dyn CentralSystemEvents>,
    config: Arc<CentralSystemConfig>,
}

impl ChargePointHandler {
    pub fn new(
        session: Arc<ChargePointSession>,
        events: Arc<dyn CentralSystemEvents>,
        config: Arc<CentralSystemConfig>,
    ) -> Self {
        Self {
            session,
            events,
            config,
        }
    }

    fn charge_point_id(&self) -> &str {
        self.session.charge_point_id()
    }
}

#[async_trait]
impl RpcListener for ChargePointHandler {
    async fn call_received(&self, action: &str, payload: Value) -> Result<Value, CallError> {
        self.session.touch();

        // A peer that has not been accepted yet only gets the restricted
        // subset through.
        if !self.session.is_accepted()
            && !originates_while_pending(action)
            && action != "DataTransfer"
        {
            warn!(
                charge_point_id = self.charge_point_id(),
                action, "call refused while registration is pending"
            );
            return Err(CallError::security("Charge point not accepted"));
        }

        match self.session.ocpp_version() {
            OcppVersion::V16 => self.dispatch_v16(action, payload).await,
            OcppVersion::V201 => self.dispatch_v201(action, payload).await,
        }
    }

    async fn disconnected(&self) {
        self.events
            .charge_point_disconnected(self.charge_point_id())
            .await;
    }
}

// ── Decision mapping helpers ───────────────────────────────────

fn id_tag_info(decision: IdTagDecision) -> IdTagInfo {
    IdTagInfo {
        status: match decision.verdict {
            AuthorizationVerdict::Accepted => AuthorizationStatus::Accepted,
            AuthorizationVerdict::Blocked => AuthorizationStatus::Blocked,
            AuthorizationVerdict::Expired => AuthorizationStatus::Expired,
            AuthorizationVerdict::Invalid => AuthorizationStatus::Invalid,
            AuthorizationVerdict::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
        },
        expiry_date: decision.expiry_date,
        parent_id_tag: decision.parent_id_tag,
    }
}

impl ChargePointHandler {
    // ── OCPP 1.6 ───────────────────────────────────────────

    async fn dispatch_v16(&self, action: &str, payload: Value) -> Result<Value, CallError> {
        let charge_point_id = self.charge_point_id();
        match action {
            "Authorize" => {
                let request: AuthorizeRequest = decode_payload(&payload)?;
                info!(charge_point_id, id_tag = request.id_tag.as_str(), "Authorize");
                let decision = self.events.authorize(charge_point_id, &request.id_tag).await;
                encode_payload(&AuthorizeResponse {
                    id_tag_info: id_tag_info(decision),
                })
            }

            "BootNotification" => {
                let request: BootNotificationRequest = decode_payload(&payload)?;
                info!(
                    charge_point_id,
                    vendor = request.charge_point_vendor.as_str(),
                    model = request.charge_point_model.as_str(),
                    "BootNotification"
                );
                let verdict = self
                    .events
                    .boot_notification(
                        charge_point_id,
                        BootInfo {
                            vendor: request.charge_point_vendor,
                            model: request.charge_point_model,
                            serial_number: request.charge_point_serial_number,
                            firmware_version: request.firmware_version,
                            iccid: request.iccid,
                            imsi: request.imsi,
                            meter_type: request.meter_type,
                            meter_serial_number: request.meter_serial_number,
                        },
                    )
                    .await;
                self.session.set_registration_status(verdict);

                // Accepted peers heartbeat, the others retry their boot.
                let interval_secs = if verdict == RegistrationVerdict::Accepted {
                    self.config.heartbeat_interval_secs
                } else {
                    self.config.boot_notification_retry_interval_secs
                };
                encode_payload(&BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: interval_secs as _,
                    status: match verdict {
                        RegistrationVerdict::Accepted => RegistrationStatus::Accepted,
                        RegistrationVerdict::Pending => RegistrationStatus::Pending,
                        RegistrationVerdict::Rejected => RegistrationStatus::Rejected,
                    },
                })
            }

            "DataTransfer" => {
                let request: DataTransferRequest = decode_payload(&payload)?;
                if request.vendor_string == PNC_VENDOR_ID {
                    return self
                        .dispatch_pnc(request.message_id.as_deref(), request.data.as_deref())
                        .await;
                }
                let decision = self
                    .events
                    .data_transfer(
                        charge_point_id,
                        &request.vendor_string,
                        request.message_id.as_deref(),
                        request.data.as_deref(),
                    )
                    .await;
                encode_payload(&DataTransferResponse {
                    status: match decision.status {
                        DataTransferVerdict::Accepted => DataTransferStatus::Accepted,
                        DataTransferVerdict::Rejected => DataTransferStatus::Rejected,
                        DataTransferVerdict::UnknownVendorId => {
                            DataTransferStatus::UnknownVendorId
                        }
                        DataTransferVerdict::UnknownMessageId => {
                            DataTransferStatus::UnknownMessageId
                        }
                    },
                    data: decision.data,
                })
            }

            "DiagnosticsStatusNotification" => {
                let request: DiagnosticsStatusNotificationRequest = decode_payload(&payload)?;
                self.events
                    .diagnostics_status_notification(
                        charge_point_id,
                        format!("{:?}", request.status),
                    )
                    .await;
                encode_payload(&DiagnosticsStatusNotificationResponse {})
            }

            "FirmwareStatusNotification" => {
                let request: FirmwareStatusNotificationRequest = decode_payload(&payload)?;
                self.events
                    .firmware_status_notification(charge_point_id, format!("{:?}", request.status))
                    .await;
                encode_payload(&FirmwareStatusNotificationResponse {})
            }

            "Heartbeat" => {
                self.events.heartbeat(charge_point_id).await;
                encode_payload(&HeartbeatResponse {
                    current_time: Utc::now(),
                })
            }

            "MeterValues" => {
                let request: MeterValuesRequest = decode_payload(&payload)?;
                let meter_value =
                    serde_json::to_value(&request.meter_value).unwrap_or_default();
                self.events
                    .meter_values(
                        charge_point_id,
                        MeterValuesInfo {
                            connector_id: request.connector_id,
                            transaction_id: request.transaction_id,
                            meter_value,
                        },
                    )
                    .await;
                encode_payload(&MeterValuesResponse {})
            }

            "StartTransaction" => {
                let request: StartTransactionRequest = decode_payload(&payload)?;
                info!(
                    charge_point_id,
                    connector_id = request.connector_id,
                    id_tag = request.id_tag.as_str(),
                    meter_start = request.meter_start,
                    "StartTransaction"
                );
                let decision = self
                    .events
                    .start_transaction(
                        charge_point_id,
                        StartTransactionInfo {
                            connector_id: request.connector_id,
                            id_tag: request.id_tag,
                            meter_start: request.meter_start,
                            timestamp: request.timestamp,
                            reservation_id: request.reservation_id,
                        },
                    )
                    .await;
                encode_payload(&StartTransactionResponse {
                    transaction_id: decision.transaction_id,
                    id_tag_info: id_tag_info(decision.id_tag_info),
                })
            }

            "StatusNotification" => {
                let request: StatusNotificationRequest = decode_payload(&payload)?;
                self.events
                    .status_notification(
                        charge_point_id,
                        StatusNotificationInfo {
                            connector_id: request.connector_id,
                            status: format!("{:?}", request.status),
                            error_code: format!("{:?}", request.error_code),
                            info: request.info,
                            timestamp: request.timestamp,
                        },
                    )
                    .await;
                encode_payload(&StatusNotificationResponse {})
            }

            "StopTransaction" => {
                let request: StopTransactionRequest = decode_payload(&payload)?;
                info!(
                    charge_point_id,
                    transaction_id = request.transaction_id,
                    meter_stop = request.meter_stop,
                    "StopTransaction"
                );
                let decision = self
                    .events
                    .stop_transaction(
                        charge_point_id,
                        StopTransactionInfo {
                            transaction_id: request.transaction_id,
                            id_tag: request.id_tag,
                            meter_stop: request.meter_stop,
                            timestamp: request.timestamp,
                            reason: request.reason.map(|r| format!("{:?}", r)),
                        },
                    )
                    .await;
                encode_payload(&StopTransactionResponse {
                    id_tag_info: decision.map(id_tag_info),
                })
            }

            // ── Security extension ─────────────────────────
            "LogStatusNotification" => {
                let request: security::LogStatusNotificationRequest = decode_payload(&payload)?;
                self.events
                    .log_status_notification(
                        charge_point_id,
                        format!("{:?}", request.status),
                        request.request_id,
                    )
                    .await;
                encode_payload(&security::LogStatusNotificationResponse {})
            }

            "SecurityEventNotification" => {
                let request: security::SecurityEventNotificationRequest =
                    decode_payload(&payload)?;
                self.events
                    .security_event_notification(
                        charge_point_id,
                        &request.kind,
                        request.timestamp,
                        request.tech_info.as_deref(),
                    )
                    .await;
                encode_payload(&security::SecurityEventNotificationResponse {})
            }

            "SignCertificate" => {
                let request: security::SignCertificateRequest = decode_payload(&payload)?;
                let accepted = self
                    .events
                    .sign_certificate(charge_point_id, &request.csr)
                    .await;
                encode_payload(&security::SignCertificateResponse {
                    status: if accepted {
                        security::GenericStatus::Accepted
                    } else {
                        security::GenericStatus::Rejected
                    },
                })
            }

            "SignedFirmwareStatusNotification" => {
                let request: security::SignedFirmwareStatusNotificationRequest =
                    decode_payload(&payload)?;
                self.events
                    .signed_firmware_status_notification(
                        charge_point_id,
                        format!("{:?}", request.status),
                        request.request_id,
                    )
                    .await;
                encode_payload(&security::SignedFirmwareStatusNotificationResponse {})
            }

            other => Err(CallError::not_implemented(other)),
        }
    }

    // ── ISO 15118 PnC over DataTransfer ────────────────────

    async fn dispatch_pnc(
        &self,
        message_id: Option<&str>,
        data: Option<&str>,
    ) -> Result<Value, CallError> {
        let charge_point_id = self.charge_point_id();

        let reply = |status: DataTransferStatus, data: Option<String>| {
            encode_payload(&DataTransferResponse { status, data })
        };
        let accepted = |payload: Result<String, serde_json::Error>| match payload {
            Ok(data) => reply(DataTransferStatus::Accepted, Some(data)),
            Err(e) => Err(CallError::internal(e.to_string())),
        };
        let bad_payload = |e: serde_json::Error| {
            CallError::new(ErrorCode::FormationViolation, e.to_string())
        };

        match message_id {
            Some("Authorize") => {
                let request: iso15118::PncAuthorizeRequest =
                    iso15118::decode_envelope(data).map_err(bad_payload)?;
                let hash_data = request
                    .iso15118_certificate_hash_data
                    .clone()
                    .unwrap_or_default();
                let decision = self
                    .events
                    .iso15118_authorize(
                        charge_point_id,
                        request.certificate.as_deref(),
                        &request.id_token,
                        &hash_data,
                    )
                    .await;
                let response = iso15118::PncAuthorizeResponse {
                    id_token_info: iso15118::PncIdTokenInfo {
                        status: match decision.verdict {
                            AuthorizationVerdict::Accepted => {
                                iso15118::PncAuthorizationStatus::Accepted
                            }
                            AuthorizationVerdict::Blocked => {
                                iso15118::PncAuthorizationStatus::Blocked
                            }
                            AuthorizationVerdict::Expired => {
                                iso15118::PncAuthorizationStatus::Expired
                            }
                            AuthorizationVerdict::Invalid => {
                                iso15118::PncAuthorizationStatus::Invalid
                            }
                            AuthorizationVerdict::ConcurrentTx => {
                                iso15118::PncAuthorizationStatus::ConcurrentTx
                            }
                        },
                        cache_expiry_date_time: decision.expiry_date,
                    },
                    certificate_status: None,
                };
                accepted(iso15118::encode_envelope(&response))
            }

            Some("Get15118EVCertificate") => {
                let request: iso15118::Get15118EvCertificateRequest =
                    iso15118::decode_envelope(data).map_err(bad_payload)?;
                let exi = self
                    .events
                    .iso15118_get_ev_certificate(
                        charge_point_id,
                        &request.iso15118_schema_version,
                        request.action,
                        &request.exi_request,
                    )
                    .await;
                let response = match exi {
                    Some(exi_response) => iso15118::Get15118EvCertificateResponse {
                        status: iso15118::Iso15118EvCertificateStatus::Accepted,
                        exi_response,
                    },
                    None => iso15118::Get15118EvCertificateResponse {
                        status: iso15118::Iso15118EvCertificateStatus::Failed,
                        exi_response: String::new(),
                    },
                };
                accepted(iso15118::encode_envelope(&response))
            }

            Some("GetCertificateStatus") => {
                let request: iso15118::GetCertificateStatusRequest =
                    iso15118::decode_envelope(data).map_err(bad_payload)?;
                let result = self
                    .events
                    .iso15118_get_certificate_status(charge_point_id, request.ocsp_request_data)
                    .await;
                let response = iso15118::GetCertificateStatusResponse {
                    status: match result {
                        Some(_) => iso15118::GetCertificateStatusKind::Accepted,
                        None => iso15118::GetCertificateStatusKind::Failed,
                    },
                    ocsp_result: result,
                };
                accepted(iso15118::encode_envelope(&response))
            }

            Some("SignCertificate") => {
                let request: iso15118::PncSignCertificateRequest =
                    iso15118::decode_envelope(data).map_err(bad_payload)?;
                let ok = self
                    .events
                    .iso15118_sign_certificate(charge_point_id, &request.csr)
                    .await;
                let response = iso15118::PncSignCertificateResponse {
                    status: if ok {
                        security::GenericStatus::Accepted
                    } else {
                        security::GenericStatus::Rejected
                    },
                };
                accepted(iso15118::encode_envelope(&response))
            }

            other => {
                warn!(charge_point_id, message_id = ?other, "unknown PnC message");
                reply(DataTransferStatus::UnknownMessageId, None)
            }
        }
    }

    // ── OCPP 2.0.1 ─────────────────────────────────────────

    async fn dispatch_v201(&self, action: &str, payload: Value) -> Result<Value, CallError> {
        use rust_ocpp::v2_0_1::datatypes::id_token_info_type::IdTokenInfoType;
        use rust_ocpp::v2_0_1::enumerations::authorization_status_enum_type::AuthorizationStatusEnumType;
        use rust_ocpp::v2_0_1::enumerations::data_transfer_status_enum_type::DataTransferStatusEnumType;
        use rust_ocpp::v2_0_1::enumerations::registration_status_enum_type::RegistrationStatusEnumType;
        use rust_ocpp::v2_0_1::messages::authorize as authorize_20;
        use rust_ocpp::v2_0_1::messages::boot_notification as boot_20;
        use rust_ocpp::v2_0_1::messages::datatransfer as data_transfer_20;
        use rust_ocpp::v2_0_1::messages::firmware_status_notification as firmware_20;
        use rust_ocpp::v2_0_1::messages::heartbeat as heartbeat_20;
        use rust_ocpp::v2_0_1::messages::meter_values as meter_values_20;
        use rust_ocpp::v2_0_1::messages::security_event_notification as security_event_20;
        use rust_ocpp::v2_0_1::messages::status_notification as status_20;
        use rust_ocpp::v2_0_1::messages::transaction_event as transaction_20;

        let charge_point_id = self.charge_point_id();

        let verdict_20 = |verdict: AuthorizationVerdict| match verdict {
            AuthorizationVerdict::Accepted => AuthorizationStatusEnumType::Accepted,
            AuthorizationVerdict::Blocked => AuthorizationStatusEnumType::Blocked,
            AuthorizationVerdict::Expired => AuthorizationStatusEnumType::Expired,
            AuthorizationVerdict::Invalid => AuthorizationStatusEnumType::Invalid,
            AuthorizationVerdict::ConcurrentTx => AuthorizationStatusEnumType::ConcurrentTx,
        };
        let id_token_info_20 = |status: AuthorizationStatusEnumType| IdTokenInfoType {
            status,
            cache_expiry_date_time: None,
            charging_priority: None,
            language1: None,
            evse_id: None,
            language2: None,
            group_id_token: None,
            personal_message: None,
        };

        match action {
            "Authorize" => {
                let request: authorize_20::AuthorizeRequest = decode_payload(&payload)?;
                let decision = self
                    .events
                    .authorize(charge_point_id, &request.id_token.id_token)
                    .await;
                encode_payload(&authorize_20::AuthorizeResponse {
                    certificate_status: None,
                    id_token_info: id_token_info_20(verdict_20(decision.verdict)),
                })
            }

            "BootNotification" => {
                let request: boot_20::BootNotificationRequest = decode_payload(&payload)?;
                let station = &request.charging_station;
                let (iccid, imsi) = station
                    .modem
                    .as_ref()
                    .map(|m| (m.iccid.clone(), m.imsi.clone()))
                    .unwrap_or((None, None));
                let verdict = self
                    .events
                    .boot_notification(
                        charge_point_id,
                        BootInfo {
                            vendor: station.vendor_name.clone(),
                            model: station.model.clone(),
                            serial_number: station.serial_number.clone(),
                            firmware_version: station.firmware_version.clone(),
                            iccid,
                            imsi,
                            meter_type: None,
                            meter_serial_number: None,
                        },
                    )
                    .await;
                self.session.set_registration_status(verdict);
                let interval_secs = if verdict == RegistrationVerdict::Accepted {
                    self.config.heartbeat_interval_secs
                } else {
                    self.config.boot_notification_retry_interval_secs
                };
                encode_payload(&boot_20::BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: interval_secs as _,
                    status: match verdict {
                        RegistrationVerdict::Accepted => RegistrationStatusEnumType::Accepted,
                        RegistrationVerdict::Pending => RegistrationStatusEnumType::Pending,
                        RegistrationVerdict::Rejected => RegistrationStatusEnumType::Rejected,
                    },
                    status_info: None,
                })
            }

            "DataTransfer" => {
                let request: data_transfer_20::DataTransferRequest = decode_payload(&payload)?;
                let decision = self
                    .events
                    .data_transfer(
                        charge_point_id,
                        &request.vendor_id,
                        request.message_id.as_deref(),
                        request.data.as_deref(),
                    )
                    .await;
                encode_payload(&data_transfer_20::DataTransferResponse {
                    status: match decision.status {
                        DataTransferVerdict::Accepted => DataTransferStatusEnumType::Accepted,
                        DataTransferVerdict::Rejected => DataTransferStatusEnumType::Rejected,
                        DataTransferVerdict::UnknownVendorId => {
                            DataTransferStatusEnumType::UnknownVendorId
                        }
                        DataTransferVerdict::UnknownMessageId => {
                            DataTransferStatusEnumType::UnknownMessageId
                        }
                    },
                    data: decision.data,
                    status_info: None,
                })
            }

            "FirmwareStatusNotification" => {
                let request: firmware_20::FirmwareStatusNotificationRequest =
                    decode_payload(&payload)?;
                self.events
                    .firmware_status_notification(charge_point_id, format!("{:?}", request.status))
                    .await;
                encode_payload(&firmware_20::FirmwareStatusNotificationResponse {})
            }

            "Heartbeat" => {
                self.events.heartbeat(charge_point_id).await;
                encode_payload(&heartbeat_20::HeartbeatResponse {
                    current_time: Utc::now(),
                })
            }

            "MeterValues" => {
                let request: meter_values_20::MeterValuesRequest = decode_payload(&payload)?;
                let meter_value =
                    serde_json::to_value(&request.meter_value).unwrap_or_default();
                self.events
                    .meter_values(
                        charge_point_id,
                        MeterValuesInfo {
                            connector_id: request.evse_id as u32,
                            transaction_id: None,
                            meter_value,
                        },
                    )
                    .await;
                encode_payload(&meter_values_20::MeterValuesResponse {})
            }

            "SecurityEventNotification" => {
                let request: security_event_20::SecurityEventNotificationRequest =
                    decode_payload(&payload)?;
                self.events
                    .security_event_notification(
                        charge_point_id,
                        &request.kind,
                        request.timestamp,
                        request.tech_info.as_deref(),
                    )
                    .await;
                encode_payload(&security_event_20::SecurityEventNotificationResponse {})
            }

            "StatusNotification" => {
                let request: status_20::StatusNotificationRequest = decode_payload(&payload)?;
                self.events
                    .status_notification(
                        charge_point_id,
                        StatusNotificationInfo {
                            connector_id: request.evse_id as u32,
                            status: format!("{:?}", request.connector_status),
                            error_code: String::new(),
                            info: None,
                            timestamp: Some(request.timestamp),
                        },
                    )
                    .await;
                encode_payload(&status_20::StatusNotificationResponse {})
            }

            "TransactionEvent" => {
                let request: transaction_20::TransactionEventRequest = decode_payload(&payload)?;
                let info = TransactionEventInfo {
                    event_type: format!("{:?}", request.event_type),
                    transaction_id: request.transaction_info.transaction_id.clone(),
                    id_token: request.id_token.as_ref().map(|t| t.id_token.clone()),
                    evse_id: request.evse.as_ref().map(|e| e.id),
                    seq_no: request.seq_no as i32,
                    timestamp: request.timestamp,
                    trigger_reason: format!("{:?}", request.trigger_reason),
                };
                let verdict = self.events.transaction_event(charge_point_id, info).await;
                encode_payload(&transaction_20::TransactionEventResponse {
                    total_cost: None,
                    charging_priority: None,
                    id_token_info: verdict.map(|v| id_token_info_20(verdict_20(v))),
                    updated_personal_message: None,
                })
            }

            other => Err(CallError::not_implemented(other)),
        }
    }
}
