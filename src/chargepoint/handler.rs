//! Server-initiated call dispatch on the charge point
//!
//! Configuration, local-list and certificate-store operations are served
//! by the stack itself; hardware and policy operations are delegated to
//! [`ChargePointEvents`]. While the registration status is not
//! `Accepted`, only the pending whitelist is served.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use rust_ocpp::v1_6::messages::change_availability::ChangeAvailabilityRequest;
use rust_ocpp::v1_6::messages::change_configuration::ChangeConfigurationRequest;
use rust_ocpp::v1_6::messages::clear_charging_profile::ClearChargingProfileRequest;
use rust_ocpp::v1_6::messages::data_transfer::DataTransferRequest;
use rust_ocpp::v1_6::messages::get_composite_schedule::GetCompositeScheduleRequest;
use rust_ocpp::v1_6::messages::get_configuration::GetConfigurationRequest;
use rust_ocpp::v1_6::messages::get_diagnostics::GetDiagnosticsRequest;
use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use rust_ocpp::v1_6::messages::reserve_now::ReserveNowRequest;
use rust_ocpp::v1_6::messages::reset::ResetRequest;
use rust_ocpp::v1_6::messages::send_local_list::SendLocalListRequest;
use rust_ocpp::v1_6::messages::set_charging_profile::SetChargingProfileRequest;
use rust_ocpp::v1_6::messages::trigger_message::TriggerMessageRequest;
use rust_ocpp::v1_6::messages::unlock_connector::UnlockConnectorRequest;
use rust_ocpp::v1_6::messages::update_firmware::UpdateFirmwareRequest;
use rust_ocpp::v1_6::types::MessageTrigger;

use super::events::{AvailabilityVerdict, RegistrationState, ReservationVerdict, UnlockVerdict};
use super::ChargePointInner;
use crate::messages::iso15118::{self, PNC_VENDOR_ID};
use crate::messages::security::{
    CertificateHashData, CertificateSignedRequest, DeleteCertificateRequest,
    ExtendedTriggerMessageRequest, GetInstalledCertificateIdsRequest, GetLogRequest,
    HashAlgorithm, InstallCertificateRequest, MessageTriggerExtended, SignedUpdateFirmwareRequest,
};
use crate::messages::{allowed_while_pending, is_cs_to_cp_action};
use crate::persistence::{CertificateKey, InstalledCertificate};
use crate::rpc::{decode_payload, CallError, ErrorCode, RpcListener};
use crate::x509::{Certificate, Sha2Algorithm};

pub(crate) struct ChargePointCallHandler {
    inner: Weak<ChargePointInner>,
}

impl ChargePointCallHandler {
    pub(crate) fn new(inner: Weak<ChargePointInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RpcListener for ChargePointCallHandler {
    async fn call_received(&self, action: &str, payload: Value) -> Result<Value, CallError> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(CallError::internal("charge point stopped"));
        };
        let inner = &inner;

        if !is_cs_to_cp_action(action) {
            return Err(CallError::not_implemented(action));
        }
        if inner.registration_state() != RegistrationState::Accepted
            && !allowed_while_pending(action)
        {
            warn!(action, "call refused while registration is pending");
            return Err(CallError::security("Charge point not accepted yet"));
        }

        dispatch(inner, action, payload).await
    }
}

async fn dispatch(
    inner: &Arc<ChargePointInner>,
    action: &str,
    payload: Value,
) -> Result<Value, CallError> {
    match action {
        // ── Configuration ──────────────────────────────────
        "ChangeConfiguration" => {
            let request: ChangeConfigurationRequest = decode_payload(&payload)?;
            let status = inner.ocpp_config.change(&request.key, &request.value);
            info!(key = request.key.as_str(), ?status, "ChangeConfiguration");
            // A changed heartbeat interval applies from the next beat.
            if request.key == "HeartbeatInterval" {
                if let Some(secs) = inner.ocpp_config.value_as_u64("HeartbeatInterval") {
                    inner
                        .heartbeat_secs
                        .store(secs, std::sync::atomic::Ordering::SeqCst);
                }
            }
            Ok(json!({ "status": format!("{:?}", status) }))
        }

        "GetConfiguration" => {
            let request: GetConfigurationRequest = decode_payload(&payload)?;
            let (known, unknown) = inner.ocpp_config.get(request.key.as_deref());
            let configuration_key: Vec<Value> = known
                .into_iter()
                .map(|entry| {
                    let mut object = json!({
                        "key": entry.key,
                        "readonly": entry.readonly,
                    });
                    if let Some(value) = entry.value {
                        object["value"] = Value::String(value);
                    }
                    object
                })
                .collect();
            Ok(json!({
                "configurationKey": configuration_key,
                "unknownKey": unknown,
            }))
        }

        // ── Core operations ────────────────────────────────
        "Reset" => {
            let request: ResetRequest = decode_payload(&payload)?;
            let kind = format!("{:?}", request.kind);
            let accepted = inner.events.reset_requested(&kind).await;
            info!(kind = kind.as_str(), accepted, "Reset");
            Ok(json!({ "status": if accepted { "Accepted" } else { "Rejected" } }))
        }

        "ChangeAvailability" => {
            let request: ChangeAvailabilityRequest = decode_payload(&payload)?;
            let verdict = inner
                .events
                .change_availability(request.connector_id, &format!("{:?}", request.kind))
                .await;
            let status = match verdict {
                AvailabilityVerdict::Accepted => "Accepted",
                AvailabilityVerdict::Rejected => "Rejected",
                AvailabilityVerdict::Scheduled => "Scheduled",
            };
            Ok(json!({ "status": status }))
        }

        "RemoteStartTransaction" => {
            let request: RemoteStartTransactionRequest = decode_payload(&payload)?;
            let accepted = inner
                .events
                .remote_start_transaction(request.connector_id, &request.id_tag)
                .await;
            Ok(json!({ "status": if accepted { "Accepted" } else { "Rejected" } }))
        }

        "RemoteStopTransaction" => {
            let request: RemoteStopTransactionRequest = decode_payload(&payload)?;
            let accepted = inner
                .events
                .remote_stop_transaction(request.transaction_id)
                .await;
            Ok(json!({ "status": if accepted { "Accepted" } else { "Rejected" } }))
        }

        "UnlockConnector" => {
            let request: UnlockConnectorRequest = decode_payload(&payload)?;
            let verdict = inner.events.unlock_connector(request.connector_id).await;
            let status = match verdict {
                UnlockVerdict::Unlocked => "Unlocked",
                UnlockVerdict::UnlockFailed => "UnlockFailed",
                UnlockVerdict::NotSupported => "NotSupported",
            };
            Ok(json!({ "status": status }))
        }

        "ReserveNow" => {
            let request: ReserveNowRequest = decode_payload(&payload)?;
            let verdict = inner
                .events
                .reserve_now(
                    request.reservation_id,
                    request.connector_id,
                    &request.id_tag,
                    request.parent_id_tag.as_deref(),
                    request.expiry_date,
                )
                .await;
            let status = match verdict {
                ReservationVerdict::Accepted => "Accepted",
                ReservationVerdict::Faulted => "Faulted",
                ReservationVerdict::Occupied => "Occupied",
                ReservationVerdict::Rejected => "Rejected",
                ReservationVerdict::Unavailable => "Unavailable",
            };
            Ok(json!({ "status": status }))
        }

        "CancelReservation" => {
            #[derive(serde::Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct CancelReservation {
                reservation_id: i32,
            }
            let request: CancelReservation = decode_payload(&payload)?;
            let accepted = inner.events.cancel_reservation(request.reservation_id).await;
            Ok(json!({ "status": if accepted { "Accepted" } else { "Rejected" } }))
        }

        "ClearCache" => {
            // The authorization cache lives with the embedder's storage;
            // clearing always succeeds from the protocol's point of view.
            Ok(json!({ "status": "Accepted" }))
        }

        "DataTransfer" => {
            let request: DataTransferRequest = decode_payload(&payload)?;
            if request.vendor_string == PNC_VENDOR_ID {
                return dispatch_pnc(inner, request.message_id.as_deref(), request.data.as_deref())
                    .await;
            }
            let reply = inner
                .events
                .data_transfer(
                    &request.vendor_string,
                    request.message_id.as_deref(),
                    request.data.as_deref(),
                )
                .await;
            let mut response = json!({ "status": reply.status });
            if let Some(data) = reply.data {
                response["data"] = Value::String(data);
            }
            Ok(response)
        }

        // ── Local authorization list ───────────────────────
        "GetLocalListVersion" => {
            let version = inner.storage.local_list.version().await;
            Ok(json!({ "listVersion": version }))
        }

        "SendLocalList" => {
            let request: SendLocalListRequest = decode_payload(&payload)?;
            let entries = request
                .local_authorization_list
                .unwrap_or_default()
                .into_iter()
                .map(|data| crate::persistence::LocalListEntry {
                    id_tag: data.id_tag,
                    status: data
                        .id_tag_info
                        .as_ref()
                        .map(|info| format!("{:?}", info.status)),
                    expiry_date: data
                        .id_tag_info
                        .as_ref()
                        .and_then(|info| info.expiry_date.map(|d| d.to_rfc3339())),
                    parent_id_tag: data
                        .id_tag_info
                        .as_ref()
                        .and_then(|info| info.parent_id_tag.clone()),
                })
                .collect();
            let applied = match request.update_type {
                rust_ocpp::v1_6::types::UpdateType::Full => {
                    inner
                        .storage
                        .local_list
                        .apply_full(request.list_version, entries)
                        .await
                }
                rust_ocpp::v1_6::types::UpdateType::Differential => {
                    inner
                        .storage
                        .local_list
                        .apply_differential(request.list_version, entries)
                        .await
                }
            };
            Ok(json!({ "status": if applied { "Accepted" } else { "VersionMismatch" } }))
        }

        // ── Charging profiles, diagnostics, firmware ───────
        "SetChargingProfile" => {
            let request: SetChargingProfileRequest = decode_payload(&payload)?;
            let profile = serde_json::to_value(&request.cs_charging_profiles)
                .map_err(|e| CallError::internal(e.to_string()))?;
            let accepted = inner
                .events
                .set_charging_profile(request.connector_id, profile)
                .await;
            Ok(json!({ "status": if accepted { "Accepted" } else { "Rejected" } }))
        }

        "ClearChargingProfile" => {
            let request: ClearChargingProfileRequest = decode_payload(&payload)?;
            let cleared = inner
                .events
                .clear_charging_profile(
                    request.id,
                    request.connector_id,
                    request
                        .charging_profile_purpose
                        .map(|p| format!("{:?}", p))
                        .as_deref(),
                    request.stack_level,
                )
                .await;
            Ok(json!({ "status": if cleared { "Accepted" } else { "Unknown" } }))
        }

        "GetCompositeSchedule" => {
            let request: GetCompositeScheduleRequest = decode_payload(&payload)?;
            match inner
                .events
                .get_composite_schedule(request.connector_id, request.duration)
                .await
            {
                Some(schedule) => Ok(json!({
                    "status": "Accepted",
                    "connectorId": request.connector_id,
                    "scheduleStart": Utc::now(),
                    "chargingSchedule": schedule,
                })),
                None => Ok(json!({ "status": "Rejected" })),
            }
        }

        "GetDiagnostics" => {
            let request: GetDiagnosticsRequest = decode_payload(&payload)?;
            let file_name = inner
                .events
                .get_diagnostics(&request.location, request.start_time, request.stop_time)
                .await;
            match file_name {
                Some(file_name) => Ok(json!({ "fileName": file_name })),
                None => Ok(json!({})),
            }
        }

        "UpdateFirmware" => {
            let request: UpdateFirmwareRequest = decode_payload(&payload)?;
            inner
                .events
                .update_firmware(&request.location, request.retrieve_date)
                .await;
            Ok(json!({}))
        }

        // ── Triggers ───────────────────────────────────────
        "TriggerMessage" => {
            let request: TriggerMessageRequest = decode_payload(&payload)?;
            Ok(handle_trigger(inner, request.requested_message))
        }

        "ExtendedTriggerMessage" => {
            let request: ExtendedTriggerMessageRequest = decode_payload(&payload)?;
            Ok(handle_extended_trigger(inner, request.requested_message).await)
        }

        // ── Security extension ─────────────────────────────
        "CertificateSigned" => {
            let request: CertificateSignedRequest = decode_payload(&payload)?;
            Ok(handle_certificate_signed(inner, &request.certificate_chain).await)
        }

        "InstallCertificate" => {
            let request: InstallCertificateRequest = decode_payload(&payload)?;
            let certificate_type = format!("{:?}", request.certificate_type);
            Ok(install_certificate(inner, &certificate_type, &request.certificate).await)
        }

        "DeleteCertificate" => {
            let request: DeleteCertificateRequest = decode_payload(&payload)?;
            Ok(delete_certificate(inner, &request.certificate_hash_data).await)
        }

        "GetInstalledCertificateIds" => {
            let request: GetInstalledCertificateIdsRequest = decode_payload(&payload)?;
            let certificate_type = format!("{:?}", request.certificate_type);
            let installed = inner.storage.certificates.list(&certificate_type).await;
            if installed.is_empty() {
                return Ok(json!({ "status": "NotFound" }));
            }
            let hash_data: Vec<Value> = installed
                .iter()
                .map(|certificate| {
                    json!({
                        "hashAlgorithm": certificate.key.hash_algorithm,
                        "issuerNameHash": certificate.key.issuer_name_hash,
                        "issuerKeyHash": certificate.key.issuer_key_hash,
                        "serialNumber": certificate.key.serial_number,
                    })
                })
                .collect();
            Ok(json!({ "status": "Accepted", "certificateHashData": hash_data }))
        }

        "GetLog" => {
            let request: GetLogRequest = decode_payload(&payload)?;
            let filename = inner
                .events
                .get_log(
                    &format!("{:?}", request.log_type),
                    &request.log.remote_location,
                    request.log.oldest_timestamp,
                    request.log.latest_timestamp,
                )
                .await;
            match filename {
                Some(filename) => Ok(json!({ "status": "Accepted", "filename": filename })),
                None => Ok(json!({ "status": "Rejected" })),
            }
        }

        "SignedUpdateFirmware" => {
            let request: SignedUpdateFirmwareRequest = decode_payload(&payload)?;
            // The signing certificate must at least parse before the
            // firmware handler sees the request.
            if Certificate::from_pem(&request.firmware.signing_certificate).is_err() {
                return Ok(json!({ "status": "InvalidCertificate" }));
            }
            let status = inner
                .events
                .signed_update_firmware(
                    &request.firmware.location,
                    request.firmware.retrieve_date_time,
                    &request.firmware.signing_certificate,
                    &request.firmware.signature,
                )
                .await;
            Ok(json!({ "status": status }))
        }

        other => Err(CallError::not_implemented(other)),
    }
}

// ── Triggers ───────────────────────────────────────────────────

/// The stack owns boot and heartbeat; other triggered notifications carry
/// embedder state and are reported as not implemented.
fn handle_trigger(inner: &Arc<ChargePointInner>, requested: MessageTrigger) -> Value {
    match requested {
        MessageTrigger::BootNotification => {
            spawn_triggered(inner, TriggeredSend::Boot);
            json!({ "status": "Accepted" })
        }
        MessageTrigger::Heartbeat => {
            spawn_triggered(inner, TriggeredSend::Heartbeat);
            json!({ "status": "Accepted" })
        }
        _ => json!({ "status": "NotImplemented" }),
    }
}

async fn handle_extended_trigger(
    inner: &Arc<ChargePointInner>,
    requested: MessageTriggerExtended,
) -> Value {
    match requested {
        MessageTriggerExtended::BootNotification => {
            spawn_triggered(inner, TriggeredSend::Boot);
            json!({ "status": "Accepted" })
        }
        MessageTriggerExtended::Heartbeat => {
            spawn_triggered(inner, TriggeredSend::Heartbeat);
            json!({ "status": "Accepted" })
        }
        MessageTriggerExtended::SignChargePointCertificate => {
            match inner.events.generate_csr().await {
                Some(csr) => {
                    spawn_triggered(inner, TriggeredSend::SignCertificate(csr));
                    json!({ "status": "Accepted" })
                }
                None => json!({ "status": "Rejected" }),
            }
        }
        _ => json!({ "status": "NotImplemented" }),
    }
}

enum TriggeredSend {
    Boot,
    Heartbeat,
    SignCertificate(String),
}

/// Triggered sends happen outside the dispatch worker: the reply to the
/// trigger must go out before the triggered call is issued.
fn spawn_triggered(inner: &Arc<ChargePointInner>, send: TriggeredSend) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let result = match &send {
            TriggeredSend::Boot => inner.send_boot_notification().await.map(|_| ()),
            TriggeredSend::Heartbeat => inner.send_heartbeat().await.map(|_| ()),
            TriggeredSend::SignCertificate(csr) => {
                inner.send_sign_certificate(csr).await.map(|_| ())
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "triggered message failed");
        }
    });
}

// ── Certificate operations backed by the store ─────────────────

async fn handle_certificate_signed(inner: &ChargePointInner, chain_pem: &str) -> Value {
    let max_chain_size = inner
        .ocpp_config
        .value_as_u64("CertificateSignedMaxChainSize")
        .unwrap_or(10_000) as usize;
    if chain_pem.len() > max_chain_size {
        warn!(size = chain_pem.len(), "certificate chain exceeds maximum size");
        return json!({ "status": "Rejected" });
    }
    let certificate = match Certificate::from_pem(chain_pem) {
        Ok(certificate) => certificate,
        Err(e) => {
            warn!(error = %e, "unparsable certificate chain");
            return json!({ "status": "Rejected" });
        }
    };
    let now = Utc::now().timestamp();
    if certificate.not_after() < now {
        warn!("signed certificate is already expired");
        return json!({ "status": "Rejected" });
    }
    let accepted = inner.events.certificate_signed(chain_pem).await;
    json!({ "status": if accepted { "Accepted" } else { "Rejected" } })
}

async fn install_certificate(
    inner: &ChargePointInner,
    certificate_type: &str,
    pem: &str,
) -> Value {
    let max_count = inner
        .ocpp_config
        .value_as_u64("CertificateStoreMaxLength")
        .unwrap_or(50) as usize;
    if inner.storage.certificates.count().await >= max_count {
        return json!({ "status": "Rejected" });
    }
    let certificate = match Certificate::from_pem(pem) {
        Ok(certificate) => certificate,
        Err(e) => {
            warn!(error = %e, "unparsable certificate");
            return json!({ "status": "Rejected" });
        }
    };
    let hash_data = ocsp_hash_data(&certificate);
    let installed = inner
        .storage
        .certificates
        .install(InstalledCertificate {
            key: CertificateKey::new(certificate_type, &hash_data),
            pem: pem.to_string(),
        })
        .await;
    json!({ "status": if installed { "Accepted" } else { "Failed" } })
}

async fn delete_certificate(inner: &ChargePointInner, hash_data: &CertificateHashData) -> Value {
    // The wire request does not carry the certificate use; try both
    // domains of the 1.6 security profile.
    for certificate_type in [
        "CentralSystemRootCertificate",
        "ManufacturerRootCertificate",
    ] {
        let key = CertificateKey::new(certificate_type, hash_data);
        if inner.storage.certificates.delete(&key).await {
            return json!({ "status": "Accepted" });
        }
    }
    json!({ "status": "NotFound" })
}

/// OCSP-style hash data of a certificate: issuer name hash, issuer key
/// hash and serial number.
fn ocsp_hash_data(certificate: &Certificate) -> CertificateHashData {
    CertificateHashData {
        hash_algorithm: HashAlgorithm::SHA256,
        issuer_name_hash: certificate.issuer_name_hash(Sha2Algorithm::Sha256),
        issuer_key_hash: certificate.public_key_hash(Sha2Algorithm::Sha256),
        serial_number: certificate.serial_number_hex(),
    }
}

// ── ISO 15118 PnC (server-initiated) ───────────────────────────

async fn dispatch_pnc(
    inner: &Arc<ChargePointInner>,
    message_id: Option<&str>,
    data: Option<&str>,
) -> Result<Value, CallError> {
    let bad_payload =
        |e: serde_json::Error| CallError::new(ErrorCode::FormationViolation, e.to_string());
    let accepted = |payload: Result<String, serde_json::Error>| match payload {
        Ok(data) => Ok(json!({ "status": "Accepted", "data": data })),
        Err(e) => Err(CallError::internal(e.to_string())),
    };

    match message_id {
        Some("CertificateSigned") => {
            let request: iso15118::PncCertificateSignedRequest =
                iso15118::decode_envelope(data).map_err(bad_payload)?;
            let result = handle_certificate_signed(inner, &request.certificate_chain).await;
            let status = if result["status"] == "Accepted" {
                crate::messages::security::GenericStatus::Accepted
            } else {
                crate::messages::security::GenericStatus::Rejected
            };
            accepted(iso15118::encode_envelope(
                &iso15118::PncCertificateSignedResponse { status },
            ))
        }

        Some("InstallCertificate") => {
            let request: iso15118::PncInstallCertificateRequest =
                iso15118::decode_envelope(data).map_err(bad_payload)?;
            let certificate_type = format!("{:?}", request.certificate_type);
            let result = install_certificate(inner, &certificate_type, &request.certificate).await;
            accepted(Ok(result.to_string()))
        }

        Some("DeleteCertificate") => {
            let request: iso15118::PncDeleteCertificateRequest =
                iso15118::decode_envelope(data).map_err(bad_payload)?;
            let mut status = "NotFound";
            for certificate_type in [
                "V2GRootCertificate",
                "MORootCertificate",
                "V2GCertificateChain",
            ] {
                let key = CertificateKey::new(certificate_type, &request.certificate_hash_data);
                if inner.storage.certificates.delete(&key).await {
                    status = "Accepted";
                    break;
                }
            }
            accepted(Ok(json!({ "status": status }).to_string()))
        }

        Some("GetInstalledCertificateIds") => {
            let request: iso15118::PncGetInstalledCertificateIdsRequest =
                iso15118::decode_envelope(data).map_err(bad_payload)?;
            let mut chains: Vec<Value> = Vec::new();
            for certificate_type in &request.certificate_type {
                let type_name = format!("{:?}", certificate_type);
                for certificate in inner.storage.certificates.list(&type_name).await {
                    chains.push(json!({
                        "certificateType": type_name,
                        "certificateHashData": {
                            "hashAlgorithm": certificate.key.hash_algorithm,
                            "issuerNameHash": certificate.key.issuer_name_hash,
                            "issuerKeyHash": certificate.key.issuer_key_hash,
                            "serialNumber": certificate.key.serial_number,
                        },
                    }));
                }
            }
            let response = if chains.is_empty() {
                json!({ "status": "NotFound" })
            } else {
                json!({ "status": "Accepted", "certificateHashDataChain": chains })
            };
            accepted(Ok(response.to_string()))
        }

        Some("TriggerMessage") => {
            let request: iso15118::PncTriggerMessageRequest =
                iso15118::decode_envelope(data).map_err(bad_payload)?;
            let response = match request.requested_message {
                iso15118::PncTriggerKind::SignChargingStationCertificate
                | iso15118::PncTriggerKind::SignV2GCertificate => {
                    match inner.events.generate_csr().await {
                        Some(csr) => {
                            spawn_triggered(inner, TriggeredSend::SignCertificate(csr));
                            json!({ "status": "Accepted" })
                        }
                        None => json!({ "status": "Rejected" }),
                    }
                }
            };
            accepted(Ok(response.to_string()))
        }

        other => {
            info!(message_id = ?other, "unknown PnC message");
            Ok(json!({ "status": "UnknownMessageId" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chargepoint::events::ChargePointEvents;
    use crate::x509::{
        Certificate, CertificateRequest, CsrSubject, IssueOptions, KeySpec, PrivateKey,
    };

    struct TestEvents;

    #[async_trait]
    impl ChargePointEvents for TestEvents {
        async fn reset_requested(&self, _kind: &str) -> bool {
            true
        }
        async fn change_availability(
            &self,
            _connector_id: u32,
            _kind: &str,
        ) -> AvailabilityVerdict {
            AvailabilityVerdict::Accepted
        }
        async fn remote_start_transaction(
            &self,
            _connector_id: Option<u32>,
            _id_tag: &str,
        ) -> bool {
            true
        }
        async fn remote_stop_transaction(&self, _transaction_id: i32) -> bool {
            false
        }
        async fn unlock_connector(&self, _connector_id: u32) -> UnlockVerdict {
            UnlockVerdict::Unlocked
        }
        async fn reserve_now(
            &self,
            _reservation_id: i32,
            _connector_id: u32,
            _id_tag: &str,
            _parent_id_tag: Option<&str>,
            _expiry_date: chrono::DateTime<Utc>,
        ) -> ReservationVerdict {
            ReservationVerdict::Accepted
        }
        async fn cancel_reservation(&self, _reservation_id: i32) -> bool {
            true
        }
        async fn certificate_signed(&self, _chain: &str) -> bool {
            true
        }
    }

    fn handler_with_state(
        state: RegistrationState,
    ) -> (ChargePointCallHandler, Arc<ChargePointInner>) {
        let inner = ChargePointInner::for_tests(Arc::new(TestEvents), state);
        (ChargePointCallHandler::new(Arc::downgrade(&inner)), inner)
    }

    fn self_signed_pem() -> String {
        let key = PrivateKey::generate(KeySpec::Rsa { bits: 2048 }).unwrap();
        let csr = CertificateRequest::new(
            &CsrSubject {
                country: "FR".into(),
                organization: "Open OCPP".into(),
                common_name: "Test Root".into(),
                ..Default::default()
            },
            &key,
            crate::x509::Sha2Algorithm::Sha256,
        )
        .unwrap();
        Certificate::self_signed(
            &csr,
            &key,
            &IssueOptions::ca(crate::x509::Sha2Algorithm::Sha256, 30, None),
        )
        .unwrap()
        .pem()
        .to_string()
    }

    #[tokio::test]
    async fn pending_state_serves_only_the_whitelist() {
        let (handler, _inner) = handler_with_state(RegistrationState::Pending);
        let refused = handler
            .call_received(
                "RemoteStartTransaction",
                serde_json::json!({"idTag": "TAG"}),
            )
            .await
            .unwrap_err();
        assert_eq!(refused.code, ErrorCode::SecurityError);

        let allowed = handler
            .call_received(
                "GetConfiguration",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(allowed.get("configurationKey").is_some());
    }

    #[tokio::test]
    async fn change_configuration_updates_heartbeat_interval() {
        let (handler, inner) = handler_with_state(RegistrationState::Accepted);
        let reply = handler
            .call_received(
                "ChangeConfiguration",
                serde_json::json!({"key": "HeartbeatInterval", "value": "120"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");
        assert_eq!(
            inner
                .heartbeat_secs
                .load(std::sync::atomic::Ordering::SeqCst),
            120
        );
    }

    #[tokio::test]
    async fn get_configuration_hides_write_only_values() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let reply = handler
            .call_received(
                "GetConfiguration",
                serde_json::json!({"key": ["AuthorizationKey", "SecurityProfile"]}),
            )
            .await
            .unwrap();
        let keys = reply["configurationKey"].as_array().unwrap();
        let auth = keys
            .iter()
            .find(|k| k["key"] == "AuthorizationKey")
            .unwrap();
        assert!(auth.get("value").is_none());
        let profile = keys.iter().find(|k| k["key"] == "SecurityProfile").unwrap();
        assert!(profile.get("value").is_some());
    }

    #[tokio::test]
    async fn local_list_operations_use_the_store() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let reply = handler
            .call_received("GetLocalListVersion", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(reply["listVersion"], 0);

        let reply = handler
            .call_received(
                "SendLocalList",
                serde_json::json!({
                    "listVersion": 5,
                    "updateType": "Full",
                    "localAuthorizationList": [
                        { "idTag": "TAG1", "idTagInfo": { "status": "Accepted" } }
                    ],
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");

        let reply = handler
            .call_received("GetLocalListVersion", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(reply["listVersion"], 5);

        // A stale version is refused.
        let reply = handler
            .call_received(
                "SendLocalList",
                serde_json::json!({"listVersion": 4, "updateType": "Full"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "VersionMismatch");
    }

    #[tokio::test]
    async fn certificate_store_operations_round_trip() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let pem = self_signed_pem();

        let reply = handler
            .call_received(
                "InstallCertificate",
                serde_json::json!({
                    "certificateType": "CentralSystemRootCertificate",
                    "certificate": pem,
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");

        let reply = handler
            .call_received(
                "GetInstalledCertificateIds",
                serde_json::json!({"certificateType": "CentralSystemRootCertificate"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");
        let hash_data = reply["certificateHashData"].as_array().unwrap();
        assert_eq!(hash_data.len(), 1);
        let serial = hash_data[0]["serialNumber"].as_str().unwrap().to_string();

        let reply = handler
            .call_received(
                "DeleteCertificate",
                serde_json::json!({
                    "certificateHashData": {
                        "hashAlgorithm": "SHA256",
                        "issuerNameHash": hash_data[0]["issuerNameHash"],
                        "issuerKeyHash": hash_data[0]["issuerKeyHash"],
                        "serialNumber": serial,
                    },
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");

        let reply = handler
            .call_received(
                "GetInstalledCertificateIds",
                serde_json::json!({"certificateType": "CentralSystemRootCertificate"}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "NotFound");
    }

    #[tokio::test]
    async fn malformed_install_certificate_is_rejected() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let reply = handler
            .call_received(
                "InstallCertificate",
                serde_json::json!({
                    "certificateType": "ManufacturerRootCertificate",
                    "certificate": "garbage",
                }),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Rejected");
    }

    #[tokio::test]
    async fn certificate_signed_accepts_a_valid_chain() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let pem = self_signed_pem();
        let reply = handler
            .call_received(
                "CertificateSigned",
                serde_json::json!({"certificateChain": pem}),
            )
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");
    }

    #[tokio::test]
    async fn cp_to_cs_actions_are_refused_inbound() {
        let (handler, _inner) = handler_with_state(RegistrationState::Accepted);
        let refused = handler
            .call_received("BootNotification", serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(refused.code, ErrorCode::NotImplemented);
    }
}
