//! Central system event handler surface
//!
//! Policy decisions (authorization, tariffs, registration verdicts) are
//! delegated to the embedder through [`CentralSystemEvents`]. The stack
//! decodes the wire message, calls the matching method with
//! version-agnostic data and maps the decision back onto the negotiated
//! protocol version.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::session::ChargePointSession;
use crate::messages::iso15118::{CertificateAction, OcspRequestData};

/// Authorization verdict for an id tag or PnC token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

/// Verdict plus the optional id tag metadata of OCPP 1.6.
#[derive(Debug, Clone)]
pub struct IdTagDecision {
    pub verdict: AuthorizationVerdict,
    pub expiry_date: Option<DateTime<Utc>>,
    pub parent_id_tag: Option<String>,
}

impl IdTagDecision {
    pub fn accepted() -> Self {
        Self {
            verdict: AuthorizationVerdict::Accepted,
            expiry_date: None,
            parent_id_tag: None,
        }
    }

    pub fn invalid() -> Self {
        Self {
            verdict: AuthorizationVerdict::Invalid,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

/// Registration verdict returned for `BootNotification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationVerdict {
    Accepted,
    Pending,
    Rejected,
}

/// Identity advertised by a charge point in `BootNotification`.
#[derive(Debug, Clone, Default)]
pub struct BootInfo {
    pub vendor: String,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub meter_type: Option<String>,
    pub meter_serial_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartTransactionInfo {
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
    pub reservation_id: Option<i32>,
}

/// Transaction id plus authorization info for `StartTransaction`.
#[derive(Debug, Clone)]
pub struct StartTransactionDecision {
    pub transaction_id: i32,
    pub id_tag_info: IdTagDecision,
}

#[derive(Debug, Clone)]
pub struct StopTransactionInfo {
    pub transaction_id: i32,
    pub id_tag: Option<String>,
    pub meter_stop: i32,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusNotificationInfo {
    pub connector_id: u32,
    pub status: String,
    pub error_code: String,
    pub info: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MeterValuesInfo {
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    /// Sampled values as wire JSON; the embedder picks the measurands it
    /// cares about.
    pub meter_value: serde_json::Value,
}

/// 2.0.1 transaction event, flattened to the fields a back end keys on.
#[derive(Debug, Clone)]
pub struct TransactionEventInfo {
    pub event_type: String,
    pub transaction_id: String,
    pub id_token: Option<String>,
    pub evse_id: Option<i32>,
    pub seq_no: i32,
    pub timestamp: DateTime<Utc>,
    pub trigger_reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTransferVerdict {
    Accepted,
    Rejected,
    UnknownVendorId,
    UnknownMessageId,
}

#[derive(Debug, Clone)]
pub struct DataTransferDecision {
    pub status: DataTransferVerdict,
    pub data: Option<String>,
}

impl DataTransferDecision {
    pub fn accepted(data: Option<String>) -> Self {
        Self {
            status: DataTransferVerdict::Accepted,
            data,
        }
    }

    pub fn unknown_vendor() -> Self {
        Self {
            status: DataTransferVerdict::UnknownVendorId,
            data: None,
        }
    }
}

/// Callbacks fired by the central system towards the embedder.
///
/// Connection-lifecycle hooks and pure notifications default to no-ops;
/// decision methods must be provided.
#[async_trait]
pub trait CentralSystemEvents: Send + Sync {
    // ── Connection acceptance ──────────────────────────────

    /// Predicate applied to the client address before the upgrade.
    fn accept_connection(&self, _remote_addr: &SocketAddr) -> bool {
        true
    }

    /// HTTP Basic credential check (security profiles 1 and 2). The user
    /// name is the charge point identifier.
    fn check_credentials(&self, _charge_point_id: &str, _password: &[u8]) -> bool {
        true
    }

    async fn charge_point_connected(&self, _session: Arc<ChargePointSession>) {}

    async fn charge_point_disconnected(&self, _charge_point_id: &str) {}

    // ── Core profile ───────────────────────────────────────

    async fn authorize(&self, charge_point_id: &str, id_tag: &str) -> IdTagDecision;

    async fn boot_notification(
        &self,
        charge_point_id: &str,
        info: BootInfo,
    ) -> RegistrationVerdict;

    async fn data_transfer(
        &self,
        _charge_point_id: &str,
        _vendor_id: &str,
        _message_id: Option<&str>,
        _data: Option<&str>,
    ) -> DataTransferDecision {
        DataTransferDecision::unknown_vendor()
    }

    async fn diagnostics_status_notification(&self, _charge_point_id: &str, _status: String) {}

    async fn firmware_status_notification(&self, _charge_point_id: &str, _status: String) {}

    async fn heartbeat(&self, _charge_point_id: &str) {}

    async fn meter_values(&self, _charge_point_id: &str, _info: MeterValuesInfo) {}

    async fn start_transaction(
        &self,
        charge_point_id: &str,
        info: StartTransactionInfo,
    ) -> StartTransactionDecision;

    async fn status_notification(&self, _charge_point_id: &str, _info: StatusNotificationInfo) {}

    async fn stop_transaction(
        &self,
        charge_point_id: &str,
        info: StopTransactionInfo,
    ) -> Option<IdTagDecision>;

    /// 2.0.1 only; replaces Start/StopTransaction. Returning a verdict
    /// fills `idTokenInfo` in the response.
    async fn transaction_event(
        &self,
        _charge_point_id: &str,
        _info: TransactionEventInfo,
    ) -> Option<AuthorizationVerdict> {
        None
    }

    // ── Security profile ───────────────────────────────────

    async fn log_status_notification(
        &self,
        _charge_point_id: &str,
        _status: String,
        _request_id: Option<i32>,
    ) {
    }

    async fn security_event_notification(
        &self,
        _charge_point_id: &str,
        _kind: &str,
        _timestamp: DateTime<Utc>,
        _tech_info: Option<&str>,
    ) {
    }

    /// A charge point asks for its CSR to be signed. Returning `true`
    /// acknowledges the request; the signed chain is delivered later via
    /// the session's `certificate_signed` operation.
    async fn sign_certificate(&self, charge_point_id: &str, csr_pem: &str) -> bool;

    async fn signed_firmware_status_notification(
        &self,
        _charge_point_id: &str,
        _status: String,
        _request_id: Option<i32>,
    ) {
    }

    // ── ISO 15118 Plug-and-Charge ──────────────────────────

    async fn iso15118_authorize(
        &self,
        _charge_point_id: &str,
        _certificate: Option<&str>,
        _id_token: &str,
        _hash_data: &[OcspRequestData],
    ) -> IdTagDecision {
        IdTagDecision::invalid()
    }

    /// Forwarded EV certificate request. Returns the EXI response, or
    /// `None` to report `Failed`.
    async fn iso15118_get_ev_certificate(
        &self,
        _charge_point_id: &str,
        _iso15118_schema_version: &str,
        _action: CertificateAction,
        _exi_request: &str,
    ) -> Option<String> {
        None
    }

    /// OCSP status lookup for a contract certificate. Returns the DER
    /// OCSP response (Base64), or `None` to report `Failed`.
    async fn iso15118_get_certificate_status(
        &self,
        _charge_point_id: &str,
        _ocsp_request: OcspRequestData,
    ) -> Option<String> {
        None
    }

    /// A charge point asks for its ISO 15118 CSR to be signed.
    async fn iso15118_sign_certificate(&self, _charge_point_id: &str, _csr_pem: &str) -> bool {
        false
    }
}
