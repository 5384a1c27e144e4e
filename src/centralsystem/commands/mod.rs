//! Server-initiated command surface
//!
//! Every operation is a thin typed wrapper over
//! [`RpcEndpoint::call`](crate::rpc::RpcEndpoint::call), exposed as a
//! method on [`ChargePointSession`]. Operations shared between protocol
//! versions resolve the session's negotiated version and build the
//! matching wire record; version-specific operations refuse the other
//! version with [`RpcError::UnsupportedVersion`].
//!
//! - [`core16`]: OCPP core profile (1.6 wire records, 2.0.1 where mapped)
//! - [`security16`]: 1.6 security extension
//! - [`iso15118`]: ISO 15118 PnC over DataTransfer
//! - [`core201`]: operations that only exist in 2.0.1

pub mod core16;
pub mod core201;
pub mod iso15118;
pub mod security16;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::session::ChargePointSession;
use crate::rpc::RpcError;

// ── Version-agnostic parameter and result types ────────────────

/// Availability state for ChangeAvailability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Operative,
    Inoperative,
}

/// Reset kind. Maps to 1.6 `Hard`/`Soft` and 2.0.1 `Immediate`/`OnIdle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft,
    Hard,
}

/// Message trigger kind for TriggerMessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    BootNotification,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    Heartbeat,
    MeterValues,
    StatusNotification,
}

/// Local list update mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Full,
    Differential,
}

/// Log kind for GetLog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    DiagnosticsLog,
    SecurityLog,
}

/// One local authorization list entry.
#[derive(Debug, Clone)]
pub struct LocalAuthEntry {
    pub id_tag: String,
    /// Authorization status: "Accepted", "Blocked", "Expired", "Invalid".
    pub status: Option<String>,
    /// ISO 8601 expiry date.
    pub expiry_date: Option<String>,
    /// Parent id tag (1.6 only).
    pub parent_id_tag: Option<String>,
}

/// A configuration key returned by GetConfiguration (1.6).
#[derive(Debug, Clone)]
pub struct KeyValue {
    pub key: String,
    pub readonly: bool,
    pub value: Option<String>,
}

/// GetConfiguration result (1.6).
#[derive(Debug)]
pub struct ConfigurationResult {
    pub configuration_key: Vec<KeyValue>,
    pub unknown_key: Vec<String>,
}

/// DataTransfer result.
#[derive(Debug)]
pub struct DataTransferResult {
    pub status: String,
    pub data: Option<String>,
}

/// GetCompositeSchedule result.
#[derive(Debug)]
pub struct CompositeScheduleResult {
    pub status: String,
    /// The composite schedule as raw JSON (version-specific structure).
    pub schedule: Option<serde_json::Value>,
    /// Connector id (1.6 only).
    pub connector_id: Option<i32>,
    /// Schedule start (1.6 only), ISO 8601.
    pub schedule_start: Option<String>,
}

/// GetLog result.
#[derive(Debug)]
pub struct GetLogResult {
    pub status: String,
    pub filename: Option<String>,
    /// The request id carried by the matching LogStatusNotification.
    pub request_id: i32,
}

/// Criteria for ClearChargingProfile.
#[derive(Debug, Clone, Default)]
pub struct ClearChargingProfileCriteria {
    pub charging_profile_id: Option<i32>,
    /// Connector id (1.6) or EVSE id (2.0.1).
    pub evse_id: Option<i32>,
    /// Profile purpose, version-specific wire name.
    pub charging_profile_purpose: Option<String>,
    pub stack_level: Option<i32>,
}

/// One GetVariables answer (2.0.1).
#[derive(Debug, Clone)]
pub struct VariableResult {
    pub component: String,
    pub variable: String,
    pub attribute_status: String,
    pub attribute_value: Option<String>,
}

/// GetVariables result (2.0.1).
#[derive(Debug)]
pub struct GetVariablesResult {
    pub results: Vec<VariableResult>,
}

/// One SetVariables answer (2.0.1).
#[derive(Debug, Clone)]
pub struct SetVariableStatus {
    pub component: String,
    pub variable: String,
    pub status: String,
}

/// SetVariables result (2.0.1).
#[derive(Debug)]
pub struct SetVariablesResult {
    pub results: Vec<SetVariableStatus>,
}

// ── Typed call plumbing ────────────────────────────────────────

impl ChargePointSession {
    /// Serialize `request`, issue the call and deserialize the response.
    pub(crate) async fn call_typed<Req, Resp>(
        &self,
        action: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)
            .map_err(|e| RpcError::SendFailed(format!("serialization failed: {}", e)))?;
        let result = self
            .endpoint()
            .call(action, payload, self.call_timeout)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    pub(crate) fn unsupported(&self, action: &str) -> RpcError {
        RpcError::UnsupportedVersion(format!(
            "{} is not available on {}",
            action,
            self.ocpp_version()
        ))
    }
}
