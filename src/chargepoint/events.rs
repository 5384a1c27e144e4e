//! Charge point event handler surface
//!
//! Server-initiated operations that touch hardware or local policy are
//! delegated to the embedder; the stack itself serves configuration,
//! local-list and certificate-store operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Registration state of the charge point against its central system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// No `BootNotification` answered yet (or connection lost).
    Unknown,
    Accepted,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityVerdict {
    Accepted,
    Rejected,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockVerdict {
    Unlocked,
    UnlockFailed,
    NotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationVerdict {
    Accepted,
    Faulted,
    Occupied,
    Rejected,
    Unavailable,
}

/// Outcome of a vendor DataTransfer handled by the embedder.
#[derive(Debug, Clone)]
pub struct VendorDataTransferReply {
    /// "Accepted", "Rejected", "UnknownVendorId" or "UnknownMessageId".
    pub status: String,
    pub data: Option<String>,
}

impl VendorDataTransferReply {
    pub fn unknown_vendor() -> Self {
        Self {
            status: "UnknownVendorId".to_string(),
            data: None,
        }
    }
}

/// Callbacks fired by the charge point stack towards the embedder.
#[async_trait]
pub trait ChargePointEvents: Send + Sync {
    // ── Lifecycle ──────────────────────────────────────────

    async fn connection_state_changed(&self, _connected: bool) {}

    async fn registration_state_changed(&self, _state: RegistrationState) {}

    // ── Server-initiated operations ────────────────────────

    /// `kind` is "Soft" or "Hard". Returning `true` accepts the reset;
    /// performing it is the embedder's business.
    async fn reset_requested(&self, kind: &str) -> bool;

    async fn change_availability(&self, connector_id: u32, kind: &str) -> AvailabilityVerdict;

    async fn remote_start_transaction(&self, connector_id: Option<u32>, id_tag: &str) -> bool;

    async fn remote_stop_transaction(&self, transaction_id: i32) -> bool;

    async fn unlock_connector(&self, connector_id: u32) -> UnlockVerdict;

    async fn reserve_now(
        &self,
        reservation_id: i32,
        connector_id: u32,
        id_tag: &str,
        parent_id_tag: Option<&str>,
        expiry_date: DateTime<Utc>,
    ) -> ReservationVerdict;

    async fn cancel_reservation(&self, reservation_id: i32) -> bool;

    async fn data_transfer(
        &self,
        _vendor_id: &str,
        _message_id: Option<&str>,
        _data: Option<&str>,
    ) -> VendorDataTransferReply {
        VendorDataTransferReply::unknown_vendor()
    }

    /// Upload diagnostics to `location`; return the file name that will
    /// be uploaded, or `None` when there is nothing to upload.
    async fn get_diagnostics(
        &self,
        location: &str,
        start_time: Option<DateTime<Utc>>,
        stop_time: Option<DateTime<Utc>>,
    ) -> Option<String> {
        let _ = (location, start_time, stop_time);
        None
    }

    async fn update_firmware(&self, _location: &str, _retrieve_date: DateTime<Utc>) {}

    async fn set_charging_profile(
        &self,
        _connector_id: i32,
        _profile: serde_json::Value,
    ) -> bool {
        false
    }

    async fn clear_charging_profile(
        &self,
        _profile_id: Option<i32>,
        _connector_id: Option<i32>,
        _purpose: Option<&str>,
        _stack_level: Option<i32>,
    ) -> bool {
        false
    }

    async fn get_composite_schedule(
        &self,
        _connector_id: i32,
        _duration: i32,
    ) -> Option<serde_json::Value> {
        None
    }

    // ── Security extension ─────────────────────────────────

    /// Produce a CSR for the charge point certificate, PEM encoded.
    /// `None` rejects the sign-certificate trigger.
    async fn generate_csr(&self) -> Option<String> {
        None
    }

    /// A signed certificate chain arrived and passed the stack's checks.
    /// Returning `true` commits it as the new client certificate.
    async fn certificate_signed(&self, _certificate_chain_pem: &str) -> bool {
        false
    }

    /// Upload the requested log; return the file name, or `None` when
    /// refused.
    async fn get_log(
        &self,
        kind: &str,
        location: &str,
        oldest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> Option<String> {
        let _ = (kind, location, oldest, latest);
        None
    }

    /// Firmware update with signature checking. The returned string is a
    /// `SignedUpdateFirmware` status, e.g. "Accepted" or
    /// "InvalidCertificate".
    async fn signed_update_firmware(
        &self,
        _location: &str,
        _retrieve_date: DateTime<Utc>,
        _signing_certificate: &str,
        _signature: &str,
    ) -> String {
        "Rejected".to_string()
    }
}
