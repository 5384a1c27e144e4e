//! Charge point (client) role
//!
//! The charge point keeps a reconnecting WebSocket to its central system,
//! drives the `BootNotification`/heartbeat cycle, retries
//! transaction-related messages across reconnects and serves
//! server-initiated operations (configuration, local list and certificate
//! store operations directly, the rest through [`ChargePointEvents`]).

pub mod events;
pub mod handler;
pub mod ocpp_config;

pub use events::{
    AvailabilityVerdict, ChargePointEvents, RegistrationState, ReservationVerdict, UnlockVerdict,
    VendorDataTransferReply,
};
pub use ocpp_config::{ChangeConfigurationStatus, ConfigKeyValue, OcppConfigStore};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
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
    ChargePointErrorCode, ChargePointStatus, IdTagInfo, MeterValue, RegistrationStatus,
};

use crate::config::ChargePointConfig;
use crate::messages::iso15118::{self, PNC_VENDOR_ID};
use crate::messages::security::{
    GenericStatus, LogStatusNotificationRequest, LogStatusNotificationResponse,
    SecurityEventNotificationRequest, SecurityEventNotificationResponse, SignCertificateRequest,
    SignCertificateResponse, SignedFirmwareStatusNotificationRequest,
    SignedFirmwareStatusNotificationResponse, UploadLogStatus,
};
use crate::persistence::{
    CertificateStore, InMemoryStorage, LocalAuthorizationList, SecurityEventLog,
};
use crate::rpc::{RpcEndpoint, RpcError};
use crate::support::{keepalive, next_ping, ConnectionUrl, MessageQueue, ShutdownSignal};

#[derive(Debug, Error)]
pub enum ChargePointError {
    #[error("invalid connect URL: {0}")]
    InvalidConnectUrl(String),
    #[error("invalid identifier: must be 1-20 ASCII characters")]
    InvalidIdentifier,
}

/// Capacity of the offline transaction-message queue.
const TRANSACTION_QUEUE_LIMIT: usize = 100;

/// A transaction-related message awaiting (re)delivery.
struct QueuedMessage {
    action: String,
    payload: Value,
    attempts_left: u32,
}

/// Storage collaborators used by the charge point.
#[derive(Clone)]
pub struct ChargePointStorage {
    pub certificates: Arc<dyn CertificateStore>,
    pub local_list: Arc<dyn LocalAuthorizationList>,
    pub security_log: Arc<dyn SecurityEventLog>,
}

impl ChargePointStorage {
    /// Volatile storage, for development and tests.
    pub fn in_memory() -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self {
            certificates: storage.clone(),
            local_list: storage.clone(),
            security_log: storage,
        }
    }
}

pub(crate) struct ChargePointInner {
    pub(crate) config: Arc<ChargePointConfig>,
    pub(crate) events: Arc<dyn ChargePointEvents>,
    pub(crate) ocpp_config: Arc<OcppConfigStore>,
    pub(crate) storage: ChargePointStorage,
    endpoint: RwLock<Option<Arc<RpcEndpoint>>>,
    registration: RwLock<RegistrationState>,
    pub(crate) heartbeat_secs: AtomicU64,
    tx_queue: MessageQueue<QueuedMessage>,
    shutdown: ShutdownSignal,
}

/// OCPP 1.6 charge point.
pub struct ChargePoint {
    inner: Arc<ChargePointInner>,
}

impl ChargePoint {
    pub fn new(
        config: ChargePointConfig,
        events: Arc<dyn ChargePointEvents>,
        storage: ChargePointStorage,
    ) -> Result<Self, ChargePointError> {
        let id = &config.identifier;
        if id.is_empty() || id.len() > 20 || !id.is_ascii() {
            return Err(ChargePointError::InvalidIdentifier);
        }
        ConnectionUrl::parse(&config.connect_url)
            .map_err(|e| ChargePointError::InvalidConnectUrl(e.to_string()))?;

        let ocpp_config = Arc::new(OcppConfigStore::new(&config));
        let heartbeat = config.heartbeat_interval_secs;
        Ok(Self {
            inner: Arc::new(ChargePointInner {
                config: Arc::new(config),
                events,
                ocpp_config,
                storage,
                endpoint: RwLock::new(None),
                registration: RwLock::new(RegistrationState::Unknown),
                heartbeat_secs: AtomicU64::new(heartbeat),
                tx_queue: MessageQueue::new(TRANSACTION_QUEUE_LIMIT),
                shutdown: ShutdownSignal::new(),
            }),
        })
    }

    /// Spawn the connection task; returns immediately.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run().await;
        });
    }

    /// Stop the connection task and fail any queued work.
    pub async fn stop(&self) {
        self.inner.shutdown.trigger();
        self.inner.tx_queue.set_enable(false);
        let endpoint = self.inner.endpoint.read().unwrap().clone();
        if let Some(endpoint) = endpoint {
            endpoint.stop().await;
        }
    }

    pub fn registration_status(&self) -> RegistrationState {
        self.inner.registration_state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .endpoint
            .read()
            .unwrap()
            .as_ref()
            .map(|e| e.is_connected())
            .unwrap_or(false)
    }

    pub fn ocpp_configuration(&self) -> &Arc<OcppConfigStore> {
        &self.inner.ocpp_config
    }

    // ── Operations towards the central system ──────────────

    pub async fn authorize(&self, id_tag: &str) -> Result<IdTagInfo, RpcError> {
        let request = AuthorizeRequest {
            id_tag: id_tag.to_string(),
        };
        let response: AuthorizeResponse = self.inner.call_typed("Authorize", &request).await?;
        Ok(response.id_tag_info)
    }

    pub async fn heartbeat(&self) -> Result<chrono::DateTime<Utc>, RpcError> {
        self.inner.send_heartbeat().await
    }

    pub async fn data_transfer(
        &self,
        vendor_id: &str,
        message_id: Option<String>,
        data: Option<String>,
    ) -> Result<DataTransferResponse, RpcError> {
        let request = DataTransferRequest {
            vendor_string: vendor_id.to_string(),
            message_id,
            data,
        };
        self.inner.call_typed("DataTransfer", &request).await
    }

    pub async fn diagnostics_status_notification(
        &self,
        status: rust_ocpp::v1_6::types::DiagnosticsStatus,
    ) -> Result<(), RpcError> {
        let request =
            rust_ocpp::v1_6::messages::diagnostics_status_notification::DiagnosticsStatusNotificationRequest {
                status,
            };
        let _: rust_ocpp::v1_6::messages::diagnostics_status_notification::DiagnosticsStatusNotificationResponse =
            self.inner.call_typed("DiagnosticsStatusNotification", &request).await?;
        Ok(())
    }

    pub async fn firmware_status_notification(
        &self,
        status: rust_ocpp::v1_6::types::FirmwareStatus,
    ) -> Result<(), RpcError> {
        let request =
            rust_ocpp::v1_6::messages::firmware_status_notification::FirmwareStatusNotificationRequest {
                status,
            };
        let _: rust_ocpp::v1_6::messages::firmware_status_notification::FirmwareStatusNotificationResponse =
            self.inner.call_typed("FirmwareStatusNotification", &request).await?;
        Ok(())
    }

    /// MeterValues is transaction-related: when it cannot be delivered it
    /// is queued and retried.
    pub async fn meter_values(
        &self,
        connector_id: u32,
        transaction_id: Option<i32>,
        meter_value: Vec<MeterValue>,
    ) -> Result<(), RpcError> {
        let request = MeterValuesRequest {
            connector_id,
            transaction_id,
            meter_value,
        };
        let _: MeterValuesResponse = self
            .inner
            .send_transaction_message("MeterValues", &request)
            .await?;
        Ok(())
    }

    pub async fn start_transaction(
        &self,
        connector_id: u32,
        id_tag: &str,
        meter_start: i32,
        reservation_id: Option<i32>,
    ) -> Result<StartTransactionResponse, RpcError> {
        let request = StartTransactionRequest {
            connector_id,
            id_tag: id_tag.to_string(),
            meter_start,
            reservation_id,
            timestamp: Utc::now(),
        };
        self.inner
            .send_transaction_message("StartTransaction", &request)
            .await
    }

    pub async fn status_notification(
        &self,
        connector_id: u32,
        status: ChargePointStatus,
        error_code: ChargePointErrorCode,
        info: Option<String>,
    ) -> Result<(), RpcError> {
        let request = StatusNotificationRequest {
            connector_id,
            error_code,
            info,
            status,
            timestamp: Some(Utc::now()),
            vendor_id: None,
            vendor_error_code: None,
        };
        let _: StatusNotificationResponse = self
            .inner
            .send_transaction_message("StatusNotification", &request)
            .await?;
        Ok(())
    }

    pub async fn stop_transaction(
        &self,
        transaction_id: i32,
        meter_stop: i32,
        id_tag: Option<String>,
        reason: Option<rust_ocpp::v1_6::types::Reason>,
    ) -> Result<StopTransactionResponse, RpcError> {
        let request = StopTransactionRequest {
            id_tag,
            meter_stop,
            timestamp: Utc::now(),
            transaction_id,
            reason,
            transaction_data: None,
        };
        self.inner
            .send_transaction_message("StopTransaction", &request)
            .await
    }

    // ── Security extension ─────────────────────────────────

    /// Report a security event; it is also appended to the local security
    /// event log.
    pub async fn security_event_notification(
        &self,
        kind: &str,
        tech_info: Option<String>,
    ) -> Result<(), RpcError> {
        let timestamp = Utc::now();
        self.inner
            .storage
            .security_log
            .record(kind, timestamp, tech_info.as_deref())
            .await;
        let request = SecurityEventNotificationRequest {
            kind: kind.to_string(),
            timestamp,
            tech_info,
        };
        let _: SecurityEventNotificationResponse = self
            .inner
            .call_typed("SecurityEventNotification", &request)
            .await?;
        Ok(())
    }

    /// Ask the central system to sign a CSR. `true` when accepted; the
    /// signed chain comes back later as `CertificateSigned`.
    pub async fn sign_certificate(&self, csr_pem: &str) -> Result<bool, RpcError> {
        self.inner.send_sign_certificate(csr_pem).await
    }

    pub async fn log_status_notification(
        &self,
        status: UploadLogStatus,
        request_id: Option<i32>,
    ) -> Result<(), RpcError> {
        let request = LogStatusNotificationRequest { status, request_id };
        let _: LogStatusNotificationResponse = self
            .inner
            .call_typed("LogStatusNotification", &request)
            .await?;
        Ok(())
    }

    pub async fn signed_firmware_status_notification(
        &self,
        status: crate::messages::security::FirmwareStatusExtended,
        request_id: Option<i32>,
    ) -> Result<(), RpcError> {
        let request = SignedFirmwareStatusNotificationRequest { status, request_id };
        let _: SignedFirmwareStatusNotificationResponse = self
            .inner
            .call_typed("SignedFirmwareStatusNotification", &request)
            .await?;
        Ok(())
    }

    // ── ISO 15118 Plug-and-Charge ──────────────────────────

    pub async fn iso15118_authorize(
        &self,
        certificate: Option<String>,
        id_token: &str,
        hash_data: Option<Vec<iso15118::OcspRequestData>>,
    ) -> Result<iso15118::PncAuthorizeResponse, RpcError> {
        let request = iso15118::PncAuthorizeRequest {
            certificate,
            id_token: id_token.to_string(),
            iso15118_certificate_hash_data: hash_data,
        };
        self.inner.pnc_call("Authorize", &request).await
    }

    pub async fn iso15118_get_ev_certificate(
        &self,
        iso15118_schema_version: &str,
        action: iso15118::CertificateAction,
        exi_request: &str,
    ) -> Result<iso15118::Get15118EvCertificateResponse, RpcError> {
        let request = iso15118::Get15118EvCertificateRequest {
            iso15118_schema_version: iso15118_schema_version.to_string(),
            action,
            exi_request: exi_request.to_string(),
        };
        self.inner.pnc_call("Get15118EVCertificate", &request).await
    }

    pub async fn iso15118_get_certificate_status(
        &self,
        ocsp_request_data: iso15118::OcspRequestData,
    ) -> Result<iso15118::GetCertificateStatusResponse, RpcError> {
        let request = iso15118::GetCertificateStatusRequest { ocsp_request_data };
        self.inner.pnc_call("GetCertificateStatus", &request).await
    }

    pub async fn iso15118_sign_certificate(&self, csr_pem: &str) -> Result<bool, RpcError> {
        let request = iso15118::PncSignCertificateRequest {
            csr: csr_pem.to_string(),
            certificate_type: Some(iso15118::PncCertificateType::V2GCertificate),
        };
        let response: iso15118::PncSignCertificateResponse =
            self.inner.pnc_call("SignCertificate", &request).await?;
        Ok(response.status == GenericStatus::Accepted)
    }
}

// ── Connection machinery ───────────────────────────────────────

impl ChargePointInner {
    pub(crate) fn registration_state(&self) -> RegistrationState {
        *self.registration.read().unwrap()
    }

    async fn set_registration_state(&self, state: RegistrationState) {
        {
            let mut registration = self.registration.write().unwrap();
            if *registration == state {
                return;
            }
            *registration = state;
        }
        self.events.registration_state_changed(state).await;
    }

    fn current_endpoint(&self) -> Result<Arc<RpcEndpoint>, RpcError> {
        self.endpoint
            .read()
            .unwrap()
            .clone()
            .ok_or(RpcError::NotConnected)
    }

    /// Typed call on the current connection.
    pub(crate) async fn call_typed<Req, Resp>(
        &self,
        action: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        if self.registration_state() != RegistrationState::Accepted
            && !crate::messages::originates_while_pending(action)
        {
            return Err(RpcError::SendFailed(format!(
                "{} refused: charge point not accepted by central system",
                action
            )));
        }
        let endpoint = self.current_endpoint()?;
        let payload = serde_json::to_value(request)
            .map_err(|e| RpcError::SendFailed(format!("serialization failed: {}", e)))?;
        let result = endpoint
            .call(action, payload, self.config.call_request_timeout())
            .await?;
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    /// Transaction-related call; queued for retry when undeliverable.
    async fn send_transaction_message<Req, Resp>(
        &self,
        action: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        match self.call_typed(action, request).await {
            Ok(response) => Ok(response),
            Err(e @ (RpcError::NotConnected | RpcError::SendFailed(_) | RpcError::Timeout)) => {
                let attempts = self.config.transaction_message_attempts;
                if attempts > 0 {
                    let payload = serde_json::to_value(request).unwrap_or_default();
                    let queued = self.tx_queue.push(QueuedMessage {
                        action: action.to_string(),
                        payload,
                        attempts_left: attempts,
                    });
                    warn!(
                        action,
                        queued, "transaction message not delivered, queued for retry"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// One PnC DataTransfer round trip.
    pub(crate) async fn pnc_call<Req, Resp>(
        &self,
        message_id: &str,
        request: &Req,
    ) -> Result<Resp, RpcError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let data = iso15118::encode_envelope(request)
            .map_err(|e| RpcError::SendFailed(format!("serialization failed: {}", e)))?;
        let envelope = DataTransferRequest {
            vendor_string: PNC_VENDOR_ID.to_string(),
            message_id: Some(message_id.to_string()),
            data: Some(data),
        };
        let response: DataTransferResponse = self.call_typed("DataTransfer", &envelope).await?;
        let status = format!("{:?}", response.status);
        if status != "Accepted" {
            return Err(RpcError::CallError {
                code: status,
                description: format!("PnC {} refused", message_id),
            });
        }
        iso15118::decode_envelope(response.data.as_deref())
            .map_err(|e| RpcError::InvalidResponse(format!("failed to parse response: {}", e)))
    }

    pub(crate) async fn send_heartbeat(&self) -> Result<chrono::DateTime<Utc>, RpcError> {
        let response: HeartbeatResponse = self
            .call_typed("Heartbeat", &serde_json::json!({}))
            .await?;
        Ok(response.current_time)
    }

    pub(crate) async fn send_boot_notification(
        &self,
    ) -> Result<BootNotificationResponse, RpcError> {
        let config = &self.config;
        let request = BootNotificationRequest {
            charge_box_serial_number: None,
            charge_point_model: config.charge_point_model.clone(),
            charge_point_serial_number: config.charge_point_serial_number.clone(),
            charge_point_vendor: config.charge_point_vendor.clone(),
            firmware_version: config.firmware_version.clone(),
            iccid: config.iccid.clone(),
            imsi: config.imsi.clone(),
            meter_serial_number: config.meter_serial_number.clone(),
            meter_type: config.meter_type.clone(),
        };
        self.call_typed("BootNotification", &request).await
    }

    pub(crate) async fn send_sign_certificate(&self, csr_pem: &str) -> Result<bool, RpcError> {
        let request = SignCertificateRequest {
            csr: csr_pem.to_string(),
        };
        let response: SignCertificateResponse =
            self.call_typed("SignCertificate", &request).await?;
        Ok(response.status == GenericStatus::Accepted)
    }

    /// Connection loop: connect, serve, reconnect after the retry
    /// interval, until shutdown.
    async fn run(self: Arc<Self>) {
        loop {
            if self.shutdown.is_triggered() {
                return;
            }
            if let Err(e) = Arc::clone(&self).serve_connection().await {
                warn!(error = %e, "connection attempt failed");
            }
            if self.shutdown.is_triggered() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval()) => {}
                _ = self.shutdown.wait() => return,
            }
        }
    }

    async fn serve_connection(
        self: Arc<Self>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let base = ConnectionUrl::parse(&self.config.connect_url)
            .map_err(|e| format!("invalid connect URL: {}", e))?;
        let url = base.join_segment(&self.config.identifier);

        let mut request = url.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            crate::messages::OcppVersion::V16.subprotocol().parse()?,
        );
        // Security profiles 1/2: identifier as user, AuthorizationKey as
        // password. The live value may have been rotated over OCPP.
        let password = self
            .ocpp_config
            .value_of("AuthorizationKey")
            .filter(|v| !v.is_empty());
        if let Some(password) = password {
            let credentials =
                BASE64.encode(format!("{}:{}", self.config.identifier, password));
            request
                .headers_mut()
                .insert("Authorization", format!("Basic {}", credentials).parse()?);
        }

        info!(url = url.as_str(), "connecting to central system");
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!("connected to central system");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let endpoint = Arc::new(RpcEndpoint::new(self.config.identifier.clone(), tx));
        let call_handler = Arc::new(handler::ChargePointCallHandler::new(Arc::downgrade(&self)));
        endpoint.register_listener(call_handler);
        endpoint.start();
        *self.endpoint.write().unwrap() = Some(Arc::clone(&endpoint));
        self.events.connection_state_changed(true).await;

        // The ping cadence comes from the WebSocketPingInterval key, read
        // once per connection (changes apply from the next socket).
        let ping_secs = self
            .ocpp_config
            .value_as_u64("WebSocketPingInterval")
            .unwrap_or(0);
        let send_task = tokio::spawn(async move {
            let mut ping = keepalive(ping_secs);
            loop {
                tokio::select! {
                    text = rx.recv() => match text {
                        Some(text) => {
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = next_ping(&mut ping) => {
                        if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let recv_endpoint = Arc::clone(&endpoint);
        let recv_task = tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => recv_endpoint.process_incoming(&text),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        let registration_task = tokio::spawn(Arc::clone(&self).registration_cycle(Arc::clone(&endpoint)));

        let mut send_task = send_task;
        let mut recv_task = recv_task;
        tokio::select! {
            _ = &mut send_task => {}
            _ = &mut recv_task => {}
            _ = self.shutdown.wait() => {}
        }
        registration_task.abort();
        send_task.abort();
        recv_task.abort();

        endpoint.notify_disconnected().await;
        endpoint.stop().await;
        *self.endpoint.write().unwrap() = None;
        self.set_registration_state(RegistrationState::Unknown).await;
        self.events.connection_state_changed(false).await;
        info!("disconnected from central system");
        Ok(())
    }

    /// Boot until accepted, then heartbeat and drain the transaction
    /// queue. Runs for the lifetime of one connection.
    async fn registration_cycle(self: Arc<Self>, endpoint: Arc<RpcEndpoint>) {
        // ── Boot loop ──────────────────────────────────────
        loop {
            match self.send_boot_notification().await {
                Ok(response) => {
                    let interval = response.interval as u64;
                    match response.status {
                        RegistrationStatus::Accepted => {
                            info!(interval, "registration accepted");
                            self.set_registration_state(RegistrationState::Accepted).await;
                            let heartbeat = if interval > 0 {
                                interval
                            } else {
                                self.config.heartbeat_interval_secs
                            };
                            self.heartbeat_secs.store(heartbeat, Ordering::SeqCst);
                            break;
                        }
                        status => {
                            let state = match status {
                                RegistrationStatus::Pending => RegistrationState::Pending,
                                _ => RegistrationState::Rejected,
                            };
                            info!(?status, interval, "registration not accepted, retrying");
                            self.set_registration_state(state).await;
                            let wait = if interval > 0 {
                                Duration::from_secs(interval)
                            } else {
                                self.config.boot_notification_retry_interval()
                            };
                            tokio::time::sleep(wait).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "boot notification failed");
                    if !endpoint.is_connected() {
                        return;
                    }
                    tokio::time::sleep(self.config.boot_notification_retry_interval()).await;
                }
            }
        }

        // ── Offline transaction messages ───────────────────
        let drain = Arc::clone(&self);
        let drain_task = tokio::spawn(async move { drain.drain_transaction_queue().await });

        // ── Heartbeat loop ─────────────────────────────────
        loop {
            let interval = Duration::from_secs(self.heartbeat_secs.load(Ordering::SeqCst).max(1));
            tokio::time::sleep(interval).await;
            match self.send_heartbeat().await {
                Ok(current_time) => debug!(%current_time, "heartbeat"),
                Err(RpcError::NotConnected | RpcError::Stopped) => break,
                Err(e) => warn!(error = %e, "heartbeat failed"),
            }
        }
        drain_task.abort();
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        events: Arc<dyn ChargePointEvents>,
        state: RegistrationState,
    ) -> Arc<Self> {
        let config = ChargePointConfig::default();
        let ocpp_config = Arc::new(OcppConfigStore::new(&config));
        let heartbeat = config.heartbeat_interval_secs;
        Arc::new(Self {
            config: Arc::new(config),
            events,
            ocpp_config,
            storage: ChargePointStorage::in_memory(),
            endpoint: RwLock::new(None),
            registration: RwLock::new(state),
            heartbeat_secs: AtomicU64::new(heartbeat),
            tx_queue: MessageQueue::new(TRANSACTION_QUEUE_LIMIT),
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Redeliver queued transaction messages, oldest first, spacing
    /// retries by the configured interval.
    async fn drain_transaction_queue(self: Arc<Self>) {
        while let Some(mut message) = self.tx_queue.pop(None).await {
            let endpoint = match self.current_endpoint() {
                Ok(endpoint) => endpoint,
                Err(_) => {
                    self.tx_queue.push(message);
                    return;
                }
            };
            let delivered = endpoint
                .call(
                    &message.action,
                    message.payload.clone(),
                    self.config.call_request_timeout(),
                )
                .await;
            match delivered {
                Ok(_) => {
                    info!(action = message.action.as_str(), "queued transaction message delivered");
                }
                Err(e) => {
                    message.attempts_left = message.attempts_left.saturating_sub(1);
                    if message.attempts_left == 0 {
                        warn!(
                            action = message.action.as_str(),
                            error = %e,
                            "transaction message dropped after last attempt"
                        );
                    } else {
                        self.tx_queue.push(message);
                        tokio::time::sleep(self.config.transaction_message_retry_interval())
                            .await;
                    }
                }
            }
        }
    }
}
