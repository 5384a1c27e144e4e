//! RPC endpoint
//!
//! One endpoint per connected peer. The endpoint serializes frames onto an
//! outbound channel owned by the transport glue and receives inbound text
//! through [`RpcEndpoint::process_incoming`].
//!
//! Outbound calls are strictly serialized: the call mutex guarantees that
//! at most one CALL is in flight per endpoint, which keeps correlation
//! trivial (any response either matches the single outstanding id or is
//! stale and dropped). Inbound calls are queued and dispatched by a worker
//! task which sends exactly one CALLRESULT or CALLERROR per call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::error::{CallError, ErrorCode, RpcError};
use super::frame::OcppFrame;
use crate::support::MessageQueue;

/// Capacity of the inbound request queue (backpressure bound).
const DEFAULT_REQUESTS_LIMIT: usize = 64;
/// Capacity of the response queue; stale entries are discarded by `call`.
const RESULTS_LIMIT: usize = 8;

/// Observer receiving every raw frame before it is processed.
pub trait RpcSpy: Send + Sync {
    fn message_sent(&self, message: &str);
    fn message_received(&self, message: &str);
}

/// Receiver of inbound calls and connection events.
#[async_trait::async_trait]
pub trait RpcListener: Send + Sync {
    /// Handle one inbound CALL. The returned payload becomes a CALLRESULT;
    /// an error becomes a CALLERROR with the error's code (handlers that
    /// fail without choosing a code use `GenericError`).
    async fn call_received(&self, action: &str, payload: Value) -> Result<Value, CallError>;

    /// The transport closed underneath the endpoint.
    async fn disconnected(&self) {}
}

struct RpcMessage {
    unique_id: String,
    action: String,
    payload: Value,
    /// `Some((code, description))` for CALLERROR responses.
    error: Option<(String, String)>,
}

/// Per-peer RPC endpoint over a framed text transport.
pub struct RpcEndpoint {
    identifier: String,
    sender: mpsc::UnboundedSender<String>,
    listener: RwLock<Option<Arc<dyn RpcListener>>>,
    spies: RwLock<Vec<Arc<dyn RpcSpy>>>,
    call_mutex: Mutex<()>,
    transaction_id: AtomicU64,
    results: MessageQueue<RpcMessage>,
    requests: MessageQueue<RpcMessage>,
    dispatch_task: StdMutex<Option<JoinHandle<()>>>,
    disconnect_reported: AtomicBool,
}

impl RpcEndpoint {
    /// Create an endpoint writing frames into `sender`.
    pub fn new(identifier: impl Into<String>, sender: mpsc::UnboundedSender<String>) -> Self {
        Self::with_requests_limit(identifier, sender, DEFAULT_REQUESTS_LIMIT)
    }

    pub fn with_requests_limit(
        identifier: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        requests_limit: usize,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            sender,
            listener: RwLock::new(None),
            spies: RwLock::new(Vec::new()),
            call_mutex: Mutex::new(()),
            transaction_id: AtomicU64::new(1),
            results: MessageQueue::new(RESULTS_LIMIT),
            requests: MessageQueue::new(requests_limit),
            dispatch_task: StdMutex::new(None),
            disconnect_reported: AtomicBool::new(false),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn register_listener(&self, listener: Arc<dyn RpcListener>) {
        *self.listener.write().unwrap() = Some(listener);
    }

    /// Register a frame observer. Spies see every sent and received frame
    /// in order, before processing.
    pub fn register_spy(&self, spy: Arc<dyn RpcSpy>) {
        self.spies.write().unwrap().push(spy);
    }

    /// Seed the unique-id sequence and start the dispatch worker.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.dispatch_task.lock().unwrap();
        if task.is_some() {
            return;
        }

        // Nonzero, unpredictable sequence start; rendered as decimal.
        let seed = rand::thread_rng().gen_range(1..=u32::MAX as u64);
        self.transaction_id.store(seed, Ordering::SeqCst);

        self.results.set_enable(true);
        self.requests.set_enable(true);

        let endpoint = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            while let Some(message) = endpoint.requests.pop(None).await {
                endpoint.dispatch_call(message).await;
            }
        }));
    }

    /// Disable the queues, fail any in-flight call and join the worker.
    pub async fn stop(&self) {
        self.results.set_enable(false);
        self.requests.set_enable(false);

        let task = self.dispatch_task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.results.clear();
        self.requests.clear();
    }

    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Issue an outbound CALL and wait for its response.
    ///
    /// Calls are strictly serialized: a second caller waits until the
    /// first one completed or timed out. Stale responses (ids that do not
    /// match the outstanding call) are discarded silently.
    pub async fn call(
        &self,
        action: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let _in_flight = self.call_mutex.lock().await;

        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        if !self.results.is_enabled() {
            return Err(RpcError::Stopped);
        }
        // Anything still queued belongs to an earlier, timed-out call.
        self.results.clear();

        let unique_id = self
            .transaction_id
            .fetch_add(1, Ordering::SeqCst)
            .to_string();

        let frame = OcppFrame::Call {
            unique_id: unique_id.clone(),
            action: action.to_string(),
            payload,
        };
        self.send_frame(&frame)?;
        debug!(
            identifier = self.identifier.as_str(),
            action,
            unique_id = unique_id.as_str(),
            "call sent"
        );

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    identifier = self.identifier.as_str(),
                    action,
                    unique_id = unique_id.as_str(),
                    "call timed out"
                );
                return Err(RpcError::Timeout);
            }

            match self.results.pop(Some(deadline - now)).await {
                Some(message) if message.unique_id == unique_id => {
                    return match message.error {
                        Some((code, description)) => Err(RpcError::CallError { code, description }),
                        None => Ok(message.payload),
                    };
                }
                Some(stale) => {
                    debug!(
                        identifier = self.identifier.as_str(),
                        unique_id = stale.unique_id.as_str(),
                        "discarding stale response"
                    );
                }
                None => {
                    return if self.results.is_enabled() {
                        Err(RpcError::Timeout)
                    } else {
                        Err(RpcError::Stopped)
                    };
                }
            }
        }
    }

    /// Feed one inbound text frame from the transport.
    pub fn process_incoming(&self, text: &str) {
        for spy in self.spies.read().unwrap().iter() {
            spy.message_received(text);
        }

        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                // The unique id could not be recovered; answer with an
                // empty one and drop the frame.
                warn!(identifier = self.identifier.as_str(), error = %e, "framing error");
                self.send_call_error("", ErrorCode::ProtocolError, "");
                return;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                let accepted = self.requests.push(RpcMessage {
                    unique_id: unique_id.clone(),
                    action,
                    payload,
                    error: None,
                });
                if !accepted {
                    warn!(
                        identifier = self.identifier.as_str(),
                        unique_id = unique_id.as_str(),
                        "request queue full"
                    );
                    self.send_call_error(&unique_id, ErrorCode::InternalError, "Too many pending requests");
                }
            }
            OcppFrame::CallResult { unique_id, payload } => {
                self.results.push(RpcMessage {
                    unique_id,
                    action: String::new(),
                    payload,
                    error: None,
                });
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                self.results.push(RpcMessage {
                    unique_id,
                    action: String::new(),
                    payload: error_details,
                    error: Some((error_code, error_description)),
                });
            }
        }
    }

    /// Report the transport closed. Fails any in-flight call and notifies
    /// the listener exactly once per endpoint lifetime.
    pub async fn notify_disconnected(&self) {
        if self.disconnect_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        self.results.set_enable(false);
        let listener = self.listener.read().unwrap().clone();
        if let Some(listener) = listener {
            listener.disconnected().await;
        }
    }

    async fn dispatch_call(&self, message: RpcMessage) {
        let listener = self.listener.read().unwrap().clone();
        let Some(listener) = listener else {
            self.send_call_error(&message.unique_id, ErrorCode::InternalError, "No listener");
            return;
        };

        debug!(
            identifier = self.identifier.as_str(),
            action = message.action.as_str(),
            unique_id = message.unique_id.as_str(),
            "dispatching call"
        );

        match listener
            .call_received(&message.action, message.payload)
            .await
        {
            Ok(response) => {
                let frame = OcppFrame::CallResult {
                    unique_id: message.unique_id,
                    payload: response,
                };
                if let Err(e) = self.send_frame(&frame) {
                    error!(identifier = self.identifier.as_str(), error = %e, "failed to send call result");
                }
            }
            Err(call_error) => {
                self.send_call_error(
                    &message.unique_id,
                    call_error.code,
                    &call_error.description,
                );
            }
        }
    }

    fn send_call_error(&self, unique_id: &str, code: ErrorCode, description: &str) {
        let frame = OcppFrame::error(unique_id, code.as_str(), description);
        if let Err(e) = self.send_frame(&frame) {
            error!(identifier = self.identifier.as_str(), error = %e, "failed to send call error");
        }
    }

    fn send_frame(&self, frame: &OcppFrame) -> Result<(), RpcError> {
        let text = frame.serialize();
        for spy in self.spies.read().unwrap().iter() {
            spy.message_sent(&text);
        }
        self.sender
            .send(text)
            .map_err(|_| RpcError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as PlainMutex;

    struct EchoListener;

    #[async_trait::async_trait]
    impl RpcListener for EchoListener {
        async fn call_received(&self, action: &str, payload: Value) -> Result<Value, CallError> {
            match action {
                "Heartbeat" => Ok(serde_json::json!({"currentTime": "2024-01-01T00:00:00Z"})),
                "Echo" => Ok(payload),
                "Fail" => Err(CallError::generic("handler failed")),
                other => Err(CallError::not_implemented(other)),
            }
        }
    }

    struct RecordingSpy {
        sent: PlainMutex<Vec<String>>,
        received: PlainMutex<Vec<String>>,
    }

    impl RpcSpy for RecordingSpy {
        fn message_sent(&self, message: &str) {
            self.sent.lock().unwrap().push(message.to_string());
        }
        fn message_received(&self, message: &str) {
            self.received.lock().unwrap().push(message.to_string());
        }
    }

    fn endpoint_with_listener() -> (Arc<RpcEndpoint>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
        endpoint.register_listener(Arc::new(EchoListener));
        endpoint.start();
        (endpoint, rx)
    }

    #[tokio::test]
    async fn inbound_call_produces_one_call_result() {
        let (endpoint, mut rx) = endpoint_with_listener();
        endpoint.process_incoming(r#"[2,"0","Heartbeat",{}]"#);
        let reply = rx.recv().await.unwrap();
        let frame = OcppFrame::parse(&reply).unwrap();
        assert!(frame.is_call_result());
        assert_eq!(frame.unique_id(), "0");
        endpoint.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_action_yields_not_implemented() {
        let (endpoint, mut rx) = endpoint_with_listener();
        endpoint.process_incoming(r#"[2,"42","FlyToMoon",{}]"#);
        let reply = rx.recv().await.unwrap();
        match OcppFrame::parse(&reply).unwrap() {
            OcppFrame::CallError {
                unique_id,
                error_code,
                ..
            } => {
                assert_eq!(unique_id, "42");
                assert_eq!(error_code, "NotImplemented");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn malformed_frame_yields_protocol_error_with_empty_id() {
        let (endpoint, mut rx) = endpoint_with_listener();
        endpoint.process_incoming("not-json");
        let reply = rx.recv().await.unwrap();
        match OcppFrame::parse(&reply).unwrap() {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_details,
                ..
            } => {
                assert_eq!(unique_id, "");
                assert_eq!(error_code, "ProtocolError");
                assert_eq!(error_details, serde_json::json!({}));
            }
            other => panic!("expected CallError, got {:?}", other),
        }
        // The endpoint still answers later well-formed frames.
        endpoint.process_incoming(r#"[2,"1","Heartbeat",{}]"#);
        assert!(OcppFrame::parse(&rx.recv().await.unwrap())
            .unwrap()
            .is_call_result());
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn handler_failure_defaults_to_generic_error() {
        let (endpoint, mut rx) = endpoint_with_listener();
        endpoint.process_incoming(r#"[2,"7","Fail",{}]"#);
        match OcppFrame::parse(&rx.recv().await.unwrap()).unwrap() {
            OcppFrame::CallError { error_code, .. } => assert_eq!(error_code, "GenericError"),
            other => panic!("expected CallError, got {:?}", other),
        }
        endpoint.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_within_window() {
        let (endpoint, _rx) = endpoint_with_listener();
        let started = Instant::now();
        let result = endpoint
            .call("Heartbeat", serde_json::json!({}), Duration::from_millis(100))
            .await;
        let elapsed = started.elapsed();
        assert!(matches!(result, Err(RpcError::Timeout)));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn call_matches_response_by_unique_id_and_drops_stale() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
        endpoint.start();

        let caller = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
                    .await
            })
        };

        // Observe the outbound CALL to learn its id.
        let sent = rx.recv().await.unwrap();
        let unique_id = match OcppFrame::parse(&sent).unwrap() {
            OcppFrame::Call { unique_id, .. } => unique_id,
            other => panic!("expected Call, got {:?}", other),
        };
        assert!(unique_id.parse::<u64>().is_ok());

        // A stale response first, then the matching one.
        endpoint.process_incoming(r#"[3,"stale-id",{"ignored":true}]"#);
        endpoint.process_incoming(&format!(
            r#"[3,"{}",{{"currentTime":"2024-01-01T00:00:00Z"}}]"#,
            unique_id
        ));

        let payload = caller.await.unwrap().unwrap();
        assert_eq!(payload["currentTime"], "2024-01-01T00:00:00Z");
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn call_surfaces_call_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
        endpoint.start();

        let caller = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .call("Reset", serde_json::json!({"type": "Soft"}), Duration::from_secs(5))
                    .await
            })
        };

        let sent = rx.recv().await.unwrap();
        let unique_id = OcppFrame::parse(&sent).unwrap().unique_id().to_string();
        endpoint.process_incoming(&format!(
            r#"[4,"{}","NotSupported","no can do",{{}}]"#,
            unique_id
        ));

        match caller.await.unwrap() {
            Err(RpcError::CallError { code, description }) => {
                assert_eq!(code, "NotSupported");
                assert_eq!(description, "no can do");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn calls_are_strictly_serialized() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
        endpoint.start();

        let first = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
                    .await
            })
        };
        let second = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .call("Heartbeat", serde_json::json!({}), Duration::from_secs(5))
                    .await
            })
        };

        // Exactly one CALL is on the wire until it is answered.
        let first_sent = rx.recv().await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "second call overlapped the first");

        let first_id = OcppFrame::parse(&first_sent).unwrap().unique_id().to_string();
        endpoint.process_incoming(&format!(r#"[3,"{}",{{}}]"#, first_id));

        // Only now the second CALL goes out, with a different id.
        let second_sent = rx.recv().await.unwrap();
        let second_id = OcppFrame::parse(&second_sent)
            .unwrap()
            .unique_id()
            .to_string();
        assert_ne!(first_id, second_id);
        endpoint.process_incoming(&format!(r#"[3,"{}",{{}}]"#, second_id));

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        endpoint.stop().await;
    }

    #[tokio::test]
    async fn stop_fails_inflight_call() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(RpcEndpoint::new("CP1", tx));
        endpoint.start();

        let caller = {
            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                endpoint
                    .call("Heartbeat", serde_json::json!({}), Duration::from_secs(30))
                    .await
            })
        };
        let _ = rx.recv().await.unwrap();

        endpoint.stop().await;
        assert!(matches!(caller.await.unwrap(), Err(RpcError::Stopped)));
    }

    #[tokio::test]
    async fn spies_observe_both_directions_in_order() {
        let (endpoint, mut rx) = endpoint_with_listener();
        let spy = Arc::new(RecordingSpy {
            sent: PlainMutex::new(Vec::new()),
            received: PlainMutex::new(Vec::new()),
        });
        endpoint.register_spy(spy.clone());

        endpoint.process_incoming(r#"[2,"9","Heartbeat",{}]"#);
        let _ = rx.recv().await.unwrap();

        assert_eq!(spy.received.lock().unwrap().len(), 1);
        assert!(spy.received.lock().unwrap()[0].contains("Heartbeat"));
        assert_eq!(spy.sent.lock().unwrap().len(), 1);
        assert!(spy.sent.lock().unwrap()[0].starts_with(r#"[3,"9""#));
        endpoint.stop().await;
    }
}
