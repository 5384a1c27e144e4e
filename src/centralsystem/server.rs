//! Central system WebSocket server
//!
//! Accepts charge point connections at `ws://<host>:<port><prefix>/{id}`.
//! The upgrade is refused unless the acceptor predicate passes, the URI
//! path matches the configured prefix, the identifier is well-formed and
//! not already mapped (under `RejectDuplicate`), and HTTP Basic
//! credentials check out when required.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use super::events::CentralSystemEvents;
use super::handler::ChargePointHandler;
use super::session::{RegisterOutcome, SessionRegistry, SharedSessionRegistry};
use crate::config::CentralSystemConfig;
use crate::messages::OcppVersion;
use crate::rpc::RpcEndpoint;
use crate::support::{keepalive, next_ping, ConnectionUrl, ShutdownSignal};

/// HTTP Basic realm presented on the authentication challenge.
const BASIC_REALM: &str = "Basic realm=\"Open OCPP\"";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen URL: {0}")]
    InvalidListenUrl(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ── Subprotocol negotiation ────────────────────────────────────

/// Picks the best mutually supported OCPP version from the
/// `Sec-WebSocket-Protocol` header.
pub struct ProtocolNegotiator {
    /// Supported versions in preference order, newest first.
    supported: Vec<OcppVersion>,
}

impl ProtocolNegotiator {
    pub fn new(supported: Vec<OcppVersion>) -> Self {
        Self { supported }
    }

    /// Best mutual version, or `None` when nothing matches.
    pub fn negotiate(&self, requested_protocols: &str) -> Option<OcppVersion> {
        let requested: Vec<&str> = requested_protocols.split(',').map(str::trim).collect();
        self.supported
            .iter()
            .copied()
            .find(|version| requested.iter().any(|p| *p == version.subprotocol()))
    }
}

impl Default for ProtocolNegotiator {
    fn default() -> Self {
        Self::new(OcppVersion::ALL.to_vec())
    }
}

// ── Server ─────────────────────────────────────────────────────

/// OCPP central system server.
pub struct CentralSystem {
    config: Arc<CentralSystemConfig>,
    events: Arc<dyn CentralSystemEvents>,
    registry: SharedSessionRegistry,
    shutdown: ShutdownSignal,
}

impl CentralSystem {
    pub fn new(config: CentralSystemConfig, events: Arc<dyn CentralSystemEvents>) -> Self {
        Self {
            config: Arc::new(config),
            events,
            registry: SessionRegistry::shared(),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn session_registry(&self) -> &SharedSessionRegistry {
        &self.registry
    }

    /// Look up a connected charge point to issue operations on it.
    pub fn session(&self, charge_point_id: &str) -> Option<Arc<super::session::ChargePointSession>> {
        self.registry.get(charge_point_id)
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Bind the listen URL and serve until the shutdown signal fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listen = ConnectionUrl::parse(&self.config.listen_url)
            .map_err(|e| ServerError::InvalidListenUrl(e.to_string()))?;
        let bind_addr = format!(
            "{}:{}",
            listen.host(),
            listen.port().unwrap_or(if listen.is_secure() { 443 } else { 80 })
        );
        let path_prefix = listen.path().trim_end_matches('/').to_string();

        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "central system listening on ws://{}{}/{{charge_point_id}}",
            bind_addr, path_prefix
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr, path_prefix.clone()),
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }
                _ = self.shutdown.wait() => {
                    info!("central system stopping");
                    for session in self.registry.sessions() {
                        session.request_close();
                        session.endpoint().stop().await;
                        self.registry.remove(&session);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, path_prefix: String) {
        if !self.events.accept_connection(&addr) {
            warn!(remote_addr = %addr, "connection refused by acceptor");
            return;
        }

        let config = Arc::clone(&self.config);
        let events = Arc::clone(&self.events);
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, addr, path_prefix, config, events, registry).await
            {
                warn!(remote_addr = %addr, error = %e, "connection ended with error");
            }
        });
    }
}

/// Last path segment under the prefix, validated as a charge point
/// identifier (1–20 ASCII characters, no separators).
fn extract_charge_point_id(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?.trim_start_matches('/');
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    if rest.len() > 20 || !rest.is_ascii() {
        return None;
    }
    Some(rest.to_string())
}

/// Decode `Authorization: Basic <credentials>` into user and password.
fn decode_basic_auth(header: &str) -> Option<(String, Vec<u8>)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = BASE64.decode(encoded).ok()?;
    let split = decoded.iter().position(|&b| b == b':')?;
    let user = String::from_utf8(decoded[..split].to_vec()).ok()?;
    Some((user, decoded[split + 1..].to_vec()))
}

fn reject(status: u16, challenge: Option<&'static str>) -> ErrorResponse {
    let mut builder = http::Response::builder().status(status);
    if let Some(challenge) = challenge {
        builder = builder.header("WWW-Authenticate", challenge);
    }
    builder.body(None).unwrap()
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    path_prefix: String,
    config: Arc<CentralSystemConfig>,
    events: Arc<dyn CentralSystemEvents>,
    registry: SharedSessionRegistry,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let negotiator = ProtocolNegotiator::default();
    let mut charge_point_id: Option<String> = None;
    let mut version = OcppVersion::V16;

    let ws_stream = {
        let events = Arc::clone(&events);
        let registry = Arc::clone(&registry);
        let config = Arc::clone(&config);
        let charge_point_id = &mut charge_point_id;
        let version = &mut version;
        tokio_tungstenite::accept_hdr_async(
            stream,
            move |request: &Request, mut response: Response| {
                let path = request.uri().path();
                let id = match extract_charge_point_id(path, &path_prefix) {
                    Some(id) => id,
                    None => {
                        warn!(remote_addr = %addr, path, "rejecting upgrade: bad path");
                        return Err(reject(404, None));
                    }
                };

                // HTTP Basic, security profiles 1 and 2.
                if config.http_basic_authent {
                    let authorized = request
                        .headers()
                        .get("Authorization")
                        .and_then(|v| v.to_str().ok())
                        .and_then(decode_basic_auth)
                        .map(|(user, password)| {
                            user == id && events.check_credentials(&id, &password)
                        })
                        .unwrap_or(false);
                    if !authorized {
                        warn!(remote_addr = %addr, charge_point_id = id.as_str(), "rejecting upgrade: bad credentials");
                        return Err(reject(401, Some(BASIC_REALM)));
                    }
                }

                // Fail early on duplicates when the policy keeps the old
                // session; the registry re-checks after the handshake.
                if config.duplicate_policy == crate::config::DuplicatePolicy::RejectDuplicate
                    && registry.is_connected(&id)
                {
                    warn!(remote_addr = %addr, charge_point_id = id.as_str(), "rejecting upgrade: identifier already connected");
                    return Err(reject(409, None));
                }

                let requested = request
                    .headers()
                    .get("Sec-WebSocket-Protocol")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if let Some(negotiated) = negotiator.negotiate(requested) {
                    *version = negotiated;
                    response.headers_mut().insert(
                        "Sec-WebSocket-Protocol",
                        negotiated.subprotocol().parse().unwrap(),
                    );
                } else if !requested.is_empty() {
                    warn!(
                        remote_addr = %addr,
                        requested, "no mutual subprotocol, defaulting to ocpp1.6"
                    );
                }

                *charge_point_id = Some(id);
                Ok(response)
            },
        )
        .await?
    };

    let Some(charge_point_id) = charge_point_id else {
        return Ok(());
    };
    info!(charge_point_id = charge_point_id.as_str(), remote_addr = %addr, %version, "charge point connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let endpoint = Arc::new(RpcEndpoint::with_requests_limit(
        charge_point_id.clone(),
        tx,
        config.incoming_requests_limit,
    ));

    let session = match registry.register(
        &charge_point_id,
        version,
        Arc::clone(&endpoint),
        Some(addr),
        config.call_request_timeout(),
        config.duplicate_policy,
    ) {
        RegisterOutcome::New(session) => session,
        RegisterOutcome::Replaced { session, evicted } => {
            evicted.request_close();
            evicted.endpoint().stop().await;
            events
                .charge_point_disconnected(evicted.charge_point_id())
                .await;
            session
        }
        RegisterOutcome::Rejected => {
            warn!(
                charge_point_id = charge_point_id.as_str(),
                "closing duplicate connection"
            );
            return Ok(());
        }
    };

    let handler = Arc::new(ChargePointHandler::new(
        Arc::clone(&session),
        Arc::clone(&events),
        Arc::clone(&config),
    ));
    endpoint.register_listener(handler);
    endpoint.start();

    events.charge_point_connected(Arc::clone(&session)).await;

    // Outbound pump: everything the endpoint serializes goes to the
    // socket, interleaved with keepalive pings at the configured interval.
    let send_id = charge_point_id.clone();
    let ping_secs = config.websocket_ping_interval_secs;
    let send_task = tokio::spawn(async move {
        let mut ping = keepalive(ping_secs);
        loop {
            tokio::select! {
                text = rx.recv() => match text {
                    Some(text) => {
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            error!(charge_point_id = send_id.as_str(), error = %e, "send failed");
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

    // Inbound pump: text frames feed the endpoint, the rest is transport
    // housekeeping.
    let recv_endpoint = Arc::clone(&endpoint);
    let recv_id = charge_point_id.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => recv_endpoint.process_incoming(&text),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(data)) => {
                    warn!(
                        charge_point_id = recv_id.as_str(),
                        bytes = data.len(),
                        "ignoring binary message"
                    );
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(charge_point_id = recv_id.as_str(), error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    let mut send_task = send_task;
    let mut recv_task = recv_task;
    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut recv_task => {}
        _ = session.wait_close_requested() => {}
    }
    send_task.abort();
    recv_task.abort();

    endpoint.notify_disconnected().await;
    endpoint.stop().await;
    registry.remove_after_grace(session, config.session_close_grace());
    info!(charge_point_id = charge_point_id.as_str(), "charge point disconnected");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_single_match() {
        let negotiator = ProtocolNegotiator::new(vec![OcppVersion::V16]);
        assert_eq!(negotiator.negotiate("ocpp1.6"), Some(OcppVersion::V16));
    }

    #[test]
    fn negotiate_prefers_newest_mutual_version() {
        let negotiator = ProtocolNegotiator::default();
        assert_eq!(
            negotiator.negotiate("ocpp1.6, ocpp2.0.1"),
            Some(OcppVersion::V201)
        );
    }

    #[test]
    fn negotiate_no_match() {
        let negotiator = ProtocolNegotiator::new(vec![OcppVersion::V16]);
        assert_eq!(negotiator.negotiate("ocpp2.0.1"), None);
        assert_eq!(negotiator.negotiate(""), None);
    }

    #[test]
    fn identifier_extraction_is_strict() {
        assert_eq!(
            extract_charge_point_id("/ocpp/CP_1", "/ocpp"),
            Some("CP_1".to_string())
        );
        assert_eq!(extract_charge_point_id("/ocpp/", "/ocpp"), None);
        assert_eq!(extract_charge_point_id("/other/CP_1", "/ocpp"), None);
        assert_eq!(extract_charge_point_id("/ocpp/a/b", "/ocpp"), None);
        // Longer than 20 characters
        assert_eq!(
            extract_charge_point_id("/ocpp/ABCDEFGHIJKLMNOPQRSTU", "/ocpp"),
            None
        );
        // Non-ASCII
        assert_eq!(extract_charge_point_id("/ocpp/CP\u{00e9}", "/ocpp"), None);
    }

    #[test]
    fn basic_auth_decoding() {
        let header = format!("Basic {}", BASE64.encode("CP001:s3cret"));
        let (user, password) = decode_basic_auth(&header).unwrap();
        assert_eq!(user, "CP001");
        assert_eq!(password, b"s3cret");
        assert!(decode_basic_auth("Bearer abc").is_none());
        assert!(decode_basic_auth("Basic not-base64!").is_none());
    }
}
