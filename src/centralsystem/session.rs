//! Session registry and per-peer session state
//!
//! The registry owns the sessions; everything else holds `Arc` handles.
//! Sessions are removed after a short grace delay so a callback running
//! inside the disconnect path never tears down the session under its own
//! feet. Removal is epoch-guarded: a delayed removal is a no-op when a
//! replacement session with the same identifier has been registered in
//! the meantime.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::events::RegistrationVerdict;
use crate::config::DuplicatePolicy;
use crate::messages::OcppVersion;
use crate::rpc::RpcEndpoint;

/// State of one connected charge point.
pub struct ChargePointSession {
    charge_point_id: String,
    ocpp_version: OcppVersion,
    endpoint: Arc<RpcEndpoint>,
    remote_addr: Option<SocketAddr>,
    registration: RwLock<RegistrationVerdict>,
    connected_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    pub(crate) call_timeout: Duration,
    request_id_counter: AtomicU64,
    close_requested: std::sync::atomic::AtomicBool,
    close_notify: Notify,
    epoch: u64,
}

impl ChargePointSession {
    fn new(
        charge_point_id: &str,
        ocpp_version: OcppVersion,
        endpoint: Arc<RpcEndpoint>,
        remote_addr: Option<SocketAddr>,
        call_timeout: Duration,
        epoch: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            charge_point_id: charge_point_id.to_string(),
            ocpp_version,
            endpoint,
            remote_addr,
            registration: RwLock::new(RegistrationVerdict::Pending),
            connected_at: now,
            last_activity: RwLock::new(now),
            call_timeout,
            request_id_counter: AtomicU64::new(1),
            close_requested: std::sync::atomic::AtomicBool::new(false),
            close_notify: Notify::new(),
            epoch,
        }
    }

    /// Ask the connection task owning this session to shut the socket,
    /// used when a replacement connection evicts it.
    pub(crate) fn request_close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
        self.close_notify.notify_waiters();
    }

    pub(crate) async fn wait_close_requested(&self) {
        loop {
            if self.close_requested.load(Ordering::SeqCst) {
                return;
            }
            let notified = self.close_notify.notified();
            if self.close_requested.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Fresh request id for operations that carry one (GetLog,
    /// UpdateFirmware on 2.0.1).
    pub fn next_request_id(&self) -> i32 {
        (self.request_id_counter.fetch_add(1, Ordering::SeqCst) % i32::MAX as u64) as i32
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    pub fn ocpp_version(&self) -> OcppVersion {
        self.ocpp_version
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn endpoint(&self) -> &Arc<RpcEndpoint> {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().unwrap()
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.write().unwrap() = Utc::now();
    }

    /// Verdict of the last `BootNotification`, `Pending` until one arrives.
    pub fn registration_status(&self) -> RegistrationVerdict {
        *self.registration.read().unwrap()
    }

    pub(crate) fn set_registration_status(&self, verdict: RegistrationVerdict) {
        *self.registration.write().unwrap() = verdict;
    }

    pub fn is_accepted(&self) -> bool {
        self.registration_status() == RegistrationVerdict::Accepted
    }
}

/// Outcome of a registration attempt.
pub enum RegisterOutcome {
    /// Fresh session, no previous one with this identifier.
    New(Arc<ChargePointSession>),
    /// The previous session was evicted (`ReplaceOnDuplicate`).
    Replaced {
        session: Arc<ChargePointSession>,
        evicted: Arc<ChargePointSession>,
    },
    /// A session with this identifier exists (`RejectDuplicate`).
    Rejected,
}

/// Thread-safe registry of active charge point sessions.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<ChargePointSession>>,
    epoch_counter: AtomicU64,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            epoch_counter: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a session for `charge_point_id` under the given duplicate
    /// policy.
    pub fn register(
        &self,
        charge_point_id: &str,
        ocpp_version: OcppVersion,
        endpoint: Arc<RpcEndpoint>,
        remote_addr: Option<SocketAddr>,
        call_timeout: Duration,
        policy: DuplicatePolicy,
    ) -> RegisterOutcome {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(ChargePointSession::new(
            charge_point_id,
            ocpp_version,
            endpoint,
            remote_addr,
            call_timeout,
            epoch,
        ));

        if let Some(existing) = self.sessions.get(charge_point_id) {
            match policy {
                DuplicatePolicy::RejectDuplicate => {
                    warn!(
                        charge_point_id,
                        "duplicate identifier, keeping existing session"
                    );
                    return RegisterOutcome::Rejected;
                }
                DuplicatePolicy::ReplaceOnDuplicate => {
                    let evicted = Arc::clone(existing.value());
                    drop(existing);
                    warn!(
                        charge_point_id,
                        connected_since = %evicted.connected_at(),
                        "duplicate identifier, evicting stale session"
                    );
                    self.sessions
                        .insert(charge_point_id.to_string(), Arc::clone(&session));
                    return RegisterOutcome::Replaced { session, evicted };
                }
            }
        }

        info!(charge_point_id, %ocpp_version, "registering charge point session");
        self.sessions
            .insert(charge_point_id.to_string(), Arc::clone(&session));
        RegisterOutcome::New(session)
    }

    /// Schedule removal of `session` after `grace`. The removal only
    /// happens if the mapped session still is this very one.
    pub fn remove_after_grace(self: &Arc<Self>, session: Arc<ChargePointSession>, grace: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let removed = registry
                .sessions
                .remove_if(session.charge_point_id(), |_, mapped| {
                    mapped.epoch == session.epoch
                });
            if removed.is_some() {
                info!(
                    charge_point_id = session.charge_point_id(),
                    "charge point session removed"
                );
            }
        });
    }

    /// Remove immediately, epoch-guarded.
    pub fn remove(&self, session: &ChargePointSession) {
        self.sessions
            .remove_if(session.charge_point_id(), |_, mapped| {
                mapped.epoch == session.epoch
            });
    }

    pub fn get(&self, charge_point_id: &str) -> Option<Arc<ChargePointSession>> {
        self.sessions
            .get(charge_point_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    /// Shallow copy of the current sessions, so callers can iterate
    /// without holding any registry lock.
    pub fn sessions(&self) -> Vec<Arc<ChargePointSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_endpoint(id: &str) -> Arc<RpcEndpoint> {
        let (tx, _rx) = mpsc::unbounded_channel();
        // The receiver is dropped: sessions in these tests never send.
        Arc::new(RpcEndpoint::new(id, tx))
    }

    fn register(
        registry: &SessionRegistry,
        id: &str,
        policy: DuplicatePolicy,
    ) -> RegisterOutcome {
        registry.register(
            id,
            OcppVersion::V16,
            test_endpoint(id),
            None,
            Duration::from_secs(5),
            policy,
        )
    }

    #[tokio::test]
    async fn reject_duplicate_keeps_existing_session() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            register(&registry, "CP1", DuplicatePolicy::RejectDuplicate),
            RegisterOutcome::New(_)
        ));
        assert!(matches!(
            register(&registry, "CP1", DuplicatePolicy::RejectDuplicate),
            RegisterOutcome::Rejected
        ));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn replace_on_duplicate_evicts_old_session() {
        let registry = SessionRegistry::new();
        let first = match register(&registry, "CP1", DuplicatePolicy::ReplaceOnDuplicate) {
            RegisterOutcome::New(session) => session,
            _ => panic!("expected new session"),
        };
        match register(&registry, "CP1", DuplicatePolicy::ReplaceOnDuplicate) {
            RegisterOutcome::Replaced { evicted, .. } => {
                assert!(Arc::ptr_eq(&evicted, &first));
            }
            _ => panic!("expected replacement"),
        }
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_removal_skips_replaced_session() {
        let registry = SessionRegistry::shared();
        let first = match register(&registry, "CP1", DuplicatePolicy::ReplaceOnDuplicate) {
            RegisterOutcome::New(session) => session,
            _ => panic!("expected new session"),
        };
        registry.remove_after_grace(Arc::clone(&first), Duration::from_millis(50));

        // A replacement arrives before the grace delay elapses.
        let second = match register(&registry, "CP1", DuplicatePolicy::ReplaceOnDuplicate) {
            RegisterOutcome::Replaced { session, .. } => session,
            _ => panic!("expected replacement"),
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The delayed removal must not have torn down the new session.
        let mapped = registry.get("CP1").expect("session should remain mapped");
        assert!(Arc::ptr_eq(&mapped, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_removal_removes_stale_session() {
        let registry = SessionRegistry::shared();
        let session = match register(&registry, "CP1", DuplicatePolicy::RejectDuplicate) {
            RegisterOutcome::New(session) => session,
            _ => panic!("expected new session"),
        };
        registry.remove_after_grace(session, Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.get("CP1").is_none());
    }

    #[tokio::test]
    async fn registration_status_defaults_to_pending() {
        let registry = SessionRegistry::new();
        let session = match register(&registry, "CP1", DuplicatePolicy::RejectDuplicate) {
            RegisterOutcome::New(session) => session,
            _ => panic!("expected new session"),
        };
        assert_eq!(session.registration_status(), RegistrationVerdict::Pending);
        assert!(!session.is_accepted());
        session.set_registration_status(RegistrationVerdict::Accepted);
        assert!(session.is_accepted());
    }
}
