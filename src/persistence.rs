//! Storage collaborators
//!
//! Durable state lives outside the stack. These traits are what the stack
//! consumes; [`InMemoryStorage`] implements all of them for development
//! and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use crate::messages::security::CertificateHashData;

/// Key of an installed certificate: type plus issuer hash data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateKey {
    /// Certificate use, e.g. `CentralSystemRootCertificate` or
    /// `V2GRootCertificate`.
    pub certificate_type: String,
    pub hash_algorithm: String,
    pub issuer_name_hash: String,
    pub issuer_key_hash: String,
    pub serial_number: String,
}

impl CertificateKey {
    pub fn new(certificate_type: &str, hash_data: &CertificateHashData) -> Self {
        Self {
            certificate_type: certificate_type.to_string(),
            hash_algorithm: format!("{:?}", hash_data.hash_algorithm),
            issuer_name_hash: hash_data.issuer_name_hash.clone(),
            issuer_key_hash: hash_data.issuer_key_hash.clone(),
            serial_number: hash_data.serial_number.clone(),
        }
    }
}

/// An installed certificate with its lookup hash data.
#[derive(Debug, Clone)]
pub struct InstalledCertificate {
    pub key: CertificateKey,
    pub pem: String,
}

/// Store of installed certificates, keyed by `(type, hash data)`.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn install(&self, certificate: InstalledCertificate) -> bool;
    async fn delete(&self, key: &CertificateKey) -> bool;
    async fn list(&self, certificate_type: &str) -> Vec<InstalledCertificate>;
    async fn count(&self) -> usize;
}

/// One entry of the local authorization list.
#[derive(Debug, Clone)]
pub struct LocalListEntry {
    pub id_tag: String,
    pub status: Option<String>,
    pub expiry_date: Option<String>,
    pub parent_id_tag: Option<String>,
}

/// Local authorization list with a monotonically increasing version.
#[async_trait]
pub trait LocalAuthorizationList: Send + Sync {
    async fn version(&self) -> i32;

    /// Replace the whole list. Fails when `version` does not increase.
    async fn apply_full(&self, version: i32, entries: Vec<LocalListEntry>) -> bool;

    /// Apply a differential update: entries without a status are removed,
    /// the rest inserted or updated. Fails when `version` does not
    /// increase.
    async fn apply_differential(&self, version: i32, entries: Vec<LocalListEntry>) -> bool;

    async fn lookup(&self, id_tag: &str) -> Option<LocalListEntry>;
}

/// Append-only security event log.
#[async_trait]
pub trait SecurityEventLog: Send + Sync {
    async fn record(&self, kind: &str, timestamp: DateTime<Utc>, tech_info: Option<&str>);
}

// ── In-memory implementation ───────────────────────────────────

/// In-memory storage for development and testing.
#[derive(Default)]
pub struct InMemoryStorage {
    certificates: DashMap<CertificateKey, InstalledCertificate>,
    local_list: DashMap<String, LocalListEntry>,
    local_list_version: AtomicI32,
    security_events: Mutex<Vec<(String, DateTime<Utc>, Option<String>)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn security_events(&self) -> Vec<(String, DateTime<Utc>, Option<String>)> {
        self.security_events.lock().unwrap().clone()
    }
}

#[async_trait]
impl CertificateStore for InMemoryStorage {
    async fn install(&self, certificate: InstalledCertificate) -> bool {
        self.certificates
            .insert(certificate.key.clone(), certificate);
        true
    }

    async fn delete(&self, key: &CertificateKey) -> bool {
        self.certificates.remove(key).is_some()
    }

    async fn list(&self, certificate_type: &str) -> Vec<InstalledCertificate> {
        self.certificates
            .iter()
            .filter(|entry| entry.key().certificate_type == certificate_type)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn count(&self) -> usize {
        self.certificates.len()
    }
}

#[async_trait]
impl LocalAuthorizationList for InMemoryStorage {
    async fn version(&self) -> i32 {
        self.local_list_version.load(Ordering::SeqCst)
    }

    async fn apply_full(&self, version: i32, entries: Vec<LocalListEntry>) -> bool {
        if version <= self.local_list_version.load(Ordering::SeqCst) {
            return false;
        }
        self.local_list.clear();
        for entry in entries {
            self.local_list.insert(entry.id_tag.clone(), entry);
        }
        self.local_list_version.store(version, Ordering::SeqCst);
        true
    }

    async fn apply_differential(&self, version: i32, entries: Vec<LocalListEntry>) -> bool {
        if version <= self.local_list_version.load(Ordering::SeqCst) {
            return false;
        }
        for entry in entries {
            if entry.status.is_none() {
                self.local_list.remove(&entry.id_tag);
            } else {
                self.local_list.insert(entry.id_tag.clone(), entry);
            }
        }
        self.local_list_version.store(version, Ordering::SeqCst);
        true
    }

    async fn lookup(&self, id_tag: &str) -> Option<LocalListEntry> {
        self.local_list.get(id_tag).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl SecurityEventLog for InMemoryStorage {
    async fn record(&self, kind: &str, timestamp: DateTime<Utc>, tech_info: Option<&str>) {
        self.security_events.lock().unwrap().push((
            kind.to_string(),
            timestamp,
            tech_info.map(str::to_string),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::security::HashAlgorithm;

    fn hash_data(serial: &str) -> CertificateHashData {
        CertificateHashData {
            hash_algorithm: HashAlgorithm::SHA256,
            issuer_name_hash: "nh".into(),
            issuer_key_hash: "kh".into(),
            serial_number: serial.into(),
        }
    }

    #[tokio::test]
    async fn certificate_store_round_trip() {
        let storage = InMemoryStorage::new();
        let key = CertificateKey::new("CentralSystemRootCertificate", &hash_data("01"));
        assert!(
            CertificateStore::install(
                &storage,
                InstalledCertificate {
                    key: key.clone(),
                    pem: "-----BEGIN CERTIFICATE-----".into(),
                }
            )
            .await
        );
        assert_eq!(storage.count().await, 1);
        assert_eq!(
            storage.list("CentralSystemRootCertificate").await.len(),
            1
        );
        assert!(storage.list("ManufacturerRootCertificate").await.is_empty());
        assert!(storage.delete(&key).await);
        assert!(!storage.delete(&key).await);
    }

    #[tokio::test]
    async fn local_list_version_must_increase() {
        let storage = InMemoryStorage::new();
        let entry = LocalListEntry {
            id_tag: "TAG1".into(),
            status: Some("Accepted".into()),
            expiry_date: None,
            parent_id_tag: None,
        };
        assert!(storage.apply_full(1, vec![entry.clone()]).await);
        assert!(!storage.apply_full(1, vec![entry.clone()]).await);
        assert_eq!(storage.version().await, 1);

        // Differential removal: no status means delete.
        let removal = LocalListEntry {
            id_tag: "TAG1".into(),
            status: None,
            expiry_date: None,
            parent_id_tag: None,
        };
        assert!(storage.apply_differential(2, vec![removal]).await);
        assert!(storage.lookup("TAG1").await.is_none());
        assert_eq!(storage.version().await, 2);
    }

    #[tokio::test]
    async fn security_events_accumulate() {
        let storage = InMemoryStorage::new();
        storage
            .record("SettingSystemTime", Utc::now(), Some("ntp"))
            .await;
        storage.record("FirmwareUpdated", Utc::now(), None).await;
        assert_eq!(storage.security_events().len(), 2);
    }
}
