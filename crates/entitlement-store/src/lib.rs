//! Owner, upstream-consumer, and pool persistence with exclusivity bindings.
//!
//! The store is the one place that can answer "who holds upstream uuid U"
//! atomically across all owners: [`EntitlementStore::bind_upstream`] is a
//! single conditional write, so two concurrent imports can never both
//! perceive a uuid as free. Per-owner locks hand out mutual exclusion for
//! the detect-then-commit window of an import.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Named conflict classes produced by import conflict detection.
///
/// The wire form is the SCREAMING_SNAKE code automation matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictCode {
    ManifestSame,
    DistributorConflict,
    InUse,
}

impl ConflictCode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManifestSame => "MANIFEST_SAME",
            Self::DistributorConflict => "DISTRIBUTOR_CONFLICT",
            Self::InUse => "IN_USE",
        }
    }
}

impl std::fmt::Display for ConflictCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class of a recorded import attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Success,
    Conflict,
    Failure,
    Delete,
}

/// One entry in an owner's import history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub status: ImportStatus,
    pub message: String,
    /// Ordered conflict codes; empty on success.
    pub conflicts: Vec<ConflictCode>,
    pub generated_by: String,
    pub generated_at: SystemTime,
    pub file_name: String,
    pub upstream_uuid: Option<Uuid>,
}

/// Upstream consumer identity currently imported for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConsumer {
    pub uuid: Uuid,
    pub name: String,
    pub api_url: String,
    pub web_url: String,
    pub ident_cert: String,
}

/// Tenant record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub key: String,
    pub upstream: Option<UpstreamConsumer>,
    pub last_imported_fingerprint: Option<String>,
}

/// Branded engineering product attached to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolBranding {
    pub product_id: String,
    pub name: String,
}

/// Entitlement pool owned by a single tenant.
///
/// `source_upstream` attributes the pool to the import that created it;
/// `None` marks a manually created pool, which import and undo never touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: Uuid,
    pub owner_key: String,
    pub product_id: String,
    pub quantity: i64,
    pub derived_product_id: Option<String>,
    /// Ordered; overwritten verbatim on update.
    pub derived_provided_product_ids: Vec<String>,
    pub branding: Vec<PoolBranding>,
    pub cdn_label: Option<String>,
    pub source_upstream: Option<Uuid>,
    pub upstream_pool_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("owner '{0}' does not exist")]
    UnknownOwner(String),
    #[error("owner '{0}' already exists")]
    DuplicateOwner(String),
    #[error("upstream uuid {uuid} is already bound to owner '{holder}'")]
    UuidBound { uuid: Uuid, holder: String },
    #[error("pool {0} does not exist")]
    UnknownPool(Uuid),
}

/// Persistence seam for the import engine.
pub trait EntitlementStore: Send + Sync {
    fn create_owner(&self, key: &str) -> Result<(), StoreError>;
    fn owner(&self, key: &str) -> Option<Owner>;
    /// Per-owner mutual-exclusion handle, created on first touch.
    fn owner_lock(&self, key: &str) -> Arc<Mutex<()>>;

    /// Current holder of an upstream uuid, if any.
    fn upstream_holder(&self, uuid: Uuid) -> Option<String>;
    /// Conditional write: binds `uuid` to `owner_key` unless a *different*
    /// owner already holds it. Re-binding to the same owner is a no-op.
    fn bind_upstream(&self, uuid: Uuid, owner_key: &str) -> Result<(), StoreError>;
    /// Releases a binding, but only if `owner_key` is the holder.
    fn release_upstream(&self, uuid: Uuid, owner_key: &str);

    /// Replaces the owner's upstream identity and fingerprint together.
    fn set_import_state(
        &self,
        key: &str,
        upstream: Option<UpstreamConsumer>,
        fingerprint: Option<String>,
    ) -> Result<(), StoreError>;

    fn pools_for_owner(&self, key: &str) -> Vec<Pool>;
    fn upsert_pool(&self, pool: Pool) -> Result<(), StoreError>;
    fn remove_pool(&self, id: Uuid) -> Result<(), StoreError>;

    fn append_import_record(&self, key: &str, record: ImportRecord) -> Result<(), StoreError>;
    fn import_records(&self, key: &str) -> Vec<ImportRecord>;
}

/// Shared pointer alias used across the engine.
pub type SharedStore = Arc<dyn EntitlementStore>;

#[derive(Debug, Default)]
struct Inner {
    owners: HashMap<String, Owner>,
    bindings: HashMap<Uuid, String>,
    pools: HashMap<Uuid, Pool>,
    history: HashMap<String, Vec<ImportRecord>>,
}

/// In-memory store backing tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntitlementStore for MemoryStore {
    fn create_owner(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.owners.contains_key(key) {
            return Err(StoreError::DuplicateOwner(key.to_string()));
        }
        inner.owners.insert(
            key.to_string(),
            Owner {
                key: key.to_string(),
                upstream: None,
                last_imported_fingerprint: None,
            },
        );
        Ok(())
    }

    fn owner(&self, key: &str) -> Option<Owner> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.owners.get(key).cloned()
    }

    fn owner_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock table mutex poisoned");
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn upstream_holder(&self, uuid: Uuid) -> Option<String> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.bindings.get(&uuid).cloned()
    }

    fn bind_upstream(&self, uuid: Uuid, owner_key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        match inner.bindings.get(&uuid) {
            Some(holder) if holder != owner_key => Err(StoreError::UuidBound {
                uuid,
                holder: holder.clone(),
            }),
            _ => {
                inner.bindings.insert(uuid, owner_key.to_string());
                Ok(())
            }
        }
    }

    fn release_upstream(&self, uuid: Uuid, owner_key: &str) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.bindings.get(&uuid).is_some_and(|h| h == owner_key) {
            inner.bindings.remove(&uuid);
        }
    }

    fn set_import_state(
        &self,
        key: &str,
        upstream: Option<UpstreamConsumer>,
        fingerprint: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let owner = inner
            .owners
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownOwner(key.to_string()))?;
        owner.upstream = upstream;
        owner.last_imported_fingerprint = fingerprint;
        Ok(())
    }

    fn pools_for_owner(&self, key: &str) -> Vec<Pool> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut pools: Vec<Pool> = inner
            .pools
            .values()
            .filter(|pool| pool.owner_key == key)
            .cloned()
            .collect();
        pools.sort_by(|a, b| a.id.cmp(&b.id));
        pools
    }

    fn upsert_pool(&self, pool: Pool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if !inner.owners.contains_key(&pool.owner_key) {
            return Err(StoreError::UnknownOwner(pool.owner_key.clone()));
        }
        inner.pools.insert(pool.id, pool);
        Ok(())
    }

    fn remove_pool(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .pools
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::UnknownPool(id))
    }

    fn append_import_record(&self, key: &str, record: ImportRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if !inner.owners.contains_key(key) {
            return Err(StoreError::UnknownOwner(key.to_string()));
        }
        inner.history.entry(key.to_string()).or_default().push(record);
        Ok(())
    }

    fn import_records(&self, key: &str) -> Vec<ImportRecord> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.history.get(key).cloned().unwrap_or_default()
    }
}
