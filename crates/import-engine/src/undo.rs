//! Undo: revert an owner to its pre-import state.

use std::time::SystemTime;

use entitlement_store::{ImportRecord, ImportStatus, SharedStore};

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::executor::acquire_owner_lock;

/// Clears the owner's upstream identity and removes every pool attributed to
/// it. Runs under the same per-owner lock as imports, so an undo can never
/// interleave with an in-flight import for the same owner.
#[derive(Clone)]
pub struct UndoManager {
    store: SharedStore,
    config: ImportConfig,
}

impl UndoManager {
    pub fn new(store: SharedStore, config: ImportConfig) -> Self {
        Self { store, config }
    }

    /// Idempotent: an owner with no upstream identity is a successful no-op
    /// and writes no history record.
    pub fn undo(&self, owner_key: &str) -> Result<ImportRecord, ImportError> {
        let lock = self.store.owner_lock(owner_key);
        let _guard = acquire_owner_lock(&lock, owner_key, &self.config)?;

        let owner = self
            .store
            .owner(owner_key)
            .ok_or_else(|| ImportError::UnknownOwner(owner_key.to_string()))?;

        let Some(upstream) = owner.upstream else {
            return Ok(ImportRecord {
                status: ImportStatus::Success,
                message: format!("No import exists for owner {owner_key}."),
                conflicts: Vec::new(),
                generated_by: self.config.generated_by.clone(),
                generated_at: SystemTime::now(),
                file_name: String::new(),
                upstream_uuid: None,
            });
        };

        let mut removed = 0usize;
        for pool in self.store.pools_for_owner(owner_key) {
            if pool.source_upstream == Some(upstream.uuid) {
                self.store.remove_pool(pool.id)?;
                removed += 1;
            }
        }
        self.store.release_upstream(upstream.uuid, owner_key);
        self.store.set_import_state(owner_key, None, None)?;

        let record = ImportRecord {
            status: ImportStatus::Delete,
            message: format!("{owner_key} import undone."),
            conflicts: Vec::new(),
            generated_by: self.config.generated_by.clone(),
            generated_at: SystemTime::now(),
            file_name: String::new(),
            upstream_uuid: Some(upstream.uuid),
        };
        self.store.append_import_record(owner_key, record.clone())?;
        tracing::info!(
            owner = owner_key,
            upstream = %upstream.uuid,
            pools_removed = removed,
            "import undone"
        );
        Ok(record)
    }
}
