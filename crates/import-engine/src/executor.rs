//! Atomic import execution.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::SystemTime;

use entitlement_store::{
    ConflictCode, ImportRecord, ImportStatus, SharedStore, UpstreamConsumer,
};
use manifest_reader::Manifest;

use crate::config::ImportConfig;
use crate::conflict::{detect, ForceSet};
use crate::error::{
    ImportError, DISTRIBUTOR_CONFLICT_MESSAGE, IN_USE_MESSAGE, MANIFEST_SAME_MESSAGE,
};
use crate::reconcile::reconcile;

/// Runs one import attempt as a single unit under the owner's lock: the
/// owner's upstream identity and pool set update together or not at all.
#[derive(Clone)]
pub struct ImportExecutor {
    store: SharedStore,
    config: ImportConfig,
}

impl ImportExecutor {
    pub fn new(store: SharedStore, config: ImportConfig) -> Self {
        Self { store, config }
    }

    /// Imports `manifest` into the owner, honoring `force`.
    ///
    /// A failed attempt leaves owner state untouched apart from its history
    /// record, so re-running the identical call reproduces the identical
    /// conflict set.
    pub fn import(
        &self,
        owner_key: &str,
        manifest: &Manifest,
        force: &ForceSet,
    ) -> Result<ImportRecord, ImportError> {
        let lock = self.store.owner_lock(owner_key);
        let _guard = acquire_owner_lock(&lock, owner_key, &self.config)?;

        let owner = self
            .store
            .owner(owner_key)
            .ok_or_else(|| ImportError::UnknownOwner(owner_key.to_string()))?;

        let holder = self.store.upstream_holder(manifest.upstream.uuid);
        let conflicts = detect(&owner, manifest, force, holder.as_deref());

        if conflicts.contains(&ConflictCode::InUse) {
            tracing::warn!(
                owner = owner_key,
                upstream = %manifest.upstream.uuid,
                holder = holder.as_deref().unwrap_or_default(),
                "import aborted: upstream already bound to another owner"
            );
            self.store.append_import_record(
                owner_key,
                self.record(ImportStatus::Failure, IN_USE_MESSAGE, conflicts, manifest),
            )?;
            return Err(ImportError::InUse);
        }

        if !conflicts.is_empty() {
            let message = if conflicts == [ConflictCode::ManifestSame] {
                MANIFEST_SAME_MESSAGE
            } else {
                DISTRIBUTOR_CONFLICT_MESSAGE
            };
            tracing::warn!(
                owner = owner_key,
                conflicts = ?conflicts,
                "import aborted: unforced conflicts"
            );
            self.store.append_import_record(
                owner_key,
                self.record(ImportStatus::Conflict, message, conflicts.clone(), manifest),
            )?;
            return Err(ImportError::Conflict {
                message: message.to_string(),
                conflicts,
            });
        }

        self.commit(owner_key, owner.upstream.as_ref(), manifest)
    }

    fn commit(
        &self,
        owner_key: &str,
        previous: Option<&UpstreamConsumer>,
        manifest: &Manifest,
    ) -> Result<ImportRecord, ImportError> {
        let uuid = manifest.upstream.uuid;
        // Conditional write: the loser of a concurrent race for the same
        // upstream uuid fails here even though detection saw it as free.
        if let Err(err) = self.store.bind_upstream(uuid, owner_key) {
            tracing::warn!(owner = owner_key, upstream = %uuid, error = %err, "binding lost to concurrent import");
            self.store.append_import_record(
                owner_key,
                self.record(
                    ImportStatus::Failure,
                    IN_USE_MESSAGE,
                    vec![ConflictCode::InUse],
                    manifest,
                ),
            )?;
            return Err(ImportError::InUse);
        }
        if let Some(previous) = previous {
            if previous.uuid != uuid {
                self.store.release_upstream(previous.uuid, owner_key);
            }
        }

        let existing = self.store.pools_for_owner(owner_key);
        let delta = reconcile(owner_key, &existing, manifest);
        for id in &delta.retire {
            self.store.remove_pool(*id)?;
        }
        for pool in delta.create.iter().chain(delta.update.iter()) {
            self.store.upsert_pool(pool.clone())?;
        }

        self.store.set_import_state(
            owner_key,
            Some(UpstreamConsumer {
                uuid,
                name: manifest.upstream.name.clone(),
                api_url: manifest.upstream.api_url.clone(),
                web_url: manifest.upstream.web_url.clone(),
                ident_cert: manifest.upstream.ident_cert.clone(),
            }),
            Some(manifest.fingerprint.clone()),
        )?;

        let record = self.record(
            ImportStatus::Success,
            &format!("{owner_key} file imported successfully."),
            Vec::new(),
            manifest,
        );
        self.store.append_import_record(owner_key, record.clone())?;
        tracing::info!(
            owner = owner_key,
            upstream = %uuid,
            pools_created = delta.create.len(),
            pools_updated = delta.update.len(),
            pools_retired = delta.retire.len(),
            "manifest imported"
        );
        Ok(record)
    }

    fn record(
        &self,
        status: ImportStatus,
        message: &str,
        conflicts: Vec<ConflictCode>,
        manifest: &Manifest,
    ) -> ImportRecord {
        ImportRecord {
            status,
            message: message.to_string(),
            conflicts,
            generated_by: self.config.generated_by.clone(),
            generated_at: SystemTime::now(),
            file_name: manifest.file_name.clone(),
            upstream_uuid: Some(manifest.upstream.uuid),
        }
    }
}

/// Bounded try-lock acquisition of the per-owner lock; exhaustion surfaces
/// as a retryable contention error instead of wedging the caller's worker.
pub(crate) fn acquire_owner_lock<'a>(
    lock: &'a Mutex<()>,
    owner_key: &str,
    config: &ImportConfig,
) -> Result<MutexGuard<'a, ()>, ImportError> {
    let mut attempts = 0;
    loop {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::WouldBlock) => {
                if attempts >= config.max_lock_retries {
                    tracing::warn!(owner = owner_key, attempts, "owner lock retries exhausted");
                    return Err(ImportError::Contention(owner_key.to_string()));
                }
                attempts += 1;
                std::thread::sleep(config.lock_retry_delay());
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(ImportError::Contention(owner_key.to_string()));
            }
        }
    }
}
