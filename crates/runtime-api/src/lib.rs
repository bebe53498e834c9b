//! Transport-agnostic import operations.
//!
//! This facade is what a REST layer would mount: every operation returns
//! either a domain value or an [`ApiError`] that already knows its HTTP-class
//! status code and JSON body shape. The synchronous and asynchronous paths
//! converge on the same executor, so their semantics are identical; only the
//! error surface differs (raised here, captured as job result data there).

use std::path::Path;
use std::sync::Arc;

use entitlement_store::{ImportRecord, SharedStore};
use import_engine::{
    ConfigError, ForceFlag, ImportConfig, ImportError, ImportExecutor, UndoManager,
};
use manifest_reader::{ManifestReader, ValidationError};
use runtime_jobs::{ImportJob, JobHandle, JobRegistry, JobState, SharedScheduler};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Operation errors with their transport mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    Conflict {
        message: String,
        conflicts: Vec<entitlement_store::ConflictCode>,
    },
    #[error("{message}")]
    InUse { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    /// HTTP-class status code for transport adapters.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::InUse { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Internal { .. } => 500,
        }
    }

    /// JSON error body; the same shape a failed job embeds as result data.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Conflict { message, conflicts } => json!({
                "displayMessage": message,
                "conflicts": conflicts,
            }),
            other => json!({ "displayMessage": other.to_string() }),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Validation(inner) => Self::Validation {
                message: inner.to_string(),
            },
            ImportError::UnknownForceFlag(_) => Self::Validation {
                message: err.to_string(),
            },
            ImportError::Conflict { message, conflicts } => Self::Conflict { message, conflicts },
            ImportError::InUse => Self::InUse {
                message: err.to_string(),
            },
            ImportError::UnknownOwner(_) => Self::NotFound {
                message: err.to_string(),
            },
            ImportError::Contention(_) | ImportError::Store(_) => Self::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

/// Pollable job projection returned by [`ImportApi::get_job`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub id: Uuid,
    pub state: &'static str,
    pub result_data: Option<Value>,
}

/// The import engine's public operation surface.
pub struct ImportApi {
    store: SharedStore,
    reader: ManifestReader,
    executor: ImportExecutor,
    undo: UndoManager,
    scheduler: SharedScheduler,
    jobs: Arc<JobRegistry>,
}

impl ImportApi {
    pub fn new(
        store: SharedStore,
        config: ImportConfig,
        scheduler: SharedScheduler,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        let reader = ManifestReader::new(config.reader_config()?)?;
        Ok(Self {
            executor: ImportExecutor::new(store.clone(), config.clone()),
            undo: UndoManager::new(store.clone(), config),
            store,
            reader,
            scheduler,
            jobs: Arc::new(JobRegistry::default()),
        })
    }

    /// Synchronous import: conflicts and in-use collisions raise directly.
    pub fn import_sync(
        &self,
        owner_key: &str,
        manifest_path: impl AsRef<Path>,
        force: &[String],
    ) -> Result<ImportRecord, ApiError> {
        let force = ForceFlag::parse_set(force)?;
        let manifest = self.reader.read(manifest_path)?;
        Ok(self.executor.import(owner_key, &manifest, &force)?)
    }

    /// Synchronous import from an in-memory archive.
    pub fn import_sync_bytes(
        &self,
        owner_key: &str,
        file_name: &str,
        archive: &[u8],
        force: &[String],
    ) -> Result<ImportRecord, ApiError> {
        let force = ForceFlag::parse_set(force)?;
        let manifest = self.reader.read_bytes(file_name, archive)?;
        Ok(self.executor.import(owner_key, &manifest, &force)?)
    }

    /// Asynchronous import: every engine error is captured as job failure
    /// data, never raised past the adapter. Unknown force flags are still
    /// rejected up front, before a job exists to park them in.
    pub async fn import_async(
        &self,
        owner_key: &str,
        manifest_path: impl AsRef<Path>,
        force: &[String],
        correlation_id: Option<Uuid>,
    ) -> Result<JobHandle, ApiError> {
        let force = ForceFlag::parse_set(force)?;
        let owner_key = owner_key.to_string();
        let path = manifest_path.as_ref().to_path_buf();
        let reader = self.reader.clone();
        let executor = self.executor.clone();
        let job = ImportJob::new(correlation_id, move || {
            let manifest = reader.read(&path)?;
            executor.import(&owner_key, &manifest, &force)
        });
        self.submit(job).await
    }

    /// Asynchronous import from an in-memory archive.
    pub async fn import_async_bytes(
        &self,
        owner_key: &str,
        file_name: &str,
        archive: Vec<u8>,
        force: &[String],
        correlation_id: Option<Uuid>,
    ) -> Result<JobHandle, ApiError> {
        let force = ForceFlag::parse_set(force)?;
        let owner_key = owner_key.to_string();
        let file_name = file_name.to_string();
        let reader = self.reader.clone();
        let executor = self.executor.clone();
        let job = ImportJob::new(correlation_id, move || {
            let manifest = reader.read_bytes(&file_name, &archive)?;
            executor.import(&owner_key, &manifest, &force)
        });
        self.submit(job).await
    }

    /// Undo is always asynchronous: pool deletion may cascade through the
    /// surrounding entitlement subsystem.
    pub async fn undo_import(&self, owner_key: &str) -> Result<JobHandle, ApiError> {
        let undo = self.undo.clone();
        let owner_key = owner_key.to_string();
        let job = ImportJob::new(None, move || undo.undo(&owner_key));
        self.submit(job).await
    }

    pub fn get_job(&self, id: Uuid, include_result: bool) -> Option<JobView> {
        let handle = self.jobs.get(id)?;
        let state = handle.state();
        let result_data = if include_result {
            match &state {
                JobState::Finished(record) => serde_json::to_value(record).ok(),
                JobState::Failed(payload) => serde_json::to_value(payload).ok(),
                JobState::Waiting | JobState::Running => None,
            }
        } else {
            None
        };
        Some(JobView {
            id,
            state: state.name(),
            result_data,
        })
    }

    /// Per-owner import history, newest last.
    pub fn get_imports(&self, owner_key: &str) -> Result<Vec<ImportRecord>, ApiError> {
        if self.store.owner(owner_key).is_none() {
            return Err(ApiError::NotFound {
                message: format!("owner '{owner_key}' does not exist"),
            });
        }
        Ok(self.store.import_records(owner_key))
    }

    async fn submit(&self, job: ImportJob) -> Result<JobHandle, ApiError> {
        let handle = self.scheduler.submit(job).await;
        self.jobs.register(&handle);
        tracing::debug!(job = %handle.id(), "job submitted");
        Ok(handle)
    }
}
