//! Import error taxonomy shared by the synchronous and asynchronous paths.

use entitlement_store::{ConflictCode, StoreError};
use manifest_reader::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display message for an import blocked by the global exclusivity rule.
pub const IN_USE_MESSAGE: &str =
    "This subscription management application has already been imported by another owner.";

/// Display message for a distributor mismatch against the owner's current
/// upstream identity.
pub const DISTRIBUTOR_CONFLICT_MESSAGE: &str =
    "Owner has already imported from another subscription management application.";

/// History message recorded when a re-import matches the last fingerprint.
pub const MANIFEST_SAME_MESSAGE: &str = "Import is the same as existing data";

/// Error payload surfaced to callers.
///
/// The synchronous path serializes this as the error body; the asynchronous
/// path embeds the identical shape as a failed job's result data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub display_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictCode>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// Malformed or unsigned manifest; never retried.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Force flag outside the supported whitelist.
    #[error("unknown force flag '{0}'")]
    UnknownForceFlag(String),

    /// Non-forced conflicts; recoverable by re-invoking with force.
    #[error("{message}")]
    Conflict {
        message: String,
        conflicts: Vec<ConflictCode>,
    },

    /// Global uuid collision; never recoverable via force.
    #[error("{IN_USE_MESSAGE}")]
    InUse,

    #[error("owner '{0}' does not exist")]
    UnknownOwner(String),

    /// Per-owner lock contention after bounded retries; retryable.
    #[error("import for owner '{0}' is already in progress")]
    Contention(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportError {
    /// Payload carried to callers, identical for both execution paths.
    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        match self {
            Self::Conflict { message, conflicts } => ErrorPayload {
                display_message: message.clone(),
                conflicts: conflicts.clone(),
            },
            Self::InUse => ErrorPayload {
                display_message: IN_USE_MESSAGE.to_string(),
                conflicts: Vec::new(),
            },
            other => ErrorPayload {
                display_message: other.to_string(),
                conflicts: Vec::new(),
            },
        }
    }
}
