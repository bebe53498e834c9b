//! Manifest import engine: conflict detection, pool reconciliation, atomic
//! import execution, and undo.
//!
//! The executor is synchronous by construction; the asynchronous path wraps
//! it in a job (see `runtime-jobs`) so both execution modes share the same
//! detect/reconcile/commit logic.

pub mod conflict;
pub mod config;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod undo;

pub use conflict::{detect, ForceFlag, ForceSet};
pub use config::{ConfigError, ImportConfig};
pub use error::{
    ErrorPayload, ImportError, DISTRIBUTOR_CONFLICT_MESSAGE, IN_USE_MESSAGE, MANIFEST_SAME_MESSAGE,
};
pub use executor::ImportExecutor;
pub use reconcile::{reconcile, PoolDelta};
pub use undo::UndoManager;
