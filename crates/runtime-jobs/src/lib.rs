//! Asynchronous job adapter for the import engine.
//!
//! The adapter's only duty is to run the supplied executor call when the
//! scheduler drives the job, capture the outcome as the job's result
//! payload, and expose a pollable handle. A conflict that the synchronous
//! path raises as an error surfaces here as a *failed* job whose result data
//! carries the identical payload shape.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use entitlement_store::ImportRecord;
use import_engine::{ErrorPayload, ImportError};
use uuid::Uuid;

/// Tagged job lifecycle: terminal-state handling is exhaustive at compile
/// time, there is no loosely-typed status string to mistype.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Waiting,
    Running,
    Finished(ImportRecord),
    Failed(ErrorPayload),
}

impl JobState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Finished(_) => "FINISHED",
            Self::Failed(_) => "FAILED",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Failed(_))
    }
}

/// Clonable, pollable view of a job. Polling before a terminal state returns
/// the current state with no result payload.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: Uuid,
    correlation_id: Option<Uuid>,
    state: Arc<Mutex<JobState>>,
}

impl JobHandle {
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state.lock().expect("job state mutex poisoned").clone()
    }

    /// Polls until the job reaches a terminal state or `timeout` elapses.
    /// Callers apply their own wait policy; this is a convenience for them.
    pub async fn wait_terminal(&self, timeout: Duration) -> Option<JobState> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.is_terminal() {
                return Some(state);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn set(&self, state: JobState) {
        *self.state.lock().expect("job state mutex poisoned") = state;
    }
}

type JobWork = Box<dyn FnOnce() -> Result<ImportRecord, ImportError> + Send + 'static>;

/// A unit of import work plus the handle observers poll.
pub struct ImportJob {
    handle: JobHandle,
    work: JobWork,
}

impl ImportJob {
    pub fn new(
        correlation_id: Option<Uuid>,
        work: impl FnOnce() -> Result<ImportRecord, ImportError> + Send + 'static,
    ) -> Self {
        Self {
            handle: JobHandle {
                id: Uuid::new_v4(),
                correlation_id,
                state: Arc::new(Mutex::new(JobState::Waiting)),
            },
            work: Box::new(work),
        }
    }

    #[must_use]
    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    /// Drives the job to completion on the current thread.
    pub fn run(self) {
        let id = self.handle.id;
        let correlation = self.handle.correlation_id;
        self.handle.set(JobState::Running);
        tracing::debug!(job = %id, correlation = ?correlation, "job running");
        match (self.work)() {
            Ok(record) => {
                tracing::info!(job = %id, "job finished");
                self.handle.set(JobState::Finished(record));
            }
            Err(err) => {
                tracing::warn!(job = %id, error = %err, "job failed");
                self.handle.set(JobState::Failed(err.payload()));
            }
        }
    }
}

/// Narrow contract against the external job-scheduling collaborator.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit(&self, job: ImportJob) -> JobHandle;
}

/// Shared pointer alias used by the API facade.
pub type SharedScheduler = Arc<dyn JobScheduler>;

/// Production scheduler: executes each job on a tokio blocking worker, so
/// distinct jobs run in parallel while same-owner work serializes on the
/// store's owner lock.
#[derive(Debug, Default)]
pub struct TokioScheduler;

#[async_trait]
impl JobScheduler for TokioScheduler {
    async fn submit(&self, job: ImportJob) -> JobHandle {
        let handle = job.handle();
        tokio::task::spawn_blocking(move || job.run());
        handle
    }
}

/// Test scheduler that parks submitted jobs until the test runs them,
/// keeping the pre-terminal states observable.
#[derive(Default)]
pub struct ManualScheduler {
    queued: Mutex<Vec<ImportJob>>,
}

impl ManualScheduler {
    /// Runs the oldest queued job; returns false when the queue is empty.
    pub fn run_next(&self) -> bool {
        let job = {
            let mut queued = self.queued.lock().expect("job queue mutex poisoned");
            if queued.is_empty() {
                return false;
            }
            queued.remove(0)
        };
        job.run();
        true
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.lock().expect("job queue mutex poisoned").len()
    }
}

#[async_trait]
impl JobScheduler for ManualScheduler {
    async fn submit(&self, job: ImportJob) -> JobHandle {
        let handle = job.handle();
        self.queued
            .lock()
            .expect("job queue mutex poisoned")
            .push(job);
        handle
    }
}

/// Id-addressable view over live job handles.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, JobHandle>>,
}

impl JobRegistry {
    pub fn register(&self, handle: &JobHandle) {
        self.jobs
            .lock()
            .expect("job registry mutex poisoned")
            .insert(handle.id(), handle.clone());
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<JobHandle> {
        self.jobs
            .lock()
            .expect("job registry mutex poisoned")
            .get(&id)
            .cloned()
    }
}
