//! Cooperative shutdown: a shared [`CancellationToken`] plus a registry
//! of background task handles, joined with a bound on how long
//! stragglers get before being aborted.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default drain window for background tasks that don't specify their
/// own (§5 names 15s specifically for the usage worker; this default is
/// generous for anything else registered without an explicit timeout).
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ShutdownCoordinator {
    token: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn register_task(&self, handle: JoinHandle<()>) {
        self.task_handles.lock().push(handle);
    }

    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.task_handles.lock())
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait for every registered (plus any
    /// explicitly passed) task to finish, up to `timeout`. Stragglers are
    /// aborted rather than left to leak past the deadline.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();

        let mut all_handles = handles;
        all_handles.extend(self.take_tasks());

        info!(task_count = all_handles.len(), timeout_secs = timeout.as_secs(), "waiting for tasks to complete");

        let abort_handles: Vec<_> = all_handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(all_handles)).await {
            Ok(_) => info!("all shutdown tasks completed"),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "shutdown timed out, aborting remaining tasks");
                for handle in &abort_handles {
                    handle.abort();
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
