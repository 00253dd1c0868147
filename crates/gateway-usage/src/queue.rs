//! `LOG_QUEUE` (§4.5 ingress side): the durable handoff between the
//! request handler and the worker. Realised in-process as a
//! mutex-guarded `VecDeque`; a multi-replica deployment would back this
//! with an external queue, which is why callers interact with it only
//! through `push`/`drain`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use gateway_core::log::Log;

/// A FIFO queue of completed-request logs awaiting the worker's next
/// tick.
#[derive(Default)]
pub struct LogQueue {
    inner: Mutex<VecDeque<Log>>,
}

impl LogQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one terminal-outcome log (spec.md §4.5: "on any terminal
    /// outcome ... pushes it to a durable queue").
    pub fn push(&self, log: Log) {
        self.inner.lock().push_back(log);
    }

    /// Drain up to `max` logs in FIFO order.
    pub fn drain(&self, max: usize) -> Vec<Log> {
        let mut guard = self.inner.lock();
        let take = max.min(guard.len());
        guard.drain(..take).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
