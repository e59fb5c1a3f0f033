//! Progress reporting

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One progress report: `current` of `total` steps plus optional status text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current: u64,
    pub total: u64,
    pub message: Option<String>,
}

/// Receives progress from a running operation
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// Pass-through to a caller's sink that goes quiet once the operation ends
pub struct Progress {
    sink: Option<Arc<dyn ProgressSink>>,
    closed: AtomicBool,
}

impl Progress {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            closed: AtomicBool::new(false),
        }
    }

    pub fn report(&self, current: u64, total: u64, message: Option<&str>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.on_progress(ProgressUpdate {
                current,
                total,
                message: message.map(str::to_string),
            });
        }
    }

    /// Stop forwarding; later reports are dropped
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
