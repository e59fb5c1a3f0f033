//! Operation dispatcher
//!
//! Runs each request on its own task, at most `workers` at a time, and turns
//! whatever the operation does (including panicking) into exactly one
//! terminal [`OperationResult`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use log::{debug, error};
use tokio::sync::{Semaphore, oneshot, watch};

use super::context::{Backends, CancelFlag, OperationContext};
use super::progress::{Progress, ProgressSink};
use super::result::{LogLevel, OperationLog, OperationResult, OperationState};
use super::{CryptoInput, OperationRequest, operation_for};
use crate::error::OperationError;

/// Operations allowed to run at once
pub const DEFAULT_WORKERS: usize = 4;

type Callback = Box<dyn FnOnce(&OperationResult) + Send + 'static>;

pub struct Dispatcher {
    backends: Backends,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new(backends: Backends) -> Self {
        Self::with_workers(backends, DEFAULT_WORKERS)
    }

    pub fn with_workers(backends: Backends, workers: usize) -> Self {
        Self {
            backends,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Queue a request. Must be called within a tokio runtime.
    pub fn submit(
        &self,
        request: OperationRequest,
        input: CryptoInput,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> OperationHandle {
        self.spawn(request, input, progress, None)
    }

    /// Like [`submit`](Self::submit), also calling `on_done` with the
    /// terminal result before the handle's `wait` resolves
    pub fn submit_with_callback(
        &self,
        request: OperationRequest,
        input: CryptoInput,
        progress: Option<Arc<dyn ProgressSink>>,
        on_done: impl FnOnce(&OperationResult) + Send + 'static,
    ) -> OperationHandle {
        self.spawn(request, input, progress, Some(Box::new(on_done)))
    }

    fn spawn(
        &self,
        request: OperationRequest,
        input: CryptoInput,
        progress: Option<Arc<dyn ProgressSink>>,
        on_done: Option<Callback>,
    ) -> OperationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelFlag::new();
        let (state_tx, state_rx) = watch::channel(OperationState::Received);
        let (result_tx, result_rx) = oneshot::channel();

        let job = Job {
            id,
            request,
            input,
            cancel: cancel.clone(),
            progress: Arc::new(Progress::new(progress)),
            backends: self.backends.clone(),
            state: state_tx,
        };
        let permits = Arc::clone(&self.permits);
        debug!("Queued operation #{} ({})", id, job.request.name());

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => job.run().await,
                Err(_) => job.finish(
                    OperationState::Failed,
                    None,
                    None,
                    log_with(LogLevel::Error, "Dispatcher is shutting down"),
                ),
            };

            if let Some(on_done) = on_done
                && std::panic::catch_unwind(AssertUnwindSafe(|| on_done(&result))).is_err()
            {
                error!("Completion callback of operation #{} panicked", result.id);
            }
            let _ = result_tx.send(result);
        });

        OperationHandle {
            id,
            cancel,
            state: state_rx,
            result: result_rx,
        }
    }
}

fn log_with(level: LogLevel, message: &str) -> OperationLog {
    let mut log = OperationLog::new();
    log.add(level, message);
    log
}

struct Job {
    id: u64,
    request: OperationRequest,
    input: CryptoInput,
    cancel: CancelFlag,
    progress: Arc<Progress>,
    backends: Backends,
    state: watch::Sender<OperationState>,
}

impl Job {
    async fn run(self) -> OperationResult {
        if self.cancel.is_cancelled() {
            debug!("Operation #{} cancelled before start", self.id);
            return self.finish(
                OperationState::Cancelled,
                None,
                None,
                log_with(LogLevel::Warn, "Cancelled before start"),
            );
        }

        self.state.send_replace(OperationState::Running);
        let name = self.request.name();
        debug!("Running operation #{} ({})", self.id, name);

        let log = Arc::new(Mutex::new(OperationLog::new()));
        let ctx = OperationContext::new(
            self.input.clone(),
            self.cancel.clone(),
            Arc::clone(&self.progress),
            Arc::clone(&log),
            self.backends.clone(),
        );
        let operation = operation_for(self.request.clone());
        let outcome = AssertUnwindSafe(operation.execute(&ctx))
            .catch_unwind()
            .await;
        drop(ctx);

        let mut log = {
            let guard = log.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        match outcome {
            Ok(Ok(output)) => self.finish(OperationState::Succeeded, Some(output), None, log),
            Ok(Err(OperationError::InputRequired(required))) => {
                log.add(LogLevel::Info, format!("Waiting for {}", required));
                self.finish(OperationState::PendingInput, None, Some(required), log)
            }
            Ok(Err(OperationError::Cancelled)) => {
                self.finish(OperationState::Cancelled, None, None, log)
            }
            Ok(Err(e)) => {
                log.add(LogLevel::Error, e.to_string());
                self.finish(OperationState::Failed, None, None, log)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Operation #{} ({}) panicked: {}", self.id, name, message);
                log.add(LogLevel::Error, format!("Internal error: {}", message));
                self.finish(OperationState::Failed, None, None, log)
            }
        }
    }

    fn finish(
        &self,
        state: OperationState,
        output: Option<super::OperationOutput>,
        required_input: Option<super::RequiredInput>,
        log: OperationLog,
    ) -> OperationResult {
        // Nothing reaches the progress sink after the terminal state
        self.progress.close();
        self.state.send_replace(state);
        debug!(
            "Operation #{} ({}) finished: {}",
            self.id,
            self.request.name(),
            state
        );
        OperationResult {
            id: self.id,
            name: self.request.name(),
            state,
            output,
            required_input,
            log,
        }
    }
}

/// Caller's view of a submitted request
pub struct OperationHandle {
    id: u64,
    cancel: CancelFlag,
    state: watch::Receiver<OperationState>,
    result: oneshot::Receiver<OperationResult>,
}

impl OperationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the operation to stop at its next safe point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancellation flag, for cancelling after the handle has been consumed
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> OperationResult {
        let id = self.id;
        self.result.await.unwrap_or_else(|_| OperationResult {
            id,
            name: "unknown",
            state: OperationState::Failed,
            output: None,
            required_input: None,
            log: log_with(LogLevel::Error, "Operation task ended without a result"),
        })
    }
}
