//! Operation results and their structured log

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RequiredInput;
use super::benchmark::BenchmarkReport;
use super::engine::{DecryptVerifyResult, ImportSummary};
use super::parse::InputBlock;
use super::transfer::KeySyncReport;

/// Lifecycle of one submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Received,
    Running,
    Succeeded,
    /// Stopped for missing input; resubmit with a populated `CryptoInput`
    PendingInput,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::Received | OperationState::Running)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationState::Received => "received",
            OperationState::Running => "running",
            OperationState::Succeeded => "succeeded",
            OperationState::PendingInput => "pending input",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Log accumulated while an operation runs; kept even if it fails or is cancelled
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        log::debug!("[{:?}] {}", level, message);
        self.entries.push(LogEntry {
            level,
            message,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }

    /// Whether any entry contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }
}

/// Successful output of an operation
#[derive(Debug, Clone)]
pub enum OperationOutput {
    /// Nothing to hand back beyond the log
    Done,
    /// Produced bytes: a message, an export, a revocation certificate
    Data(Vec<u8>),
    Decrypted(DecryptVerifyResult),
    Imported(ImportSummary),
    Parsed(Vec<InputBlock>),
    Benchmark(BenchmarkReport),
    ProofVerified(bool),
    Synced(KeySyncReport),
}

/// Terminal report of one request
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub id: u64,
    pub name: &'static str,
    pub state: OperationState,
    pub output: Option<OperationOutput>,
    /// Set when `state` is `PendingInput`
    pub required_input: Option<RequiredInput>,
    pub log: OperationLog,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        self.state == OperationState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!OperationState::Received.is_terminal());
        assert!(!OperationState::Running.is_terminal());
        for state in [
            OperationState::Succeeded,
            OperationState::PendingInput,
            OperationState::Failed,
            OperationState::Cancelled,
        ] {
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_log_tracks_errors() {
        let mut log = OperationLog::new();
        log.add(LogLevel::Info, "starting");
        assert!(!log.has_errors());

        log.add(LogLevel::Error, "engine exploded");
        assert!(log.has_errors());
        assert_eq!(log.len(), 2);
        assert!(log.contains("exploded"));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&OperationState::PendingInput).unwrap();
        assert_eq!(json, "\"pending_input\"");
    }
}
