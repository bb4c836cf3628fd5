//! Standard error types for the state store and the agent lifecycle.
//!
//! Two error layers:
//!
//! 1. **StateError** — Store/domain errors (snapshot not found, bad snapshot
//!    name, malformed document, I/O failure). Every store operation returns
//!    these through [`StateResult`].
//!
//! 2. **RunError** — Errors surfaced by [`Agent::run`](crate::agent::Agent::run).
//!    A failure raised by the processor itself is carried through untouched
//!    in `RunError::Process`; a failure raised while a lifecycle hook wrote
//!    to the store is carried in `RunError::Hook`.
//!
//! # Propagation Rule
//!
//! Nothing in this crate retries. A failure is either recorded in the store
//! (for observability) and re-surfaced, or surfaced directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════
// LAYER 1: Store errors
// ═══════════════════════════════════════════════════════════════════

/// Standard error type for every state store operation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct StateError {
    /// Error code (machine-readable)
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,

    /// Additional context (for debugging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,

    /// Suggested action for recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
}

impl StateError {
    /// Create a new error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggested_action: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let context = self.context.get_or_insert_with(HashMap::new);
        if let Ok(v) = serde_json::to_value(value) {
            context.insert(key.into(), v);
        }
        self
    }

    /// Set suggested action
    pub fn with_suggestion(mut self, action: SuggestedAction) -> Self {
        self.suggested_action = Some(action);
        self
    }

    /// Check the error code
    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Format the error with its recovery hint appended.
    pub fn to_display_message(&self) -> String {
        let mut msg = format!("Error: {}", self.message);
        if let Some(ref action) = self.suggested_action {
            match action {
                SuggestedAction::Alternative { description } => {
                    msg.push_str(&format!(". Try: {}", description));
                }
                SuggestedAction::CheckPath { path } => {
                    msg.push_str(&format!(". Check path: {}", path));
                }
            }
        }
        msg
    }

    // ═══════════════════════════════════════════════════════════
    // Common error constructors
    // ═══════════════════════════════════════════════════════════

    /// Snapshot document not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(ErrorCode::NotFound, format!("State file not found: {}", resource))
            .with_context("path", &resource)
            .with_suggestion(SuggestedAction::Alternative {
                description: "List saved snapshots to find available names".into(),
            })
    }

    /// Snapshot name rejected (empty, path traversal, control characters)
    pub fn invalid_name(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidName, message)
    }

    /// Value or document could not be (de)serialized
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }
}

/// Standard error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Snapshot document not found
    NotFound,

    /// Snapshot name is not a plain file name
    InvalidName,

    /// Value or document could not be (de)serialized
    SerializationError,

    /// Storage error (read/write failed)
    StorageError,

    /// A processor's `process` step failed
    ProcessingFailure,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidName => "INVALID_NAME",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::ProcessingFailure => "PROCESSING_FAILURE",
        };
        write!(f, "{}", s)
    }
}

/// Suggested actions for error recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Use a different approach
    Alternative {
        /// Description of the alternative
        description: String,
    },

    /// Check a filesystem path
    CheckPath {
        /// The path to check
        path: String,
    },
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        StateError::new(ErrorCode::StorageError, format!("I/O error: {}", e))
            .with_context("io_error_kind", format!("{:?}", e.kind()))
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::new(ErrorCode::SerializationError, format!("JSON error: {}", e))
            .with_context("line", e.line())
    }
}

/// Result type alias for store operations
pub type StateResult<T> = Result<T, StateError>;

// ═══════════════════════════════════════════════════════════════════
// LAYER 2: Run errors (Agent::run)
// ═══════════════════════════════════════════════════════════════════

/// Failure surfaced by a single agent run.
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// The processor failed; the original error is passed through unchanged.
    #[error(transparent)]
    Process(E),

    /// A lifecycle hook failed while writing to the state store.
    #[error("lifecycle hook failed: {0}")]
    Hook(#[from] StateError),
}

impl<E> RunError<E> {
    /// The processor's own error, if that is what failed.
    pub fn into_process(self) -> Option<E> {
        match self {
            Self::Process(e) => Some(e),
            Self::Hook(_) => None,
        }
    }

    /// Borrow the processor's error, if that is what failed.
    pub fn as_process(&self) -> Option<&E> {
        match self {
            Self::Process(e) => Some(e),
            Self::Hook(_) => None,
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self, Self::Process(_))
    }

    /// Failure kind as recorded under `last_error.kind`.
    ///
    /// Processor failures report the error's type name; hook failures
    /// report their store error code.
    pub fn kind(&self) -> String {
        match self {
            Self::Process(_) => crate::types::short_type_name::<E>().to_string(),
            Self::Hook(e) => e.code.to_string(),
        }
    }

    /// Error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Process(_) => ErrorCode::ProcessingFailure,
            Self::Hook(e) => e.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom: {0}")]
    struct Boom(&'static str);

    #[test]
    fn test_error_creation() {
        let err = StateError::not_found("states/missing.json");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.is(ErrorCode::NotFound));
        assert!(err.message.contains("missing.json"));
    }

    #[test]
    fn test_error_with_context() {
        let err = StateError::invalid_name("bad name")
            .with_context("name", "../etc")
            .with_context("reason", "path traversal");

        let ctx = err.context.unwrap();
        assert_eq!(ctx.get("name").unwrap(), "../etc");
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_error_serialization() {
        let err = StateError::not_found("test");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("NOT_FOUND"));

        let recovered: StateError = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_display_message_formatting() {
        let err = StateError::not_found("snap1.json");
        let msg = err.to_display_message();
        assert!(msg.contains("snap1.json"));
        assert!(msg.contains("Try:"));

        let err2 = StateError::storage("disk full").with_suggestion(SuggestedAction::CheckPath {
            path: "states".into(),
        });
        assert_eq!(err2.to_display_message(), "Error: disk full. Check path: states");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StateError = io.into();
        assert_eq!(err.code, ErrorCode::StorageError);
        assert_eq!(
            err.context.unwrap().get("io_error_kind").unwrap(),
            "PermissionDenied"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StateError = parse.into();
        assert_eq!(err.code, ErrorCode::SerializationError);
    }

    #[test]
    fn test_run_error_passes_process_error_through() {
        let err: RunError<Boom> = RunError::Process(Boom("disk"));
        assert_eq!(err.to_string(), "boom: disk");
        assert_eq!(err.kind(), "Boom");
        assert_eq!(err.code(), ErrorCode::ProcessingFailure);
        assert_eq!(err.into_process().unwrap().0, "disk");
    }

    #[test]
    fn test_run_error_hook() {
        let err: RunError<Boom> = StateError::storage("write failed").into();
        assert!(!err.is_process());
        assert_eq!(err.kind(), "STORAGE_ERROR");
        assert!(err.to_string().contains("write failed"));
        assert!(err.into_process().is_none());
    }
}
