//! Error types and handling
//!
//! This module provides the error types used throughout the Mindwell engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Provider error bodies are scrubbed by the engine before they are wrapped
//! here, so messages are safe to log. Hints never carry request data.

use thiserror::Error;

/// Trait for error extensions
///
/// Provides additional context for errors, including user-friendly hints and
/// recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain secrets,
    /// transcript content or internal identifiers.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried manually by the user (for example a
    /// provider hiccup during a turn). Non-recoverable errors need a fix to
    /// configuration or data before a retry can succeed.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Not found**: missing audio blob, session, user, planner entry
/// - **Authorization**: no identity, or identity does not own the record
/// - **Input**: malformed requests, unsupported audio, illegal status changes
/// - **Upstream**: non-success responses from transcription, synthesis, LLM
/// - **Infrastructure**: configuration, database, storage, IO
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::NotFound("session".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(!error.is_recoverable());
///
/// let upstream = EngineError::Synthesis("503 Service Unavailable".to_string());
/// assert!(upstream.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // File storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Lookup errors
    #[error("{0} not found")]
    NotFound(String),

    // Authorization errors
    #[error("Not authenticated")]
    Unauthorized,

    #[error("Access denied: {0}")]
    Forbidden(String),

    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid planner transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    // Upstream provider errors
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Database operation failed. Try again shortly",
            Self::Storage(_) => "File storage operation failed. Try uploading again",

            Self::NotFound(_) => "The requested item does not exist",

            Self::Unauthorized => "Sign in to continue",
            Self::Forbidden(_) => "You do not have access to this item",

            Self::InvalidInput(_) => "The request was malformed",
            Self::InvalidTransition { .. } => "This activity can no longer change to that state",
            Self::UnsupportedAudio(_) => "Record again; the audio could not be used",

            Self::Transcription(_) => "We could not understand the recording. Try again",
            Self::Synthesis(_) => "Voice reply failed. Try again",
            Self::LLMProvider(_) => "The assistant is unavailable right now. Try again",

            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::NotFound(_)
            | Self::Unauthorized
            | Self::Forbidden(_)
            | Self::InvalidTransition { .. }
            | Self::KeyringError(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message_names_both_states() {
        let err = EngineError::InvalidTransition {
            from: "completed".to_string(),
            to: "pending".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid planner transition: completed -> pending"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_upstream_errors_are_recoverable() {
        assert!(EngineError::Transcription("500".into()).is_recoverable());
        assert!(EngineError::Synthesis("500".into()).is_recoverable());
        assert!(EngineError::LLMProvider("500".into()).is_recoverable());
    }

    #[test]
    fn test_not_found_display() {
        let err = EngineError::NotFound("Audio".to_string());
        assert_eq!(err.to_string(), "Audio not found");
    }
}
