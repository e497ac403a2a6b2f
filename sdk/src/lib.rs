//! Mindwell SDK
//!
//! Shared types and errors for Mindwell components.
//! This crate is used by the engine and by anything that speaks its wire formats.

/// Error types and handling
pub mod errors;

/// Wire types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
pub use types::{KeyInsight, OnboardingResponse, Preferences, ProfileUpdate, TaskDraft};
