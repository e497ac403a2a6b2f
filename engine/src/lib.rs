//! Mindwell Engine Library
//!
//! Backend for a voice-first coaching app: conversational sessions with an
//! LLM persona, end-of-session summaries, planner tasks and a cumulative
//! user profile. Used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Speech-to-text and text-to-speech providers
pub mod speech;

/// Caller identity and ownership scoping
pub mod auth;

/// Turn orchestration and session finalization
pub mod conversation;

/// Application facade
pub mod app;

/// HTTP API
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
