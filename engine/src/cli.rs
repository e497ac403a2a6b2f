//! CLI interface for Mindwell
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mindwell voice-coaching backend
///
/// Serves the session API and manages the knowledge base used to ground
/// the coach's replies.
#[derive(Parser, Debug)]
#[command(name = "mindwell")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API until interrupted
    Serve {
        /// Listen address, overriding `core.bind_addr`
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Manage the core methodology document
    Methodology {
        #[command(subcommand)]
        action: MethodologyAction,
    },

    /// Manage API keys in the OS keychain
    Secrets {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Validate configuration, secrets and the database
    Doctor,
}

/// Secret actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Read a value from stdin and store it under `name`
    Set {
        /// One of openrouter_api_key, deepgram_api_key, auth_proxy_secret
        name: String,
    },
}

/// Methodology actions
#[derive(Subcommand, Debug)]
pub enum MethodologyAction {
    /// Store a text file as the core methodology, replacing any previous one
    Set {
        /// Path to a UTF-8 text or markdown file
        file: PathBuf,

        /// Short description kept alongside the document
        #[arg(short, long, default_value = "Core methodology")]
        description: String,
    },

    /// Show the stored methodology's description and size
    Show,
}
