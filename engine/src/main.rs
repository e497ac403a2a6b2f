// Mindwell voice-coaching backend
// Main entry point for the mindwell binary

use clap::Parser;
use mindwell_engine::cli::{Cli, Command, MethodologyAction, SecretAction};
use mindwell_engine::config::Config;
use mindwell_engine::handlers::{
    handle_doctor, handle_methodology_set, handle_methodology_show, handle_secret_set,
    handle_serve, OutputFormat,
};
use mindwell_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG still wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Mindwell v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { bind } => handle_serve(config, bind).await,

        Command::Methodology { action } => match action {
            MethodologyAction::Set { file, description } => {
                handle_methodology_set(config, &file, &description, format).await
            }
            MethodologyAction::Show => handle_methodology_show(config, format).await,
        },

        Command::Secrets { action } => match action {
            SecretAction::Set { name } => handle_secret_set(&name),
        },

        Command::Doctor => handle_doctor(&config, format).await,
    }
}
