//! Command handlers for CLI operations
//!
//! - serve: run the HTTP API until Ctrl-C
//! - methodology set / show: manage the core methodology document
//! - secrets set: store an API key in the OS keychain
//! - doctor: validate configuration and check dependencies

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::app::App;
use crate::config::Config;
use crate::db::Database;
use crate::secrets::{
    SecretCache, SecretManager, SecretString, AUTH_PROXY_SECRET, LLM_API_KEY, SPEECH_API_KEY,
};
use crate::server::{self, ServerState};

/// Keychain service name for all Mindwell secrets
pub const KEYCHAIN_SERVICE: &str = "mindwell";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn secret_manager() -> Arc<SecretManager> {
    Arc::new(SecretManager::new(KEYCHAIN_SERVICE))
}

/// Resolve the proxy secret up front so a misconfigured server fails at start
fn proxy_secret(config: &Config, secrets: &SecretCache) -> Result<Option<SecretString>> {
    if !config.auth.require_proxy_secret {
        tracing::warn!("auth.require_proxy_secret is off; identity headers are trusted as-is");
        return Ok(None);
    }
    let secret = secrets
        .get_secret(AUTH_PROXY_SECRET)
        .context("auth.require_proxy_secret is set but no proxy secret is configured")?;
    Ok(Some(secret))
}

/// Run the HTTP API until Ctrl-C
pub async fn handle_serve(config: Config, bind: Option<String>) -> Result<()> {
    let secrets = Arc::new(SecretCache::new(secret_manager()));
    let proxy_secret = proxy_secret(&config, &secrets)?;
    let addr = bind.unwrap_or_else(|| config.core.bind_addr.clone());

    let app = Arc::new(App::open(config, secrets).await?);
    let status = app.status().await?;
    if !status.core_methodology {
        tracing::warn!("No core methodology stored; replies use the persona only");
    }

    let state = ServerState::new(app.clone(), proxy_secret);
    server::serve(state, &addr, shutdown_signal()).await?;

    match Arc::try_unwrap(app) {
        Ok(app) => app.shutdown().await?,
        Err(app) => app.db().flush_wal().await?,
    }
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
}

/// Store a text file as the core methodology
pub async fn handle_methodology_set(
    config: Config,
    file: &Path,
    description: &str,
    format: OutputFormat,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read methodology file {:?}", file))?;

    let app = App::open(config, Arc::new(SecretCache::new(secret_manager()))).await?;
    let doc = app.set_core_methodology_text(&text, description).await?;

    match format {
        OutputFormat::Text => {
            println!("Core methodology stored ({} bytes)", text.len());
            println!("  Document: {}", doc.id);
            println!("  Storage:  {}", doc.storage_id);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }

    app.shutdown().await
}

/// Show the stored core methodology
pub async fn handle_methodology_show(config: Config, format: OutputFormat) -> Result<()> {
    let db = Database::new(&config.db_path()).await?;
    let knowledge = db.knowledge();
    let doc = knowledge.core_methodology().await?;
    let text = knowledge.core_methodology_text().await?;

    match format {
        OutputFormat::Text => match (&doc, &text) {
            (Some(doc), Some(text)) => {
                println!("Core methodology: {}", doc.description);
                println!("  Size: {} bytes", text.len());
            }
            _ => println!("No core methodology stored."),
        },
        OutputFormat::Json => {
            let output = json!({
                "document": doc,
                "bytes": text.as_ref().map(|t| t.len()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    db.close().await
}

/// Store a secret read from stdin in the OS keychain
pub fn handle_secret_set(name: &str) -> Result<()> {
    let known = [LLM_API_KEY, SPEECH_API_KEY, AUTH_PROXY_SECRET];
    if !known.contains(&name) {
        bail!("Unknown secret '{}'. Expected one of: {}", name, known.join(", "));
    }

    eprintln!("Enter value for {} and press Enter:", name);
    let mut value = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut value)
        .context("Failed to read secret from stdin")?;

    let value = value.trim();
    if value.is_empty() {
        bail!("Secret value is empty");
    }

    secret_manager().set_secret(name, value)?;
    println!("Stored {}.", name);
    Ok(())
}

/// Validate configuration, secrets and the database
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid"));

    if config.core.data_dir.exists() {
        checks.push(("Data directory", "Exists"));
    } else {
        checks.push(("Data directory", "Missing"));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    match Database::new(&config.db_path()).await {
        Ok(db) => {
            checks.push(("Database connection", "OK"));
            match db.knowledge().core_methodology().await {
                Ok(Some(_)) => checks.push(("Core methodology", "Stored")),
                Ok(None) => {
                    checks.push(("Core methodology", "Not stored"));
                    issues.push(
                        "No core methodology. Run 'mindwell methodology set <file>'.".to_string(),
                    );
                }
                Err(e) => {
                    checks.push(("Core methodology", "Error"));
                    issues.push(format!("Cannot read knowledge base: {}", e));
                }
            }
            db.close().await.ok();
        }
        Err(e) => {
            checks.push(("Database connection", "Failed"));
            issues.push(format!("Cannot open database: {}", e));
        }
    }

    let manager = secret_manager();
    for (label, key) in [("LLM API key", LLM_API_KEY), ("Speech API key", SPEECH_API_KEY)] {
        if manager.has_secret(key) {
            checks.push((label, "Configured"));
        } else {
            checks.push((label, "Not configured"));
            issues.push(format!(
                "{} missing. Export {} or run 'mindwell secrets set {}'.",
                label,
                SecretManager::env_var_name(key),
                key
            ));
        }
    }

    if config.auth.require_proxy_secret {
        if manager.has_secret(AUTH_PROXY_SECRET) {
            checks.push(("Proxy secret", "Configured"));
        } else {
            checks.push(("Proxy secret", "Not configured"));
            issues.push("auth.require_proxy_secret is on but no proxy secret is set.".to_string());
        }
    } else {
        checks.push(("Proxy secret", "Not required"));
    }

    match format {
        OutputFormat::Text => {
            println!("Mindwell Diagnostics");
            println!("====================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("All checks passed!");
            } else {
                println!("Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_secret_not_required() {
        let config = Config::default_config();
        let secrets = SecretCache::new(secret_manager());
        assert!(proxy_secret(&config, &secrets).unwrap().is_none());
    }

    #[test]
    fn test_proxy_secret_resolved_when_required() {
        let mut config = Config::default_config();
        config.auth.require_proxy_secret = true;
        let secrets = SecretCache::with_values(secret_manager(), &[(AUTH_PROXY_SECRET, "s3cret")]);

        let secret = proxy_secret(&config, &secrets).unwrap().unwrap();
        assert_eq!(secret.unsecure(), "s3cret");
    }

    #[tokio::test]
    async fn test_methodology_set_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("method.md");
        std::fs::write(&file, "Observe the mind.").unwrap();

        let mut config = Config::default_config();
        config.core.data_dir = dir.path().to_path_buf();

        handle_methodology_set(config.clone(), &file, "notes", OutputFormat::Json)
            .await
            .unwrap();

        let db = Database::new(&config.db_path()).await.unwrap();
        assert_eq!(
            db.knowledge().core_methodology_text().await.unwrap().as_deref(),
            Some("Observe the mind.")
        );
    }
}
