//! PropChat application binary - composition root.
//!
//! Ties together all PropChat crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the SQLite database and wire the repositories
//! 3. Pick the intent parser (LLM when a key is configured, else keywords)
//! 4. Start the axum server, or import a property file and exit

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use propchat_api::{start_server, AppState};
use propchat_chat::{ChatOrchestrator, KeywordIntentParser, LlmIntentParser};
use propchat_core::config::PropChatConfig;
use propchat_core::error::PropChatError;
use propchat_core::services::IntentParser;
use propchat_storage::{Database, LocalAuthProvider, MessageRepository, PropertyRepository};

use cli::{expand_home, CliArgs, Command};

/// `RUST_LOG` wins; otherwise the CLI or config level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Where the running configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSource {
    File,
    Defaults,
}

/// Read the config file before the subscriber exists; the caller reports
/// the outcome once logging is up.
///
/// A missing file means defaults. A file that cannot be read or parsed is
/// an error rather than a silent fallback, since it may carry cookie and
/// confirmation settings.
fn read_config(path: &Path) -> Result<(PropChatConfig, ConfigSource), PropChatError> {
    if !path.exists() {
        return Ok((PropChatConfig::default(), ConfigSource::Defaults));
    }
    PropChatConfig::load(path).map(|config| (config, ConfigSource::File))
}

fn intent_parser(config: &PropChatConfig) -> Result<Arc<dyn IntentParser>, Box<dyn std::error::Error>> {
    match config.llm.resolve_api_key() {
        Some(key) => {
            tracing::info!(model = %config.llm.model, "Using LLM intent parser");
            Ok(Arc::new(LlmIntentParser::new(config.llm.clone(), key)?))
        }
        None => {
            tracing::warn!(
                env = %config.llm.api_key_env,
                "No LLM API key configured, falling back to keyword intent parser"
            );
            Ok(Arc::new(KeywordIntentParser::new()))
        }
    }
}

fn import(properties: &PropertyRepository, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let imported = properties.import_json(file)?;
    tracing::info!(
        file = %file.display(),
        imported,
        total = properties.count()?,
        "Property import finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config, then tracing at the configured level.
    let config_file = args.resolve_config_path();
    let loaded = read_config(&config_file);
    let log_level = args
        .resolve_log_level()
        .or_else(|| loaded.as_ref().ok().map(|(c, _)| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&log_level);
    tracing::info!("Starting PropChat v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok((config, ConfigSource::File)) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Ok((config, ConfigSource::Defaults)) => {
            tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
            config
        }
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.general.log_level = log_level;
    config.server.port = args.resolve_port(config.server.port);

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("propchat.db");
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let properties = Arc::new(PropertyRepository::new(Arc::clone(&db)));

    if let Command::Import { file } = args.command() {
        return import(&properties, &file);
    }

    let auth = Arc::new(LocalAuthProvider::new(Arc::clone(&db), config.auth.clone()));
    match auth.purge_expired() {
        Ok(0) => {}
        Ok(purged) => tracing::info!(purged, "Removed expired sessions"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired sessions"),
    }

    let messages = Arc::new(MessageRepository::new(Arc::clone(&db)));
    let parser = intent_parser(&config)?;
    let orchestrator = ChatOrchestrator::new(
        properties.clone(),
        parser,
        properties.clone(),
        messages.clone(),
    );

    let state = AppState::new(config, auth, orchestrator, messages);
    tracing::info!("Chat at {}/chat", state.config.server.public_url.trim_end_matches('/'));

    start_server(state).await?;

    Ok(())
}
