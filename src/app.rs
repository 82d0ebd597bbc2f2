use crate::{
    cli::args::{Cli, Command, ModuleName},
    config::{Config, ConfigLoader},
    core::errors::{ConfigError, LahmaError},
    modules::{esxi, honeypot, web_fuzzer},
    utils::logging::{self, LogLevel, LogSettings},
};
use anyhow::Result;
use std::fmt;

/// Value of `--log-file` that turns the file sink off for one run.
const NO_LOG_FILE: &str = "NONE";

/// Why a run did not succeed. `Display` is the line printed after `Error:`.
#[derive(Debug)]
pub enum Failure {
    Configuration(ConfigError),
    Module(LahmaError),
    Unexpected(anyhow::Error),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "Configuration failed - {}", e),
            Self::Module(e) => write!(f, "{}", e),
            Self::Unexpected(e) => write!(f, "An unexpected critical error occurred: {}", e),
        }
    }
}

pub async fn run(cli: Cli) -> std::result::Result<(), Failure> {
    // Nothing is configured yet; surface loader warnings on stderr
    let loaded = tracing::subscriber::with_default(logging::bootstrap(), || {
        ConfigLoader::new().load(cli.config.as_deref())
    });
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::subscriber::with_default(logging::bootstrap(), || {
                tracing::error!("Configuration failed: {}", e);
            });
            return Err(Failure::Configuration(e));
        }
    };

    let settings = log_settings(&cli, &config);
    match logging::init(&settings) {
        Ok(handle) => {
            if let Some(path) = handle.file_path() {
                tracing::debug!("Log file in use: {}", path.display());
            }
        }
        Err(e) => eprintln!("Warning: {:#}. Continuing without configured logging.", e),
    }

    tracing::info!("LahMa starting up...");
    tracing::debug!("Effective configuration: {:?}", config.redacted());

    match dispatch(&cli.command, &config).await {
        Ok(()) => {
            tracing::info!("LahMa finished.");
            Ok(())
        }
        Err(err) => Err(classify(err)),
    }
}

/// Typed module errors keep their own message; anything else is unexpected.
/// Panics never get here, `human_panic` reports those.
fn classify(err: anyhow::Error) -> Failure {
    match err.downcast::<LahmaError>() {
        Ok(e) => {
            tracing::error!("Module execution failed: {}", e);
            Failure::Module(e)
        }
        Err(other) => {
            tracing::error!("An unexpected critical error occurred: {:?}", other);
            Failure::Unexpected(other)
        }
    }
}

async fn dispatch(command: &Command, config: &Config) -> Result<()> {
    let Command::Run { module } = command;
    tracing::info!("Running module: {:?}", module);

    match module {
        ModuleName::Honeypot => honeypot::run(config).await?,
        ModuleName::Esxi => esxi::run(config).await?,
        ModuleName::Fuzz => web_fuzzer::run(config).await?,
    }
    Ok(())
}

/// CLI flags win over the config file. `--log-file NONE` disables the file
/// sink; an empty name means console only as well.
fn log_settings(cli: &Cli, config: &Config) -> LogSettings {
    let level = cli
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.logging.level));

    let file = match cli.log_file.as_deref() {
        Some(name) if name.eq_ignore_ascii_case(NO_LOG_FILE) => None,
        Some(name) => Some(name.to_string()),
        None => config.logging.file.clone(),
    }
    .filter(|name| !name.trim().is_empty());

    LogSettings { level, file }
}
