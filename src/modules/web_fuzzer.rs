//! Wrapper around the nuclei template scanner.

use crate::config::Config;
use crate::config::types::NucleiConfig;
use crate::core::errors::{ConfigError, ExecError, LahmaError, WebFuzzerError};
use crate::executors::command::{self, CommandResult};
use std::time::Duration;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Scanner executable as configured. Resolved against `PATH` on use.
#[derive(Debug, Clone)]
pub struct Nuclei {
    command: String,
}

impl Nuclei {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Whether the scanner can be launched. A failing `-version` still
    /// counts as installed.
    pub async fn check_tool_available(&self) -> bool {
        match which::which(&self.command) {
            Ok(path) => tracing::debug!("Found {} at: {}", self.command, path.display()),
            Err(_) => tracing::debug!("{} not found in PATH", self.command),
        }

        let args = vec!["-version".to_string()];
        match command::execute(&self.command, &args, VERSION_CHECK_TIMEOUT).await {
            Ok(result) if result.success() => {
                tracing::debug!("Nuclei installation confirmed.");
                true
            }
            Ok(result) => {
                tracing::warn!(
                    "Nuclei command found, but '-version' exited with error: {}",
                    result.stderr
                );
                true
            }
            Err(ExecError::NotFound { .. }) => {
                tracing::error!(
                    "Nuclei command not found. Please install Nuclei and ensure it's in your system PATH."
                );
                false
            }
            Err(ExecError::TimedOut { .. }) => {
                tracing::error!("Checking Nuclei version timed out.");
                false
            }
            Err(e) => {
                tracing::error!("Unexpected error while checking for Nuclei: {}", e);
                false
            }
        }
    }

    /// Run one scan to completion. Output is logged line by line and
    /// returned unparsed.
    pub async fn run_scan(
        &self,
        target_url: &str,
        templates_path: Option<&str>,
        extra_flags: Option<&str>,
        limit: Duration,
    ) -> Result<CommandResult, LahmaError> {
        tracing::info!("Preparing to run Nuclei against: {}", target_url);

        let args = build_args(target_url, templates_path, extra_flags);
        let argv = std::iter::once(self.command.as_str()).chain(args.iter().map(String::as_str));
        let command_line = shell_words::join(argv);
        tracing::debug!("Executing Nuclei command: {}", command_line);

        let result = match command::execute(&self.command, &args, limit).await {
            Ok(result) => result,
            Err(ExecError::NotFound { .. }) => {
                tracing::error!("Nuclei executable could not be launched: not found.");
                return Err(LahmaError::environment(
                    "Nuclei executable not found during execution. \
                     Please ensure it is installed and in the system PATH.",
                ));
            }
            Err(ExecError::TimedOut { .. }) => {
                tracing::error!("Nuclei scan timed out after {} seconds.", limit.as_secs());
                return Err(WebFuzzerError::TimedOut {
                    seconds: limit.as_secs(),
                }
                .into());
            }
            Err(e) => {
                tracing::error!("An unexpected error occurred while running Nuclei command: {}", e);
                return Err(WebFuzzerError::Execution(e.to_string()).into());
            }
        };

        log_stream("stdout", "NUCLEI_OUT", &result.stdout);
        log_stream("stderr", "NUCLEI_ERR", &result.stderr);

        if !result.success() {
            tracing::error!("Nuclei exited with non-zero status: {}", result.exit_code);
            return Err(WebFuzzerError::NonZeroExit {
                code: result.exit_code,
            }
            .into());
        }

        tracing::info!(
            "Nuclei scan process completed successfully (exit code 0) in {}ms.",
            result.duration_ms
        );
        Ok(result)
    }
}

/// `-u <url> [-t <templates>] [extra flags...]`. Unparseable extra flags
/// are dropped.
pub fn build_args(target_url: &str, templates_path: Option<&str>, extra_flags: Option<&str>) -> Vec<String> {
    let mut args = vec!["-u".to_string(), target_url.to_string()];

    if let Some(templates) = templates_path.filter(|t| !t.is_empty()) {
        args.push("-t".to_string());
        args.push(templates.to_string());
        tracing::info!("Using Nuclei templates from: {}", templates);
    }

    if let Some(flags) = extra_flags.filter(|f| !f.trim().is_empty()) {
        match shell_words::split(flags) {
            Ok(extra) => {
                tracing::info!("Adding extra Nuclei flags: {:?}", extra);
                args.extend(extra);
            }
            Err(e) => {
                tracing::error!("Error parsing extra flags '{}': {}. Flags ignored.", flags, e);
            }
        }
    }

    args
}

fn log_stream(name: &str, tag: &str, output: &str) {
    let output = output.trim();
    if output.is_empty() {
        tracing::info!("Nuclei {}: (empty)", name);
        return;
    }
    tracing::info!("Nuclei {}:", name);
    for line in output.lines() {
        tracing::info!("  [{}] {}", tag, line);
    }
}

async fn scan(target_url: &str, nuclei: &NucleiConfig) -> Result<(), LahmaError> {
    let scanner = Nuclei::new(&nuclei.command);

    if !scanner.check_tool_available().await {
        return Err(LahmaError::environment(
            "Nuclei dependency check failed. Cannot proceed with Nuclei scan.",
        ));
    }

    tracing::info!("Proceeding with Nuclei scan...");
    scanner
        .run_scan(
            target_url,
            nuclei.templates_path.as_deref(),
            nuclei.extra_flags.as_deref(),
            Duration::from_secs(nuclei.process_timeout),
        )
        .await?;
    tracing::info!("Nuclei scan execution completed.");
    Ok(())
}

/// Module entry point.
pub async fn run(config: &Config) -> Result<(), LahmaError> {
    tracing::info!("--- Starting Web Fuzzer Module ---");

    let target_url = config
        .web_fuzzer
        .target_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or(ConfigError::Missing("web_fuzzer.target_url"))?;
    tracing::info!("Target URL: {}", target_url);

    scan(target_url, &config.web_fuzzer.nuclei).await?;

    tracing::info!("--- Web Fuzzer Module Finished ---");
    Ok(())
}
