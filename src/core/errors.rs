use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures while locating, reading or interpreting configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file specified via --config does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML syntax in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration value in {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Required setting '{0}' is missing in configuration.")]
    Missing(&'static str),

    #[error("No {0} specified ('{1}' is empty or missing).")]
    Empty(&'static str, &'static str),
}

/// Failures launching or supervising a child process. A non-zero exit is
/// not one of them; callers inspect the exit code themselves.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("{tool}: command not found")]
    NotFound { tool: String },

    #[error("{tool} timed out after {}s", timeout.as_secs())]
    TimedOut { tool: String, timeout: Duration },

    #[error("failed to run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum HoneypotError {
    #[error("Rule generation failed: {0}")]
    RuleGeneration(#[source] Box<LahmaError>),
}

#[derive(Error, Debug)]
pub enum WebFuzzerError {
    #[error("Nuclei process failed with exit code {code}.")]
    NonZeroExit { code: i32 },

    #[error("Nuclei scan process timed out ({seconds}s).")]
    TimedOut { seconds: u64 },

    #[error("Nuclei execution failed unexpectedly: {0}")]
    Execution(String),
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("[Honeypot Module Error]: {0}")]
    Honeypot(#[from] HoneypotError),

    #[error("[Web Fuzzer Module Error]: {0}")]
    WebFuzzer(#[from] WebFuzzerError),
}

#[derive(Error, Debug)]
pub enum LahmaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required tool, library or feature is not present at runtime.
    #[error("{0}")]
    Environment(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    /// A remote service rejected or failed a call.
    #[allow(dead_code)]
    #[error("[{service} API Error]: {message}")]
    Api { service: String, message: String },
}

impl LahmaError {
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<HoneypotError> for LahmaError {
    fn from(err: HoneypotError) -> Self {
        Self::Module(err.into())
    }
}

impl From<WebFuzzerError> for LahmaError {
    fn from(err: WebFuzzerError) -> Self {
        Self::Module(err.into())
    }
}
