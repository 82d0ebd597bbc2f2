use super::types::Config;
use crate::core::errors::ConfigError;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";

/// Checked in order; the first non-empty value replaces `openai.api_key`.
pub const API_KEY_ENV_VARS: &[&str] = &["LAHMA_OPENAI_API_KEY", "OPENAI_API_KEY"];

pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at the process working directory.
    pub fn new() -> Self {
        Self::at(PathBuf::from("."))
    }

    /// Loader that looks for `config/` under `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn default_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(DEFAULT_CONFIG_FILE)
    }

    pub fn example_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(EXAMPLE_CONFIG_FILE)
    }

    /// Pick the file to load: explicit path, then the default path, then the
    /// example file. `Ok(None)` when nothing exists.
    pub fn resolve_path(&self, explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if path.exists() {
                tracing::debug!("Using config file specified via argument: {}", path.display());
                return Ok(Some(path.to_path_buf()));
            }
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let default_path = self.default_path();
        if default_path.exists() {
            tracing::debug!("Using default config file: {}", default_path.display());
            return Ok(Some(default_path));
        }

        let example_path = self.example_path();
        if example_path.exists() {
            tracing::warn!(
                "Default config file '{}' not found. Falling back to example config: {}. \
                 Please copy it to {} and customize.",
                default_path.display(),
                example_path.display(),
                DEFAULT_CONFIG_FILE
            );
            return Ok(Some(example_path));
        }

        tracing::warn!(
            "No configuration file found at specified path, default path '{}', or example path.",
            default_path.display()
        );
        Ok(None)
    }

    /// Load configuration using the process environment for overrides.
    pub fn load(&self, explicit: Option<&Path>) -> Result<Config, ConfigError> {
        self.load_with_env(explicit, |name| std::env::var(name).ok())
    }

    pub fn load_with_env<F>(&self, explicit: Option<&Path>, env: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (document, path) = match self.resolve_path(explicit)? {
            Some(path) => (read_document(&path)?, Some(path)),
            None => {
                tracing::info!(
                    "No config file loaded. Relying on defaults and environment variables."
                );
                (Value::Null, None)
            }
        };

        let config = build(document, &env).map_err(|source| ConfigError::Invalid {
            path: path.unwrap_or_default(),
            source,
        })?;

        tracing::debug!("Configuration loading complete.");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        tracing::warn!(
            "Config file '{}' is empty or not a valid dictionary. Using defaults.",
            path.display()
        );
        return Ok(Value::Null);
    }

    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if value.is_mapping() {
        tracing::info!("Successfully loaded configuration from: {}", path.display());
        Ok(value)
    } else {
        tracing::warn!(
            "Config file '{}' is empty or not a valid dictionary. Using defaults.",
            path.display()
        );
        Ok(Value::Null)
    }
}

/// Pure construction from a parsed document and an environment lookup.
/// Anything other than a mapping counts as an empty document.
pub fn build<F>(document: Value, env: F) -> Result<Config, serde_yaml::Error>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: Config = if document.is_mapping() {
        serde_yaml::from_value(document)?
    } else {
        Config::default()
    };

    let env_key = API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.is_empty());

    match env_key {
        Some(key) => {
            config.openai.api_key = Some(key);
            tracing::debug!("OpenAI API key loaded from environment variable.");
        }
        None if config.openai.api_key.as_deref().unwrap_or_default().is_empty() => {
            tracing::debug!("OpenAI API key not found in environment variables or config file.");
        }
        None => {}
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn workspace() -> (TempDir, ConfigLoader) {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(CONFIG_DIR)).unwrap();
        let loader = ConfigLoader::at(dir.path());
        (dir, loader)
    }

    #[test]
    fn test_resolve_explicit_missing_path_fails() {
        let (dir, loader) = workspace();
        let missing = dir.path().join("missing.yaml");
        let err = loader.resolve_path(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn test_resolve_explicit_path_is_returned_verbatim() {
        let (dir, loader) = workspace();
        let custom = dir.path().join("custom.yaml");
        fs::write(&custom, "logging: {}\n").unwrap();
        fs::write(loader.default_path(), "logging: {}\n").unwrap();
        assert_eq!(loader.resolve_path(Some(&custom)).unwrap(), Some(custom));
    }

    #[test]
    fn test_resolve_order_default_then_example_then_none() {
        let (_dir, loader) = workspace();
        assert_eq!(loader.resolve_path(None).unwrap(), None);

        fs::write(loader.example_path(), "{}\n").unwrap();
        assert_eq!(loader.resolve_path(None).unwrap(), Some(loader.example_path()));

        fs::write(loader.default_path(), "{}\n").unwrap();
        assert_eq!(loader.resolve_path(None).unwrap(), Some(loader.default_path()));
    }

    #[test]
    fn test_load_default_file() {
        let (_dir, loader) = workspace();
        fs::write(
            loader.default_path(),
            r#"
logging:
  level: DEBUG
  file: test.log
web_fuzzer:
  target_url: "http://actual-test.com"
esxi_tester:
  targets: ["10.0.0.1"]
"#,
        )
        .unwrap();

        let config = loader.load_with_env(None, no_env).unwrap();
        assert_eq!(config.logging.level, "DEBUG");
        assert_eq!(config.logging.file.as_deref(), Some("test.log"));
        assert_eq!(
            config.web_fuzzer.target_url.as_deref(),
            Some("http://actual-test.com")
        );
        assert_eq!(config.esxi_tester.targets, vec!["10.0.0.1"]);
        assert_eq!(config.openai.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_load_falls_back_to_example() {
        let (_dir, loader) = workspace();
        fs::write(
            loader.example_path(),
            "logging:\n  level: INFO\nopenai:\n  model: gpt-test\n",
        )
        .unwrap();

        let config = loader.load_with_env(None, no_env).unwrap();
        assert_eq!(config.logging.level, "INFO");
        assert_eq!(config.openai.model, "gpt-test");
        assert!(config.esxi_tester.targets.is_empty());
    }

    #[test]
    fn test_load_without_any_file_uses_defaults() {
        let (_dir, loader) = workspace();
        let config = loader.load_with_env(None, no_env).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let (_dir, loader) = workspace();
        fs::write(loader.default_path(), "logging: [unclosed\n  level: : :\n").unwrap();
        let err = loader.load_with_env(None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_wrong_value_type_is_config_error() {
        let (_dir, loader) = workspace();
        fs::write(loader.default_path(), "tor:\n  control_port: not-a-port\n").unwrap();
        let err = loader.load_with_env(None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_empty_and_non_mapping_documents_use_defaults() {
        let (_dir, loader) = workspace();
        for content in ["", "just a string\n", "- a\n- b\n"] {
            fs::write(loader.default_path(), content).unwrap();
            let config = loader.load_with_env(None, no_env).unwrap();
            assert_eq!(config, Config::default(), "content: {content:?}");
        }
    }

    #[test]
    fn test_env_key_overrides_file_value() {
        let (_dir, loader) = workspace();
        fs::write(loader.default_path(), "openai:\n  api_key: from-file\n").unwrap();

        let config = loader
            .load_with_env(None, env_from(&[("OPENAI_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_env_key_priority() {
        let env = env_from(&[
            ("LAHMA_OPENAI_API_KEY", "lahma-key"),
            ("OPENAI_API_KEY", "generic-key"),
        ]);
        let config = build(Value::Null, env).unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("lahma-key"));
    }

    #[test]
    fn test_empty_env_value_is_skipped() {
        let env = env_from(&[("LAHMA_OPENAI_API_KEY", ""), ("OPENAI_API_KEY", "generic-key")]);
        let config = build(Value::Null, env).unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("generic-key"));

        let env = env_from(&[("LAHMA_OPENAI_API_KEY", "")]);
        let document: Value = serde_yaml::from_str("openai:\n  api_key: kept\n").unwrap();
        let config = build(document, env).unwrap();
        assert_eq!(config.openai.api_key.as_deref(), Some("kept"));
    }

    #[test]
    fn test_load_is_idempotent() {
        let (dir, loader) = workspace();
        let path = dir.path().join("explicit.yaml");
        fs::write(&path, "esxi_tester:\n  targets: [a, b]\ntor:\n  enabled: true\n").unwrap();

        let env = env_from(&[("OPENAI_API_KEY", "k")]);
        let first = loader.load_with_env(Some(&path), &env).unwrap();
        let second = loader.load_with_env(Some(&path), &env).unwrap();
        assert_eq!(first, second);
    }
}
