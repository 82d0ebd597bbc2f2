use serde::{Deserialize, Deserializer, Serialize};

/// Fully populated configuration. Every recognised key carries a default,
/// keys present in the file keep their value even when falsy or null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    #[serde(deserialize_with = "null_as_default")]
    pub logging: LoggingConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub openai: OpenAiConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub honeypot: HoneypotConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub esxi_tester: EsxiTesterConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub web_fuzzer: WebFuzzerConfig,
    #[serde(deserialize_with = "null_as_default")]
    pub tor: TorConfig,
}

impl Config {
    /// Copy safe to print: secrets replaced with a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.openai.api_key.is_some() {
            copy.openai.api_key = Some(REDACTED.to_string());
        }
        if copy.tor.control_password.is_some() {
            copy.tor.control_password = Some(REDACTED.to_string());
        }
        copy
    }
}

const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `None` when the file explicitly sets `file: null`.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: Some("lahma.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            request_timeout: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HoneypotConfig {
    pub target_tech_simulation: String,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            target_tech_simulation: "Generic Service".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EsxiTesterConfig {
    #[serde(deserialize_with = "scalar_list")]
    pub targets: Vec<String>,
    pub check_timeout: u64,
}

impl Default for EsxiTesterConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            check_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebFuzzerConfig {
    pub target_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub nuclei: NucleiConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NucleiConfig {
    pub command: String,
    pub templates_path: Option<String>,
    pub extra_flags: Option<String>,
    pub process_timeout: u64,
}

impl Default for NucleiConfig {
    fn default() -> Self {
        Self {
            command: "nuclei".to_string(),
            templates_path: None,
            extra_flags: Some("-silent".to_string()),
            process_timeout: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TorConfig {
    pub enabled: bool,
    pub control_port: u16,
    pub control_password: Option<String>,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            control_port: 9051,
            control_password: None,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a list of YAML scalars (a bare `10.0.0.1` or `8443` alike) and
/// keeps each one as its string form. `null` reads as an empty list.
fn scalar_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    let items = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(D::Error::custom(format!(
                "expected a host string, found {other:?}"
            ))),
        })
        .collect()
}
