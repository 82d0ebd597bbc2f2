//! Read-only connectivity checks against ESXi / vCenter management endpoints.
//!
//! Each target gets one connect, read-`about`, disconnect cycle. Per-target
//! failures become [`CheckOutcome`] values; only preconditions (no targets,
//! client not compiled in) are returned as errors.

#[cfg(feature = "vsphere")]
pub mod vsphere;

use crate::config::Config;
use crate::config::types::EsxiTesterConfig;
use crate::core::errors::{ConfigError, LahmaError};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 443;

const CLIENT_MISSING: &str =
    "The vSphere client is required for the ESXi module but this build does not include it \
     (enable the 'vsphere' feature).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AboutInfo {
    pub full_name: String,
    pub version: String,
    pub api_version: String,
}

/// Why a connection attempt produced no session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The endpoint answered with an API fault.
    Fault(String),
    TimedOut,
    Resolve(String),
    /// Refused, unreachable, reset or TLS handshake failure.
    Connection(String),
    Unexpected(String),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fault(msg) => write!(f, "API fault: {}", msg),
            Self::TimedOut => f.write_str("timed out"),
            Self::Resolve(msg) => write!(f, "resolution failed: {}", msg),
            Self::Connection(msg) => write!(f, "connection failed: {}", msg),
            Self::Unexpected(msg) => f.write_str(msg),
        }
    }
}

/// Opens sessions to a management endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Whether the client backing this connector is usable in this build.
    fn is_available(&self) -> bool {
        true
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Session, ConnectError>;
}

#[async_trait]
pub trait Session: Send {
    fn about(&self) -> Option<&AboutInfo>;

    async fn disconnect(self) -> Result<(), ConnectError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Connected(AboutInfo),
    /// A session was established but the endpoint reported no metadata.
    NoMetadata,
    ApiFault(String),
    TimedOut { seconds: u64 },
    Resolve(String),
    Connection(String),
    Unexpected(String),
    InvalidFormat,
}

impl CheckOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    fn from_connect_error(err: ConnectError, timeout: Duration) -> Self {
        match err {
            ConnectError::Fault(msg) => Self::ApiFault(msg),
            ConnectError::TimedOut => Self::TimedOut {
                seconds: timeout.as_secs(),
            },
            ConnectError::Resolve(msg) => Self::Resolve(msg),
            ConnectError::Connection(msg) => Self::Connection(msg),
            ConnectError::Unexpected(msg) => Self::Unexpected(msg),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(about) => write!(
                f,
                "Successfully connected. Product: {}, Version: {}, API Version: {}",
                about.full_name, about.version, about.api_version
            ),
            Self::NoMetadata => {
                f.write_str("Connection attempt returned no service instance metadata.")
            }
            Self::ApiFault(msg) => write!(f, "VMware API error: {}", msg),
            Self::TimedOut { seconds } => {
                write!(f, "Connection timed out after {} seconds.", seconds)
            }
            Self::Resolve(msg) => write!(f, "DNS resolution error: {}", msg),
            Self::Connection(msg) => write!(f, "Connection error: {}", msg),
            Self::Unexpected(msg) => {
                write!(f, "An unexpected error occurred during connection: {}", msg)
            }
            Self::InvalidFormat => f.write_str("Invalid format (expected 'host' or 'host:port')."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// The target string exactly as configured.
    pub target: String,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn success(&self) -> bool {
        self.outcome.success()
    }

    pub fn message(&self) -> String {
        self.outcome.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Results in configuration order. Duplicate targets keep one entry each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub fn summary(&self) -> Summary {
        self.results.iter().fold(Summary::default(), |mut acc, result| {
            if result.success() {
                acc.succeeded += 1;
            } else {
                acc.failed += 1;
            }
            acc
        })
    }

    fn log(&self) {
        tracing::info!("--- ESXi Check Results ---");
        for result in &self.results {
            if result.success() {
                tracing::info!("[+] Target: {} - SUCCESS: {}", result.target, result.message());
            } else {
                tracing::warn!("[-] Target: {} - FAILED: {}", result.target, result.message());
            }
        }
        let summary = self.summary();
        tracing::info!(
            "Summary: {} successful connection(s), {} failed connection/check(s).",
            summary.succeeded,
            summary.failed
        );
    }
}

/// Split `host` or `host:port`. `None` when the port segment is not a valid
/// port number.
pub fn parse_target(entry: &str) -> Option<(String, u16)> {
    match entry.split_once(':') {
        Some((host, port)) => {
            let port = port.trim().parse::<u16>().ok()?;
            Some((host.to_string(), port))
        }
        None => Some((entry.to_string(), DEFAULT_PORT)),
    }
}

pub struct EsxiChecker<C> {
    connector: C,
}

impl<C: Connector> EsxiChecker<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// One connect / read-about / disconnect cycle. Only a missing client is
    /// an error; every network failure is folded into the outcome.
    pub async fn check(&self, host: &str, port: u16, timeout: Duration) -> Result<CheckOutcome, LahmaError> {
        if !self.connector.is_available() {
            return Err(LahmaError::environment(CLIENT_MISSING));
        }

        tracing::info!(
            "Checking ESXi target: {}:{} (Timeout: {}s)",
            host,
            port,
            timeout.as_secs()
        );

        let session = match self.connector.connect(host, port, timeout).await {
            Ok(session) => session,
            Err(err) => {
                let outcome = CheckOutcome::from_connect_error(err, timeout);
                log_failure(host, port, &outcome);
                return Ok(outcome);
            }
        };

        let outcome = match session.about() {
            Some(about) => CheckOutcome::Connected(about.clone()),
            None => CheckOutcome::NoMetadata,
        };
        match &outcome {
            CheckOutcome::Connected(_) => tracing::info!("{}", outcome),
            _ => tracing::warn!("{}", outcome),
        }

        match session.disconnect().await {
            Ok(()) => tracing::debug!("Disconnected from {}:{}", host, port),
            Err(err) => tracing::warn!("Failed to disconnect from {}:{}: {}", host, port, err),
        }

        Ok(outcome)
    }

    /// Check every configured target in order, one at a time.
    pub async fn run(&self, config: &EsxiTesterConfig) -> Result<CheckReport, LahmaError> {
        if config.targets.is_empty() {
            return Err(ConfigError::Empty("ESXi targets", "esxi_tester.targets").into());
        }
        if !self.connector.is_available() {
            return Err(LahmaError::environment(CLIENT_MISSING));
        }

        tracing::warn!("Executing SAFE checks against configured ESXi targets.");
        tracing::warn!("Ensure you have AUTHORIZATION before scanning any targets.");

        let timeout = Duration::from_secs(config.check_timeout);
        let mut results = Vec::with_capacity(config.targets.len());

        for entry in &config.targets {
            let outcome = match parse_target(entry) {
                Some((host, port)) => self.check(&host, port, timeout).await?,
                None => {
                    tracing::error!("Invalid target format: '{}'. Skipping.", entry);
                    CheckOutcome::InvalidFormat
                }
            };
            results.push(CheckResult {
                target: entry.clone(),
                outcome,
            });
        }

        let report = CheckReport { results };
        report.log();
        Ok(report)
    }
}

fn log_failure(host: &str, port: u16, outcome: &CheckOutcome) {
    match outcome {
        CheckOutcome::TimedOut { .. } | CheckOutcome::Connection(_) => {
            tracing::warn!("{} Target: {}:{}", outcome, host, port)
        }
        CheckOutcome::Resolve(_) => tracing::error!("{} Target: {}", outcome, host),
        _ => tracing::error!("Failed to check {}:{} - {}", host, port, outcome),
    }
}

#[cfg(feature = "vsphere")]
fn default_checker() -> EsxiChecker<vsphere::VsphereConnector> {
    EsxiChecker::new(vsphere::VsphereConnector)
}

#[cfg(not(feature = "vsphere"))]
fn default_checker() -> EsxiChecker<unavailable::MissingClient> {
    EsxiChecker::new(unavailable::MissingClient)
}

#[cfg(not(feature = "vsphere"))]
mod unavailable {
    use super::{AboutInfo, ConnectError, Connector, Session};
    use async_trait::async_trait;
    use std::time::Duration;

    pub struct MissingClient;

    pub struct NoSession;

    #[async_trait]
    impl Connector for MissingClient {
        type Session = NoSession;

        fn is_available(&self) -> bool {
            false
        }

        async fn connect(&self, _: &str, _: u16, _: Duration) -> Result<NoSession, ConnectError> {
            Err(ConnectError::Unexpected(super::CLIENT_MISSING.to_string()))
        }
    }

    #[async_trait]
    impl Session for NoSession {
        fn about(&self) -> Option<&AboutInfo> {
            None
        }

        async fn disconnect(self) -> Result<(), ConnectError> {
            Ok(())
        }
    }
}

/// Module entry point.
pub async fn run(config: &Config) -> Result<(), LahmaError> {
    tracing::info!("--- Starting ESXi Tester Module ---");
    default_checker().run(&config.esxi_tester).await?;
    tracing::info!("--- ESXi Tester Module Finished ---");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct MockSession {
        about: Option<AboutInfo>,
        disconnect_fails: bool,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Session for MockSession {
        fn about(&self) -> Option<&AboutInfo> {
            self.about.as_ref()
        }

        async fn disconnect(self) -> Result<(), ConnectError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.disconnect_fails {
                Err(ConnectError::Connection("reset by peer".to_string()))
            } else {
                Ok(())
            }
        }
    }

    type Behaviour = Box<dyn Fn(&str, u16) -> Result<Option<AboutInfo>, ConnectError> + Send + Sync>;

    struct MockConnector {
        available: bool,
        disconnect_fails: bool,
        behaviour: Behaviour,
        calls: Mutex<Vec<(String, u16)>>,
        disconnects: Arc<AtomicUsize>,
    }

    impl MockConnector {
        fn new(
            behaviour: impl Fn(&str, u16) -> Result<Option<AboutInfo>, ConnectError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                available: true,
                disconnect_fails: false,
                behaviour: Box::new(behaviour),
                calls: Mutex::new(Vec::new()),
                disconnects: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn calls(&self) -> Vec<(String, u16)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Session = MockSession;

        fn is_available(&self) -> bool {
            self.available
        }

        async fn connect(&self, host: &str, port: u16, _timeout: Duration) -> Result<MockSession, ConnectError> {
            self.calls.lock().unwrap().push((host.to_string(), port));
            (self.behaviour)(host, port).map(|about| MockSession {
                about,
                disconnect_fails: self.disconnect_fails,
                disconnects: self.disconnects.clone(),
            })
        }
    }

    fn esxi_about() -> AboutInfo {
        AboutInfo {
            full_name: "VMware ESXi 7.0.3 build-20036589".to_string(),
            version: "7.0.3".to_string(),
            api_version: "7.0.3.0".to_string(),
        }
    }

    fn targets(items: &[&str]) -> EsxiTesterConfig {
        EsxiTesterConfig {
            targets: items.iter().map(|s| s.to_string()).collect(),
            check_timeout: 10,
        }
    }

    #[rstest]
    #[case("10.0.0.1", Some(("10.0.0.1", 443)))]
    #[case("esx01.lab:8443", Some(("esx01.lab", 8443)))]
    #[case("esx01.lab: 902", Some(("esx01.lab", 902)))]
    #[case("badport:notanumber", None)]
    #[case("host:", None)]
    #[case("host:70000", None)]
    fn test_parse_target(#[case] entry: &str, #[case] expected: Option<(&str, u16)>) {
        let expected = expected.map(|(host, port)| (host.to_string(), port));
        assert_eq!(parse_target(entry), expected);
    }

    #[tokio::test]
    async fn test_valid_and_malformed_targets() {
        let checker = EsxiChecker::new(MockConnector::new(|_, _| Ok(Some(esxi_about()))));
        let report = checker
            .run(&targets(&["10.0.0.5:8443", "badport:notanumber"]))
            .await
            .unwrap();

        assert_eq!(checker.connector.calls(), vec![("10.0.0.5".to_string(), 8443)]);
        assert_eq!(report.results.len(), 2);
        assert!(report.results[0].success());
        assert_eq!(report.results[1].target, "badport:notanumber");
        assert!(!report.results[1].success());
        assert!(report.results[1].message().starts_with("Invalid format"));
        assert_eq!(report.summary(), Summary { succeeded: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_success_message_and_disconnect() {
        let checker = EsxiChecker::new(MockConnector::new(|_, _| Ok(Some(esxi_about()))));
        let outcome = checker.check("esx01", 443, Duration::from_secs(5)).await.unwrap();

        assert_eq!(
            outcome.to_string(),
            "Successfully connected. Product: VMware ESXi 7.0.3 build-20036589, \
             Version: 7.0.3, API Version: 7.0.3.0"
        );
        assert_eq!(checker.connector.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_failure_but_still_disconnects() {
        let checker = EsxiChecker::new(MockConnector::new(|_, _| Ok(None)));
        let outcome = checker.check("esx01", 443, Duration::from_secs(5)).await.unwrap();

        assert_eq!(outcome, CheckOutcome::NoMetadata);
        assert!(!outcome.success());
        assert_eq!(checker.connector.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_failure_keeps_result() {
        let mut connector = MockConnector::new(|_, _| Ok(Some(esxi_about())));
        connector.disconnect_fails = true;
        let checker = EsxiChecker::new(connector);

        let outcome = checker.check("esx01", 443, Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success());
    }

    #[rstest]
    #[case(ConnectError::Fault("Cannot complete login".into()), "VMware API error: Cannot complete login")]
    #[case(ConnectError::TimedOut, "Connection timed out after 7 seconds.")]
    #[case(ConnectError::Resolve("no such host".into()), "DNS resolution error: no such host")]
    #[case(ConnectError::Connection("refused".into()), "Connection error: refused")]
    #[case(ConnectError::Unexpected("boom".into()), "An unexpected error occurred during connection: boom")]
    #[tokio::test]
    async fn test_failure_classification(#[case] error: ConnectError, #[case] expected: &str) {
        let checker = EsxiChecker::new(MockConnector::new(move |_, _| Err(error.clone())));
        let outcome = checker.check("esx01", 443, Duration::from_secs(7)).await.unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.to_string(), expected);
        assert_eq!(checker.connector.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let checker = EsxiChecker::new(MockConnector::new(|host, _| match host {
            "down" => Err(ConnectError::Connection("refused".to_string())),
            _ => Ok(Some(esxi_about())),
        }));
        let report = checker.run(&targets(&["down", "up", "up"])).await.unwrap();

        let kept: Vec<_> = report.results.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(kept, vec!["down", "up", "up"]);
        assert_eq!(report.summary(), Summary { succeeded: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_empty_targets_is_config_error() {
        let checker = EsxiChecker::new(MockConnector::new(|_, _| Ok(None)));
        let err = checker.run(&targets(&[])).await.unwrap_err();

        assert!(err.is_config());
        assert!(checker.connector.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_client_is_environment_error() {
        let mut connector = MockConnector::new(|_, _| Ok(None));
        connector.available = false;
        let checker = EsxiChecker::new(connector);

        let err = checker.run(&targets(&["10.0.0.1"])).await.unwrap_err();
        assert!(matches!(err, LahmaError::Environment(_)));
        let err = checker.check("10.0.0.1", 443, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LahmaError::Environment(_)));
        assert!(checker.connector.calls().is_empty());
    }
}
