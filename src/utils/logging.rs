use anyhow::Result;
use chrono::Local;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry, reload, util::SubscriberInitExt};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Third-party targets kept at WARNING or quieter.
const NOISY_TARGETS: &[&str] = &["hyper", "reqwest"];

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type Sinks = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Reload handles of the process-wide subscriber, set by the first `init`.
struct Installed {
    filter: reload::Handle<EnvFilter, Registry>,
    sinks: reload::Handle<Sinks, FilteredRegistry>,
}

static INSTALLED: OnceLock<Installed> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Case-insensitive; accepts `WARN` as well as `WARNING`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Level named in the config file, INFO when unrecognised.
    pub fn from_config(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Info)
    }

    pub fn filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error | Self::Critical => LevelFilter::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: LogLevel,
    /// File name (or path) for the file sink; `None` logs to the console only.
    pub file: Option<String>,
}

/// What `init` actually installed.
#[derive(Debug)]
pub struct LogHandle {
    file: Option<PathBuf>,
}

impl LogHandle {
    /// Where the file sink writes, if one is active.
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// `timestamp - target - SEVERITY - message`
struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format(TIMESTAMP_FORMAT),
            meta.target(),
            severity(meta.level())
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn severity(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "TRACE",
        Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARNING",
        Level::ERROR => "ERROR",
    }
}

fn build_filter(level: LogLevel) -> EnvFilter {
    let base = level.filter();
    let pinned = base.min(LevelFilter::WARN);
    let mut directives = base.to_string();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{}={}", target, pinned));
    }
    EnvFilter::new(directives)
}

#[derive(Debug)]
enum FileSink {
    Primary(PathBuf, File),
    Fallback(PathBuf, File, std::io::Error),
    Unavailable(PathBuf, String),
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Open `name` under the install directory, else under the home directory.
fn open_file_sink(name: &str, install_dir: Option<&Path>, home_dir: Option<&Path>) -> FileSink {
    let primary = match install_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    };

    let primary_err = match open_append(&primary) {
        Ok(file) => return FileSink::Primary(primary, file),
        Err(e) => e,
    };

    let Some(home) = home_dir else {
        return FileSink::Unavailable(primary, format!("{} (no home directory)", primary_err));
    };
    let file_name = Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(name));
    let fallback = home.join(file_name);

    match open_append(&fallback) {
        Ok(file) => FileSink::Fallback(fallback, file, primary_err),
        Err(e) => FileSink::Unavailable(
            primary,
            format!("{}; fallback {} failed: {}", primary_err, fallback.display(), e),
        ),
    }
}

fn install_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Subscriber for the window before `init` runs: warnings and errors only,
/// on stderr.
pub fn bootstrap() -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(LevelFilter::WARN).with(
        tracing_subscriber::fmt::layer()
            .event_format(LineFormat)
            .with_writer(std::io::stderr),
    )
}

/// Console on stdout plus an optional append-mode file sink.
fn build_sinks(file: Option<&File>) -> std::io::Result<Sinks> {
    let console = tracing_subscriber::fmt::layer::<FilteredRegistry>()
        .event_format(LineFormat)
        .with_writer(std::io::stdout);

    let file_layer = match file {
        Some(file) => Some(
            tracing_subscriber::fmt::layer::<FilteredRegistry>()
                .event_format(LineFormat)
                .with_ansi(false)
                .with_writer(Mutex::new(file.try_clone()?)),
        ),
        None => None,
    };

    Ok(console.and_then(file_layer).boxed())
}

/// Install the process-wide subscriber. Calling it again swaps the level
/// filter and sinks of the installed one, so the last call wins. File
/// problems degrade to console-only.
pub fn init(settings: &LogSettings) -> Result<LogHandle> {
    let sink = settings
        .file
        .as_deref()
        .map(|name| open_file_sink(name, install_dir().as_deref(), home_dir().as_deref()));

    let (file, file_path) = match &sink {
        Some(FileSink::Primary(path, file)) | Some(FileSink::Fallback(path, file, _)) => {
            (Some(file), Some(path.clone()))
        }
        _ => (None, None),
    };

    let filter = build_filter(settings.level);
    let sinks = build_sinks(file)?;

    match INSTALLED.get() {
        Some(installed) => {
            installed
                .filter
                .reload(filter)
                .map_err(|e| anyhow::anyhow!("Failed to reload log filter: {}", e))?;
            installed
                .sinks
                .reload(sinks)
                .map_err(|e| anyhow::anyhow!("Failed to reload log sinks: {}", e))?;
        }
        None => {
            let (filter_layer, filter) = reload::Layer::new(filter);
            let (sinks_layer, sinks) = reload::Layer::new(sinks);
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(sinks_layer)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            let _ = INSTALLED.set(Installed { filter, sinks });
        }
    }

    match sink {
        Some(FileSink::Fallback(path, _, reason)) => {
            tracing::warn!(
                "Install directory not writable ({}), logging to: {}",
                reason,
                path.display()
            );
        }
        Some(FileSink::Unavailable(path, reason)) => {
            tracing::error!("Failed to set up file logging to {}: {}", path.display(), reason);
        }
        _ => {}
    }

    match &file_path {
        Some(path) => tracing::info!(
            "Logging configured with level {}. Output also sent to: {}",
            settings.level,
            path.display()
        ),
        None => tracing::info!(
            "Logging configured with level {}. Output to console only.",
            settings.level
        ),
    }

    Ok(LogHandle { file: file_path })
}
