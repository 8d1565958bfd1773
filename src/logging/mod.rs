//! Logging for the yield service
//!
//! Structured logging through `tracing`, printed to stdout in one of three
//! formats and optionally mirrored into a daily rolling file.
//!
//! ```rust,no_run
//! use bittensor_apy::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::from_env().with_format(LogFormat::Json);
//! init_logging(&config);
//! ```

pub mod format;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Once, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub use format::{LineFormatter, LineStyle};

static INIT: Once = Once::new();

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the non-blocking file writer alive for the life of the process
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "apy-server.log";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// `YYYY-MM-DD HH:MM:SS | LEVEL | target | message`
    #[default]
    Text,
    /// Newline delimited JSON
    Json,
    /// `[LEVEL] message`
    Compact,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Compact => write!(f, "compact"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!(
                "Invalid log format '{}'. Valid options: text, json, compact",
                s
            )),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level DEBUG
    pub debug: bool,
    /// Minimum level TRACE, wins over `debug`
    pub trace: bool,
    /// Mirror output into a daily rolling file
    pub record_log: bool,
    /// Directory for log files, `~` is expanded
    pub logging_dir: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            trace: false,
            record_log: false,
            logging_dir: "~/.bittensor-apy/logs".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_file_logging(mut self, enabled: bool) -> Self {
        self.record_log = enabled;
        self
    }

    pub fn with_logging_dir(mut self, dir: impl Into<String>) -> Self {
        self.logging_dir = dir.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Load configuration from environment variables
    ///
    /// - `APY_DEBUG`: enable debug level (any value)
    /// - `APY_TRACE`: enable trace level (any value)
    /// - `APY_LOG_FORMAT`: text, json or compact
    /// - `APY_LOG_DIR`: enables file logging into this directory
    ///
    /// `RUST_LOG` still takes precedence over the level at init time.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if std::env::var("APY_DEBUG").is_ok() {
            config.debug = true;
        }

        if std::env::var("APY_TRACE").is_ok() {
            config.trace = true;
        }

        if let Ok(format) = std::env::var("APY_LOG_FORMAT") {
            match format.parse() {
                Ok(f) => config.format = f,
                Err(e) => eprintln!("Warning: {}", e),
            }
        }

        if let Ok(dir) = std::env::var("APY_LOG_DIR") {
            config.logging_dir = dir;
            config.record_log = true;
        }

        config
    }

    fn level(&self) -> Level {
        if self.trace {
            Level::TRACE
        } else if self.debug {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    fn expand_path(&self) -> PathBuf {
        let path = &self.logging_dir;
        if let Some(stripped) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        }
        PathBuf::from(path)
    }

    fn env_filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(format!(
                "{},hyper=warn,h2=warn,jsonrpsee=warn,tower_http=info",
                self.level()
            ))
        }
    }
}

/// Initialize logging. Only the first call has an effect.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        install(config);
        INITIALIZED.store(true, Ordering::SeqCst);
    });
}

/// Initialize logging with INFO level text output
pub fn init_default_logging() {
    init_logging(&LoggingConfig::default());
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn output_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer()
            .event_format(LineFormatter::full())
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .event_format(LineFormatter::compact())
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(writer)
            .with_ansi(false)
            .boxed(),
    }
}

fn file_writer(config: &LoggingConfig) -> Option<NonBlocking> {
    let log_dir = config.expand_path();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_dir, e
        );
        return None;
    }
    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

fn install(config: &LoggingConfig) {
    let mut layers: Vec<BoxedLayer> = vec![output_layer(config.format, io::stdout, true)];

    if config.record_log {
        if let Some(writer) = file_writer(config) {
            layers.push(output_layer(config.format, writer, false));
        }
    }

    // A subscriber may already be installed by a host process or test harness.
    if let Err(e) = tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter())
        .try_init()
    {
        eprintln!("Warning: logging already initialized: {}", e);
    }
}
