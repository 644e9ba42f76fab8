//! Tracing/logging configuration for edugate
//!
//! Supports:
//! - Verbosity levels: default (WARN), verbose (INFO), debug (DEBUG), quiet (ERROR), silent (off)
//! - Pretty, JSON or compact output on stderr
//! - An optional log file at the most detailed level compiled in

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const CRATE_TARGET: &str = "edugate";

/// Log output format
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored human-readable output
    #[default]
    Pretty,
    /// Structured JSON output (one JSON object per line)
    Json,
    /// Compact single-line format
    Compact,
}

/// Tracing configuration built from CLI args
#[derive(Debug, Default)]
pub struct TracingConfig {
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    /// No terminal output at all
    pub silent: bool,
    pub format: LogFormat,
    /// Optional log file path (written regardless of terminal level)
    pub log_file: Option<PathBuf>,
}

impl TracingConfig {
    /// Terminal level, or `None` when silent
    ///
    /// DEBUG is compiled out of release builds (`release_max_level_info`), so
    /// it is clamped to INFO there.
    fn terminal_level(&self) -> Option<Level> {
        if self.silent {
            None
        } else if self.quiet {
            Some(Level::ERROR)
        } else if self.debug {
            Some(max_compiled_level())
        } else if self.verbose {
            Some(Level::INFO)
        } else {
            Some(Level::WARN)
        }
    }

    /// Whether a level flag was given explicitly (which then overrides RUST_LOG)
    fn level_specified(&self) -> bool {
        self.verbose || self.debug || self.quiet || self.silent
    }
}

fn max_compiled_level() -> Level {
    if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// `edugate=<level>,warn`: our crate at `level`, dependencies at WARN
fn directive(level: Level) -> String {
    format!("{}={},warn", CRATE_TARGET, level.as_str().to_lowercase())
}

fn terminal_filter(level: Level, cli_specified: bool) -> EnvFilter {
    if cli_specified {
        EnvFilter::new(directive(level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)))
    }
}

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn make_terminal_layer(format: &LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn make_file_layer(file: std::fs::File) -> BoxedLayer {
    fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(file)
        .with_filter(EnvFilter::new(directive(max_compiled_level())))
        .boxed()
}

/// Initialize tracing with the given configuration.
///
/// Subsequent calls are ignored.
pub fn init_tracing(config: TracingConfig) {
    if TRACING_INITIALIZED.set(()).is_err() {
        return;
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(path) = &config.log_file {
        match std::fs::File::create(path) {
            Ok(file) => layers.push(make_file_layer(file)),
            // Subscriber is not up yet, so this cannot go through tracing
            Err(e) => eprintln!("Warning: Failed to create log file {:?}: {}", path, e),
        }
    }

    if let Some(level) = config.terminal_level() {
        let filter = terminal_filter(level, config.level_specified());
        layers.push(make_terminal_layer(&config.format, filter));
    }

    if layers.is_empty() {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
    } else {
        let _ = tracing_subscriber::registry().with(layers).try_init();
    }
}
