//! Subscriber setup for the sessionkeep binaries
//!
//! Library code only emits `tracing` events; whoever owns `main` decides
//! where they go by calling [`init_logging`].

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// `[logging]` section of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Attach source file and line to each event
    pub include_location: bool,
    pub include_thread: bool,
    /// Write to `log_file_path` instead of stderr
    pub log_to_file: bool,
    pub log_file_path: Option<String>,
    /// Emit span close events with timings
    pub enable_performance_monitoring: bool,
    /// Extra `EnvFilter` directives, e.g. `sqlx=warn`
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            log_to_file: false,
            log_file_path: None,
            enable_performance_monitoring: false,
            filter_directives: vec![
                "sessionkeep_core=info".to_string(),
                "sessionkeep_store=info".to_string(),
                "sqlx=warn".to_string(),
            ],
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Pick the sink for log lines: an append-only file or stderr.
fn make_writer(config: &LoggingConfig) -> io::Result<BoxMakeWriter> {
    if !config.log_to_file {
        return Ok(BoxMakeWriter::new(io::stderr));
    }

    let path = config.log_file_path.as_deref().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "log_file_path is required when log_to_file is set",
        )
    })?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`; `filter_directives` are layered on top of
/// either. Calling this twice is an error.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = config.filter_directives.iter().try_fold(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
        |filter, directive| directive.parse().map(|d| filter.add_directive(d)),
    )?;

    let span_events = if config.enable_performance_monitoring {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(make_writer(config)?)
        .with_ansi(!config.log_to_file)
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread);

    let layer: BoxedLayer = match config.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;

    Ok(())
}

/// Timing helpers for store maintenance paths
pub mod performance {
    use std::time::Instant;
    use tracing::{info_span, Instrument};

    /// Run `future` inside a `timed` span and report how long it took.
    pub async fn measure_async<F, T>(operation: &str, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let started = Instant::now();
        let output = future.instrument(info_span!("timed", operation)).await;
        tracing::debug!(
            target: "sessionkeep::timing",
            operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Timed operation finished"
        );
        output
    }
}

/// `info` event marking the start of a named operation
#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr) => {
        $crate::tracing::info!(
            operation = $operation,
            "Operation started"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            operation = $operation,
            $($field)*,
            "Operation started"
        );
    };
}

/// `info` event marking a named operation as done
#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr) => {
        $crate::tracing::info!(
            operation = $operation,
            "Operation finished"
        );
    };
    ($operation:expr, $($field:tt)*) => {
        $crate::tracing::info!(
            operation = $operation,
            $($field)*,
            "Operation finished"
        );
    };
}

/// `error` event carrying the failure of a named operation
#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr) => {
        $crate::tracing::error!(
            operation = $operation,
            error = %$error,
            "Operation failed"
        );
    };
    ($operation:expr, $error:expr, $($field:tt)*) => {
        $crate::tracing::error!(
            operation = $operation,
            error = %$error,
            $($field)*,
            "Operation failed"
        );
    };
}
