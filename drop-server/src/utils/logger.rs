//! Logging Infrastructure
//!
//! Structured logging for development and production:
//! - Console output (pretty or JSON)
//! - Daily rotating application logs (last 14 files kept)
//! - Separate security log for rejected admin access

use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

/// security 日志的 tracing target，见 [`security_log!`](crate::security_log)
pub const SECURITY_TARGET: &str = "security";

const MAX_LOG_FILES: usize = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn rolling_appender(dir: &Path, prefix: &str) -> anyhow::Result<RollingFileAppender> {
    fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(appender)
}

fn file_layer<F>(appender: RollingFileAppender, json: bool, filter: F) -> BoxedLayer
where
    F: Fn(&tracing::Metadata<'_>) -> bool + Send + Sync + 'static,
{
    let writer = std::sync::Mutex::new(appender);
    if json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_writer(writer)
            .with_filter(filter_fn(filter))
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter_fn(filter))
            .boxed()
    }
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug"); `RUST_LOG` overrides it
/// * `json_format` - JSON output (production) or pretty output (development)
/// * `log_dir` - Optional directory for file logging; `app/` and `security/`
///   subdirectories are created inside it
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };
    layers.push(console_layer);

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);

        let app_log = rolling_appender(&log_dir.join("app"), "app")?;
        layers.push(file_layer(app_log, json_format, |meta| {
            meta.target() != SECURITY_TARGET
        }));

        let security_log = rolling_appender(&log_dir.join("security"), "security")?;
        layers.push(file_layer(security_log, json_format, |meta| {
            meta.target() == SECURITY_TARGET
        }));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}
