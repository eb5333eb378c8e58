//! Structured logging utilities for batchcache
//!
//! Diagnostics go to stderr through `tracing`; stdout is reserved for progress
//! lines and command output.
//!
//! # Log Format Conventions
//!
//! - `scene`: Scene file being processed
//! - `unit`: Cache node path (e.g. `/obj/sim/filecache1`)
//! - `mode`: Batch execution mode ("sequential", "parallel")
//! - `frames_done` / `frames_total`: Completion progress of a unit
//! - `status`: Outcome of a unit ("success", "not_found", "timed_out", ...)
//!
//! # Examples
//!
//! ```rust,ignore
//! use tracing::info;
//!
//! info!(
//!     unit = %unit,
//!     frames_done = 12,
//!     frames_total = 100,
//!     "cache progress"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Custom formatter that shows "batchcache" instead of full module path
struct BatchcacheFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for BatchcacheFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(
                writer,
                "{}{:5}(batchcache)\x1b[0m: ",
                level_style,
                meta.level()
            )?;
        } else {
            write!(writer, "{:5}(batchcache): ", meta.level())?;
        }

        // Bridge output keeps its target so it can be told apart
        if meta.target() == "batchcache::bridge" {
            write!(writer, "[bridge] ")?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    Pretty,
    /// Plain format (for CI and farm logs)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Read `BATCHCACHE_LOG_FORMAT`, falling back to `default`
    ///
    /// Without either, CI gets compact output and everything else pretty.
    pub fn from_env(default: Option<&str>) -> Self {
        std::env::var("BATCHCACHE_LOG_FORMAT")
            .ok()
            .and_then(|v| Self::parse(&v))
            .or_else(|| default.and_then(Self::parse))
            .unwrap_or_else(|| {
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            })
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "batchcache=trace"); wins over `level`
/// - `BATCHCACHE_LOG_FORMAT`: Set format ("pretty", "compact", "json"); wins over `format`
/// - `CI`: If set, defaults to compact format
pub fn init(level: Option<&str>, format: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match LogFormat::from_env(format) {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .event_format(BatchcacheFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .event_format(BatchcacheFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("batchcache: logging already initialized: {}", e);
    }
}

/// Status values for the `status` field
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const NOT_FOUND: &str = "not_found";
    pub const TRIGGER_FAILED: &str = "trigger_failed";
    pub const TIMED_OUT: &str = "timed_out";
    pub const CANCELLED: &str = "cancelled";
    pub const FATAL: &str = "fatal";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" compact "), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
