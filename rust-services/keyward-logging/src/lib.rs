//! Structured logging setup for keyward binaries

use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line (services)
    Json,
    /// Human-readable lines (operator tooling)
    #[default]
    Console,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "console" | "pretty" | "text" => Ok(LogFormat::Console),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize logging in the requested format.
///
/// `RUST_LOG` takes precedence over `default_level`. Calling this twice in
/// one process is a no-op for the second call.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));
    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .try_init(),
        LogFormat::Console => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(service = service_name, format = ?format, "Logging initialized");
    }
}

/// JSON logs for long-running services
pub fn init_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Json);
}

/// Human-readable logs on stderr, keeping stdout free for command output
pub fn init_console_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Console);
}
