//! Tracing initialisation for hosts embedding phasegate.
//!
//! Call [`init_tracing`] (or [`init_from_env`]) once at program start. Later
//! calls are ignored; the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Env var selecting the output format (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "PHASEGATE_LOG_FORMAT";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    /// Newline-delimited JSON, one object per event.
    Json,
}

impl LogFormat {
    /// Anything other than `json` (case-insensitive) is text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Initialise the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_tracing(json: bool, level: Level) {
    let format = if json { LogFormat::Json } else { LogFormat::Text };
    install(format, level);
}

/// Like [`init_tracing`], with the format taken from `PHASEGATE_LOG_FORMAT`.
pub fn init_from_env(level: Level) {
    let format = std::env::var(LOG_FORMAT_ENV)
        .map(|v| LogFormat::parse(&v))
        .unwrap_or(LogFormat::Text);
    install(format, level);
}

fn install(format: LogFormat, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init().ok(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
        init_from_env(Level::INFO);
    }
}
