//! # Structured Logging
//!
//! The engine only emits `tracing` records. Installing a subscriber is the
//! embedding application's call; these helpers are the default wiring, with
//! `RUST_LOG` overriding the level the caller passes in.
//!
//! Output goes to stderr. Test suites use [`init_test_logging`], which
//! routes records through libtest's capture so they only show for failing
//! tests.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable records.
    #[default]
    Pretty,
    /// One line per record, fields inline.
    Compact,
    /// JSON lines for log aggregation.
    Json,
}

impl LogFormat {
    /// Accepts "json", "compact" or "pretty" (case-insensitive); anything
    /// else is `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g. `"info"` or
/// `"covenant_protocol=debug,covenant_contracts=info"`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn try_init_logging(
    default_level: &str,
    format: LogFormat,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(default_level));
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match format {
        LogFormat::Pretty => registry.with(layer.pretty()).try_init()?,
        LogFormat::Compact => registry.with(layer.compact()).try_init()?,
        LogFormat::Json => registry
            .with(layer.json().with_current_span(false))
            .try_init()?,
    }

    tracing::debug!(?format, "logging initialized");
    Ok(())
}

/// Like [`try_init_logging`], but a second call is a no-op instead of an error.
pub fn init_logging(default_level: &str, format: LogFormat) {
    if try_init_logging(default_level, format).is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

/// Compact records through libtest's output capture. Safe to call from
/// every test; only the first call installs anything.
pub fn init_test_logging(default_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt::layer().compact().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("Compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn repeated_init_does_not_panic() {
        init_test_logging("warn");
        init_logging("warn", LogFormat::Pretty);
        init_logging("warn", LogFormat::Json);
        assert!(try_init_logging("warn", LogFormat::Compact).is_err());
    }
}
