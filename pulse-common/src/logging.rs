//! Logging setup for the Pulse CLI.
//!
//! Results go to stdout, so every log line goes to stderr. Noisy HTTP
//! modules (hyper, reqwest, h2, rustls) are held at `warn` so per-batch
//! analysis logs stay readable. `RUST_LOG` replaces the whole filter.

use std::io::IsTerminal;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Library modules filtered to warn level.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Output style for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One flattened JSON object per event, for piping into log tools
    Json,
    /// Compact human-readable lines, colored when stderr is a terminal
    Pretty,
}

impl LogFormat {
    /// Anything other than "json" is treated as pretty.
    pub fn parse(format: &str) -> Self {
        if format.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Filter directives for `log_level` with noisy modules capped at warn.
pub fn filter_directives(log_level: &str) -> String {
    std::iter::once(log_level.trim().to_lowercase())
        .chain(NOISY_MODULES.iter().map(|module| format!("{module}=warn")))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(log_level: &str, log_format: &str) {
    let format = LogFormat::parse(log_format);
    let layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let installed = tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(log_level, ?format, "Logging initialized");
    }
}

pub fn init_from_config(config: &ObservabilityConfig) {
    init_logging(&config.log_level, &config.log_format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging("debug", "pretty");
        init_logging("info", "json");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_directives_cap_http_stack() {
        let directives = filter_directives("DEBUG");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(directives.contains("hyper=warn"));
        assert_eq!(directives.split(',').count(), NOISY_MODULES.len() + 1);
    }
}
