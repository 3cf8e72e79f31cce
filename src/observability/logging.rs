//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Filter used when neither the config nor the environment sets one.
const DEFAULT_FILTER: &str = "spacesearch=info,warn";
/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "spacesearch=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// `SPACESEARCH_LOG_FORMAT` and `SPACESEARCH_LOG_FILE` override the
    /// settings; `RUST_LOG` overrides the filter unless `verbose` is set.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let format = std::env::var("SPACESEARCH_LOG_FORMAT")
            .ok()
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        let file = std::env::var("SPACESEARCH_LOG_FILE")
            .ok()
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        let directives = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            std::env::var("RUST_LOG")
                .ok()
                .or_else(|| settings.and_then(|s| s.filter.clone()))
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };
        let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
            tracing::warn!(
                directives = %directives,
                error = %e,
                "Invalid log filter, using default"
            );
            EnvFilter::new(DEFAULT_FILTER)
        });

        Self {
            format,
            filter,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_verbose_uses_debug_filter() {
        let config = LoggingConfig::from_settings(None, true);
        assert_eq!(config.filter.to_string(), EnvFilter::new(VERBOSE_FILTER).to_string());
    }
}
