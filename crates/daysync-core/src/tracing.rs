//! Logging setup shared by the daysync binaries.
//!
//! The CLI logs compact lines to stderr at `warn` unless asked for more; the
//! exchange server logs JSON with span events. `RUST_LOG` always wins over
//! the configured default level.
//!
//! ```ignore
//! use daysync_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::cli(verbose))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crate prefixes the default filter applies to.
const CRATE_TARGETS: &[&str] = &[
    "daysync",
    "daysync_core",
    "daysync_google",
    "daysync_exchange",
    "daysync_client",
];

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed.
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive did not parse.
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Structured JSON, one object per event.
    Json,
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to daysync crates when `RUST_LOG` is unset.
    pub default_level: Level,
    /// Line layout.
    pub output_format: TracingOutputFormat,
    /// Include file and line.
    pub include_location: bool,
    /// Include the module path.
    pub include_target: bool,
    /// Include timestamps (compact format only).
    pub include_timestamp: bool,
    /// Emit span open/close events.
    pub include_span_events: bool,
    /// Explicit filter directive, overriding both `RUST_LOG` and the level.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: false,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// CLI preset: quiet by default, debug with locations when `verbose`.
    #[must_use]
    pub fn cli(verbose: bool) -> Self {
        if verbose {
            Self {
                default_level: Level::DEBUG,
                include_location: true,
                include_target: true,
                include_timestamp: false,
                ..Self::default()
            }
        } else {
            Self {
                default_level: Level::WARN,
                include_timestamp: false,
                ..Self::default()
            }
        }
    }

    /// Exchange server preset: JSON lines with span events.
    #[must_use]
    pub fn server() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Json,
            include_location: true,
            include_target: true,
            include_timestamp: true,
            include_span_events: true,
            env_filter: None,
        }
    }

    /// Set the default level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set an explicit filter directive.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Builds the default directive, e.g. `daysync=warn,daysync_core=warn,...`.
    fn default_directive(&self) -> String {
        let level = self.default_level.to_string().to_lowercase();
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a subscriber is already installed or the explicit filter
/// directive is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = match config.env_filter {
        Some(ref filter) => EnvFilter::try_new(filter)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_directive())),
    };

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.output_format {
        TracingOutputFormat::Pretty => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target)
                    .with_span_events(span_events),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target)
                .with_span_events(span_events);

            let layer = if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            };

            let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        TracingOutputFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                fmt::layer()
                    .json()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target)
                    .with_span_events(span_events),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_preset_is_quiet() {
        let config = TracingConfig::cli(false);
        assert_eq!(config.default_level, Level::WARN);
        assert_eq!(config.output_format, TracingOutputFormat::Compact);
        assert!(!config.include_timestamp);
    }

    #[test]
    fn cli_verbose_preset() {
        let config = TracingConfig::cli(true);
        assert_eq!(config.default_level, Level::DEBUG);
        assert!(config.include_location);
    }

    #[test]
    fn server_preset_is_json() {
        let config = TracingConfig::server();
        assert_eq!(config.output_format, TracingOutputFormat::Json);
        assert!(config.include_span_events);
    }

    #[test]
    fn default_directive_covers_all_crates() {
        let directive = TracingConfig::default()
            .with_level(Level::DEBUG)
            .default_directive();
        assert!(directive.contains("daysync_google=debug"));
        assert!(directive.contains("daysync_exchange=debug"));
        assert_eq!(directive.split(',').count(), CRATE_TARGETS.len());
    }

    #[test]
    fn builder_sets_filter() {
        let config = TracingConfig::default().with_env_filter("daysync_google=trace");
        assert_eq!(config.env_filter.as_deref(), Some("daysync_google=trace"));
    }
}
