//! Logger builder implementation

use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Format layer with the display options applied.
macro_rules! create_fmt_layer {
    ($kind:ident, $display:expr) => {{
        let display = $display;
        fmt::layer()
            .$kind()
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source)
            .with_thread_ids(display.thread_ids)
    }};
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// The filter this builder would install.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Filter`] if the level directive does not parse.
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {e}", self.config.level)))
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn init(self) -> LogResult<()> {
        let filter = self.filter()?;
        let display = &self.config.display;
        let registry = Registry::default().with(filter);

        let installed = match self.config.format {
            Format::Pretty => registry.with(create_fmt_layer!(pretty, display)).try_init(),
            Format::Compact => registry.with(create_fmt_layer!(compact, display)).try_init(),
            Format::Json => registry
                .with(
                    create_fmt_layer!(json, display)
                        .with_ansi(false)
                        .flatten_event(display.flatten)
                        .with_current_span(true),
                )
                .try_init(),
        };
        installed.map_err(|e| LogError::Init(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = %self.config.format,
            "logger initialized"
        );
        Ok(())
    }
}
