//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

impl Config {
    /// Create configuration from environment variables
    ///
    /// `IPAM_LOG_PRESET` picks a starting point (`development` or
    /// `production`), then `IPAM_LOG` (falling back to `RUST_LOG`) sets the
    /// filter and `IPAM_LOG_FORMAT` the format. Unknown presets and formats
    /// are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::default().with_env_overrides(lookup)
    }

    /// Apply environment overrides on top of this configuration.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(preset) = lookup("IPAM_LOG_PRESET").and_then(|p| Self::preset(&p).ok()) {
            self = preset;
        }

        if let Some(level) = lookup("IPAM_LOG").or_else(|| lookup("RUST_LOG")) {
            self.level = level;
        }

        if let Some(format) = lookup("IPAM_LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.format = format;
        }

        self.display.parse_env(&lookup);
        self
    }

    /// Preset by name: `development` (`dev`) or `production` (`prod`).
    pub fn preset(name: &str) -> Result<Self, String> {
        match name.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::development()),
            "production" | "prod" => Ok(Self::production()),
            other => Err(format!(
                "unknown log preset `{other}` (expected development or production)"
            )),
        }
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
        }
    }
}
