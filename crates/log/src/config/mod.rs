//! Logger configuration

mod presets;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info` or `ipam_provider=debug,info`
    pub level: String,
    /// Output format
    pub format: Format,
    /// What each line shows
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unknown log format `{other}` (expected pretty, compact or json)"
            )),
        }
    }
}

/// Display options for the fmt layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors
    pub colors: bool,
    /// Source file and line
    pub source: bool,
    /// Event target (module path)
    pub target: bool,
    /// Thread ids
    pub thread_ids: bool,
    /// Put event fields at the top level of JSON output
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            source: false,
            target: true,
            thread_ids: false,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Apply `IPAM_LOG_COLORS` and `IPAM_LOG_SOURCE` overrides.
    pub(crate) fn parse_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(colors) = lookup("IPAM_LOG_COLORS").and_then(|v| parse_bool(&v)) {
            self.colors = colors;
        }
        if let Some(source) = lookup("IPAM_LOG_SOURCE").and_then(|v| parse_bool(&v)) {
            self.source = source;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
