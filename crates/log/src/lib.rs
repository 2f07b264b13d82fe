#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Log
//!
//! `tracing` subscriber setup shared by the IPAM binaries.
//!
//! A [`Config`] picks the filter and one of three output formats; [`init`]
//! installs a registry with an `EnvFilter` and the matching `fmt` layer.
//!
//! ```rust,ignore
//! ipam_log::init(&ipam_log::Config::from_env())?;
//! ```

pub mod builder;
pub mod config;
pub mod error;

pub use builder::LoggerBuilder;
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// See [`LoggerBuilder::init`].
pub fn init(config: &Config) -> LogResult<()> {
    LoggerBuilder::from_config(config.clone()).init()
}
