//! Logging errors

/// Result alias for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors from installing the logger
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level directive is not a valid `EnvFilter`
    #[error("invalid log filter {0}")]
    Filter(String),

    /// The global subscriber could not be installed
    #[error("failed to install logger: {0}")]
    Init(String),
}
