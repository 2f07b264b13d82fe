//! Webhook error types.

use std::path::PathBuf;

use ipam_ports::StoreError;
use ipam_provider::ProviderError;

/// Why an intercepted operation was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The payload is missing or is not a machine.
    #[error("cannot decode object: {0}")]
    Decode(String),

    /// The allocator refused or failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The mutated object could not be turned into a patch.
    #[error("cannot encode patch: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AdmissionError {
    /// Status code reported in the admission response.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Decode(_) => 400,
            Self::Encode(_) => 500,
            Self::Provider(e) => match e {
                ProviderError::MissingPoolReference
                | ProviderError::NoAddressAvailable { .. }
                | ProviderError::BadRelease { .. }
                | ProviderError::AllocationConflict { .. } => 400,
                ProviderError::NotReady => 503,
                ProviderError::Cancelled => 504,
                ProviderError::Store(StoreError::NotFound { .. }) => 404,
                ProviderError::Store(_) | ProviderError::AlreadyBound => 500,
            },
        }
    }
}

/// Errors from loading the webhook configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override has an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The configuration parsed but makes no sense.
    #[error("invalid config: {0}")]
    Invalid(String),
}
