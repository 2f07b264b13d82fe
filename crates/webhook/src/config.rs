//! Webhook configuration: TOML file, environment overrides, validation.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ipam_core::{IpPool, ResourceTypeId};
use ipam_provider::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Everything the webhook binary needs to start.
///
/// ```toml
/// bind = "0.0.0.0:9876"
/// path = "/mutate-machines"
/// request_timeout = "8s"
///
/// [pool_api]
/// group = "ipam.k8s.io"
/// version = "v1beta1"
/// kind = "IPPool"
///
/// [retry]
/// max_attempts = 5
/// initial_backoff = "10ms"
///
/// [store]
/// backend = "kubernetes"
/// timeout = "5s"
///
/// [log]
/// level = "info"
/// format = "json"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Listen address.
    pub bind: SocketAddr,
    /// Path the API server posts admission reviews to.
    pub path: String,
    /// Budget for one admission request, allocator retries included.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Resource type of the pools the static provider serves.
    pub pool_api: PoolApiConfig,
    /// Conflict retry for the static provider.
    pub retry: RetryPolicy,
    /// Where pools live.
    pub store: StoreConfig,
    /// Logging.
    pub log: ipam_log::Config,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 9876)),
            path: "/mutate-machines".to_owned(),
            request_timeout: Duration::from_secs(8),
            max_body_bytes: 1024 * 1024,
            pool_api: PoolApiConfig::default(),
            retry: RetryPolicy::default(),
            store: StoreConfig::default(),
            log: ipam_log::Config::default(),
        }
    }
}

/// Group, version and kind of the pool custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolApiConfig {
    /// API group.
    pub group: String,
    /// API version.
    pub version: String,
    /// Kind.
    pub kind: String,
}

impl Default for PoolApiConfig {
    fn default() -> Self {
        Self {
            group: "ipam.k8s.io".to_owned(),
            version: "v1beta1".to_owned(),
            kind: "IPPool".to_owned(),
        }
    }
}

impl PoolApiConfig {
    /// Registry key for this resource type.
    pub fn resource_type_id(&self) -> Result<ResourceTypeId, ConfigError> {
        ResourceTypeId::new(&self.group, &self.version, &self.kind)
            .map_err(|e| ConfigError::Invalid(format!("pool_api: {e}")))
    }
}

/// Pool store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local pools, seeded from the config.
    Memory {
        /// Seed pools.
        #[serde(default)]
        pools: Vec<IpPool>,
    },
    /// Pool custom resources on the API server.
    Kubernetes {
        /// Kubeconfig to use instead of the in-cluster service account.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kubeconfig: Option<PathBuf>,
        /// Budget for one API server round trip.
        #[serde(default = "default_api_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Kubernetes {
            kubeconfig: None,
            timeout: default_api_timeout(),
        }
    }
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(5)
}

impl WebhookConfig {
    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without overrides or validation.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `IPAM_WEBHOOK_BIND`, `IPAM_WEBHOOK_PATH` and the logging
    /// variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// [`apply_env`](Self::apply_env) with variables read through `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = lookup("IPAM_WEBHOOK_BIND") {
            self.bind = bind.parse().map_err(|e| ConfigError::Env {
                var: "IPAM_WEBHOOK_BIND",
                reason: format!("`{bind}`: {e}"),
            })?;
        }
        if let Some(path) = lookup("IPAM_WEBHOOK_PATH") {
            self.path = path;
        }
        self.log = std::mem::take(&mut self.log).with_env_overrides(&lookup);
        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "path must be an absolute, non-root path, got `{}`",
                self.path
            )));
        }
        if matches!(self.path.as_str(), "/healthz" | "/readyz") {
            return Err(ConfigError::Invalid(format!(
                "path `{}` collides with a health endpoint",
                self.path
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("request_timeout must be positive".into()));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be positive".into()));
        }
        self.pool_api.resource_type_id()?;
        self.retry
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("retry: {e}")))?;

        if let StoreConfig::Kubernetes { timeout, .. } = &self.store {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid("store.timeout must be positive".into()));
            }
        }

        if let StoreConfig::Memory { pools } = &self.store {
            let mut seen = HashSet::new();
            for pool in pools {
                if pool.namespace.is_empty() || pool.name.is_empty() {
                    return Err(ConfigError::Invalid(
                        "store.pools: every pool needs a namespace and a name".into(),
                    ));
                }
                if !seen.insert(pool.key()) {
                    return Err(ConfigError::Invalid(format!(
                        "store.pools: pool {} defined twice",
                        pool.key()
                    )));
                }
                pool.validate()
                    .map_err(|e| ConfigError::Invalid(format!("store.pools: {e}")))?;
            }
        }
        Ok(())
    }
}
