#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Kubernetes Store Driver
//!
//! [`PoolStore`] backed by `IPPool` custom resources on a Kubernetes API
//! server.
//!
//! - `get` reads the object and maps `spec`/`status` onto an [`IpPool`], with
//!   `metadata.resourceVersion` as the version token.
//! - `update` sends a JSON merge patch that carries the read
//!   `resourceVersion`; the API server answers 409 when another writer got
//!   there first, which is surfaced as [`StoreError::Conflict`].
//!
//! Each API round trip is bounded by a timeout (5s unless set with
//! [`KubePoolStore::with_timeout`]) and reported as [`StoreError::Timeout`]
//! when it runs out.
//!
//! Spec and status are written in one call. The `IPPool` CRD must therefore
//! not enable the `status` subresource, or the status half of the patch is
//! silently dropped.

mod convert;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ipam_core::{IpPool, PoolKey, ResourceTypeId};
use ipam_ports::{PoolStore, StoreError};
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool store talking to the Kubernetes API.
#[derive(Clone)]
pub struct KubePoolStore {
    client: Client,
    resource: ApiResource,
    timeout: Duration,
}

impl std::fmt::Debug for KubePoolStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubePoolStore")
            .field("group", &self.resource.group)
            .field("version", &self.resource.version)
            .field("plural", &self.resource.plural)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubePoolStore {
    /// Build a store for pools of type `pool_type` over an existing client.
    pub fn new(client: Client, pool_type: &ResourceTypeId) -> Self {
        let gvk = GroupVersionKind::gvk(pool_type.group(), pool_type.version(), pool_type.kind());
        Self {
            client,
            resource: ApiResource::from_gvk(&gvk),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every API round trip by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect using `kubeconfig` if given, else the in-cluster service
    /// account (falling back to `$KUBECONFIG` / `~/.kube/config`).
    pub async fn connect(
        pool_type: &ResourceTypeId,
        kubeconfig: Option<&Path>,
    ) -> Result<Self, StoreError> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    StoreError::Connection(format!(
                        "failed to read kubeconfig {}: {e}",
                        path.display()
                    ))
                })?;
                let config =
                    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| StoreError::Connection(format!("invalid kubeconfig: {e}")))?;
                Client::try_from(config).map_err(|e| StoreError::Connection(e.to_string()))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?,
        };

        let store = Self::new(client, pool_type);
        tracing::info!(
            group = %store.resource.group,
            version = %store.resource.version,
            plural = %store.resource.plural,
            "connected kubernetes pool store"
        );
        Ok(store)
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl PoolStore for KubePoolStore {
    async fn get(&self, key: &PoolKey) -> Result<IpPool, StoreError> {
        let api = self.api(&key.namespace);
        let object = bounded("get", self.timeout, async {
            api.get(&key.name)
                .await
                .map_err(|e| map_kube_error(key, None, e))
        })
        .await?;
        convert::pool_from_object(key, &object)
    }

    async fn update(&self, pool: &IpPool) -> Result<IpPool, StoreError> {
        let key = pool.key();
        let patch = convert::conditional_patch(pool)?;
        let api = self.api(&key.namespace);
        let object = bounded("patch", self.timeout, async {
            api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map_err(|e| map_kube_error(&key, Some(pool), e))
        })
        .await?;
        convert::pool_from_object(&key, &object)
    }

    fn backend(&self) -> &'static str {
        "kubernetes"
    }
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?limit, "kubernetes api call timed out");
            Err(StoreError::timeout(operation, limit))
        }
    }
}

fn map_kube_error(key: &PoolKey, written: Option<&IpPool>, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::not_found(key),
            409 => StoreError::conflict(key, written.and_then(|p| p.version.as_ref()), None),
            code => StoreError::Internal(format!(
                "api server returned {code} {}: {}",
                response.reason, response.message
            )),
        },
        kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
        kube::Error::HyperError(e) => StoreError::Connection(e.to_string()),
        kube::Error::Service(e) => StoreError::Connection(e.to_string()),
        other => StoreError::Internal(other.to_string()),
    }
}
