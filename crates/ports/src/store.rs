//! Pool store port.
//!
//! Defines the versioned read/update primitive that is the only coordination
//! point between webhook replicas.

use async_trait::async_trait;
use ipam_core::{IpPool, PoolKey};

use crate::error::StoreError;

/// Versioned access to pool resources.
///
/// Every pool a store returns carries the [`version`](IpPool::version) it was
/// read at. [`update`](Self::update) succeeds only if that version is still
/// current, and the returned pool carries the new one. There is no other
/// locking: two writers racing on the same pool see exactly one success and
/// one [`StoreError::Conflict`].
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Fetch the current state of a pool.
    async fn get(&self, key: &PoolKey) -> Result<IpPool, StoreError>;

    /// Replace a pool's address lists if `pool.version` is still current.
    ///
    /// Fails with [`StoreError::Conflict`] when another writer got there
    /// first; the caller is expected to re-read and try again.
    async fn update(&self, pool: &IpPool) -> Result<IpPool, StoreError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
