#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM In-Memory Store Driver
//!
//! In-memory pool store implementing the [`PoolStore`] port.
//!
//! Pools live in a `DashMap`; an update compares versions and writes while
//! holding the map's per-key write guard, so the compare-and-swap is atomic
//! with respect to every other reader and writer of the same pool. Versions
//! come from one monotonically increasing counter.
//!
//! Suitable for tests and single-process deployments where durability is not
//! required. Replicas of the webhook do not share an in-memory store.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ipam_core::{Address, IpPool, PoolKey};
//! use ipam_ports::PoolStore;
//! use ipam_store_memory::MemoryPoolStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryPoolStore::new();
//! store.insert(
//!     IpPool::new("ns", "rack-1")
//!         .with_reserved([Address::new("10.0.0.2", "10.0.0.1", "255.255.255.0")]),
//! )?;
//! let pool = store.get(&PoolKey::new("ns", "rack-1")).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use ipam_core::{IpPool, PoolError, PoolKey, ResourceVersion};
use ipam_ports::{PoolStore, StoreError};

/// In-memory, versioned pool store.
#[derive(Debug, Default)]
pub struct MemoryPoolStore {
    pools: DashMap<PoolKey, IpPool>,
    revision: AtomicU64,
}

impl MemoryPoolStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `pools`.
    pub fn with_pools(pools: impl IntoIterator<Item = IpPool>) -> Result<Self, PoolError> {
        let store = Self::new();
        for pool in pools {
            store.insert(pool)?;
        }
        Ok(store)
    }

    /// Add or overwrite a pool, ignoring any version it carries.
    ///
    /// This is the operator-side path (seeding from configuration, test
    /// fixtures); allocators only ever go through [`PoolStore::update`].
    /// Returns the stored copy with its fresh version.
    pub fn insert(&self, mut pool: IpPool) -> Result<IpPool, PoolError> {
        pool.validate()?;
        pool.version = Some(self.next_version());
        tracing::debug!(pool = %pool.key(), version = ?pool.version, "seeded pool");
        self.pools.insert(pool.key(), pool.clone());
        Ok(pool)
    }

    /// Current stored copy of a pool, if any.
    #[must_use]
    pub fn snapshot(&self, key: &PoolKey) -> Option<IpPool> {
        self.pools.get(key).map(|entry| entry.value().clone())
    }

    /// Number of pools held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether the store holds no pools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    fn next_version(&self) -> ResourceVersion {
        let revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        ResourceVersion::new(revision.to_string())
    }
}

#[async_trait]
impl PoolStore for MemoryPoolStore {
    async fn get(&self, key: &PoolKey) -> Result<IpPool, StoreError> {
        self.snapshot(key).ok_or_else(|| StoreError::not_found(key))
    }

    async fn update(&self, pool: &IpPool) -> Result<IpPool, StoreError> {
        let key = pool.key();
        let mut entry = self
            .pools
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(&key))?;

        let stored = entry.value_mut();
        if pool.version.is_none() || stored.version != pool.version {
            return Err(StoreError::conflict(
                &key,
                pool.version.as_ref(),
                stored.version.clone(),
            ));
        }

        stored.reserved_addresses.clone_from(&pool.reserved_addresses);
        stored.allocated_addresses.clone_from(&pool.allocated_addresses);
        stored.version = Some(self.next_version());
        tracing::trace!(pool = %key, version = ?stored.version, "pool updated");
        Ok(stored.clone())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipam_core::Address;
    use pretty_assertions::assert_eq;

    fn addr(ip: &str) -> Address {
        Address::new(ip, "1.2.3.1", "255.255.255.0")
    }

    fn seeded() -> (MemoryPoolStore, PoolKey) {
        let store = MemoryPoolStore::new();
        let pool = store
            .insert(IpPool::new("ns", "n").with_reserved([addr("1.2.3.2"), addr("1.2.3.3")]))
            .unwrap();
        (store, pool.key())
    }

    #[tokio::test]
    async fn get_returns_versioned_copy() {
        let (store, key) = seeded();
        let pool = store.get(&key).await.unwrap();
        assert_eq!(pool.reserved_addresses.len(), 2);
        assert!(pool.version.is_some());
    }

    #[tokio::test]
    async fn get_missing_pool_is_not_found() {
        let store = MemoryPoolStore::new();
        let err = store.get(&PoolKey::new("ns", "missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_with_current_version_bumps_version() {
        let (store, key) = seeded();
        let mut pool = store.get(&key).await.unwrap();
        let before = pool.version.clone();
        pool.take_next_reserved();

        let written = store.update(&pool).await.unwrap();
        assert_ne!(written.version, before);
        assert_eq!(written.allocated_addresses, vec![addr("1.2.3.2")]);
        assert_eq!(store.snapshot(&key).unwrap(), written);
    }

    #[tokio::test]
    async fn stale_update_conflicts_and_leaves_pool_alone() {
        let (store, key) = seeded();
        let mut first = store.get(&key).await.unwrap();
        let mut second = first.clone();

        first.take_next_reserved();
        store.update(&first).await.unwrap();
        let after_first = store.snapshot(&key).unwrap();

        second.take_next_reserved();
        let err = store.update(&second).await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");
        assert_eq!(store.snapshot(&key).unwrap(), after_first);
    }

    #[tokio::test]
    async fn unversioned_update_conflicts() {
        let (store, key) = seeded();
        let mut pool = store.get(&key).await.unwrap();
        pool.version = None;
        assert!(store.update(&pool).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn update_only_rewrites_address_lists() {
        let store = MemoryPoolStore::new();
        store
            .insert(
                IpPool::new("ns", "n")
                    .with_reserved([addr("1.2.3.2")])
                    .with_dns(["8.8.8.8"])
                    .with_ntp("ntp.local"),
            )
            .unwrap();
        let key = PoolKey::new("ns", "n");
        let mut pool = store.get(&key).await.unwrap();
        pool.dns.clear();
        pool.ntp.clear();
        pool.take_next_reserved();

        let written = store.update(&pool).await.unwrap();
        assert_eq!(written.dns, vec!["8.8.8.8"]);
        assert_eq!(written.ntp, "ntp.local");
    }

    #[tokio::test]
    async fn update_missing_pool_is_not_found() {
        let store = MemoryPoolStore::new();
        let mut pool = IpPool::new("ns", "ghost");
        pool.version = Some(ResourceVersion::from("1"));
        assert!(store.update(&pool).await.unwrap_err().is_not_found());
    }

    #[test]
    fn insert_rejects_invalid_pool() {
        let store = MemoryPoolStore::new();
        let err = store
            .insert(
                IpPool::new("ns", "n")
                    .with_reserved([addr("1.2.3.2")])
                    .with_allocated([addr("1.2.3.2")]),
            )
            .unwrap_err();
        assert!(matches!(err, PoolError::Overlap { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn with_pools_seeds_every_pool() {
        let store = MemoryPoolStore::with_pools([IpPool::new("ns", "a"), IpPool::new("ns", "b")])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.backend(), "memory");
    }
}
