//! Provider error types.

use ipam_core::{PoolKey, ResourceTypeId};
use ipam_ports::StoreError;

/// Errors from allocating or releasing an address.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No store has been bound to the provider.
    #[error("provider not ready")]
    NotReady,

    /// A store was bound a second time.
    #[error("provider already has a store bound")]
    AlreadyBound,

    /// The allocation context names no pool.
    #[error("interface has no pool reference")]
    MissingPoolReference,

    /// The pool has no reserved addresses left.
    #[error("no address available in pool {pool}")]
    NoAddressAvailable {
        /// Exhausted pool.
        pool: PoolKey,
    },

    /// The address being released is not allocated in the pool.
    #[error("bad release: {ipv4} is not allocated in pool {pool}")]
    BadRelease {
        /// Pool released to.
        pool: PoolKey,
        /// Address that was not allocated.
        ipv4: String,
    },

    /// Every attempt lost the race against a concurrent writer.
    #[error("pool {pool} kept changing underneath us: gave up after {attempts} attempts")]
    AllocationConflict {
        /// Contended pool.
        pool: PoolKey,
        /// Attempts made.
        attempts: u32,
    },

    /// The caller cancelled, or its deadline passed, before the operation
    /// finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Any store failure other than a version conflict.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from building the provider registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A provider is already registered for this resource type.
    #[error("{0} already registered")]
    AlreadyRegistered(ResourceTypeId),
}
