//! Error types for the core data model.

/// Violations of the pool invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The same IPv4 appears twice within one address sequence.
    #[error("pool {pool}: address {ipv4} listed more than once in {list}")]
    DuplicateAddress {
        /// `namespace/name` of the pool.
        pool: String,
        /// Offending address.
        ipv4: String,
        /// `reservedAddresses` or `allocatedAddresses`.
        list: &'static str,
    },

    /// An IPv4 is both reserved and allocated.
    #[error("pool {pool}: address {ipv4} is both reserved and allocated")]
    Overlap {
        /// `namespace/name` of the pool.
        pool: String,
        /// Offending address.
        ipv4: String,
    },

    /// An address entry has no IPv4.
    #[error("pool {pool}: address entry without ipv4 in {list}")]
    MissingIpv4 {
        /// `namespace/name` of the pool.
        pool: String,
        /// `reservedAddresses` or `allocatedAddresses`.
        list: &'static str,
    },
}

/// Errors from parsing a [`ResourceTypeId`](crate::ResourceTypeId).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceTypeIdError {
    /// `apiVersion` was empty.
    #[error("apiVersion cannot be empty")]
    EmptyApiVersion,

    /// `apiVersion` had more than one `/`, or an empty group or version.
    #[error("malformed apiVersion: {0:?}")]
    MalformedApiVersion(String),

    /// `kind` was empty.
    #[error("kind cannot be empty")]
    EmptyKind,

    /// The display form `group/version, Kind=kind` could not be parsed.
    #[error("malformed resource type id: {0:?}")]
    Malformed(String),
}
