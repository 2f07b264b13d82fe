#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Core
//!
//! Data model shared by every IPAM crate.
//!
//! ## Key Components
//!
//! - **Addresses**: [`Address`] (one entry of a pool) and [`IpConfig`] (what an
//!   interface receives once an address is allocated)
//! - **Pools**: [`IpPool`], identified by a [`PoolKey`] and versioned by an
//!   opaque [`ResourceVersion`] issued by the store
//! - **References**: [`PoolReference`] and the [`ResourceTypeId`] used to pick
//!   an allocator for it
//! - **Intercepted objects**: [`Machine`] and its [`InterfaceSpec`]
//!
//! The crate is pure data: no I/O, no async. Pools are mutated only through
//! [`IpPool::take_next_reserved`] and [`IpPool::return_allocated`], which keep
//! the reserved and allocated sequences disjoint.

pub mod address;
pub mod error;
pub mod machine;
pub mod pool;
pub mod reference;

pub use address::{Address, IpConfig};
pub use error::{PoolError, ResourceTypeIdError};
pub use machine::{InterfaceSpec, Machine, MachineSpec, ObjectMeta};
pub use pool::{IpPool, PoolKey, ResourceVersion};
pub use reference::{PoolReference, ResourceTypeId};

/// Result type for pool invariant checks.
pub type Result<T> = std::result::Result<T, PoolError>;
