#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Provider
//!
//! Address allocation for intercepted machines.
//!
//! This crate provides:
//! - [`IpamProvider`] -- the allocate/release capability, selected per pool
//!   resource type
//! - [`StaticPoolProvider`] -- allocator over a pool of pre-provisioned
//!   addresses, safe against concurrent writers through version-checked
//!   updates and bounded retry
//! - [`ProviderRegistry`] -- immutable lookup from [`ResourceTypeId`] to
//!   provider, built once at startup
//! - [`RetryPolicy`] -- attempt budget and backoff for contended pools
//!
//! Every store round trip a provider makes goes through
//! [`AllocationContext`], which races it against the caller's cancellation
//! token and deadline.
//!
//! [`ResourceTypeId`]: ipam_core::ResourceTypeId

pub mod error;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod static_pool;

pub use error::{ProviderError, RegistryError};
pub use provider::{AllocationContext, IpamProvider};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use retry::RetryPolicy;
pub use static_pool::StaticPoolProvider;
