#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Ports
//!
//! The pool store port: the one interface allocators use to reach shared
//! state.
//!
//! - [`PoolStore`] -- versioned get and conditional update of a pool
//! - [`StoreError`] -- what a store backend may fail with
//!
//! The trait is `async_trait` and object-safe, so providers hold it as
//! `Arc<dyn PoolStore>` and backends (in-memory, Kubernetes API) are chosen
//! at startup.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::PoolStore;
