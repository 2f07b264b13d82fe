#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # IPAM Webhook
//!
//! Kubernetes mutating admission webhook that assigns IP addresses to
//! machines from pools.
//!
//! ## Key Components
//!
//! - **Protocol**: [`AdmissionReview`] and friends (`admission.k8s.io/v1`)
//! - **Dispatcher**: [`IpamAdmission`] decodes the machine, picks a provider
//!   from the registry and answers with a JSON Patch
//! - **Patches**: [`patch::diff`] computes RFC 6902 operations between the
//!   decoded object and its mutated copy
//! - **Server**: axum [`router`] with the admission path and `/healthz`,
//!   `/readyz` health endpoints
//! - **Configuration**: [`WebhookConfig`] loaded from TOML plus environment
//!
//! The server speaks plain HTTP; TLS is expected to be terminated in front
//! of it.

pub mod admission;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod patch;
pub mod server;

pub use admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, Operation, PatchType, Status,
};
pub use config::{PoolApiConfig, StoreConfig, WebhookConfig};
pub use dispatcher::IpamAdmission;
pub use error::{AdmissionError, ConfigError};
pub use patch::PatchOperation;
pub use server::{AppState, router, router_for, serve};
