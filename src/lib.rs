//! Tessera - Kubernetes operator that installs a multi-product suite
//!
//! A single Installation custom resource describes the desired suite. The
//! operator drives it to completion through repeated reconciliation:
//! preflight checks gate the start, stages run strictly in order, products
//! inside a stage run one after another and tolerate each other's failures,
//! and deletion tears products down before the Installation is released.
//!
//! # Modules
//!
//! - [`crd`] - Installation CRD and status types
//! - [`installation_type`] - Stage/product templates per installation type
//! - [`product`] - Product reconciler contract, registry and default reconciler
//! - [`bootstrap`] - Bootstrap stage (OAuth secrets, cluster routing)
//! - [`controller`] - Installation reconciliation
//! - [`client`] - Kubernetes access behind a mockable trait
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Operator configuration
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod bootstrap;
pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod installation_type;
pub mod product;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default delay before an Installation is reconciled again
///
/// Used for the periodic requeue, version conflicts and retried deletion.
pub const DEFAULT_REQUEUE_SECS: u64 = 10;

/// Finalizer token owned by the controller itself; removed last
pub const INSTALLATION_FINALIZER: &str = "tessera.dev/installation";

/// Prefix of finalizer tokens owned by products
pub const PRODUCT_FINALIZER_PREFIX: &str = "product.tessera.dev/";

/// Name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "tessera-installation-controller";
