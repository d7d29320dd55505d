//! Integration tests for the Tessera operator
//!
//! These tests require a Kubernetes cluster (kind) to run and tell the story
//! of how cluster administrators interact with Tessera.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading and deleting
//!   Installation resources through the Kubernetes API
//!
//! - `installation_lifecycle`: Stories about how the controller drives an
//!   Installation through preflight, stages and teardown
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod helpers;
mod installation_lifecycle;
