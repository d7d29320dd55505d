//! Custom Resource Definitions for Tessera
//!
//! This module contains the Installation CRD and the status types shared by
//! stages and products.

mod installation;
mod types;

pub use installation::{Installation, InstallationSpec, InstallationStatus};
pub use types::{Phase, PreflightStatus, ProductStatus, StageStatus};
