//! Operator configuration
//!
//! Command-line flags (with environment fallbacks) are parsed into
//! [`ControllerArgs`] and turned into an [`OperatorConfig`], which is what
//! the controller reads at runtime.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::info;

use crate::crd::{Installation, InstallationSpec};
use crate::installation_type::{InstallationTypeCatalog, ALL_PRODUCTS};
use crate::{Error, DEFAULT_REQUEUE_SECS};

/// Flags for the `controller` subcommand
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Namespace the operator watches for Installations
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: String,

    /// Products to install, comma separated, or `all`
    #[arg(
        long,
        env = "INSTALLATION_PRODUCTS",
        value_delimiter = ',',
        default_value = ALL_PRODUCTS
    )]
    pub products: Vec<String>,

    /// Secrets that must exist in the watch namespace before installing
    #[arg(
        long,
        env = "REQUIRED_SECRETS",
        value_delimiter = ',',
        default_value = "github-oauth-secret"
    )]
    pub required_secrets: Vec<String>,

    /// Delay between reconciles of an Installation
    #[arg(long, default_value_t = DEFAULT_REQUEUE_SECS)]
    pub requeue_seconds: u64,

    /// YAML file with installation type templates replacing the built-ins
    #[arg(long, env = "INSTALLATION_TYPES_FILE")]
    pub installation_types: Option<PathBuf>,

    /// Name of the Installation created at startup when none exists
    #[arg(long, default_value = "tessera-installation")]
    pub default_installation_name: String,

    /// Type of the Installation created at startup
    #[arg(long, default_value = "managed")]
    pub default_installation_type: String,

    /// Namespace prefix of the Installation created at startup
    #[arg(long, default_value = "tessera-")]
    pub default_namespace_prefix: String,
}

impl ControllerArgs {
    /// Validate the flags and load the installation type catalog
    pub fn into_config(self) -> Result<OperatorConfig, Error> {
        if self.watch_namespace.is_empty() {
            return Err(Error::configuration("watch namespace must not be empty"));
        }
        if self.requeue_seconds == 0 {
            return Err(Error::configuration("requeue interval must be at least one second"));
        }

        let catalog = match &self.installation_types {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    Error::configuration(format!("read {}: {e}", path.display()))
                })?;
                info!(path = %path.display(), "Loaded installation types");
                InstallationTypeCatalog::from_yaml(&yaml)?
            }
            None => InstallationTypeCatalog::builtin(),
        };

        let products: Vec<String> = self
            .products
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(OperatorConfig {
            watch_namespace: self.watch_namespace,
            products,
            required_secrets: self
                .required_secrets
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            requeue_after: Duration::from_secs(self.requeue_seconds),
            catalog,
            default_installation: DefaultInstallation {
                name: self.default_installation_name,
                type_: self.default_installation_type,
                namespace_prefix: self.default_namespace_prefix,
            },
        })
    }
}

/// Installation created at startup if the watch namespace has none
#[derive(Debug, Clone)]
pub struct DefaultInstallation {
    /// Object name
    pub name: String,
    /// Installation type
    pub type_: String,
    /// Product namespace prefix
    pub namespace_prefix: String,
}

/// Runtime configuration of the operator
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace holding the Installations and required secrets
    pub watch_namespace: String,
    /// Products to install; `all` or empty means every product
    pub products: Vec<String>,
    /// Secrets checked by preflight
    pub required_secrets: Vec<String>,
    /// Fixed delay for every requeue
    pub requeue_after: Duration,
    /// Installation type templates
    pub catalog: InstallationTypeCatalog,
    /// Installation created at startup
    pub default_installation: DefaultInstallation,
}

impl OperatorConfig {
    /// Configuration with the built-in catalog and default settings
    pub fn new(watch_namespace: impl Into<String>) -> Self {
        Self {
            watch_namespace: watch_namespace.into(),
            products: vec![ALL_PRODUCTS.to_string()],
            required_secrets: vec!["github-oauth-secret".to_string()],
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            catalog: InstallationTypeCatalog::builtin(),
            default_installation: DefaultInstallation {
                name: "tessera-installation".to_string(),
                type_: "managed".to_string(),
                namespace_prefix: "tessera-".to_string(),
            },
        }
    }

    /// The Installation to create when the watch namespace has none
    pub fn default_installation(&self) -> Installation {
        let mut inst = Installation::new(
            &self.default_installation.name,
            InstallationSpec {
                type_: self.default_installation.type_.clone(),
                namespace_prefix: self.default_installation.namespace_prefix.clone(),
                ..Default::default()
            },
        );
        inst.metadata.namespace = Some(self.watch_namespace.clone());
        inst
    }
}
