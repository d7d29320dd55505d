//! Installation Custom Resource Definition
//!
//! An Installation is the root aggregate the operator drives to completion:
//! its spec names the installation type and namespace prefix, its status
//! records the preflight result and per-stage/per-product progress.

use std::collections::BTreeMap;

use kube::{CustomResource, CustomResourceExt, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Phase, PreflightStatus, ProductStatus, StageStatus};
use crate::Error;

/// Desired configuration of an Installation
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "tessera.dev",
    version = "v1alpha1",
    kind = "Installation",
    plural = "installations",
    shortname = "inst",
    status = "InstallationStatus",
    namespaced,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Preflight","type":"string","jsonPath":".status.preflightStatus"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    /// Installation type selecting the stage template (e.g. managed, workshop)
    #[serde(rename = "type")]
    pub type_: String,

    /// Prefix applied to every namespace created for a product
    #[serde(default)]
    pub namespace_prefix: String,

    /// Accept self-signed certificates when talking to product endpoints
    #[serde(default)]
    pub self_signed_certs: bool,

    /// Cluster routing subdomain, discovered by the bootstrap stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_subdomain: Option<String>,

    /// Cluster console URL, discovered by the bootstrap stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_url: Option<String>,
}

/// Observed state of an Installation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// Result of the preflight gate
    #[serde(default)]
    pub preflight_status: PreflightStatus,

    /// Human-readable preflight outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_message: Option<String>,

    /// Stage statuses keyed by stage name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stages: BTreeMap<String, StageStatus>,
}

impl InstallationStatus {
    /// Record a preflight outcome
    pub fn set_preflight(&mut self, status: PreflightStatus, message: impl Into<String>) {
        self.preflight_status = status;
        self.preflight_message = Some(message.into());
    }

    /// Phase of the named stage, `None` if the stage has not been reached
    pub fn stage_phase(&self, stage: &str) -> Option<Phase> {
        self.stages.get(stage).map(|s| s.phase)
    }
}

impl Installation {
    /// CRD manifest as YAML, as applied by `kubectl apply -f`
    pub fn crd_yaml() -> Result<String, Error> {
        serde_yaml::to_string(&Self::crd())
            .map_err(|e| Error::serialization(format!("Installation CRD: {e}")))
    }

    /// Returns true once deletion has been requested
    ///
    /// The deletion timestamp is permanent: once set, every later reconcile
    /// takes the teardown path.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Returns true if the given finalizer token is present
    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers().iter().any(|f| f == token)
    }

    /// Add a finalizer token, returning false if it was already present
    pub fn add_finalizer(&mut self, token: &str) -> bool {
        if self.has_finalizer(token) {
            return false;
        }
        self.finalizers_mut().push(token.to_string());
        true
    }

    /// Remove a finalizer token, returning false if it was not present
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        let finalizers = self.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != token);
        finalizers.len() != before
    }

    /// Current preflight status, `NotStarted` when no status exists yet
    pub fn preflight_status(&self) -> PreflightStatus {
        self.status
            .as_ref()
            .map(|s| s.preflight_status)
            .unwrap_or_default()
    }

    /// Mutable status, created on first access
    pub fn status_mut(&mut self) -> &mut InstallationStatus {
        self.status.get_or_insert_with(InstallationStatus::default)
    }

    /// Find a product's status slot in whichever stage holds it
    ///
    /// Returns the stage name alongside the slot.
    pub fn product_status(&self, product: &str) -> Option<(&str, &ProductStatus)> {
        self.status.as_ref()?.stages.iter().find_map(|(stage, s)| {
            s.products
                .get(product)
                .map(|p| (stage.as_str(), p))
        })
    }
}
