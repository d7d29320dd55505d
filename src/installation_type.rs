//! Installation type templates
//!
//! An installation type is a static, ordered list of stages, each an ordered
//! list of products. The operator picks one template per reconcile from the
//! Installation's `spec.type` and narrows it to the configured product list.
//! Templates are read-only once resolved.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::client::ResourceDescriptor;
use crate::Error;

/// Name of the stage handled by the bootstrap reconciler instead of the
/// product registry
pub const BOOTSTRAP_STAGE: &str = "bootstrap";

/// Product list entry that keeps every product of a template
pub const ALL_PRODUCTS: &str = "all";

/// Resource whose existence in any namespace signals a conflicting install
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreflightTarget {
    /// API version (e.g. `apps/v1`)
    pub api_version: String,
    /// Kind (e.g. `Deployment`)
    pub kind: String,
    /// Plural resource name used in API paths
    pub plural: String,
    /// Object name
    pub name: String,
}

impl PreflightTarget {
    fn new(api_version: &str, kind: &str, plural: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            name: name.to_string(),
        }
    }

    /// Resolve the target to a concrete object in the given namespace
    pub fn in_namespace(&self, namespace: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
            name: self.name.clone(),
            namespace: namespace.to_string(),
        }
    }
}

/// One product within a stage
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProductDescriptor {
    /// Product identifier, also the registry key
    pub name: String,

    /// Namespace suffix; the Installation's prefix is prepended
    pub namespace: String,

    /// Product version reported once installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Operator version reported once installed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,

    /// Host reported once installed, relative to the routing subdomain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_prefix: Option<String>,

    /// Product authenticates through a cluster OAuth client
    #[serde(default)]
    pub oauth_client: bool,

    /// Conflict check run during preflight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight: Option<PreflightTarget>,
}

impl ProductDescriptor {
    /// Create a descriptor with only a name and namespace suffix
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            version: None,
            operator_version: None,
            host_prefix: None,
            oauth_client: false,
            preflight: None,
        }
    }

    fn versions(mut self, version: &str, operator_version: &str) -> Self {
        self.version = Some(version.to_string());
        self.operator_version = Some(operator_version.to_string());
        self
    }

    fn host(mut self, prefix: &str) -> Self {
        self.host_prefix = Some(prefix.to_string());
        self
    }

    fn oauth(mut self) -> Self {
        self.oauth_client = true;
        self
    }

    fn preflight(mut self, target: PreflightTarget) -> Self {
        self.preflight = Some(target);
        self
    }
}

/// An ordered group of products that must all complete before the next
/// stage starts
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Stage {
    /// Stage name
    pub name: String,
    /// Products in declared order
    #[serde(default)]
    pub products: Vec<ProductDescriptor>,
}

impl Stage {
    /// Create a stage
    pub fn new(name: impl Into<String>, products: Vec<ProductDescriptor>) -> Self {
        Self {
            name: name.into(),
            products,
        }
    }

    /// Returns true for the bootstrap stage
    pub fn is_bootstrap(&self) -> bool {
        self.name == BOOTSTRAP_STAGE
    }
}

/// A resolved template: the stages one Installation goes through
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallationType {
    /// Type name (the Installation's `spec.type`)
    pub name: String,
    /// Stages in execution order
    pub stages: Vec<Stage>,
}

impl InstallationType {
    /// All products across all stages, paired with their stage name
    pub fn products(&self) -> impl Iterator<Item = (&str, &ProductDescriptor)> {
        self.stages
            .iter()
            .flat_map(|s| s.products.iter().map(move |p| (s.name.as_str(), p)))
    }

    /// Look up a product descriptor by name
    pub fn product(&self, name: &str) -> Option<&ProductDescriptor> {
        self.products().map(|(_, p)| p).find(|p| p.name == name)
    }
}

/// Mapping from installation type name to its stage template
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InstallationTypeCatalog {
    types: BTreeMap<String, Vec<Stage>>,
}

impl InstallationTypeCatalog {
    /// Build a catalog from explicit templates, validating each one
    pub fn new(types: BTreeMap<String, Vec<Stage>>) -> Result<Self, Error> {
        let catalog = Self { types };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from YAML (type name → list of stages)
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let types: BTreeMap<String, Vec<Stage>> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("invalid installation types: {e}")))?;
        Self::new(types)
    }

    /// Names of every known installation type
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Names of every product across every installation type
    pub fn product_names(&self) -> BTreeSet<String> {
        self.types
            .values()
            .flatten()
            .flat_map(|stage| stage.products.iter().map(|p| p.name.clone()))
            .collect()
    }

    /// Resolve an installation type, keeping only the requested products
    ///
    /// `products` containing [`ALL_PRODUCTS`] (or being empty) keeps every
    /// product. Stages left without products are dropped, except bootstrap.
    pub fn resolve(&self, type_name: &str, products: &[String]) -> Result<InstallationType, Error> {
        let stages = self.types.get(type_name).ok_or_else(|| {
            Error::configuration(format!("unknown installation type: {type_name}"))
        })?;

        let keep_all = products.is_empty() || products.iter().any(|p| p == ALL_PRODUCTS);
        let wanted: HashSet<&str> = products.iter().map(String::as_str).collect();

        let stages = stages
            .iter()
            .filter_map(|stage| {
                let products: Vec<ProductDescriptor> = stage
                    .products
                    .iter()
                    .filter(|p| keep_all || wanted.contains(p.name.as_str()))
                    .cloned()
                    .collect();
                if products.is_empty() && !stage.is_bootstrap() {
                    return None;
                }
                Some(Stage::new(stage.name.clone(), products))
            })
            .collect();

        Ok(InstallationType {
            name: type_name.to_string(),
            stages,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        for (type_name, stages) in &self.types {
            let mut stage_names = HashSet::new();
            let mut product_names = HashSet::new();
            for stage in stages {
                if stage.name.is_empty() {
                    return Err(Error::configuration(format!(
                        "installation type {type_name} has a stage without a name"
                    )));
                }
                if !stage_names.insert(stage.name.as_str()) {
                    return Err(Error::configuration(format!(
                        "installation type {type_name} declares stage {} twice",
                        stage.name
                    )));
                }
                for product in &stage.products {
                    if product.name.is_empty() {
                        return Err(Error::configuration(format!(
                            "stage {} of {type_name} has a product without a name",
                            stage.name
                        )));
                    }
                    if !product_names.insert(product.name.as_str()) {
                        return Err(Error::configuration(format!(
                            "installation type {type_name} declares product {} twice",
                            product.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The templates shipped with the operator: `managed` and `workshop`
    pub fn builtin() -> Self {
        let deployment_config = |name: &str| {
            PreflightTarget::new("apps.openshift.io/v1", "DeploymentConfig", "deploymentconfigs", name)
        };
        let deployment =
            |name: &str| PreflightTarget::new("apps/v1", "Deployment", "deployments", name);

        let cloud_resources = ProductDescriptor::new("cloud-resources", "cloud-resources")
            .versions("0.10.0", "0.10.0");
        let monitoring = ProductDescriptor::new("monitoring", "middleware-monitoring")
            .versions("1.1.0", "0.0.29")
            .host("grafana-route");
        let rhsso = ProductDescriptor::new("rhsso", "rhsso")
            .versions("7.3", "1.9.2")
            .host("keycloak-edge")
            .oauth()
            .preflight(deployment_config("sso"));
        let rhssouser = ProductDescriptor::new("rhssouser", "user-sso")
            .versions("7.3", "1.9.2")
            .host("keycloak-edge-user")
            .oauth()
            .preflight(deployment_config("sso"));
        let threescale = ProductDescriptor::new("3scale", "3scale")
            .versions("2.7", "0.4.0")
            .host("3scale-admin")
            .oauth()
            .preflight(deployment_config("apicast-production"));
        let amq_online = ProductDescriptor::new("amqonline", "amq-online")
            .versions("1.3.1", "1.3.1")
            .preflight(deployment("enmasse-operator"));
        let amq_streams = ProductDescriptor::new("amqstreams", "amq-streams")
            .versions("1.1.0", "1.1.0")
            .preflight(deployment("strimzi-cluster-operator"));
        let codeready = ProductDescriptor::new("codeready-workspaces", "codeready-workspaces")
            .versions("2.0.0", "2.0.0")
            .host("codeready")
            .preflight(deployment("codeready"));
        let fuse = ProductDescriptor::new("fuse", "fuse")
            .versions("7.5", "1.5.0")
            .preflight(deployment("syndesis-operator"));
        let fuse_on_openshift = ProductDescriptor::new("fuse-on-openshift", "openshift")
            .versions("7.5", "7.5");
        let ups = ProductDescriptor::new("ups", "mobile-unifiedpush")
            .versions("2.3.2", "0.4.0")
            .host("unifiedpush");
        let solution_explorer = ProductDescriptor::new("solution-explorer", "solution-explorer")
            .versions("2.19.0", "0.0.44")
            .host("tutorial-web-app")
            .preflight(deployment_config("tutorial-web-app"));

        let managed = vec![
            Stage::new(BOOTSTRAP_STAGE, vec![]),
            Stage::new("cloud-resources", vec![cloud_resources.clone()]),
            Stage::new("monitoring", vec![monitoring.clone()]),
            Stage::new("authentication", vec![rhsso.clone()]),
            Stage::new(
                "products",
                vec![
                    threescale.clone(),
                    amq_online.clone(),
                    codeready.clone(),
                    fuse.clone(),
                    fuse_on_openshift.clone(),
                    ups.clone(),
                    rhssouser,
                ],
            ),
            Stage::new("solution-explorer", vec![solution_explorer.clone()]),
        ];

        let workshop = vec![
            Stage::new(BOOTSTRAP_STAGE, vec![]),
            Stage::new("cloud-resources", vec![cloud_resources]),
            Stage::new("monitoring", vec![monitoring]),
            Stage::new("authentication", vec![rhsso]),
            Stage::new(
                "products",
                vec![
                    threescale,
                    amq_online,
                    amq_streams,
                    codeready,
                    fuse,
                    fuse_on_openshift,
                    ups,
                ],
            ),
            Stage::new("solution-explorer", vec![solution_explorer]),
        ];

        let mut types = BTreeMap::new();
        types.insert("managed".to_string(), managed);
        types.insert("workshop".to_string(), workshop);
        Self { types }
    }
}
