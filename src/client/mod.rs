//! Kubernetes access for the Installation controller
//!
//! Everything the controller, the bootstrap stage and the product
//! reconcilers read or write goes through [`KubeClient`], so reconcile logic
//! can be exercised against mocks and an in-memory fake.
//!
//! Writes to the Installation carry the resource version of the copy they
//! were computed from. The API server rejects them with 409 Conflict when
//! another writer got there first.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::Installation;
use crate::Error;

#[cfg(test)]
pub(crate) mod fake;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "tessera-operator";

/// Identifies one namespaced object of an arbitrary kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// API version (e.g. `apps/v1`)
    pub api_version: String,
    /// Kind (e.g. `Deployment`)
    pub kind: String,
    /// Plural resource name
    pub plural: String,
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
}

impl ResourceDescriptor {
    fn api_resource(&self) -> ApiResource {
        let (group, version) = parse_api_version(&self.api_version);
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }
}

impl std::fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {}/{}", self.api_version, self.kind, self.namespace, self.name)
    }
}

/// Split `group/version` (or a core `version`) into its parts
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Admitted ingress of an OpenShift route
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteIngress {
    /// Host the route is served on
    pub host: String,
    /// Canonical hostname of the router that admitted the route
    pub router_canonical_hostname: String,
}

/// Kubernetes operations used by the operator
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch an Installation, `None` if it does not exist
    async fn get_installation(&self, namespace: &str, name: &str)
        -> Result<Option<Installation>, Error>;

    /// List Installations in a namespace
    async fn list_installations(&self, namespace: &str) -> Result<Vec<Installation>, Error>;

    /// Create an Installation
    async fn create_installation(&self, installation: &Installation) -> Result<Installation, Error>;

    /// Write the status subresource, conditional on the resource version
    async fn update_installation_status(
        &self,
        installation: &Installation,
    ) -> Result<Installation, Error>;

    /// Write finalizers and spec, conditional on the resource version
    async fn update_installation(&self, installation: &Installation) -> Result<Installation, Error>;

    /// Fetch a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create or update a Secret
    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Names of every namespace in the cluster
    async fn list_namespaces(&self) -> Result<Vec<String>, Error>;

    /// Returns true if the described object exists
    async fn resource_exists(&self, resource: &ResourceDescriptor) -> Result<bool, Error>;

    /// Fetch a Namespace, `None` if it does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error>;

    /// Create or update a Namespace with the given labels
    async fn ensure_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), Error>;

    /// Request deletion of a Namespace; missing namespaces are not an error
    async fn delete_namespace(&self, name: &str) -> Result<(), Error>;

    /// First admitted ingress of an OpenShift route, `None` if the route
    /// does not exist or has not been admitted
    async fn get_route_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RouteIngress>, Error>;
}

/// [`KubeClient`] backed by a live API server
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Wrap a kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn installations(&self, namespace: &str) -> Api<Installation> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of(installation: &Installation) -> Result<String, Error> {
        installation
            .namespace()
            .ok_or_else(|| Error::internal("client", "installation has no namespace"))
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_installation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Installation>, Error> {
        Ok(self.installations(namespace).get_opt(name).await?)
    }

    async fn list_installations(&self, namespace: &str) -> Result<Vec<Installation>, Error> {
        let list = self
            .installations(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn create_installation(&self, installation: &Installation) -> Result<Installation, Error> {
        let namespace = Self::namespace_of(installation)?;
        Ok(self
            .installations(&namespace)
            .create(&PostParams::default(), installation)
            .await?)
    }

    async fn update_installation_status(
        &self,
        installation: &Installation,
    ) -> Result<Installation, Error> {
        let namespace = Self::namespace_of(installation)?;
        let patch = json!({
            "metadata": { "resourceVersion": installation.resource_version() },
            "status": installation.status,
        });
        let updated = self
            .installations(&namespace)
            .patch_status(
                &installation.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    async fn update_installation(&self, installation: &Installation) -> Result<Installation, Error> {
        let namespace = Self::namespace_of(installation)?;
        let patch = json!({
            "metadata": {
                "resourceVersion": installation.resource_version(),
                "finalizers": installation.finalizers(),
            },
            "spec": installation.spec,
        });
        let updated = self
            .installations(&namespace)
            .patch(
                &installation.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        let namespace = secret
            .namespace()
            .ok_or_else(|| Error::internal("client", "secret has no namespace"))?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &secret.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(secret),
        )
        .await?;
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn resource_exists(&self, resource: &ResourceDescriptor) -> Result<bool, Error> {
        let ar = resource.api_resource();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &resource.namespace, &ar);
        match api.get_opt(&resource.name).await.map_err(Error::from) {
            Ok(found) => Ok(found.is_some()),
            // Kind not served by this cluster means nothing can conflict
            Err(e) if e.is_not_found() => {
                debug!(resource = %resource, "Resource kind not served");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn ensure_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": name, "labels": labels },
        });
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&ns),
        )
        .await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await.map_err(Error::from) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_route_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RouteIngress>, Error> {
        let ar = ApiResource {
            group: "route.openshift.io".to_string(),
            version: "v1".to_string(),
            api_version: "route.openshift.io/v1".to_string(),
            kind: "Route".to_string(),
            plural: "routes".to_string(),
        };
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, &ar);
        let Some(route) = api.get_opt(name).await? else {
            return Ok(None);
        };
        Ok(first_ingress(&route.data))
    }
}

/// Extract `status.ingress[0]` from a route's untyped data
fn first_ingress(data: &serde_json::Value) -> Option<RouteIngress> {
    let ingress = data.get("status")?.get("ingress")?.as_array()?.first()?;
    let field = |key: &str| ingress.get(key).and_then(|v| v.as_str()).map(str::to_string);
    Some(RouteIngress {
        host: field("host")?,
        router_canonical_hostname: field("routerCanonicalHostname").unwrap_or_default(),
    })
}
