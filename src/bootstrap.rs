//! Bootstrap stage
//!
//! Runs before any product stage: makes sure every OAuth-enabled product
//! has a client secret, and discovers the cluster's console host and
//! routing subdomain from the console route.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, instrument};

use crate::crd::{Installation, Phase};
use crate::installation_type::InstallationType;
use crate::product::ReconcileScope;
use crate::Error;

/// Secret holding one generated client secret per OAuth-enabled product
pub const OAUTH_CLIENT_SECRETS: &str = "oauth-client-secrets";

/// Namespace of the cluster console route
pub const CONSOLE_ROUTE_NAMESPACE: &str = "openshift-console";

/// Name of the cluster console route
pub const CONSOLE_ROUTE_NAME: &str = "console";

const CLIENT_SECRET_LENGTH: usize = 32;

/// Reconciles the bootstrap stage of one Installation
pub struct BootstrapReconciler {
    oauth_products: Vec<String>,
}

impl BootstrapReconciler {
    /// Build the reconciler for the products of a resolved installation type
    pub fn new(installation_type: &InstallationType) -> Self {
        let oauth_products = installation_type
            .products()
            .filter(|(_, p)| p.oauth_client)
            .map(|(_, p)| p.name.clone())
            .collect();
        Self { oauth_products }
    }

    /// Run the bootstrap stage
    ///
    /// A missing console route is a bootstrap error; the caller records the
    /// stage as Failed and retries.
    #[instrument(skip(self, scope, installation), fields(installation = %installation.name_any()))]
    pub async fn reconcile(
        &self,
        scope: &ReconcileScope,
        installation: &mut Installation,
    ) -> Result<Phase, Error> {
        scope.ensure_active("bootstrap")?;

        let namespace = installation
            .namespace()
            .ok_or_else(|| Error::bootstrap("installation has no namespace"))?;
        self.reconcile_oauth_secrets(scope, &namespace).await?;
        self.reconcile_cluster_routes(scope, installation).await?;

        Ok(Phase::Completed)
    }

    async fn reconcile_oauth_secrets(
        &self,
        scope: &ReconcileScope,
        namespace: &str,
    ) -> Result<(), Error> {
        let existing = scope
            .client
            .get_secret(namespace, OAUTH_CLIENT_SECRETS)
            .await
            .map_err(|e| Error::bootstrap(format!("read {OAUTH_CLIENT_SECRETS}: {e}")))?;

        let mut data = existing
            .as_ref()
            .and_then(|s| s.data.clone())
            .unwrap_or_default();
        let before = data.len();
        for product in &self.oauth_products {
            data.entry(product.clone())
                .or_insert_with(|| ByteString(generate_secret(CLIENT_SECRET_LENGTH).into_bytes()));
        }

        if existing.is_some() && data.len() == before {
            debug!("OAuth client secrets up to date");
            return Ok(());
        }

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(OAUTH_CLIENT_SECRETS.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };
        scope
            .client
            .apply_secret(&secret)
            .await
            .map_err(|e| Error::bootstrap(format!("write {OAUTH_CLIENT_SECRETS}: {e}")))?;
        info!(products = self.oauth_products.len(), "OAuth client secrets written");
        Ok(())
    }

    async fn reconcile_cluster_routes(
        &self,
        scope: &ReconcileScope,
        installation: &mut Installation,
    ) -> Result<(), Error> {
        let ingress = scope
            .client
            .get_route_ingress(CONSOLE_ROUTE_NAMESPACE, CONSOLE_ROUTE_NAME)
            .await
            .map_err(|e| Error::bootstrap(format!("read console route: {e}")))?
            .ok_or_else(|| {
                Error::bootstrap(format!(
                    "route {CONSOLE_ROUTE_NAME} in {CONSOLE_ROUTE_NAMESPACE} not found or not admitted"
                ))
            })?;

        installation.spec.master_url = Some(ingress.host);
        installation.spec.routing_subdomain = Some(ingress.router_canonical_hostname);
        Ok(())
    }
}

/// Random alphanumeric string of the given length
fn generate_secret(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
