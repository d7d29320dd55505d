//! Default product reconciler: one namespace per product

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{reconcile_finalizer, ProductReconciler, ReconcileScope};
use crate::client::ResourceDescriptor;
use crate::crd::{Installation, Phase, ProductStatus};
use crate::installation_type::ProductDescriptor;
use crate::Error;

/// Label carrying the owning Installation's name
pub const INSTALLATION_LABEL: &str = "tessera.dev/installation";

/// Label carrying the product name
pub const PRODUCT_LABEL: &str = "tessera.dev/product";

const NAMESPACE_ACTIVE: &str = "Active";

/// Installs a product into its own namespace
///
/// The product counts as installed once its namespace is Active; its
/// reported versions come from the descriptor. Teardown deletes the
/// namespace and waits until it is gone.
pub struct NamespacedProduct {
    descriptor: ProductDescriptor,
    namespace: String,
}

impl NamespacedProduct {
    /// Build the reconciler for one Installation
    pub fn new(descriptor: ProductDescriptor, installation: &Installation) -> Self {
        let namespace = format!("{}{}", installation.spec.namespace_prefix, descriptor.namespace);
        Self {
            descriptor,
            namespace,
        }
    }

    /// Namespace owned by this product
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn host(&self, installation: &Installation) -> Option<String> {
        let prefix = self.descriptor.host_prefix.as_ref()?;
        let subdomain = installation.spec.routing_subdomain.as_ref()?;
        Some(format!("https://{prefix}-{}.{subdomain}", self.namespace))
    }

    async fn namespace_phase(&self, scope: &ReconcileScope) -> Result<Option<String>, Error> {
        let ns = scope.client.get_namespace(&self.namespace).await?;
        Ok(ns.map(|ns| {
            ns.status
                .and_then(|s| s.phase)
                .unwrap_or_else(|| NAMESPACE_ACTIVE.to_string())
        }))
    }

    async fn teardown(&self, scope: &ReconcileScope) -> Result<Phase, Error> {
        if self.namespace_phase(scope).await?.is_none() {
            info!(product = %self.descriptor.name, namespace = %self.namespace, "Product namespace removed");
            return Ok(Phase::Completed);
        }
        scope.client.delete_namespace(&self.namespace).await?;
        if self.namespace_phase(scope).await?.is_none() {
            return Ok(Phase::Completed);
        }
        debug!(namespace = %self.namespace, "Waiting for product namespace to terminate");
        Ok(Phase::InProgress)
    }
}

#[async_trait]
impl ProductReconciler for NamespacedProduct {
    async fn reconcile(
        &self,
        scope: &ReconcileScope,
        installation: &mut Installation,
        product: &mut ProductStatus,
    ) -> Result<Phase, Error> {
        let name = self.descriptor.name.clone();

        let phase = reconcile_finalizer(installation, &name, || self.teardown(scope)).await?;
        if installation.is_deleting() {
            return Ok(phase);
        }

        scope.ensure_active(&name)?;

        let labels = BTreeMap::from([
            (INSTALLATION_LABEL.to_string(), installation.name_any()),
            (PRODUCT_LABEL.to_string(), name.clone()),
        ]);
        scope
            .client
            .ensure_namespace(&self.namespace, labels)
            .await
            .map_err(|e| Error::product(&name, format!("ensure namespace {}: {e}", self.namespace)))?;

        match self.namespace_phase(scope).await?.as_deref() {
            Some(NAMESPACE_ACTIVE) => {}
            Some(other) => {
                debug!(product = %name, namespace = %self.namespace, phase = other, "Namespace not active yet");
                return Ok(Phase::InProgress);
            }
            None => return Ok(Phase::InProgress),
        }

        product.version = self.descriptor.version.clone();
        product.operator_version = self.descriptor.operator_version.clone();
        if let Some(host) = self.host(installation) {
            product.host = Some(host);
        }
        Ok(Phase::Completed)
    }

    fn preflight_object(&self, namespace: &str) -> Option<ResourceDescriptor> {
        self.descriptor
            .preflight
            .as_ref()
            .map(|target| target.in_namespace(namespace))
    }
}
