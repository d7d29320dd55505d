//! Product reconcilers
//!
//! A product is one installable component of the suite. The controller only
//! knows products through [`ProductReconciler`]: it hands each one the
//! Installation and the product's own status slot, and records the phase it
//! returns. Products detect the Installation's deletion marker themselves
//! and tear down instead of installing.

mod finalizer;
mod namespaced;
mod registry;


use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use crate::client::{KubeClient, ResourceDescriptor};
use crate::crd::{Installation, Phase, ProductStatus};
use crate::Error;

pub use finalizer::{product_finalizer, product_from_finalizer, reconcile_finalizer};
pub use namespaced::{NamespacedProduct, INSTALLATION_LABEL, PRODUCT_LABEL};
pub use registry::{ProductFactory, ProductRegistry};

/// Installs (or tears down) one product
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProductReconciler: Send + Sync {
    /// Drive the product one step toward its desired state
    ///
    /// `product` is the slot this product owns in the Installation status;
    /// the returned phase is recorded into it by the caller. When the
    /// Installation is being deleted this performs teardown and removes the
    /// product's finalizer token once its resources are gone.
    async fn reconcile(
        &self,
        scope: &ReconcileScope,
        installation: &mut Installation,
        product: &mut ProductStatus,
    ) -> Result<Phase, Error>;

    /// Object whose presence in `namespace` means an existing install
    /// conflicts with this product, `None` if the product has no such check
    fn preflight_object(&self, namespace: &str) -> Option<ResourceDescriptor>;
}

/// What a reconciler may use during one reconcile invocation
#[derive(Clone)]
pub struct ReconcileScope {
    /// Cluster access
    pub client: Arc<dyn KubeClient>,
    /// Cancelled when the Installation enters teardown
    pub cancel: CancellationToken,
}

impl ReconcileScope {
    /// Create a scope
    pub fn new(client: Arc<dyn KubeClient>, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// Fail with [`Error::Cancelled`] if the scope has been cancelled
    pub fn ensure_active(&self, what: &str) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(what));
        }
        Ok(())
    }
}
