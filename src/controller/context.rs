//! Shared controller state

use std::sync::Arc;

use dashmap::DashMap;
use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::client::{KubeClient, KubeClientImpl};
use crate::config::OperatorConfig;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::product::{ProductRegistry, ReconcileScope};
use crate::CONTROLLER_NAME;

/// Controller context shared across reconciles
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Product reconcilers by name
    pub registry: ProductRegistry,
    /// Operator configuration
    pub config: OperatorConfig,
    /// Cancellation token per Installation (`namespace/name`)
    scopes: DashMap<String, CancellationToken>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: OperatorConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Create a context for testing without a live cluster
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        registry: ProductRegistry,
        config: OperatorConfig,
    ) -> Self {
        Self {
            kube,
            events,
            registry,
            config,
            scopes: DashMap::new(),
        }
    }

    /// Reconcile scope for an Installation, reusing its live token
    pub fn scope_for(&self, key: &str) -> ReconcileScope {
        let token = self
            .scopes
            .entry(key.to_string())
            .or_default()
            .clone();
        ReconcileScope::new(self.kube.clone(), token)
    }

    /// Cancel an Installation's live token, if any
    ///
    /// Returns true if a token was cancelled. The next [`Context::scope_for`]
    /// starts from a fresh token.
    pub fn cancel_scope(&self, key: &str) -> bool {
        match self.scopes.remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    kube: Option<Arc<dyn KubeClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    registry: Option<ProductRegistry>,
}

impl ContextBuilder {
    fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            kube: None,
            events: None,
            registry: None,
        }
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the product registry
    pub fn registry(mut self, registry: ProductRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the Context
    ///
    /// Without an explicit registry every product in the catalog is
    /// installed with the namespaced default reconciler.
    pub fn build(self) -> Context {
        let registry = self
            .registry
            .unwrap_or_else(|| ProductRegistry::namespaced(self.config.catalog.product_names()));
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME))),
            registry,
            config: self.config,
            scopes: DashMap::new(),
        }
    }
}
