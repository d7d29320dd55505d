//! Lookup from product name to reconciler

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{NamespacedProduct, ProductReconciler};
use crate::crd::Installation;
use crate::installation_type::ProductDescriptor;
use crate::Error;

/// Builds a reconciler for one product of one Installation
pub type ProductFactory =
    Arc<dyn Fn(&ProductDescriptor, &Installation) -> Arc<dyn ProductReconciler> + Send + Sync>;

/// Known products and how to build their reconcilers
#[derive(Clone, Default)]
pub struct ProductRegistry {
    factories: BTreeMap<String, ProductFactory>,
}

impl ProductRegistry {
    /// Empty registry; every lookup fails until products are registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that installs each named product with [`NamespacedProduct`]
    pub fn namespaced<I, S>(products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in products {
            registry.register(
                name,
                Arc::new(
                    |descriptor: &ProductDescriptor,
                     installation: &Installation|
                     -> Arc<dyn ProductReconciler> {
                        Arc::new(NamespacedProduct::new(descriptor.clone(), installation))
                    },
                ),
            );
        }
        registry
    }

    /// Register (or replace) the factory for a product
    pub fn register(&mut self, product: impl Into<String>, factory: ProductFactory) -> &mut Self {
        self.factories.insert(product.into(), factory);
        self
    }

    /// Returns true if the product has a factory
    pub fn contains(&self, product: &str) -> bool {
        self.factories.contains_key(product)
    }

    /// Build the reconciler for a product
    pub fn reconciler_for(
        &self,
        descriptor: &ProductDescriptor,
        installation: &Installation,
    ) -> Result<Arc<dyn ProductReconciler>, Error> {
        let factory = self.factories.get(&descriptor.name).ok_or_else(|| {
            Error::configuration(format!("unknown product: {}", descriptor.name))
        })?;
        Ok(factory(descriptor, installation))
    }
}
