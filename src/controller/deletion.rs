//! Teardown of a deleted Installation
//!
//! Every product still holding a finalizer token is asked to tear down.
//! Products drop their own tokens once their resources are gone; the
//! controller's token goes last, releasing the Installation.

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::Context;
use crate::crd::{Installation, ProductStatus};
use crate::error::ProductErrors;
use crate::events::{actions, reasons};
use crate::installation_type::InstallationType;
use crate::product::{product_from_finalizer, ReconcileScope};
use crate::{Error, INSTALLATION_FINALIZER};

/// Drive teardown one step
///
/// `installation_type` must be the unfiltered template, so products dropped
/// from the operator's product list can still be torn down. Returns
/// [`Action::await_change`] once the controller's own token was removed.
#[instrument(skip_all, fields(installation = %installation.name_any()))]
pub(crate) async fn run_deletion(
    ctx: &Context,
    key: &str,
    installation: &mut Installation,
    installation_type: &InstallationType,
) -> Action {
    if ctx.cancel_scope(key) {
        info!("Cancelled in-flight reconcile work");
    }
    let scope = ReconcileScope::new(ctx.kube.clone(), CancellationToken::new());

    let before = installation.finalizers().to_vec();
    let products: Vec<String> = before
        .iter()
        .filter_map(|token| product_from_finalizer(token))
        .map(str::to_string)
        .collect();

    let mut errors = ProductErrors::new();
    for product in &products {
        if let Err(e) = teardown(ctx, &scope, installation, installation_type, product).await {
            errors.push(e);
        }
    }

    if let Some(errors) = errors.into_option() {
        warn!(error = %errors, "Product teardown failed, keeping finalizers");
        installation.metadata.finalizers = Some(before);
        for err in errors.errors() {
            ctx.events
                .publish(
                    &installation.object_ref(&()),
                    EventType::Warning,
                    reasons::PRODUCT_RECONCILE_FAILED,
                    actions::DELETE,
                    Some(err.to_string()),
                )
                .await;
        }
        return Action::requeue(ctx.config.requeue_after);
    }

    let remaining = installation.finalizers();
    if remaining.iter().all(|f| f == INSTALLATION_FINALIZER) {
        installation.remove_finalizer(INSTALLATION_FINALIZER);
        info!("All products removed, releasing installation");
        return Action::await_change();
    }

    info!(remaining = remaining.len(), "Waiting for product teardown");
    Action::requeue(ctx.config.requeue_after)
}

async fn teardown(
    ctx: &Context,
    scope: &ReconcileScope,
    installation: &mut Installation,
    installation_type: &InstallationType,
    product: &str,
) -> Result<(), Error> {
    let descriptor = installation_type.product(product).ok_or_else(|| {
        Error::configuration(format!(
            "finalizer names product {product} unknown to installation type {}",
            installation_type.name
        ))
    })?;
    let reconciler = ctx.registry.reconciler_for(descriptor, installation)?;

    let mut slot = installation
        .product_status(product)
        .map(|(_, slot)| slot.clone())
        .unwrap_or_else(|| ProductStatus::named(product));
    let phase = reconciler
        .reconcile(scope, installation, &mut slot)
        .await
        .map_err(|e| match e {
            Error::Product { .. } => e,
            other => Error::product(product, other.to_string()),
        })?;
    info!(product, %phase, "Product teardown step");
    Ok(())
}
