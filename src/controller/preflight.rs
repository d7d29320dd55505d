//! Preflight gate
//!
//! Confirms the cluster is ready for an install: the required secrets exist
//! and no product finds an existing, conflicting deployment anywhere in the
//! cluster. The outcome is recorded on the Installation status only; a
//! failed preflight is retried on the next pass.
//!
//! The checks run to completion within one pass. `InProgress` is set while
//! they run, so a pass that errors out part way leaves a status that is
//! checked again.

use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument, warn};

use super::Context;
use crate::crd::{Installation, PreflightStatus};
use crate::events::{actions, reasons};
use crate::installation_type::InstallationType;
use crate::Error;

/// Message recorded when every check passes
pub const PREFLIGHT_PASSED: &str = "preflight checks passed";

/// Run the preflight checks and record the outcome on the status
///
/// Only API and configuration failures are returned as errors; a failed
/// check is a `Fail` status.
#[instrument(skip_all, fields(installation = %installation.name_any()))]
pub(crate) async fn run_preflight(
    ctx: &Context,
    installation: &mut Installation,
    installation_type: &InstallationType,
) -> Result<PreflightStatus, Error> {
    let namespace = installation.namespace().unwrap_or_default();
    installation.status_mut().preflight_status = PreflightStatus::InProgress;

    if let Some(message) = missing_secret(ctx, &namespace).await? {
        return Ok(fail(ctx, installation, message).await);
    }

    if let Some(message) = conflicting_products(ctx, installation, installation_type).await? {
        return Ok(fail(ctx, installation, message).await);
    }

    installation
        .status_mut()
        .set_preflight(PreflightStatus::Success, PREFLIGHT_PASSED);
    info!("Preflight checks passed");
    ctx.events
        .publish(
            &installation.object_ref(&()),
            EventType::Normal,
            reasons::PREFLIGHT_PASSED,
            actions::PREFLIGHT,
            Some(PREFLIGHT_PASSED.to_string()),
        )
        .await;
    Ok(PreflightStatus::Success)
}

async fn missing_secret(ctx: &Context, namespace: &str) -> Result<Option<String>, Error> {
    for secret in &ctx.config.required_secrets {
        if ctx.kube.get_secret(namespace, secret).await?.is_none() {
            return Ok(Some(format!(
                "could not find secret {secret} in namespace {namespace}"
            )));
        }
    }
    Ok(None)
}

/// First namespace holding objects that conflict with the products to be
/// installed, described as a status message
async fn conflicting_products(
    ctx: &Context,
    installation: &Installation,
    installation_type: &InstallationType,
) -> Result<Option<String>, Error> {
    let mut reconcilers = Vec::new();
    for (_, descriptor) in installation_type.products() {
        let reconciler = ctx.registry.reconciler_for(descriptor, installation)?;
        reconcilers.push((descriptor.name.as_str(), reconciler));
    }

    for namespace in ctx.kube.list_namespaces().await? {
        let mut conflicts = Vec::new();
        for (product, reconciler) in &reconcilers {
            let Some(object) = reconciler.preflight_object(&namespace) else {
                continue;
            };
            if ctx.kube.resource_exists(&object).await? {
                warn!(product, resource = %object, "Found conflicting installation");
                conflicts.push(*product);
            }
        }
        if !conflicts.is_empty() {
            return Ok(Some(format!(
                "found conflicting products: {}, in namespace: {namespace}",
                conflicts.join(", ")
            )));
        }
    }
    Ok(None)
}

async fn fail(ctx: &Context, installation: &mut Installation, message: String) -> PreflightStatus {
    warn!(%message, "Preflight check failed");
    installation
        .status_mut()
        .set_preflight(PreflightStatus::Fail, message.clone());
    ctx.events
        .publish(
            &installation.object_ref(&()),
            EventType::Warning,
            reasons::PREFLIGHT_FAILED,
            actions::PREFLIGHT,
            Some(message),
        )
        .await;
    PreflightStatus::Fail
}
