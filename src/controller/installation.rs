//! Installation controller
//!
//! Each pass fetches the latest Installation, then either runs the preflight
//! gate, tears the installation down, or advances its stages in order. The
//! pass ends by persisting what changed and asking to be requeued, so
//! progress is re-evaluated without an external trigger.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::deletion::run_deletion;
use super::preflight::run_preflight;
use super::stage::{run_stage, stage_status};
use super::status::{persist, Snapshot};
use super::Context;
use crate::bootstrap::BootstrapReconciler;
use crate::crd::{Installation, Phase};
use crate::events::{actions, reasons};
use crate::installation_type::{InstallationType, Stage};
use crate::product::ReconcileScope;
use crate::{Error, INSTALLATION_FINALIZER};

/// Reconcile an Installation
///
/// Version conflicts while persisting and failed preflight checks are not
/// errors; both end in a fixed-delay requeue. Configuration errors, API
/// errors and bootstrap failures are returned to the controller runtime.
#[instrument(skip(obj, ctx), fields(installation = %obj.name_any()))]
pub async fn reconcile(obj: Arc<Installation>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::internal("controller", "installation has no namespace"))?;
    let key = format!("{namespace}/{name}");

    let Some(mut installation) = ctx.kube.get_installation(&namespace, &name).await? else {
        debug!("Installation no longer exists");
        ctx.cancel_scope(&key);
        return Ok(Action::await_change());
    };
    let snapshot = Snapshot::of(&installation);
    let requeue = Action::requeue(ctx.config.requeue_after);

    let installation_type = ctx
        .config
        .catalog
        .resolve(&installation.spec.type_, &ctx.config.products)?;

    if !installation.is_deleting() && installation.add_finalizer(INSTALLATION_FINALIZER) {
        debug!("Added installation finalizer");
    }

    if installation.preflight_status().needs_check() {
        let status = run_preflight(&ctx, &mut installation, &installation_type).await?;
        debug!(%status, "Preflight finished");
        return persist_and(&ctx, &mut installation, &snapshot, requeue).await;
    }

    if installation.is_deleting() {
        let full_type = ctx.config.catalog.resolve(&installation.spec.type_, &[])?;
        let action = run_deletion(&ctx, &key, &mut installation, &full_type).await;
        return persist_and(&ctx, &mut installation, &snapshot, action).await;
    }

    let scope = ctx.scope_for(&key);
    let outcome = run_stages(&ctx, &scope, &mut installation, &installation_type).await;

    let action = persist_and(&ctx, &mut installation, &snapshot, requeue).await?;
    outcome.map(|()| action)
}

/// Error policy for the Installation controller
///
/// Retries after the same fixed delay as every other requeue.
pub fn error_policy(installation: Arc<Installation>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        installation = %installation.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.requeue_after)
}

/// Persist, then return `action` unless a write conflicted
async fn persist_and(
    ctx: &Context,
    installation: &mut Installation,
    snapshot: &Snapshot,
    action: Action,
) -> Result<Action, Error> {
    let conflict = persist(
        ctx.kube.as_ref(),
        installation,
        snapshot,
        ctx.config.requeue_after,
    )
    .await?;
    Ok(conflict.unwrap_or(action))
}

/// Advance stages in declared order, stopping at the first incomplete one
///
/// Product failures are reported through logs and events only; the status
/// records them as an incomplete stage. A bootstrap failure marks the stage
/// Failed and is returned after the status has been persisted.
async fn run_stages(
    ctx: &Context,
    scope: &ReconcileScope,
    installation: &mut Installation,
    installation_type: &InstallationType,
) -> Result<(), Error> {
    for stage in &installation_type.stages {
        let previous = installation
            .status
            .as_ref()
            .and_then(|s| s.stage_phase(&stage.name));

        let phase = if stage.is_bootstrap() {
            run_bootstrap(ctx, scope, installation, installation_type, stage).await?
        } else {
            let outcome = run_stage(&ctx.registry, scope, installation, stage).await;
            for product in &outcome.newly_completed {
                info!(stage = %stage.name, product = %product, "Product completed");
                publish(
                    ctx,
                    installation,
                    EventType::Normal,
                    reasons::PRODUCT_COMPLETED,
                    format!("product {product} completed"),
                )
                .await;
            }
            if let Some(errors) = outcome.errors {
                warn!(stage = %stage.name, error = %errors, "Stage finished with product errors");
                for err in errors.errors() {
                    publish(
                        ctx,
                        installation,
                        EventType::Warning,
                        reasons::PRODUCT_RECONCILE_FAILED,
                        err.to_string(),
                    )
                    .await;
                }
            }
            outcome.phase
        };

        if !phase.is_completed() {
            info!(stage = %stage.name, %phase, "Stage not complete yet");
            return Ok(());
        }
        if previous != Some(Phase::Completed) {
            info!(stage = %stage.name, "Stage completed");
            publish(
                ctx,
                installation,
                EventType::Normal,
                reasons::STAGE_COMPLETED,
                format!("stage {} completed", stage.name),
            )
            .await;
        }
    }
    Ok(())
}

async fn run_bootstrap(
    ctx: &Context,
    scope: &ReconcileScope,
    installation: &mut Installation,
    installation_type: &InstallationType,
    stage: &Stage,
) -> Result<Phase, Error> {
    let reconciler = BootstrapReconciler::new(installation_type);
    match reconciler.reconcile(scope, installation).await {
        Ok(phase) => {
            stage_status(installation, &stage.name).phase = phase;
            Ok(phase)
        }
        Err(e) => {
            warn!(error = %e, "Bootstrap stage failed");
            stage_status(installation, &stage.name).phase = Phase::Failed;
            publish(
                ctx,
                installation,
                EventType::Warning,
                reasons::BOOTSTRAP_FAILED,
                e.to_string(),
            )
            .await;
            Err(e)
        }
    }
}

async fn publish(
    ctx: &Context,
    installation: &Installation,
    type_: EventType,
    reason: &str,
    note: String,
) {
    ctx.events
        .publish(
            &installation.object_ref(&()),
            type_,
            reason,
            actions::RECONCILE,
            Some(note),
        )
        .await;
}
