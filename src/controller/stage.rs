//! Stage sequencing
//!
//! Products of a stage are reconciled one after another. A failing product
//! does not stop its siblings; its error is collected and the stage stays
//! InProgress so the whole stage is retried on the next pass.

use tracing::{debug, instrument};

use crate::crd::{Installation, Phase, ProductStatus, StageStatus};
use crate::error::ProductErrors;
use crate::installation_type::Stage;
use crate::product::{ProductRegistry, ReconcileScope};
use crate::Error;

/// Result of one pass over a stage
#[derive(Debug)]
pub(crate) struct StageOutcome {
    /// Aggregated stage phase, already recorded on the status
    pub phase: Phase,
    /// Product failures, `None` when every product reconciled cleanly
    pub errors: Option<ProductErrors>,
    /// Products that reached Completed during this pass
    pub newly_completed: Vec<String>,
}

/// Reconcile every product of `stage` and record the stage phase
#[instrument(skip_all, fields(stage = %stage.name))]
pub(crate) async fn run_stage(
    registry: &ProductRegistry,
    scope: &ReconcileScope,
    installation: &mut Installation,
    stage: &Stage,
) -> StageOutcome {
    let mut errors = ProductErrors::new();
    let mut newly_completed = Vec::new();

    for descriptor in &stage.products {
        let name = descriptor.name.as_str();
        if let Err(e) = scope.ensure_active(name) {
            errors.push(e);
            break;
        }

        let mut slot = stage_status(installation, &stage.name)
            .products
            .entry(name.to_string())
            .or_insert_with(|| ProductStatus::named(name))
            .clone();

        let result = match registry.reconciler_for(descriptor, installation) {
            Ok(reconciler) => reconciler.reconcile(scope, installation, &mut slot).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(phase) => {
                debug!(product = name, %phase, "Product reconciled");
                if phase.is_completed() && !slot.phase.is_completed() {
                    newly_completed.push(name.to_string());
                }
                slot.phase = phase;
            }
            Err(e) => errors.push(attribute(name, e)),
        }

        stage_status(installation, &stage.name)
            .products
            .insert(name.to_string(), slot);
    }

    let status = stage_status(installation, &stage.name);
    let complete = stage.products.iter().all(|p| {
        status
            .products
            .get(&p.name)
            .is_some_and(|slot| slot.phase.is_completed())
    });
    let phase = if complete {
        Phase::Completed
    } else {
        Phase::InProgress
    };
    status.phase = phase;

    StageOutcome {
        phase,
        errors: errors.into_option(),
        newly_completed,
    }
}

/// Stage status slot, created on first visit
pub(crate) fn stage_status<'a>(installation: &'a mut Installation, stage: &str) -> &'a mut StageStatus {
    installation
        .status_mut()
        .stages
        .entry(stage.to_string())
        .or_insert_with(|| StageStatus::named(stage))
}

fn attribute(product: &str, err: Error) -> Error {
    match err {
        Error::Product { .. } => err,
        other => Error::product(product, other.to_string()),
    }
}
