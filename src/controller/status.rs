//! Persisting the Installation after a reconcile pass
//!
//! Status and finalizers/spec are written as two separate conditional
//! writes, each only when it differs from what the pass started with. A
//! version conflict on either drops the write and asks for a requeue; the
//! next pass re-reads the object and recomputes every change.

use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::client::KubeClient;
use crate::crd::{Installation, InstallationSpec, InstallationStatus};
use crate::Error;

/// The persisted parts of an Installation as read at the start of a pass
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    status: Option<InstallationStatus>,
    spec: InstallationSpec,
    finalizers: Vec<String>,
}

impl Snapshot {
    pub(crate) fn of(installation: &Installation) -> Self {
        Self {
            status: installation.status.clone(),
            spec: installation.spec.clone(),
            finalizers: installation.finalizers().to_vec(),
        }
    }

    fn status_changed(&self, installation: &Installation) -> bool {
        self.status != installation.status
    }

    fn spec_changed(&self, installation: &Installation) -> bool {
        self.spec != installation.spec || self.finalizers.as_slice() != installation.finalizers()
    }
}

/// Write status, then finalizers and spec
///
/// Returns `Ok(Some(action))` when a write hit a version conflict, `Ok(None)`
/// when everything that changed was written. Other write errors are
/// returned as-is.
pub(crate) async fn persist(
    kube: &dyn KubeClient,
    installation: &mut Installation,
    snapshot: &Snapshot,
    requeue_after: Duration,
) -> Result<Option<Action>, Error> {
    if snapshot.status_changed(installation) {
        match kube.update_installation_status(installation).await {
            Ok(updated) => {
                installation.metadata.resource_version = updated.metadata.resource_version;
            }
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "Status write conflicted, retrying later");
                return Ok(Some(Action::requeue(requeue_after)));
            }
            Err(e) => return Err(e),
        }
    } else {
        debug!("Status unchanged, skipping write");
    }

    if snapshot.spec_changed(installation) {
        match kube.update_installation(installation).await {
            Ok(updated) => {
                installation.metadata.resource_version = updated.metadata.resource_version;
            }
            Err(e) if e.is_conflict() => {
                warn!(error = %e, "Finalizer/spec write conflicted, retrying later");
                return Ok(Some(Action::requeue(requeue_after)));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(None)
}
