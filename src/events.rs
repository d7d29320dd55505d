//! Kubernetes Event recording for the Installation controller
//!
//! Events are fire-and-forget: failures are logged and never propagate. A
//! failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about an Installation
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given object
    ///
    /// * `reason` - machine-readable reason, see [`reasons`]
    /// * `action` - what the controller was doing, see [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Every product of a stage reported Completed
    pub const STAGE_COMPLETED: &str = "StageCompleted";
    /// A product reported Completed for the first time
    pub const PRODUCT_COMPLETED: &str = "ProductCompleted";
    /// A product reconciler returned an error
    pub const PRODUCT_RECONCILE_FAILED: &str = "ProductReconcileFailed";
    /// A preflight check failed
    pub const PREFLIGHT_FAILED: &str = "PreflightFailed";
    /// All preflight checks passed
    pub const PREFLIGHT_PASSED: &str = "PreflightPassed";
    /// The bootstrap stage failed
    pub const BOOTSTRAP_FAILED: &str = "BootstrapFailed";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Regular reconcile pass
    pub const RECONCILE: &str = "Reconcile";
    /// Preflight gate
    pub const PREFLIGHT: &str = "Preflight";
    /// Teardown of products
    pub const DELETE: &str = "Delete";
}
