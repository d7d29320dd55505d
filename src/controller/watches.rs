//! Secondary watches
//!
//! Product namespaces carry the name of the Installation that created them.
//! A change to one of them (a namespace finishing termination, for example)
//! wakes the owning Installation instead of waiting for the requeue timer.

use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::Installation;
use crate::product::INSTALLATION_LABEL;

/// Installation to reconcile when a labelled product namespace changes
///
/// Installations live in the watch namespace; product namespaces are
/// cluster scoped, so the reference is rebuilt from the label value.
pub fn installation_for_namespace(
    namespace: &Namespace,
    watch_namespace: &str,
) -> Option<ObjectRef<Installation>> {
    let installation = namespace.labels().get(INSTALLATION_LABEL)?;
    if installation.is_empty() {
        return None;
    }
    debug!(
        namespace = %namespace.name_any(),
        %installation,
        "Product namespace changed"
    );
    Some(ObjectRef::new(installation).within(watch_namespace))
}
