//! In-memory [`KubeClient`] for reconcile tests
//!
//! Keeps resource versions the way the API server does: every accepted
//! Installation write bumps the version, and a write carrying an older
//! version is rejected with 409. Objects marked for deletion disappear once
//! their last finalizer is removed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;

use super::{KubeClient, ResourceDescriptor, RouteIngress};
use crate::crd::Installation;
use crate::Error;

type Key = (String, String);

#[derive(Default)]
struct State {
    installations: BTreeMap<Key, Installation>,
    secrets: BTreeMap<Key, Secret>,
    namespaces: BTreeMap<String, Namespace>,
    resources: BTreeSet<(String, String, String)>,
    routes: BTreeMap<Key, RouteIngress>,
    next_version: u64,
    status_writes: usize,
    spec_writes: usize,
    conflict_status_writes: usize,
    conflict_spec_writes: usize,
    slow_namespace_deletion: bool,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn installation_key(installation: &Installation) -> Key {
    key(
        &installation.namespace().unwrap_or_default(),
        &installation.name_any(),
    )
}

/// Shared in-memory cluster; clones see the same state
#[derive(Clone, Default)]
pub struct FakeKubeClient {
    state: Arc<Mutex<State>>,
}

impl FakeKubeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an Installation as if a user had created it
    pub fn insert_installation(&self, mut installation: Installation) -> Installation {
        let mut state = self.state.lock().unwrap();
        installation.metadata.resource_version = Some(state.bump());
        state
            .installations
            .insert(installation_key(&installation), installation.clone());
        installation
    }

    /// Current stored copy of an Installation
    pub fn installation(&self, namespace: &str, name: &str) -> Option<Installation> {
        self.state
            .lock()
            .unwrap()
            .installations
            .get(&key(namespace, name))
            .cloned()
    }

    /// Drop an Installation outright, as garbage collection would
    pub fn remove_installation(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .installations
            .remove(&key(namespace, name));
    }

    /// Mark an Installation for deletion, the way `kubectl delete` does
    pub fn request_deletion(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        if let Some(inst) = state.installations.get_mut(&key(namespace, name)) {
            inst.metadata.deletion_timestamp = Some(
                k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Default::default()),
            );
            inst.metadata.resource_version = Some(version);
        }
    }

    /// Simulate a concurrent writer touching the Installation
    pub fn touch_installation(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        if let Some(inst) = state.installations.get_mut(&key(namespace, name)) {
            inst.metadata.resource_version = Some(version);
        }
    }

    pub fn insert_secret(&self, namespace: &str, name: &str) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .secrets
            .insert(key(namespace, name), secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn insert_namespace(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.namespaces.insert(name.to_string(), active_namespace(name, BTreeMap::new()));
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains_key(name)
    }

    pub fn namespace_labels(&self, name: &str) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .namespaces
            .get(name)
            .and_then(|ns| ns.metadata.labels.clone())
            .unwrap_or_default()
    }

    /// Register an object that preflight conflict checks will find
    pub fn insert_resource(&self, kind: &str, namespace: &str, name: &str) {
        self.state.lock().unwrap().resources.insert((
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        ));
    }

    pub fn insert_route(&self, namespace: &str, name: &str, host: &str, canonical: &str) {
        self.state.lock().unwrap().routes.insert(
            key(namespace, name),
            RouteIngress {
                host: host.to_string(),
                router_canonical_hostname: canonical.to_string(),
            },
        );
    }

    /// Reject the next `count` status writes with 409
    pub fn conflict_next_status_writes(&self, count: usize) {
        self.state.lock().unwrap().conflict_status_writes = count;
    }

    /// Reject the next `count` finalizer/spec writes with 409
    pub fn conflict_next_spec_writes(&self, count: usize) {
        self.state.lock().unwrap().conflict_spec_writes = count;
    }

    /// Deleted namespaces linger in Terminating until deleted a second time
    pub fn slow_namespace_deletion(&self) {
        self.state.lock().unwrap().slow_namespace_deletion = true;
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }

    pub fn spec_writes(&self) -> usize {
        self.state.lock().unwrap().spec_writes
    }

    fn check_version<'a>(
        state: &'a mut State,
        installation: &Installation,
    ) -> Result<&'a mut Installation, Error> {
        let k = installation_key(installation);
        let stored = state.installations.get_mut(&k).ok_or_else(|| {
            api_error(404, "NotFound", format!("installation {} not found", k.1))
        })?;
        if stored.resource_version() != installation.resource_version() {
            return Err(api_error(
                409,
                "Conflict",
                "the object has been modified; please apply your changes to the latest version"
                    .to_string(),
            ));
        }
        Ok(stored)
    }
}

fn active_namespace(name: &str, labels: BTreeMap<String, String>) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(NamespaceStatus {
            phase: Some("Active".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl KubeClient for FakeKubeClient {
    async fn get_installation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Installation>, Error> {
        Ok(self.installation(namespace, name))
    }

    async fn list_installations(&self, namespace: &str) -> Result<Vec<Installation>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .installations
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, inst)| inst.clone())
            .collect())
    }

    async fn create_installation(&self, installation: &Installation) -> Result<Installation, Error> {
        let k = installation_key(installation);
        if self.state.lock().unwrap().installations.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists", format!("{} exists", k.1)));
        }
        Ok(self.insert_installation(installation.clone()))
    }

    async fn update_installation_status(
        &self,
        installation: &Installation,
    ) -> Result<Installation, Error> {
        let mut state = self.state.lock().unwrap();
        if state.conflict_status_writes > 0 {
            state.conflict_status_writes -= 1;
            return Err(api_error(409, "Conflict", "injected conflict".to_string()));
        }
        let version = state.bump();
        let stored = Self::check_version(&mut state, installation)?;
        stored.status = installation.status.clone();
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();
        state.status_writes += 1;
        Ok(updated)
    }

    async fn update_installation(&self, installation: &Installation) -> Result<Installation, Error> {
        let mut state = self.state.lock().unwrap();
        if state.conflict_spec_writes > 0 {
            state.conflict_spec_writes -= 1;
            return Err(api_error(409, "Conflict", "injected conflict".to_string()));
        }
        let version = state.bump();
        let stored = Self::check_version(&mut state, installation)?;
        stored.spec = installation.spec.clone();
        stored.metadata.finalizers = installation.metadata.finalizers.clone();
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();
        state.spec_writes += 1;

        if updated.is_deleting() && updated.finalizers().is_empty() {
            state.installations.remove(&installation_key(&updated));
        }
        Ok(updated)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secret(namespace, name))
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<(), Error> {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.state.lock().unwrap().secrets.insert(k, secret.clone());
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.lock().unwrap().namespaces.keys().cloned().collect())
    }

    async fn resource_exists(&self, resource: &ResourceDescriptor) -> Result<bool, Error> {
        Ok(self.state.lock().unwrap().resources.contains(&(
            resource.kind.clone(),
            resource.namespace.clone(),
            resource.name.clone(),
        )))
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        Ok(self.state.lock().unwrap().namespaces.get(name).cloned())
    }

    async fn ensure_namespace(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), Error> {
        self.state
            .lock()
            .unwrap()
            .namespaces
            .insert(name.to_string(), active_namespace(name, labels));
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        let slow = state.slow_namespace_deletion;
        let Some(ns) = state.namespaces.get_mut(name) else {
            return Ok(());
        };
        let terminating = ns
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Terminating");
        if slow && !terminating {
            ns.status = Some(NamespaceStatus {
                phase: Some("Terminating".to_string()),
                ..Default::default()
            });
        } else {
            state.namespaces.remove(name);
        }
        Ok(())
    }

    async fn get_route_ingress(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<RouteIngress>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .routes
            .get(&key(namespace, name))
            .cloned())
    }
}
