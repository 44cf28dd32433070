//! In-memory `ResourceStore` for multi-pass tests
//!
//! Behaves like a small API server: writes are guarded by `resourceVersion`,
//! a deleting object disappears once its last finalizer is removed, and
//! removing an owner garbage-collects the children it controls.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;

use webapp_common::crd::NginxWebApp;
use webapp_common::kube_utils::{controller_of, is_being_deleted};
use webapp_common::Error;

use super::{ObjectKey, ResourceStore};

#[derive(Default)]
struct State {
    webapps: BTreeMap<ObjectKey, NginxWebApp>,
    deployments: BTreeMap<ObjectKey, Deployment>,
    services: BTreeMap<ObjectKey, Service>,
    version: u64,
    uids: u64,
    calls: Vec<String>,
    fail_webapp_update: bool,
    fail_status_update: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Drop a deleting owner whose finalizers are gone, with its children
    fn collect_garbage(&mut self, key: &ObjectKey) {
        let Some(webapp) = self.webapps.get(key) else {
            return;
        };
        let finalizers_left = webapp
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if !is_being_deleted(webapp) || finalizers_left {
            return;
        }
        let uid = webapp.metadata.uid.clone();
        self.webapps.remove(key);
        self.deployments
            .retain(|_, d| controller_of(d).map(|r| Some(&r.uid)) != Some(uid.as_ref()));
        self.services
            .retain(|_, s| controller_of(s).map(|r| Some(&r.uid)) != Some(uid.as_ref()));
    }
}

fn check_version<K: Resource<DynamicType = ()>>(
    stored: &K,
    incoming: &K,
    key: &ObjectKey,
) -> Result<(), Error> {
    if stored.meta().resource_version != incoming.meta().resource_version {
        return Err(Error::conflict(K::kind(&()), key.to_string()));
    }
    Ok(())
}

fn missing<K: Resource<DynamicType = ()>>(key: &ObjectKey) -> Error {
    Error::internal_with_context("memory-store", format!("{} {} not found", K::kind(&()), key))
}

/// Generic create into one of the maps
fn create_in<K>(
    map: &mut BTreeMap<ObjectKey, K>,
    obj: &K,
    version: String,
) -> Result<K, Error>
where
    K: Resource<DynamicType = ()> + Clone,
{
    let key = ObjectKey::for_resource(obj)?;
    if map.contains_key(&key) {
        return Err(Error::conflict(K::kind(&()), key.to_string()));
    }
    let mut stored = obj.clone();
    stored.meta_mut().resource_version = Some(version);
    map.insert(key, stored.clone());
    Ok(stored)
}

/// Generic replace in one of the maps
fn update_in<K>(
    map: &mut BTreeMap<ObjectKey, K>,
    obj: &K,
    version: String,
) -> Result<K, Error>
where
    K: Resource<DynamicType = ()> + Clone,
{
    let key = ObjectKey::for_resource(obj)?;
    let stored = map.get(&key).ok_or_else(|| missing::<K>(&key))?;
    check_version(stored, obj, &key)?;
    let mut updated = obj.clone();
    updated.meta_mut().resource_version = Some(version);
    map.insert(key, updated.clone());
    Ok(updated)
}

/// Fake object store
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Admit a NginxWebApp as if a user had applied it
    pub(crate) fn insert_webapp(&self, mut webapp: NginxWebApp) -> NginxWebApp {
        let mut state = self.lock();
        let key = ObjectKey::for_resource(&webapp).unwrap();
        if webapp.metadata.uid.is_none() {
            state.uids += 1;
            webapp.metadata.uid = Some(format!("uid-{}", state.uids));
        }
        webapp.metadata.resource_version = Some(state.next_version());
        state.webapps.insert(key, webapp.clone());
        webapp
    }

    /// Request deletion as the API server would
    pub(crate) fn request_deletion(&self, key: &ObjectKey) {
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(webapp) = state.webapps.get_mut(key) {
            webapp.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            webapp.metadata.resource_version = Some(version);
        }
        state.collect_garbage(key);
    }

    /// Report available replicas the way the Deployment controller would
    pub(crate) fn set_available_replicas(&self, key: &ObjectKey, available: i32) {
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(deployment) = state.deployments.get_mut(key) {
            deployment
                .status
                .get_or_insert_with(DeploymentStatus::default)
                .available_replicas = Some(available);
            deployment.metadata.resource_version = Some(version);
        }
    }

    pub(crate) fn fail_webapp_updates(&self) {
        self.lock().fail_webapp_update = true;
    }

    pub(crate) fn fail_status_updates(&self) {
        self.lock().fail_status_update = true;
    }

    pub(crate) fn webapp(&self, key: &ObjectKey) -> Option<NginxWebApp> {
        self.lock().webapps.get(key).cloned()
    }

    pub(crate) fn deployment(&self, key: &ObjectKey) -> Option<Deployment> {
        self.lock().deployments.get(key).cloned()
    }

    pub(crate) fn service(&self, key: &ObjectKey) -> Option<Service> {
        self.lock().services.get(key).cloned()
    }

    /// Every mutating call so far, as `verb kind`
    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of mutating calls that touched a Deployment or Service
    pub(crate) fn child_writes(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.ends_with("Deployment") || c.ends_with("Service"))
            .count()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_webapp(&self, key: &ObjectKey) -> Result<Option<NginxWebApp>, Error> {
        Ok(self.webapp(key))
    }

    async fn update_webapp(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error> {
        let mut state = self.lock();
        state.calls.push("update NginxWebApp".to_string());
        let key = ObjectKey::for_resource(webapp)?;
        if state.fail_webapp_update {
            return Err(Error::internal("injected NginxWebApp update failure"));
        }
        let stored = state
            .webapps
            .get(&key)
            .ok_or_else(|| missing::<NginxWebApp>(&key))?;
        check_version(stored, webapp, &key)?;

        let mut updated = webapp.clone();
        // Status is only writable through the subresource
        updated.status = stored.status.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.webapps.insert(key.clone(), updated.clone());
        state.collect_garbage(&key);
        Ok(updated)
    }

    async fn update_webapp_status(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error> {
        let mut state = self.lock();
        state.calls.push("update_status NginxWebApp".to_string());
        let key = ObjectKey::for_resource(webapp)?;
        if state.fail_status_update {
            return Err(Error::internal("injected status update failure"));
        }
        let stored = state
            .webapps
            .get(&key)
            .ok_or_else(|| missing::<NginxWebApp>(&key))?;
        check_version(stored, webapp, &key)?;

        let mut updated = stored.clone();
        updated.status = webapp.status.clone();
        updated.metadata.resource_version = Some(state.next_version());
        state.webapps.insert(key, updated.clone());
        Ok(updated)
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, Error> {
        Ok(self.deployment(key))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let mut state = self.lock();
        state.calls.push("create Deployment".to_string());
        let version = state.next_version();
        create_in(&mut state.deployments, deployment, version)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let mut state = self.lock();
        state.calls.push("update Deployment".to_string());
        let version = state.next_version();
        update_in(&mut state.deployments, deployment, version)
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), Error> {
        let mut state = self.lock();
        state.calls.push("delete Deployment".to_string());
        state.deployments.remove(key);
        Ok(())
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error> {
        Ok(self.service(key))
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        let mut state = self.lock();
        state.calls.push("create Service".to_string());
        let version = state.next_version();
        create_in(&mut state.services, service, version)
    }

    async fn update_service(&self, service: &Service) -> Result<Service, Error> {
        let mut state = self.lock();
        state.calls.push("update Service".to_string());
        let version = state.next_version();
        update_in(&mut state.services, service, version)
    }

    async fn delete_service(&self, key: &ObjectKey) -> Result<(), Error> {
        let mut state = self.lock();
        state.calls.push("delete Service".to_string());
        state.services.remove(key);
        Ok(())
    }
}
