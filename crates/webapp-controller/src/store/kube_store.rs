//! `ResourceStore` backed by the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde_json::json;
use tracing::debug;

use webapp_common::crd::NginxWebApp;
use webapp_common::kube_utils::{is_conflict, is_not_found};
use webapp_common::{Error, FIELD_MANAGER};

use super::{ObjectKey, ResourceStore};

/// Real Kubernetes store implementation
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a new KubeStore wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

/// Map a write failure, surfacing 409 as `Error::Conflict`
fn write_error<K: Resource<DynamicType = ()>>(key: &ObjectKey, err: kube::Error) -> Error {
    if is_conflict(&err) {
        Error::conflict(K::kind(&()), key.to_string())
    } else {
        err.into()
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, Error>
where
    K: Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn delete_ignoring_missing<K>(api: &Api<K>, key: &ObjectKey) -> Result<(), Error>
where
    K: Resource<DynamicType = ()> + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(&key.name, &DeleteParams::background()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => {
            debug!(kind = %K::kind(&()), object = %key, "already deleted");
            Ok(())
        }
        Err(e) => Err(write_error::<K>(key, e)),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_webapp(&self, key: &ObjectKey) -> Result<Option<NginxWebApp>, Error> {
        get_opt(&self.api::<NginxWebApp>(&key.namespace), &key.name).await
    }

    async fn update_webapp(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error> {
        let key = ObjectKey::for_resource(webapp)?;
        self.api::<NginxWebApp>(&key.namespace)
            .replace(&key.name, &post_params(), webapp)
            .await
            .map_err(|e| write_error::<NginxWebApp>(&key, e))
    }

    async fn update_webapp_status(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error> {
        let key = ObjectKey::for_resource(webapp)?;
        // resourceVersion turns the merge patch into a compare-and-swap
        let patch = json!({
            "metadata": { "resourceVersion": webapp.metadata.resource_version },
            "status": webapp.status.clone().unwrap_or_default(),
        });
        self.api::<NginxWebApp>(&key.namespace)
            .patch_status(
                &key.name,
                &PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| write_error::<NginxWebApp>(&key, e))
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, Error> {
        get_opt(&self.api::<Deployment>(&key.namespace), &key.name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let key = ObjectKey::for_resource(deployment)?;
        self.api::<Deployment>(&key.namespace)
            .create(&post_params(), deployment)
            .await
            .map_err(|e| write_error::<Deployment>(&key, e))
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error> {
        let key = ObjectKey::for_resource(deployment)?;
        self.api::<Deployment>(&key.namespace)
            .replace(&key.name, &post_params(), deployment)
            .await
            .map_err(|e| write_error::<Deployment>(&key, e))
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), Error> {
        delete_ignoring_missing(&self.api::<Deployment>(&key.namespace), key).await
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error> {
        get_opt(&self.api::<Service>(&key.namespace), &key.name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, Error> {
        let key = ObjectKey::for_resource(service)?;
        self.api::<Service>(&key.namespace)
            .create(&post_params(), service)
            .await
            .map_err(|e| write_error::<Service>(&key, e))
    }

    async fn update_service(&self, service: &Service) -> Result<Service, Error> {
        let key = ObjectKey::for_resource(service)?;
        self.api::<Service>(&key.namespace)
            .replace(&key.name, &post_params(), service)
            .await
            .map_err(|e| write_error::<Service>(&key, e))
    }

    async fn delete_service(&self, key: &ObjectKey) -> Result<(), Error> {
        delete_ignoring_missing(&self.api::<Service>(&key.namespace), key).await
    }
}
