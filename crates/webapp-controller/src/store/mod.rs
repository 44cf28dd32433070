//! Object store abstraction
//!
//! The reconciliation loop talks to the API server only through
//! [`ResourceStore`]. Reads report a missing object as `Ok(None)`, deletes of
//! a missing object succeed, and stale writes fail with
//! [`Error::Conflict`](webapp_common::Error::Conflict) so callers can tell a
//! lost optimistic-concurrency race apart from a real fault.

mod kube_store;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Resource;

#[cfg(test)]
use mockall::automock;

use webapp_common::crd::NginxWebApp;
use webapp_common::Error;

pub use kube_store::KubeStore;

/// Namespace and name addressing one object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing namespaced object
    pub fn for_resource<K: Resource<DynamicType = ()>>(obj: &K) -> Result<Self, Error> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| Error::missing_field(K::kind(&()), "metadata.name"))?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or_else(|| Error::missing_field(K::kind(&()), "metadata.namespace"))?;
        Ok(Self { namespace, name })
    }

    /// Key of a sibling object in the same namespace
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Trait abstracting object store operations for the NginxWebApp controller
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a NginxWebApp, `None` if it does not exist
    async fn get_webapp(&self, key: &ObjectKey) -> Result<Option<NginxWebApp>, Error>;

    /// Replace a NginxWebApp's metadata and spec
    ///
    /// The write is guarded by the object's `resourceVersion`; a stale copy
    /// fails with `Error::Conflict`.
    async fn update_webapp(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error>;

    /// Replace a NginxWebApp's status through the status subresource
    async fn update_webapp_status(&self, webapp: &NginxWebApp) -> Result<NginxWebApp, Error>;

    /// Get a Deployment, `None` if it does not exist
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Option<Deployment>, Error>;

    /// Create a Deployment
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;

    /// Replace an existing Deployment
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, Error>;

    /// Delete a Deployment; deleting a missing Deployment succeeds
    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), Error>;

    /// Get a Service, `None` if it does not exist
    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>, Error>;

    /// Create a Service
    async fn create_service(&self, service: &Service) -> Result<Service, Error>;

    /// Replace an existing Service
    async fn update_service(&self, service: &Service) -> Result<Service, Error>;

    /// Delete a Service; deleting a missing Service succeeds
    async fn delete_service(&self, key: &ObjectKey) -> Result<(), Error>;
}
