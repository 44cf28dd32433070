//! Child convergence
//!
//! `create_or_update` fetches a child, lets a mutate step write the fields
//! this controller owns, and only talks to the store again when something
//! actually changed. The mutate steps leave every other field alone
//! (server defaults, fields written by other actors), which is what makes a
//! second pass with the same spec a no-op.
//!
//! The controller owner reference is set inside the mutate step, so a child
//! is never created without it.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;

use webapp_common::Error;

use crate::compiler::{DesiredDeployment, DesiredService, CONTAINER_NAME};
use crate::store::{ObjectKey, ResourceStore};

/// What `create_or_update` did to the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object did not exist and was created
    Created,
    /// The object existed and was replaced
    Updated,
    /// The object already matched; nothing was written
    Unchanged,
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// A child kind the store knows how to read and write
#[async_trait]
pub trait ChildObject:
    Resource<DynamicType = ()> + Clone + Default + PartialEq + Send + Sync + 'static
{
    /// Read the object, `None` if missing
    async fn fetch(store: &dyn ResourceStore, key: &ObjectKey) -> Result<Option<Self>, Error>;
    /// Create the object
    async fn create(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error>;
    /// Replace the object
    async fn update(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error>;
}

#[async_trait]
impl ChildObject for Deployment {
    async fn fetch(store: &dyn ResourceStore, key: &ObjectKey) -> Result<Option<Self>, Error> {
        store.get_deployment(key).await
    }

    async fn create(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error> {
        store.create_deployment(obj).await
    }

    async fn update(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error> {
        store.update_deployment(obj).await
    }
}

#[async_trait]
impl ChildObject for Service {
    async fn fetch(store: &dyn ResourceStore, key: &ObjectKey) -> Result<Option<Self>, Error> {
        store.get_service(key).await
    }

    async fn create(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error> {
        store.create_service(obj).await
    }

    async fn update(store: &dyn ResourceStore, obj: &Self) -> Result<Self, Error> {
        store.update_service(obj).await
    }
}

/// Create the object at `key`, or update it if `mutate` changes it
///
/// `mutate` receives the live object (or an empty one carrying only the
/// key) and must not change its name or namespace.
pub async fn create_or_update<K, F>(
    store: &dyn ResourceStore,
    key: &ObjectKey,
    mutate: F,
) -> Result<(K, OperationResult), Error>
where
    K: ChildObject,
    F: FnOnce(&mut K) -> Result<(), Error> + Send,
{
    match K::fetch(store, key).await? {
        None => {
            let mut obj = K::default();
            obj.meta_mut().name = Some(key.name.clone());
            obj.meta_mut().namespace = Some(key.namespace.clone());
            mutate(&mut obj)?;
            ensure_key_unchanged(&obj, key)?;
            let created = K::create(store, &obj).await?;
            Ok((created, OperationResult::Created))
        }
        Some(current) => {
            let mut obj = current.clone();
            mutate(&mut obj)?;
            ensure_key_unchanged(&obj, key)?;
            if obj == current {
                return Ok((current, OperationResult::Unchanged));
            }
            let updated = K::update(store, &obj).await?;
            Ok((updated, OperationResult::Updated))
        }
    }
}

fn ensure_key_unchanged<K: Resource<DynamicType = ()>>(
    obj: &K,
    key: &ObjectKey,
) -> Result<(), Error> {
    let meta = obj.meta();
    if meta.name.as_deref() != Some(key.name.as_str())
        || meta.namespace.as_deref() != Some(key.namespace.as_str())
    {
        return Err(Error::internal_with_context(
            "converger",
            format!("mutate step changed the key of {} {}", K::kind(&()), key),
        ));
    }
    Ok(())
}

/// Make `owner` the controller of a child
///
/// Fails if a different object already controls the child. An existing
/// reference to the same owner is replaced in place so reference order is
/// stable across passes.
pub fn set_controller_reference(
    child_kind: &str,
    meta: &mut ObjectMeta,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(Error::already_owned(
            child_kind,
            meta.name.clone().unwrap_or_default(),
            format!("{} {}", existing.kind, existing.name),
        ));
    }
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(slot) => *slot = owner.clone(),
        None => refs.push(owner.clone()),
    }
    Ok(())
}

/// Write the controller-owned fields of a Deployment
pub fn apply_deployment(
    deployment: &mut Deployment,
    desired: &DesiredDeployment,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let spec = deployment.spec.get_or_insert_with(DeploymentSpec::default);
    spec.replicas = Some(desired.replicas);
    spec.selector = LabelSelector {
        match_labels: Some(desired.selector.clone()),
        ..Default::default()
    };

    let template_meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
    template_meta
        .labels
        .get_or_insert_with(Default::default)
        .extend(desired.template_labels.clone());

    // The container list is owned: keep only our container, with whatever
    // the API server defaulted on it
    let pod_spec = spec.template.spec.get_or_insert_with(Default::default);
    let mut container = pod_spec
        .containers
        .drain(..)
        .find(|c| c.name == CONTAINER_NAME)
        .unwrap_or_else(|| Container {
            name: CONTAINER_NAME.to_string(),
            ..Default::default()
        });
    container.image = Some(desired.image.clone());
    let port_matches = matches!(
        container.ports.as_deref(),
        Some([port]) if port.container_port == desired.container_port
    );
    if !port_matches {
        container.ports = Some(vec![ContainerPort {
            container_port: desired.container_port,
            ..Default::default()
        }]);
    }
    pod_spec.containers = vec![container];

    set_controller_reference("Deployment", &mut deployment.metadata, owner)
}

/// Write the controller-owned fields of a Service
pub fn apply_service(
    service: &mut Service,
    desired: &DesiredService,
    owner: &OwnerReference,
) -> Result<(), Error> {
    let spec = service.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(desired.selector.clone());
    spec.type_ = Some(desired.type_.clone());

    let target = IntOrString::Int(desired.target_port);
    let port_matches = matches!(
        spec.ports.as_deref(),
        Some([port]) if port.port == desired.port && port.target_port.as_ref() == Some(&target)
    );
    if !port_matches {
        spec.ports = Some(vec![ServicePort {
            port: desired.port,
            target_port: Some(target),
            ..Default::default()
        }]);
    }

    set_controller_reference("Service", &mut service.metadata, owner)
}

/// Converge the Deployment child
pub async fn converge_deployment(
    store: &dyn ResourceStore,
    namespace: &str,
    desired: &DesiredDeployment,
    owner: &OwnerReference,
) -> Result<OperationResult, Error> {
    let key = ObjectKey::new(namespace, desired.name.clone());
    let (_, op) = create_or_update::<Deployment, _>(store, &key, |deployment| {
        apply_deployment(deployment, desired, owner)
    })
    .await?;
    Ok(op)
}

/// Converge the Service child
pub async fn converge_service(
    store: &dyn ResourceStore,
    namespace: &str,
    desired: &DesiredService,
    owner: &OwnerReference,
) -> Result<OperationResult, Error> {
    let key = ObjectKey::new(namespace, desired.name.clone());
    let (_, op) = create_or_update::<Service, _>(store, &key, |service| {
        apply_service(service, desired, owner)
    })
    .await?;
    Ok(op)
}
