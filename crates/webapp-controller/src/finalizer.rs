//! Finalizer lifecycle
//!
//! Active → Guarded: the finalizer is attached and persisted before anything
//! else runs. Guarded + deletionTimestamp → Deleting: children are cleaned up
//! according to [`ChildCleanup`], the finalizer is detached, and the pass
//! ends there.

use kube::Resource;
use tracing::{debug, info};

use webapp_common::crd::{NginxWebApp, WEBAPP_FINALIZER};
use webapp_common::kube_utils::{
    add_finalizer, controller_of, has_finalizer, is_being_deleted, remove_finalizer,
};
use webapp_common::Error;

use crate::compiler::{deployment_name, service_name};
use crate::store::{ObjectKey, ResourceStore};

/// How children are removed when their owner is deleted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChildCleanup {
    /// Leave it to owner-reference garbage collection
    #[default]
    Cascade,
    /// Delete the Service and the Deployment before releasing the owner
    Explicit,
}

/// Result of running the finalizer step
#[derive(Debug)]
pub enum FinalizerOutcome {
    /// Keep reconciling with this (possibly re-persisted) object
    Proceed(NginxWebApp),
    /// The owner is being deleted and nothing else should run
    Finished,
}

/// Run the finalizer step for a freshly fetched NginxWebApp
///
/// Any store failure aborts the pass so nothing downstream acts on stale
/// metadata.
pub async fn handle_finalizer(
    store: &dyn ResourceStore,
    webapp: NginxWebApp,
    cleanup: ChildCleanup,
) -> Result<FinalizerOutcome, Error> {
    let key = ObjectKey::for_resource(&webapp)?;

    if !is_being_deleted(&webapp) {
        if has_finalizer(&webapp, WEBAPP_FINALIZER) {
            return Ok(FinalizerOutcome::Proceed(webapp));
        }
        let mut guarded = webapp;
        add_finalizer(&mut guarded, WEBAPP_FINALIZER);
        let persisted = store.update_webapp(&guarded).await?;
        debug!(webapp = %key, "finalizer added");
        return Ok(FinalizerOutcome::Proceed(persisted));
    }

    if !has_finalizer(&webapp, WEBAPP_FINALIZER) {
        return Ok(FinalizerOutcome::Finished);
    }

    cleanup_children(store, &webapp, &key, cleanup).await?;

    let mut released = webapp;
    remove_finalizer(&mut released, WEBAPP_FINALIZER);
    store.update_webapp(&released).await?;
    info!(webapp = %key, "finalizer removed, deletion can proceed");
    Ok(FinalizerOutcome::Finished)
}

/// Whether `child` is controlled by the object with `owner_uid`
fn is_controlled_by<K: Resource>(child: &K, owner_uid: Option<&str>) -> bool {
    match (controller_of(child), owner_uid) {
        (Some(r), Some(uid)) => r.uid == uid,
        _ => false,
    }
}

/// Delete the children `webapp` controls; same-named objects controlled by
/// anyone else are left in place
async fn cleanup_children(
    store: &dyn ResourceStore,
    webapp: &NginxWebApp,
    key: &ObjectKey,
    cleanup: ChildCleanup,
) -> Result<(), Error> {
    if cleanup == ChildCleanup::Cascade {
        return Ok(());
    }
    let owner_uid = webapp.metadata.uid.as_deref();

    let service_key = key.sibling(service_name(&key.name));
    match store.get_service(&service_key).await? {
        Some(svc) if is_controlled_by(&svc, owner_uid) => {
            store.delete_service(&service_key).await?;
        }
        Some(_) => debug!(webapp = %key, service = %service_key, "service not ours, skipping"),
        None => {}
    }

    let deployment_key = key.sibling(deployment_name(&key.name));
    match store.get_deployment(&deployment_key).await? {
        Some(deployment) if is_controlled_by(&deployment, owner_uid) => {
            store.delete_deployment(&deployment_key).await?;
        }
        Some(_) => {
            debug!(webapp = %key, deployment = %deployment_key, "deployment not ours, skipping")
        }
        None => {}
    }

    info!(webapp = %key, "children deleted");
    Ok(())
}
