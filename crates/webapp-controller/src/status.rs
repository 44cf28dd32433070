//! Status projection
//!
//! Derives the phase from the live Deployment and writes the whole status
//! back. A failed write is logged and reported as `WebAppPhase::Error` to the
//! caller only; it is never persisted and never fails the pass.

use tracing::{debug, error, warn};

use webapp_common::crd::{
    Condition, ConditionStatus, NginxWebApp, NginxWebAppStatus, WebAppPhase, AVAILABLE_CONDITION,
};
use webapp_common::Error;

use crate::compiler::DesiredDeployment;
use crate::store::{ObjectKey, ResourceStore};

/// Phase for a Deployment with `available` of `desired` replicas up
pub fn derive_phase(available: i32, desired: i32) -> WebAppPhase {
    if available < desired {
        WebAppPhase::Creating
    } else {
        WebAppPhase::Running
    }
}

/// Build the full replacement status
///
/// `endpoint` stays empty: no exposure children are materialized.
pub fn project_status(
    previous: Option<&NginxWebAppStatus>,
    available: i32,
    desired: i32,
) -> NginxWebAppStatus {
    let phase = derive_phase(available, desired);
    let condition = match phase {
        WebAppPhase::Running => Condition::new(
            AVAILABLE_CONDITION,
            ConditionStatus::True,
            "AllReplicasAvailable",
            format!("{available}/{desired} replicas available"),
        ),
        _ => Condition::new(
            AVAILABLE_CONDITION,
            ConditionStatus::False,
            "ReplicasUnavailable",
            format!("{available}/{desired} replicas available"),
        ),
    }
    .carry_transition_time(previous.and_then(|s| s.condition(AVAILABLE_CONDITION)));

    NginxWebAppStatus {
        conditions: vec![condition],
        available_replicas: available,
        endpoint: String::new(),
        phase,
    }
}

/// Project and write status for one NginxWebApp
///
/// Returns the phase of this pass, or `None` when the Deployment could not
/// be read and nothing was projected.
pub async fn update_status(
    store: &dyn ResourceStore,
    webapp: &NginxWebApp,
    desired: &DesiredDeployment,
) -> Result<Option<WebAppPhase>, Error> {
    let key = ObjectKey::for_resource(webapp)?;
    let deployment_key = key.sibling(desired.name.clone());

    let deployment = match store.get_deployment(&deployment_key).await {
        Ok(Some(d)) => d,
        Ok(None) => {
            warn!(
                webapp = %key,
                deployment = %deployment_key,
                "deployment not found, skipping status"
            );
            return Ok(None);
        }
        Err(e) => {
            warn!(webapp = %key, error = %e, "failed to read deployment, skipping status");
            return Ok(None);
        }
    };

    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    let status = project_status(webapp.status.as_ref(), available, desired.replicas);
    let phase = status.phase;

    let mut updated = webapp.clone();
    updated.status = Some(status);
    match store.update_webapp_status(&updated).await {
        Ok(_) => {
            debug!(webapp = %key, %phase, available, "status updated");
            Ok(Some(phase))
        }
        Err(e) => {
            error!(webapp = %key, error = %e, "failed to update status");
            Ok(Some(WebAppPhase::Error))
        }
    }
}
