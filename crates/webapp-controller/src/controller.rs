//! NginxWebApp reconciliation entry point
//!
//! One pass runs, in order: fetch → finalizer → synthesize → converge
//! Deployment → converge Service → project status. Only the deletion path
//! returns early.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument};

use webapp_common::crd::{NginxWebApp, WebAppPhase};
use webapp_common::{Error, DEFAULT_IMAGE};

use crate::compiler::synthesize;
use crate::converge::{converge_deployment, converge_service, OperationResult};
use crate::finalizer::{handle_finalizer, ChildCleanup, FinalizerOutcome};
use crate::status::update_status;
use crate::store::{KubeStore, ObjectKey, ResourceStore};

/// Requeue interval while replicas are still rolling out
pub const CREATING_REQUEUE: Duration = Duration::from_secs(10);

/// Requeue interval after a status write failed
pub const STATUS_RETRY_REQUEUE: Duration = Duration::from_secs(30);

/// Periodic resync of a settled NginxWebApp
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue after losing an optimistic-concurrency race
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Requeue after any other failure
pub const ERROR_REQUEUE: Duration = Duration::from_secs(15);

/// Controller behaviour knobs
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Image used when a spec leaves `image` empty
    pub default_image: String,
    /// How children are removed on deletion
    pub child_cleanup: ChildCleanup,
    /// Deadline for one reconciliation pass
    pub reconcile_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_image: DEFAULT_IMAGE.to_string(),
            child_cleanup: ChildCleanup::default(),
            reconcile_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared context for the NginxWebApp controller
pub struct Context {
    store: Arc<dyn ResourceStore>,
    config: ControllerConfig,
}

impl Context {
    /// Create a context talking to the cluster through `client`
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self::with_store(Arc::new(KubeStore::new(client)), config)
    }

    /// Create a context over any store
    pub fn with_store(store: Arc<dyn ResourceStore>, config: ControllerConfig) -> Self {
        Self { store, config }
    }

    /// The object store
    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    /// Controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

/// Result of one pass: when the scheduler should come back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `None` waits for the next watch event
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    fn for_phase(phase: Option<WebAppPhase>) -> Self {
        let after = match phase {
            // Deployment unreadable right after converging it; look again soon
            None | Some(WebAppPhase::Creating) => CREATING_REQUEUE,
            Some(WebAppPhase::Error) => STATUS_RETRY_REQUEUE,
            _ => RESYNC_INTERVAL,
        };
        Self {
            requeue_after: Some(after),
        }
    }

    /// Convert into a kube-runtime action
    pub fn into_action(self) -> Action {
        match self.requeue_after {
            Some(after) => Action::requeue(after),
            None => Action::await_change(),
        }
    }
}

/// Reconcile the NginxWebApp at `key`
///
/// A missing object is a successful no-op. Store errors are returned as
/// they are; a failed status write is not an error.
#[instrument(skip_all, fields(webapp = %key))]
pub async fn reconcile_key(key: &ObjectKey, ctx: &Context) -> Result<ReconcileOutcome, Error> {
    let store = ctx.store();

    let Some(webapp) = store.get_webapp(key).await? else {
        debug!("NginxWebApp not found, nothing to do");
        return Ok(ReconcileOutcome::await_change());
    };

    let webapp = match handle_finalizer(store, webapp, ctx.config.child_cleanup).await? {
        FinalizerOutcome::Proceed(webapp) => webapp,
        FinalizerOutcome::Finished => return Ok(ReconcileOutcome::await_change()),
    };

    let owner = webapp
        .controller_owner_ref(&())
        .ok_or_else(|| Error::missing_field(NginxWebApp::kind(&()), "metadata.uid"))?;

    let desired = synthesize(&key.name, &webapp.spec, &ctx.config.default_image);

    let op = converge_deployment(store, &key.namespace, &desired.deployment, &owner).await?;
    log_child_op("Deployment", &desired.deployment.name, op);

    let op = converge_service(store, &key.namespace, &desired.service, &owner).await?;
    log_child_op("Service", &desired.service.name, op);

    let phase = update_status(store, &webapp, &desired.deployment).await?;
    Ok(ReconcileOutcome::for_phase(phase))
}

fn log_child_op(kind: &str, name: &str, op: OperationResult) {
    match op {
        OperationResult::Unchanged => debug!(kind, name, "child up to date"),
        _ => info!(kind, name, operation = %op, "child converged"),
    }
}

/// Reconcile entry point for `kube::runtime::Controller`
///
/// Bounds the pass by the configured deadline.
pub async fn reconcile(webapp: Arc<NginxWebApp>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ObjectKey::for_resource(webapp.as_ref())?;
    let deadline = ctx.config.reconcile_timeout;

    match tokio::time::timeout(deadline, reconcile_key(&key, &ctx)).await {
        Ok(outcome) => Ok(outcome?.into_action()),
        Err(_) => Err(Error::timeout(key.to_string(), deadline)),
    }
}

/// How long to wait before retrying after `error`
pub fn error_requeue(error: &Error) -> Duration {
    if error.is_conflict() {
        CONFLICT_REQUEUE
    } else {
        ERROR_REQUEUE
    }
}

/// Error policy for NginxWebApp reconciliation
pub fn error_policy(webapp: Arc<NginxWebApp>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_conflict() {
        debug!(webapp = %webapp.name_any(), %error, "conflict, requeueing");
    } else {
        error!(
            ?error,
            webapp = %webapp.name_any(),
            retryable = error.is_retryable(),
            "NginxWebApp reconciliation failed"
        );
    }
    Action::requeue(error_requeue(error))
}
