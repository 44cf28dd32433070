//! Controller runner - builds the NginxWebApp controller future
//!
//! The watch on NginxWebApp drives reconciliation; `owns` watches on
//! Deployments and Services requeue the owner when a child drifts.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use webapp_common::crd::NginxWebApp;
use webapp_controller::{error_policy, reconcile, Context, ControllerConfig};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Build the NginxWebApp controller future
///
/// Watches one namespace when `namespace` is set, otherwise the whole
/// cluster. The future completes on SIGTERM/SIGINT.
pub fn build_webapp_controller(
    client: Client,
    namespace: Option<&str>,
    config: ControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let webapps: Api<NginxWebApp> = scoped_api(&client, namespace);
    let deployments: Api<Deployment> = scoped_api(&client, namespace);
    let services: Api<Service> = scoped_api(&client, namespace);

    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "- NginxWebApp controller"),
        None => tracing::info!("- NginxWebApp controller (all namespaces)"),
    }

    let ctx = Arc::new(Context::new(client, config));
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    Box::pin(
        Controller::new(webapps, watcher())
            .owns(deployments, watcher())
            .owns(services, watcher())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("NginxWebApp")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
