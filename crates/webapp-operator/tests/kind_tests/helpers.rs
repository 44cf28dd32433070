//! Shared setup for kind tests

use std::future::Future;
use std::time::Duration;

use kube::api::{Api, DeleteParams};
use kube::Client;
use tokio::task::JoinHandle;

use webapp_common::crd::NginxWebApp;
use webapp_controller::ControllerConfig;
use webapp_operator::controller_runner::build_webapp_controller;
use webapp_operator::startup::ensure_crd_installed;

/// Namespace the tests create objects in
pub const TEST_NAMESPACE: &str = "default";

/// Upper bound for any convergence the tests wait on
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(90);

/// Connect to the current cluster and make sure the CRD is installed
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let client = Client::try_default()
        .await
        .map_err(|e| format!("no usable kubeconfig: {e}"))?;
    ensure_crd_installed(&client)
        .await
        .map_err(|e| format!("failed to install CRD: {e}"))?;
    Ok(client)
}

/// Run the controller in the background for the duration of a test
pub fn start_controller(client: Client) -> JoinHandle<()> {
    tokio::spawn(build_webapp_controller(
        client,
        Some(TEST_NAMESPACE),
        ControllerConfig::default(),
    ))
}

/// Delete a NginxWebApp left over from a previous run and wait until it is gone
pub async fn cleanup_webapp(client: &Client, name: &str) {
    let api: Api<NginxWebApp> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
    let api = &api;
    let _ = wait_for(&format!("{name} to be deleted"), move || async move {
        matches!(api.get_opt(name).await, Ok(None))
    })
    .await;
}

/// Poll `check` every second until it holds or `CONVERGE_TIMEOUT` elapses
pub async fn wait_for<F, Fut>(what: &str, mut check: F) -> Result<(), String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    Err(format!("timed out waiting for {what}"))
}
