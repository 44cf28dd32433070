//! Startup utilities
//!
//! The operator can install its own CRD with server-side apply so the schema
//! always matches the binary.

use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use webapp_common::crd::NginxWebApp;
use webapp_common::FIELD_MANAGER;

/// How long to wait for the API server to serve a freshly applied CRD
pub const CRD_ESTABLISHED_TIMEOUT: Duration = Duration::from_secs(30);

const CRD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Render the CRD as YAML
pub fn crd_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&NginxWebApp::crd())
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))
}

/// Install or update the NginxWebApp CRD and wait until it is established
pub async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let name = NginxWebApp::crd_name();

    tracing::info!("Installing {} CRD...", name);
    crds.patch(name, &params, &Patch::Apply(&NginxWebApp::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;

    wait_for_established(&crds, name).await?;
    tracing::info!("{} CRD installed/updated", name);
    Ok(())
}

fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Established" && c.status == "True")
        })
}

async fn wait_for_established(
    crds: &Api<CustomResourceDefinition>,
    name: &str,
) -> anyhow::Result<()> {
    let poll = async {
        loop {
            match crds.get_opt(name).await {
                Ok(Some(crd)) if is_established(&crd) => return,
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "CRD not readable yet"),
            }
            tokio::time::sleep(CRD_POLL_INTERVAL).await;
        }
    };
    tokio::time::timeout(CRD_ESTABLISHED_TIMEOUT, poll)
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "CRD {} not established after {}s",
                name,
                CRD_ESTABLISHED_TIMEOUT.as_secs()
            )
        })
}
