//! Integration tests for the NginxWebApp lifecycle
//!
//! Each test creates a NginxWebApp, lets the in-process controller act on
//! it, and checks what ends up in the cluster.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;

use webapp_common::crd::{NginxWebApp, NginxWebAppSpec, WebAppPhase, WEBAPP_FINALIZER};

use super::helpers::{
    cleanup_webapp, ensure_test_cluster, start_controller, wait_for, TEST_NAMESPACE,
};

fn sample_webapp(name: &str, replicas: i32, port: i32) -> NginxWebApp {
    NginxWebApp::new(
        name,
        NginxWebAppSpec {
            replicas: Some(replicas),
            image: "nginx:1.27".to_string(),
            port,
            ..Default::default()
        },
    )
}

fn apis(client: &Client) -> (Api<NginxWebApp>, Api<Deployment>, Api<Service>) {
    (
        Api::namespaced(client.clone(), TEST_NAMESPACE),
        Api::namespaced(client.clone(), TEST_NAMESPACE),
        Api::namespaced(client.clone(), TEST_NAMESPACE),
    )
}

async fn deployment_replicas(api: &Api<Deployment>, name: &str) -> Option<i32> {
    api.get_opt(name)
        .await
        .ok()
        .flatten()
        .and_then(|d| d.spec)
        .and_then(|s| s.replicas)
}

/// Story: Application owner declares a web app and gets a running nginx
///
/// Expected behavior:
/// - The finalizer is attached to the NginxWebApp
/// - `<name>-deployment` runs the requested image and replica count
/// - `<name>-svc` exposes the requested port
/// - Both children are controlled by the NginxWebApp
/// - Status eventually reports Running
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_owner_declares_webapp_and_children_appear() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-web-create";
    cleanup_webapp(&client, name).await;
    let controller = start_controller(client.clone());
    let (webapps, deployments, services) = apis(&client);

    let created = webapps
        .create(&PostParams::default(), &sample_webapp(name, 2, 8080))
        .await
        .expect("failed to create NginxWebApp");
    let uid = created.metadata.uid.clone().expect("uid assigned");

    let deployment_name = format!("{name}-deployment");
    let (dapi, dname) = (&deployments, deployment_name.as_str());
    wait_for("deployment", move || async move {
        deployment_replicas(dapi, dname).await == Some(2)
    })
    .await
    .expect("deployment never appeared");

    let deployment = deployments.get(&deployment_name).await.unwrap();
    let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
    assert_eq!(pod_spec.containers.len(), 1);
    assert_eq!(pod_spec.containers[0].name, "nginx");
    assert_eq!(pod_spec.containers[0].image.as_deref(), Some("nginx:1.27"));
    let owner = &deployment.metadata.owner_references.unwrap()[0];
    assert_eq!(owner.uid, uid);
    assert_eq!(owner.controller, Some(true));

    let service = services.get(&format!("{name}-svc")).await.unwrap();
    let spec = service.spec.unwrap();
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    let port = &spec.ports.unwrap()[0];
    assert_eq!(port.port, 8080);
    assert_eq!(port.target_port, Some(IntOrString::Int(8080)));

    let wapi = &webapps;
    wait_for("phase Running", move || async move {
        wapi.get(name)
            .await
            .ok()
            .and_then(|w| w.status)
            .is_some_and(|s| s.phase == WebAppPhase::Running)
    })
    .await
    .expect("NginxWebApp never became Running");

    let fetched = webapps.get(name).await.unwrap();
    assert!(fetched
        .metadata
        .finalizers
        .unwrap_or_default()
        .contains(&WEBAPP_FINALIZER.to_string()));

    cleanup_webapp(&client, name).await;
    controller.abort();
}

/// Story: Someone scales the Deployment by hand and the controller puts it back
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_manual_drift_is_reverted() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-web-drift";
    cleanup_webapp(&client, name).await;
    let controller = start_controller(client.clone());
    let (webapps, deployments, _) = apis(&client);

    webapps
        .create(&PostParams::default(), &sample_webapp(name, 1, 80))
        .await
        .expect("failed to create NginxWebApp");

    let deployment_name = format!("{name}-deployment");
    let (dapi, dname) = (&deployments, deployment_name.as_str());
    wait_for("deployment", move || async move {
        deployment_replicas(dapi, dname).await == Some(1)
    })
    .await
    .expect("deployment never appeared");

    deployments
        .patch(
            &deployment_name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "spec": { "replicas": 4 } })),
        )
        .await
        .expect("failed to scale deployment");

    wait_for("replicas reverted", move || async move {
        deployment_replicas(dapi, dname).await == Some(1)
    })
    .await
    .expect("drift was not reverted");

    cleanup_webapp(&client, name).await;
    controller.abort();
}

/// Story: Owner changes the spec and the Deployment follows
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_spec_update_rolls_through() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-web-update";
    cleanup_webapp(&client, name).await;
    let controller = start_controller(client.clone());
    let (webapps, deployments, _) = apis(&client);

    webapps
        .create(&PostParams::default(), &sample_webapp(name, 1, 80))
        .await
        .expect("failed to create NginxWebApp");

    webapps
        .patch(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "spec": { "replicas": 3 } })),
        )
        .await
        .expect("failed to update NginxWebApp");

    let deployment_name = format!("{name}-deployment");
    let (dapi, dname) = (&deployments, deployment_name.as_str());
    wait_for("scaled deployment", move || async move {
        deployment_replicas(dapi, dname).await == Some(3)
    })
    .await
    .expect("deployment was not scaled");

    cleanup_webapp(&client, name).await;
    controller.abort();
}

/// Story: Owner deletes the web app and it goes away with its children
///
/// Expected behavior:
/// - The controller releases the finalizer so the delete completes
/// - Garbage collection removes the Deployment and Service
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_owner_deletes_webapp() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let name = "kind-web-delete";
    cleanup_webapp(&client, name).await;
    let controller = start_controller(client.clone());
    let (webapps, deployments, services) = apis(&client);

    webapps
        .create(&PostParams::default(), &sample_webapp(name, 1, 80))
        .await
        .expect("failed to create NginxWebApp");

    let wapi = &webapps;
    wait_for("finalizer", move || async move {
        wapi.get(name)
            .await
            .ok()
            .and_then(|w| w.metadata.finalizers)
            .is_some_and(|f| f.iter().any(|x| x == WEBAPP_FINALIZER))
    })
    .await
    .expect("finalizer never attached");

    webapps
        .delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete NginxWebApp");

    wait_for("NginxWebApp removal", move || async move {
        matches!(wapi.get_opt(name).await, Ok(None))
    })
    .await
    .expect("finalizer was never released");

    let deployment_name = format!("{name}-deployment");
    let service_name = format!("{name}-svc");
    let (dapi, sapi) = (&deployments, &services);
    let (dname, sname) = (deployment_name.as_str(), service_name.as_str());
    wait_for("children removal", move || async move {
        matches!(dapi.get_opt(dname).await, Ok(None))
            && matches!(sapi.get_opt(sname).await, Ok(None))
    })
    .await
    .expect("children were not garbage collected");

    controller.abort();
}
