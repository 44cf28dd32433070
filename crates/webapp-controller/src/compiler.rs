//! Desired-state synthesis
//!
//! Compiles a `NginxWebAppSpec` into the desired shape of its two children.
//! Pure: no I/O, no clock, same input always yields the same output.
//!
//! `lbConfig` and `ingress` are accepted by the schema but not compiled into
//! anything yet.

use std::collections::BTreeMap;

use webapp_common::crd::NginxWebAppSpec;
use webapp_common::APP_LABEL_KEY;

/// Suffix appended to the owner name to form the Deployment name
pub const DEPLOYMENT_SUFFIX: &str = "-deployment";

/// Suffix appended to the owner name to form the Service name
pub const SERVICE_SUFFIX: &str = "-svc";

/// Name of the single container in the pod template
pub const CONTAINER_NAME: &str = "nginx";

/// Replica count used when the spec leaves it unset
pub const DEFAULT_REPLICAS: i32 = 1;

/// Service type of the generated Service
pub const SERVICE_TYPE: &str = "ClusterIP";

/// Derive the Deployment name for an owner
pub fn deployment_name(owner: &str) -> String {
    format!("{owner}{DEPLOYMENT_SUFFIX}")
}

/// Derive the Service name for an owner
pub fn service_name(owner: &str) -> String {
    format!("{owner}{SERVICE_SUFFIX}")
}

/// Labels selecting the pods of an owner (`app: <owner>`)
///
/// The selector is derived only from the owner name. A Deployment's
/// selector is immutable, so an owner cannot be renamed in place.
pub fn selector_labels(owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL_KEY.to_string(), owner.to_string())])
}

/// Desired Deployment fields owned by the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredDeployment {
    /// Deployment name
    pub name: String,
    /// Replica count
    pub replicas: i32,
    /// Image of the `nginx` container
    pub image: String,
    /// Port the container listens on
    pub container_port: i32,
    /// Label selector
    pub selector: BTreeMap<String, String>,
    /// Pod template labels; always equal to `selector`
    pub template_labels: BTreeMap<String, String>,
}

/// Desired Service fields owned by the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredService {
    /// Service name
    pub name: String,
    /// Exposed port
    pub port: i32,
    /// Pod port traffic is forwarded to
    pub target_port: i32,
    /// Pod selector
    pub selector: BTreeMap<String, String>,
    /// Service type
    pub type_: String,
}

/// Both children of one NginxWebApp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredState {
    /// The Deployment running the pods
    pub deployment: DesiredDeployment,
    /// The Service exposing them
    pub service: DesiredService,
}

/// Compile a spec into desired children
///
/// `default_image` is substituted when the spec carries an empty image.
pub fn synthesize(owner: &str, spec: &NginxWebAppSpec, default_image: &str) -> DesiredState {
    let labels = selector_labels(owner);
    let image = if spec.image.is_empty() {
        default_image.to_string()
    } else {
        spec.image.clone()
    };

    DesiredState {
        deployment: DesiredDeployment {
            name: deployment_name(owner),
            replicas: spec.replicas.unwrap_or(DEFAULT_REPLICAS),
            image,
            container_port: spec.port,
            selector: labels.clone(),
            template_labels: labels.clone(),
        },
        service: DesiredService {
            name: service_name(owner),
            port: spec.port,
            target_port: spec.port,
            selector: labels,
            type_: SERVICE_TYPE.to_string(),
        },
    }
}
