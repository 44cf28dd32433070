//! NginxWebApp CRD types
//!
//! A `NginxWebApp` declares a replicated nginx workload exposed on a single
//! port. The controller realizes it as one Deployment and one ClusterIP
//! Service, both named after the owning resource.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;
use crate::DEFAULT_IMAGE;

/// Finalizer guarding NginxWebApp deletion until cleanup has run
pub const WEBAPP_FINALIZER: &str = "webapp.vnptplatform.vn/finalizer";

/// Condition type reporting whether all desired replicas are available
pub const AVAILABLE_CONDITION: &str = "Available";

// =============================================================================
// Phase
// =============================================================================

/// Observed phase of a NginxWebApp
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum WebAppPhase {
    /// Not yet observed by the controller
    #[default]
    Pending,
    /// Children exist but not every replica is available
    Creating,
    /// Every desired replica is available
    Running,
    /// The last status write failed
    Error,
}

impl std::fmt::Display for WebAppPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Error => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Load balancer / ingress (declared, not materialized)
// =============================================================================

/// Load balancer exposure settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    /// Expose the application through a load balancer
    #[serde(default)]
    pub enable: bool,

    /// Annotations applied to the load balancer resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Port exposed by the load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: Option<i32>,
}

/// Path matching semantics for an ingress rule
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IngressPathType {
    /// Matching is up to the ingress class
    #[default]
    ImplementationSpecific,
    /// Exact URL path match
    Exact,
    /// Path prefix match split on `/`
    Prefix,
}

/// A single path routed by the ingress
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressPath {
    /// URL path (e.g. `/` or `/foo`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// How `path` is matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_type: Option<IngressPathType>,

    /// Backend service port; falls back to `spec.port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_port: Option<i32>,
}

/// TLS settings for a set of ingress hosts
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    /// Hosts covered by the certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    /// Secret holding the certificate
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,
}

/// Ingress exposure settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    /// Create an Ingress for the application
    #[serde(default)]
    pub enable: bool,

    /// Ingress class (e.g. "nginx", "traefik")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    /// Annotations applied to the Ingress
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Virtual host (e.g. example.com)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    /// Routed paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<IngressPath>,

    /// TLS configuration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTls>,
}

// =============================================================================
// CRD
// =============================================================================

/// Desired state of a replicated nginx web application
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "webapp.vnptplatform.vn",
    version = "v1alpha1",
    kind = "NginxWebApp",
    plural = "nginxwebapps",
    shortname = "nwa",
    namespaced,
    status = "NginxWebAppStatus",
    printcolumn = r#"{"name":"STATUS","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"ENDPOINT","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"AVAILABLE","type":"integer","jsonPath":".status.availableReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NginxWebAppSpec {
    /// Number of pods; the controller substitutes 1 when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub replicas: Option<i32>,

    /// Container image
    #[serde(default = "default_image")]
    pub image: String,

    /// Port the container listens on and the Service exposes
    #[serde(default = "default_port")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: i32,

    /// Load balancer exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lb_config: Option<LoadBalancerConfig>,

    /// Ingress exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressConfig>,
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_string()
}

fn default_port() -> i32 {
    80
}

impl Default for NginxWebAppSpec {
    fn default() -> Self {
        Self {
            replicas: None,
            image: default_image(),
            port: default_port(),
            lb_config: None,
            ingress: None,
        }
    }
}

/// Observed state of a NginxWebApp
///
/// Every field is always serialized: the controller writes the status as a
/// whole and an omitted field would leave a stale value behind.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NginxWebAppStatus {
    /// Conditions keyed by type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Pods of the Deployment that are up and available
    #[serde(default)]
    pub available_replicas: i32,

    /// Externally reachable endpoint (ingress or load balancer)
    #[serde(default)]
    pub endpoint: String,

    /// Current phase
    #[serde(default)]
    pub phase: WebAppPhase,
}

impl NginxWebAppStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}
