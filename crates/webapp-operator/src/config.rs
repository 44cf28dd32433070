//! Operator configuration
//!
//! Every setting is a CLI flag with an environment variable fallback so the
//! same binary runs from a shell or from a Deployment manifest.

use std::time::Duration;

use clap::Args;

use webapp_common::telemetry::LogFormat;
use webapp_common::DEFAULT_IMAGE;
use webapp_controller::{ChildCleanup, ControllerConfig};

/// Runtime settings of the operator
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Image used when a NginxWebApp leaves `spec.image` empty
    #[arg(long, env = "WEBAPP_DEFAULT_IMAGE", default_value = DEFAULT_IMAGE)]
    pub default_image: String,

    /// Only watch this namespace (all namespaces when unset)
    #[arg(long, env = "WEBAPP_WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Deadline for a single reconciliation pass, in seconds
    #[arg(long, env = "WEBAPP_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Delete the Service and Deployment explicitly on deletion instead of
    /// relying on garbage collection
    #[arg(long, env = "WEBAPP_EXPLICIT_CHILD_CLEANUP")]
    pub explicit_child_cleanup: bool,

    /// Install or update the NginxWebApp CRD on startup
    #[arg(long, env = "WEBAPP_INSTALL_CRD")]
    pub install_crd: bool,

    /// Log output format (json or text)
    #[arg(long, env = "WEBAPP_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl OperatorConfig {
    /// Settings handed to the reconciliation loop
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            default_image: self.default_image.clone(),
            child_cleanup: if self.explicit_child_cleanup {
                ChildCleanup::Explicit
            } else {
                ChildCleanup::Cascade
            },
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
        }
    }
}
