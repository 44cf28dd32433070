//! Custom Resource Definitions for the NginxWebApp operator

mod types;
mod webapp;

pub use types::{Condition, ConditionStatus};
pub use webapp::{
    IngressConfig, IngressPath, IngressPathType, IngressTls, LoadBalancerConfig, NginxWebApp,
    NginxWebAppSpec, NginxWebAppStatus, WebAppPhase, AVAILABLE_CONDITION, WEBAPP_FINALIZER,
};
