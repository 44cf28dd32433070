//! Common types for the NginxWebApp operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Field manager recorded on every write the operator makes
pub const FIELD_MANAGER: &str = "nginx-webapp-controller";

/// Label key used to select the pods of a web application
pub const APP_LABEL_KEY: &str = "app";

/// Image used when a NginxWebApp does not name one
pub const DEFAULT_IMAGE: &str = "nginx:stable";
