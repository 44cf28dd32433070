//! NginxWebApp operator - configuration, startup and controller wiring
//!
//! The reconciliation logic lives in `webapp-controller`; this crate only
//! connects it to a cluster.

pub mod config;
pub mod controller_runner;
pub mod startup;

pub use config::OperatorConfig;
