//! NginxWebApp reconciliation
//!
//! Drives the cluster toward each declared `NginxWebApp`:
//! - `finalizer`: guards deletion with `webapp.vnptplatform.vn/finalizer`
//! - `compiler`: pure mapping from the spec to desired Deployment and Service
//! - `converge`: idempotent create-or-update of both children with owner references
//! - `status`: phase and availability projected from the live Deployment
//! - `controller`: the entry point sequencing the steps above for one key
//!
//! All object-store access goes through the `ResourceStore` trait so the loop
//! can be exercised without an API server.

pub mod compiler;
pub mod controller;
pub mod converge;
pub mod finalizer;
pub mod status;
pub mod store;

pub use controller::{
    error_policy, reconcile, reconcile_key, Context, ControllerConfig, ReconcileOutcome,
};
pub use converge::OperationResult;
pub use finalizer::ChildCleanup;
pub use store::{KubeStore, ObjectKey, ResourceStore};
