//! Integration tests for the NginxWebApp operator
//!
//! These tests run the controller in-process against a kind cluster and tell
//! the story of how an application owner interacts with NginxWebApp.
//!
//! - `webapp_lifecycle`: create, drift, update and delete of a NginxWebApp
//!   and the Deployment and Service it owns

mod helpers;
mod webapp_lifecycle;
