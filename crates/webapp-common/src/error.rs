//! Error types for the NginxWebApp operator
//!
//! Errors carry the kind and name of the object involved so that a failed
//! reconciliation can be traced back to a concrete resource from the logs.
//! Optimistic-concurrency conflicts get their own variant: the controller
//! retries them quickly and does not report them as faults.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A write was rejected because the object changed since it was read
    #[error("conflict writing {kind} {name}: object was modified concurrently")]
    Conflict {
        /// Kind of the object being written
        kind: String,
        /// Namespaced name of the object being written
        name: String,
    },

    /// A child object is already controlled by a different owner
    #[error("{kind} {name} is already controlled by {owner}")]
    AlreadyOwned {
        /// Kind of the child object
        kind: String,
        /// Name of the child object
        name: String,
        /// Name of the controller that owns it
        owner: String,
    },

    /// An object is missing metadata the controller depends on
    #[error("{kind} is missing required field {field}")]
    MissingField {
        /// Kind of the incomplete object
        kind: String,
        /// Path of the missing field (e.g. "metadata.uid")
        field: String,
    },

    /// Reconciliation exceeded its deadline
    #[error("reconciliation of {key} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Namespaced key of the object being reconciled
        key: String,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "converger", "finalizer")
        context: String,
    },
}

impl Error {
    /// Create a conflict error for the given object
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an error for a child that another controller already owns
    pub fn already_owned(
        kind: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self::AlreadyOwned {
            kind: kind.into(),
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Create an error for an object lacking a required field
    pub fn missing_field(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            kind: kind.into(),
            field: field.into(),
        }
    }

    /// Create a deadline-exceeded error
    pub fn timeout(key: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            key: key.into(),
            after,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this error is retryable
    ///
    /// Conflicts, API failures and timeouts clear up on their own; ownership
    /// clashes and incomplete objects need a human.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { .. } => true,
            Error::Conflict { .. } => true,
            Error::AlreadyOwned { .. } => false,
            Error::MissingField { .. } => false,
            Error::Timeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}
