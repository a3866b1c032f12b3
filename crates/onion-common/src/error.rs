//! Error types for onion
//!
//! Errors are structured with fields to aid debugging in production.
//! Configuration errors carry the offending field, provider errors carry the
//! failing operation and the instance they were issued for.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// The provider instance API operation that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderOperation {
    /// Instance creation
    Create,
    /// Instance listing
    Describe,
    /// Instance termination
    Terminate,
}

impl ProviderOperation {
    /// Lower-case name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Describe => "describe",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the cloud provider's instance API
///
/// Cloneable so that every failed instance record can keep its own copy of
/// the error that put it there.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error(
    "{operation} failed for {}: {message}",
    .instance.as_deref().unwrap_or(UNKNOWN_CONTEXT)
)]
pub struct ProviderError {
    /// Operation that failed
    pub operation: ProviderOperation,
    /// Instance name or provider id the call was issued for, if any
    pub instance: Option<String>,
    /// Provider-reported description of the failure
    pub message: String,
    /// Whether the call may succeed if issued again (throttling, network)
    pub retryable: bool,
}

impl ProviderError {
    /// Create a retryable provider error for the given operation
    pub fn new(operation: ProviderOperation, msg: impl Into<String>) -> Self {
        Self {
            operation,
            instance: None,
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error (quota, auth, unknown instance)
    pub fn permanent(operation: ProviderOperation, msg: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(operation, msg)
        }
    }

    /// Attach the instance this error concerns
    pub fn for_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Main error type for onion operations
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid cluster configuration, raised before any provider call
    #[error("configuration error [{field}]: {message}")]
    Config {
        /// Offending configuration field (e.g. "master_count")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Cloud provider API failure
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "instance-state", "manager")
        context: String,
    },
}

impl Error {
    /// Create a configuration error for a specific field
    pub fn config_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration and internal errors need a fix from the caller.
    /// Provider errors carry their own classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Config { .. } => false,
            Error::Provider(e) => e.retryable,
            Error::Internal { .. } => false,
        }
    }

    /// Get the offending field if this is a configuration error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Config { field, .. } => Some(field),
            _ => None,
        }
    }
}
