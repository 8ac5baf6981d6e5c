//! Error types for the voice session client

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sdk::PermissionStatus;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the voice session client
///
/// None of these are retried automatically. Each maps onto an
/// [`ErrorCategory`] so the presentation layer can offer the right
/// follow-up (re-enter identity, retry the call, grant permission).
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Blank or otherwise unusable input
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Microphone permission was not granted
    #[error("Microphone permission not granted ({status})")]
    PermissionDenied { status: PermissionStatus },

    /// The token provider could not produce a credential
    #[error("Token fetch failed: {reason}")]
    TokenFetch { reason: String },

    /// The SDK refused the credential
    #[error("Registration failed: {reason}")]
    Registration { reason: String },

    /// A newer identity or a teardown superseded this registration attempt
    #[error("Registration for '{identity}' was cancelled")]
    RegistrationCancelled { identity: String },

    /// Placing a call requires a ready registration
    #[error("Voice client is not ready (registration {status})")]
    NotReady { status: crate::registration::RegistrationStatus },

    /// No receiver identity or number was supplied
    #[error("Missing call target")]
    MissingTarget,

    /// A call session already exists
    #[error("A call is already in progress")]
    CallInProgress,

    /// There is no invite to accept
    #[error("No pending invite")]
    NoPendingInvite,

    /// The same asynchronous step is already outstanding
    #[error("Operation already in progress: {operation}")]
    OperationInProgress { operation: String },

    /// Outgoing call could not be connected
    #[error("Call connect failed: {reason}")]
    CallConnect { reason: String },

    /// Incoming invite could not be accepted
    #[error("Call accept failed: {reason}")]
    CallAccept { reason: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The client actor is no longer running
    #[error("Voice client has shut down")]
    Shutdown,
}

impl ClientError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a token fetch error
    pub fn token_fetch(reason: impl Into<String>) -> Self {
        Self::TokenFetch {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an operation-in-progress error
    pub fn in_progress(operation: impl Into<String>) -> Self {
        Self::OperationInProgress {
            operation: operation.into(),
        }
    }

    /// Category used when the error is reported through events and snapshots
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Validation { .. } | ClientError::MissingTarget => ErrorCategory::Validation,
            ClientError::PermissionDenied { .. } => ErrorCategory::Permission,
            ClientError::TokenFetch { .. } => ErrorCategory::TokenFetch,
            ClientError::Registration { .. } | ClientError::RegistrationCancelled { .. } => {
                ErrorCategory::Registration
            }
            ClientError::NotReady { .. } => ErrorCategory::NotReady,
            ClientError::CallInProgress
            | ClientError::NoPendingInvite
            | ClientError::OperationInProgress { .. } => ErrorCategory::Busy,
            ClientError::CallConnect { .. } => ErrorCategory::CallConnect,
            ClientError::CallAccept { .. } => ErrorCategory::CallAccept,
            ClientError::Configuration { .. } | ClientError::Shutdown => ErrorCategory::Internal,
        }
    }
}

/// Error categories for event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Bad user input, corrected locally
    Validation,
    /// Permission missing, terminal until the user grants it
    Permission,
    /// Credential could not be fetched
    TokenFetch,
    /// SDK registration failed
    Registration,
    /// Command issued before registration was ready
    NotReady,
    /// Command conflicts with the current call session
    Busy,
    /// Outgoing call failed to connect
    CallConnect,
    /// Incoming call failed to accept
    CallAccept,
    /// Internal or configuration error
    Internal,
}

/// Error reported by the underlying telephony SDK
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SdkError {
    /// SDK supplied description
    pub message: String,
}

impl SdkError {
    /// Create an SDK error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
