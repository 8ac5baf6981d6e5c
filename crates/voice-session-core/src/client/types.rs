//! Snapshot types rendered by the presentation layer

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ErrorCategory};
use crate::registration::RegistrationStatus;
use crate::session::SessionState;

/// The last failure the user may act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&ClientError> for Failure {
    fn from(error: &ClientError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Everything the UI needs to render the call screen
///
/// Published after every step of the client actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    /// Identity registered or being registered
    pub identity: Option<String>,
    pub registration: RegistrationStatus,
    pub session: SessionState,
    /// Cleared when a new identity is set
    pub last_failure: Option<Failure>,
}

impl ClientSnapshot {
    pub fn is_ready(&self) -> bool {
        self.registration.is_ready()
    }
}

impl Default for ClientSnapshot {
    fn default() -> Self {
        Self {
            identity: None,
            registration: RegistrationStatus::Uninitialized,
            session: SessionState::None,
            last_failure: None,
        }
    }
}
