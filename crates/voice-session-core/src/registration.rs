//! Registration management for the voice session client
//!
//! The [`RegistrationManager`] owns the SDK client handle and the current
//! [`Credential`]. It is the only component that mutates either.
//!
//! # Registration Process
//!
//! 1. **Reset** - Drop the previous credential and bump the generation
//! 2. **Unregister** - Release the old credential on the SDK (best-effort)
//! 3. **Permission** - Ask the platform for microphone access
//! 4. **Token** - Fetch a credential for the identity
//! 5. **Register** - Hand the credential to the SDK
//!
//! Steps 2-5 run on a spawned task as a [`RegistrationJob`]. Its result is
//! applied with [`RegistrationManager::complete`], which discards results
//! from superseded generations.
//!
//! # State Transitions
//!
//! `Uninitialized` → `Registering` → `Ready` / `Failed`, and back to
//! `Uninitialized` on teardown. Setting a new identity from any state
//! restarts at `Registering`.
//!
//! ```rust
//! use voice_session_core::RegistrationStatus;
//!
//! let status = RegistrationStatus::Ready;
//! assert_eq!(status.to_string(), "Ready");
//! assert!(status.is_ready());
//! assert!(!RegistrationStatus::Failed.is_ready());
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::identity::Identity;
use crate::sdk::{PermissionGate, PermissionStatus, SdkFactory, VoiceSdk};
use crate::token::{Credential, TokenProvider};

/// Current status of the SDK registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// No identity set, or torn down
    Uninitialized,

    /// Permission, token fetch or SDK register is outstanding
    Registering,

    /// Registered; calls can be placed and received
    Ready,

    /// The last attempt failed. Setting an identity again starts over.
    Failed,
}

impl RegistrationStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, RegistrationStatus::Ready)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStatus::Uninitialized => write!(f, "Uninitialized"),
            RegistrationStatus::Registering => write!(f, "Registering"),
            RegistrationStatus::Ready => write!(f, "Ready"),
            RegistrationStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One registration attempt, detached from the manager so it can run on its own task
pub struct RegistrationJob {
    /// Generation this job belongs to
    pub generation: u64,
    pub identity: Identity,
    sdk: Arc<dyn VoiceSdk>,
    permissions: Arc<dyn PermissionGate>,
    tokens: Arc<dyn TokenProvider>,
    previous: Option<Credential>,
}

impl RegistrationJob {
    /// Unregister the previous credential, then permission, token and register
    pub async fn run(self) -> ClientResult<Credential> {
        if let Some(previous) = &self.previous {
            if let Err(e) = self.sdk.unregister(previous).await {
                warn!("Failed to unregister previous credential: {}", e);
            }
        }

        match self.permissions.request_microphone().await {
            PermissionStatus::Granted => debug!("Microphone permission granted"),
            status => {
                warn!("Microphone permission {} for '{}'", status, self.identity);
                return Err(ClientError::PermissionDenied { status });
            }
        }

        let credential = self.tokens.fetch_token(&self.identity).await?;

        self.sdk
            .register(&credential)
            .await
            .map_err(|e| ClientError::Registration { reason: e.message })?;

        info!("Registered '{}' with the voice SDK", self.identity);
        Ok(credential)
    }
}

/// What applying a finished [`RegistrationJob`] did
#[derive(Debug)]
pub enum RegistrationOutcome {
    /// Registration is ready
    Ready,
    /// The attempt failed; status is now `Failed`
    Failed(ClientError),
    /// The job was superseded. A credential it managed to register is
    /// returned so the caller can release it.
    Stale(Option<Credential>),
}

/// Owns the SDK client handle, the credential and the registration status
pub struct RegistrationManager {
    factory: Arc<dyn SdkFactory>,
    permissions: Arc<dyn PermissionGate>,
    tokens: Arc<dyn TokenProvider>,
    sdk: Option<Arc<dyn VoiceSdk>>,
    credential: Option<Credential>,
    status: RegistrationStatus,
    generation: u64,
}

impl RegistrationManager {
    pub fn new(
        factory: Arc<dyn SdkFactory>,
        permissions: Arc<dyn PermissionGate>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            factory,
            permissions,
            tokens,
            sdk: None,
            credential: None,
            status: RegistrationStatus::Uninitialized,
            generation: 0,
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// The SDK handle, if one has been created
    pub fn sdk(&self) -> Option<&Arc<dyn VoiceSdk>> {
        self.sdk.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn sdk_or_create(&mut self) -> Arc<dyn VoiceSdk> {
        match &self.sdk {
            Some(sdk) => sdk.clone(),
            None => {
                info!("Creating voice SDK client");
                let sdk = self.factory.create();
                self.sdk = Some(sdk.clone());
                sdk
            }
        }
    }

    /// Start a new registration for `identity`
    ///
    /// Invalidates any attempt in flight and hands the current credential to
    /// the job so it is unregistered before the new one is fetched.
    pub fn begin(&mut self, identity: Identity) -> RegistrationJob {
        self.generation += 1;
        self.status = RegistrationStatus::Registering;
        let previous = self.credential.take();
        debug!(
            "Starting registration generation {} for '{}' (previous credential: {})",
            self.generation,
            identity,
            previous.is_some()
        );

        RegistrationJob {
            generation: self.generation,
            identity,
            sdk: self.sdk_or_create(),
            permissions: self.permissions.clone(),
            tokens: self.tokens.clone(),
            previous,
        }
    }

    /// Apply the result of a finished job
    pub fn complete(&mut self, generation: u64, result: ClientResult<Credential>) -> RegistrationOutcome {
        if generation != self.generation || self.status != RegistrationStatus::Registering {
            debug!(
                "Ignoring registration result for generation {} (current {})",
                generation, self.generation
            );
            return RegistrationOutcome::Stale(result.ok());
        }

        match result {
            Ok(credential) => {
                self.credential = Some(credential);
                self.status = RegistrationStatus::Ready;
                RegistrationOutcome::Ready
            }
            Err(e) => {
                self.status = RegistrationStatus::Failed;
                RegistrationOutcome::Failed(e)
            }
        }
    }

    /// Release a credential left behind by a superseded job
    pub fn release_stale(&self, credential: Credential, timeout: Duration) {
        let Some(sdk) = self.sdk.clone() else {
            return;
        };
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sdk.unregister(&credential)).await {
                Ok(Ok(())) => debug!("Released stale credential"),
                Ok(Err(e)) => warn!("Failed to release stale credential: {}", e),
                Err(_) => warn!("Timed out releasing stale credential"),
            }
        });
    }

    /// Cancel any attempt in flight, unregister the credential and reset to `Uninitialized`
    ///
    /// Unregister failures are logged, never returned. Calling this when
    /// already uninitialized does nothing.
    pub async fn teardown(&mut self, timeout: Duration) {
        if self.status == RegistrationStatus::Uninitialized && self.credential.is_none() {
            return;
        }

        self.generation += 1;
        self.status = RegistrationStatus::Uninitialized;

        let (Some(credential), Some(sdk)) = (self.credential.take(), self.sdk.clone()) else {
            return;
        };

        match tokio::time::timeout(timeout, sdk.unregister(&credential)).await {
            Ok(Ok(())) => info!("Unregistered voice SDK credential"),
            Ok(Err(e)) => warn!("Unregister failed during teardown: {}", e),
            Err(_) => warn!("Unregister timed out after {:?} during teardown", timeout),
        }
    }
}

impl std::fmt::Debug for RegistrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationManager")
            .field("status", &self.status)
            .field("generation", &self.generation)
            .field("has_sdk", &self.sdk.is_some())
            .field("credential", &self.credential)
            .finish()
    }
}
