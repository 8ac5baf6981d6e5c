//! Builder pattern for creating voice clients

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::client::config::ClientConfig;
use crate::client::manager::ClientManager;
use crate::client::types::ClientSnapshot;
use crate::client::VoiceClient;
use crate::error::{ClientError, ClientResult};
use crate::events::EventEmitter;
use crate::registration::RegistrationManager;
use crate::sdk::{AlwaysGranted, PermissionGate, SdkFactory};
use crate::token::{HttpTokenProvider, TokenProvider};

/// Builder for a [`VoiceClient`]
///
/// Only the SDK factory is required. Without an explicit permission gate
/// the microphone is assumed granted; without an explicit token provider an
/// [`HttpTokenProvider`] is built from the configuration.
///
/// ```rust,no_run
/// # use voice_session_core::{ClientConfig, VoiceClient, VoiceSdk};
/// # use std::sync::Arc;
/// # fn make_sdk() -> Arc<dyn VoiceSdk> { unimplemented!() }
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = VoiceClient::builder()
///     .config(ClientConfig::new().with_display_name("Support Line"))
///     .sdk_factory(make_sdk)
///     .build()?;
///
/// client.set_identity("alice").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct VoiceClientBuilder {
    config: ClientConfig,
    sdk_factory: Option<Arc<dyn SdkFactory>>,
    permissions: Option<Arc<dyn PermissionGate>>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl VoiceClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Factory for the SDK client handle, invoked once on the first identity
    pub fn sdk_factory(mut self, factory: impl SdkFactory + 'static) -> Self {
        self.sdk_factory = Some(Arc::new(factory));
        self
    }

    pub fn permission_gate(mut self, gate: impl PermissionGate + 'static) -> Self {
        self.permissions = Some(Arc::new(gate));
        self
    }

    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.tokens = Some(Arc::new(provider));
        self
    }

    /// Validate the configuration and start the client actor
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> ClientResult<VoiceClient> {
        self.config.validate()?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::config("VoiceClient must be built inside a tokio runtime"))?;

        let factory = self
            .sdk_factory
            .ok_or_else(|| ClientError::config("an SDK factory is required"))?;
        let permissions = self.permissions.unwrap_or_else(|| Arc::new(AlwaysGranted));
        let tokens = match self.tokens {
            Some(tokens) => tokens,
            None => Arc::new(HttpTokenProvider::from_config(&self.config)?),
        };

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(ClientSnapshot::default());
        let events = EventEmitter::new(self.config.event_capacity);

        let registration = RegistrationManager::new(factory, permissions, tokens);
        let (manager, inbox) = ClientManager::new(
            self.config,
            registration,
            events.clone(),
            snapshot_tx,
            command_rx,
        );
        runtime.spawn(manager.run(inbox));

        Ok(VoiceClient::new(command_tx, snapshot_rx, events))
    }
}
