//! The voice client handle and its actor
//!
//! [`VoiceClient`] is a cheap, cloneable handle. Every method sends a
//! command to the client actor and waits for its reply; state is observed
//! through [`VoiceClient::snapshot`], [`VoiceClient::watch`] and
//! [`VoiceClient::events`].
//!
//! ```rust,no_run
//! # use voice_session_core::{VoiceClient, VoiceSdk, SessionState};
//! # use std::sync::Arc;
//! # fn make_sdk() -> Arc<dyn VoiceSdk> { unimplemented!() }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VoiceClient::builder().sdk_factory(make_sdk).build()?;
//!
//! client.set_identity("alice").await?;
//! assert!(client.is_ready());
//!
//! let call_id = client.place_call("bob").await?;
//! println!("connected {}", call_id);
//!
//! client.end_call().await?;
//! assert_eq!(client.snapshot().session, SessionState::None);
//!
//! client.teardown().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub(crate) mod manager;
pub mod types;

use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{ClientError, ClientResult};
use crate::events::{EventEmitter, EventIterator, EventStream};
use crate::session::CallId;

pub use builder::VoiceClientBuilder;
pub use config::ClientConfig;
pub use types::{ClientSnapshot, Failure};

use manager::Command;

/// Handle to a running voice client
///
/// The actor stops, tearing down its registration, once every clone of the
/// handle has been dropped.
#[derive(Clone)]
pub struct VoiceClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ClientSnapshot>,
    events: EventEmitter,
}

impl VoiceClient {
    pub fn builder() -> VoiceClientBuilder {
        VoiceClientBuilder::new()
    }

    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshot: watch::Receiver<ClientSnapshot>,
        events: EventEmitter,
    ) -> Self {
        Self {
            commands,
            snapshot,
            events,
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> ClientResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::Shutdown)?;
        response.await.map_err(|_| ClientError::Shutdown)
    }

    /// Switch to `identity` and register it
    ///
    /// Any call in progress is dropped first. Resolves once registration is
    /// ready or has failed; a newer `set_identity` or a `teardown` makes it
    /// resolve with [`ClientError::RegistrationCancelled`].
    pub async fn set_identity(&self, identity: impl Into<String>) -> ClientResult<()> {
        let identity = identity.into();
        self.request(|reply| Command::SetIdentity { identity, reply })
            .await?
    }

    /// Place an outgoing call; resolves once it is connected
    pub async fn place_call(&self, target: impl Into<String>) -> ClientResult<CallId> {
        let target = target.into();
        self.request(|reply| Command::PlaceCall { target, reply }).await?
    }

    /// Accept the pending invite (only needed when auto-accept is off)
    pub async fn accept_call(&self) -> ClientResult<CallId> {
        self.request(|reply| Command::AcceptCall { reply }).await?
    }

    /// End the current call, rejecting an invite or disconnecting an active call
    pub async fn end_call(&self) -> ClientResult<()> {
        self.request(|reply| Command::EndCall { reply }).await?
    }

    /// Unsubscribe from SDK events and unregister. Safe to call repeatedly.
    pub async fn teardown(&self) -> ClientResult<()> {
        self.request(|reply| Command::Teardown { reply }).await
    }

    /// Current state
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the state changes
    pub fn watch(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.borrow().is_ready()
    }

    /// Stream of client events
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    /// Client events without needing `StreamExt`
    pub fn events_simple(&self) -> EventIterator {
        self.events.subscribe_simple()
    }
}

impl std::fmt::Debug for VoiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceClient")
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}
