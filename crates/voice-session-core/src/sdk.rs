//! Seams to the external telephony SDK and platform permission prompt
//!
//! The client never talks to a concrete SDK. Applications adapt their vendor
//! SDK to these traits:
//!
//! - [`VoiceSdk`] - register/unregister a credential, place calls, and expose
//!   the native notification channel
//! - [`CallInvite`] - an inbound offer that can be accepted or rejected
//! - [`ActiveCall`] - a connected call that can be disconnected
//! - [`PermissionGate`] - the microphone permission prompt
//!
//! The native notification channel is a `tokio::sync::broadcast` channel
//! carrying [`SdkNotification`]s. The event bridge subscribes to it only
//! while registration is ready.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::SdkError;
use crate::token::Credential;

/// Parameters for an outgoing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Receiver identity or phone number
    pub target: String,
    /// Name shown in the platform call notification
    pub display_name: String,
}

/// A connected, bidirectional voice call
pub trait ActiveCall: Send + Sync + fmt::Debug {
    /// Hang up the call
    fn disconnect(&self) -> Result<(), SdkError>;
}

/// An inbound call offer not yet connected to media
#[async_trait]
pub trait CallInvite: Send + Sync + fmt::Debug {
    /// Caller identity or number
    fn caller(&self) -> &str;

    /// Callee identity (normally the local identity)
    fn callee(&self) -> &str;

    /// Accept the offer; resolves once the call is connected
    async fn accept(&self) -> Result<Arc<dyn ActiveCall>, SdkError>;

    /// Decline the offer
    fn reject(&self) -> Result<(), SdkError>;
}

/// Native notifications delivered by the SDK
#[derive(Debug, Clone)]
pub enum SdkNotification {
    /// A remote party is calling
    IncomingInvite(Arc<dyn CallInvite>),
    /// The current call ended on the SDK side
    CallDisconnected,
    /// The outgoing call is ringing at the remote end
    CallRinging,
}

impl SdkNotification {
    /// Native channel name, used in logs
    pub fn channel(&self) -> &'static str {
        match self {
            SdkNotification::IncomingInvite(_) => "incoming-invite",
            SdkNotification::CallDisconnected => "call-disconnected",
            SdkNotification::CallRinging => "call-ringing",
        }
    }
}

/// Handle to the telephony SDK client
#[async_trait]
pub trait VoiceSdk: Send + Sync {
    /// Register a credential so the SDK can place and receive calls
    async fn register(&self, credential: &Credential) -> Result<(), SdkError>;

    /// Release a previously registered credential
    async fn unregister(&self, credential: &Credential) -> Result<(), SdkError>;

    /// Place an outgoing call
    async fn connect(
        &self,
        credential: &Credential,
        options: ConnectOptions,
    ) -> Result<Arc<dyn ActiveCall>, SdkError>;

    /// Subscribe to the native notification channel
    fn notifications(&self) -> broadcast::Receiver<SdkNotification>;
}

/// Creates the SDK client handle
///
/// Called at most once per [`VoiceClient`](crate::VoiceClient), on the first
/// identity. Closures returning `Arc<dyn VoiceSdk>` implement this trait.
pub trait SdkFactory: Send + Sync {
    fn create(&self) -> Arc<dyn VoiceSdk>;
}

impl<F> SdkFactory for F
where
    F: Fn() -> Arc<dyn VoiceSdk> + Send + Sync,
{
    fn create(&self) -> Arc<dyn VoiceSdk> {
        self()
    }
}

/// Outcome of a microphone permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Blocked by device policy; the user cannot grant it from the prompt
    Restricted,
}

impl fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Platform microphone permission prompt
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request_microphone(&self) -> PermissionStatus;
}

/// Permission gate for platforms without a runtime prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn request_microphone(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}
