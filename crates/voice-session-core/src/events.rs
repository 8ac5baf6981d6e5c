//! Event system for the voice session client
//!
//! Every state change the presentation layer may care about is broadcast as
//! a [`ClientEvent`]. Rendering should normally use the snapshot stream
//! ([`VoiceClient::watch`](crate::VoiceClient::watch)); events carry the
//! transitions themselves, including failures raised by asynchronous
//! notifications that no command is waiting on.
//!
//! ```rust
//! use voice_session_core::events::{ClientEvent, EventEmitter};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let emitter = EventEmitter::new(16);
//! let mut events = emitter.subscribe_simple();
//! emitter.emit(ClientEvent::CallRinging { call_id: None });
//! assert!(matches!(events.next().await, Some(ClientEvent::CallRinging { .. })));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::ErrorCategory;
use crate::registration::RegistrationStatus;
use crate::session::{CallDirection, CallId};

/// Events emitted by the voice session client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Registration status changed
    RegistrationStatusChanged {
        /// Identity the status applies to
        identity: Option<String>,
        /// New status
        status: RegistrationStatus,
        /// Reason for the change, if any
        reason: Option<String>,
    },

    /// An inbound invite became the current session
    IncomingInvite {
        call_id: CallId,
        /// Caller identity or number
        from: String,
        /// Callee identity
        to: String,
    },

    /// An inbound invite was declined without becoming a session
    InviteRejected {
        from: String,
        reason: InviteRejectReason,
    },

    /// The remote end is ringing
    CallRinging {
        /// Current session, if any
        call_id: Option<CallId>,
    },

    /// A call is connected
    CallConnected {
        call_id: CallId,
        direction: CallDirection,
        /// Remote party
        remote: String,
    },

    /// The session ended and the state is back to no call
    CallEnded {
        call_id: CallId,
        reason: EndReason,
    },

    /// A failure the user can act on
    Error {
        /// Associated call
        call_id: Option<CallId>,
        category: ErrorCategory,
        message: String,
    },
}

/// Why an inbound invite was declined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteRejectReason {
    /// Another session already exists
    Busy,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// The user ended the call
    LocalHangup,
    /// The user declined the invite
    Rejected,
    /// The SDK reported the call disconnected
    RemoteDisconnected,
    /// Accepting the invite failed
    AcceptFailed,
    /// Connecting the outgoing call failed
    ConnectFailed,
    /// Dropped because the identity changed
    IdentityChanged,
    /// Dropped because the client was torn down
    Teardown,
}

/// Event stream type
pub type EventStream = BroadcastStream<ClientEvent>;

/// Simple event iterator that doesn't require StreamExt
pub struct EventIterator {
    stream: EventStream,
}

impl EventIterator {
    pub fn new(stream: EventStream) -> Self {
        Self { stream }
    }

    /// Get the next event, skipping over lag notifications
    pub async fn next(&mut self) -> Option<ClientEvent> {
        use tokio_stream::StreamExt;
        loop {
            match self.stream.next().await? {
                Ok(event) => return Some(event),
                Err(e) => tracing::debug!("Event subscriber lagged: {}", e),
            }
        }
    }
}

/// Event emitter for the voice session client
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn subscribe_simple(&self) -> EventIterator {
        EventIterator::new(self.subscribe())
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
