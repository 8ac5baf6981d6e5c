//! Session state machine - the single source of truth for the current call
//!
//! # States
//!
//! ```text
//!            InviteReceived                 accept ok
//!   None ──────────────────────► Invite ─────────────────► Active(Connected)
//!    │  ▲                           │ accept err / EndCall        ▲
//!    │  └───────────────────────────┘ / Disconnected              │ connect ok
//!    │ PlaceCall                                                  │
//!    └────────────────────────► Active(Connecting) ───────────────┘
//!                                   │ connect err / EndCall / Disconnected
//!                                   └──────────────────────────► None
//! ```
//!
//! Every transition here is synchronous. The asynchronous halves (accept,
//! connect) run elsewhere and come back through [`SessionStateMachine::finish_accept`]
//! and [`SessionStateMachine::finish_connect`], keyed by [`CallId`] so that a
//! completion for a session that no longer exists is recognised as stale.
//! A stale completion that produced a live call has that call disconnected
//! on the spot.
//!
//! Only one session exists at a time. An invite arriving while a session
//! exists is rejected with [`InviteOutcome::Busy`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult, SdkError};
use crate::events::EndReason;
use crate::sdk::{ActiveCall, CallInvite};

/// Locally assigned session identifier
pub type CallId = Uuid;

/// Who initiated the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// An inbound invite waiting to be connected
#[derive(Debug)]
pub struct InviteSession {
    pub call_id: CallId,
    invite: Arc<dyn CallInvite>,
    pub received_at: DateTime<Utc>,
    /// Whether accept() is outstanding
    pub accepting: bool,
}

/// Connection state of an active session
#[derive(Debug)]
pub enum CallLink {
    /// Outgoing connect() is outstanding
    Connecting,
    Connected(Arc<dyn ActiveCall>),
}

/// A call that is connected or being connected
#[derive(Debug)]
pub struct ActiveSession {
    pub call_id: CallId,
    pub direction: CallDirection,
    /// Remote party
    pub remote: String,
    pub started_at: DateTime<Utc>,
    pub link: CallLink,
}

/// The current call session
#[derive(Debug, Default)]
pub enum CallSession {
    #[default]
    None,
    Invite(InviteSession),
    Active(ActiveSession),
}

impl CallSession {
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            CallSession::None => None,
            CallSession::Invite(invite) => Some(invite.call_id),
            CallSession::Active(active) => Some(active.call_id),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CallSession::None)
    }
}

/// Render-only view of the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    None,
    Invite {
        call_id: CallId,
        from: String,
        to: String,
        received_at: DateTime<Utc>,
        accepting: bool,
    },
    Active {
        call_id: CallId,
        direction: CallDirection,
        remote: String,
        started_at: DateTime<Utc>,
        /// False while an outgoing call is still connecting
        connected: bool,
    },
}

impl SessionState {
    pub fn is_none(&self) -> bool {
        matches!(self, SessionState::None)
    }

    pub fn call_id(&self) -> Option<CallId> {
        match self {
            SessionState::None => None,
            SessionState::Invite { call_id, .. } | SessionState::Active { call_id, .. } => Some(*call_id),
        }
    }
}

/// Result of offering an inbound invite to the state machine
#[derive(Debug)]
pub enum InviteOutcome {
    /// The invite is now the current session
    Stored { call_id: CallId },
    /// A session already exists; the invite was rejected
    Busy,
}

/// Result of applying an accept or connect completion
#[derive(Debug)]
pub enum SetupOutcome {
    Connected,
    /// The session was dropped; state is back to `None`
    Failed(ClientError),
    /// The completion belongs to a session that no longer exists
    Stale,
}

/// A session that has just been dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndedCall {
    pub call_id: CallId,
    pub reason: EndReason,
}

/// Holds the single [`CallSession`] and applies transitions to it
#[derive(Debug, Default)]
pub struct SessionStateMachine {
    current: CallSession,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &CallSession {
        &self.current
    }

    pub fn snapshot(&self) -> SessionState {
        match &self.current {
            CallSession::None => SessionState::None,
            CallSession::Invite(s) => SessionState::Invite {
                call_id: s.call_id,
                from: s.invite.caller().to_string(),
                to: s.invite.callee().to_string(),
                received_at: s.received_at,
                accepting: s.accepting,
            },
            CallSession::Active(s) => SessionState::Active {
                call_id: s.call_id,
                direction: s.direction,
                remote: s.remote.clone(),
                started_at: s.started_at,
                connected: matches!(s.link, CallLink::Connected(_)),
            },
        }
    }

    /// Offer an inbound invite
    pub fn receive_invite(&mut self, invite: Arc<dyn CallInvite>) -> InviteOutcome {
        if !self.current.is_none() {
            info!("Rejecting invite from {}: a call is already in progress", invite.caller());
            if let Err(e) = invite.reject() {
                warn!("Rejecting busy invite failed: {}", e);
            }
            return InviteOutcome::Busy;
        }

        let call_id = Uuid::new_v4();
        info!("Invite {} from {}", call_id, invite.caller());
        self.current = CallSession::Invite(InviteSession {
            call_id,
            invite,
            received_at: Utc::now(),
            accepting: false,
        });
        InviteOutcome::Stored { call_id }
    }

    /// Mark the pending invite as accepting and hand it out for `accept()`
    pub fn begin_accept(&mut self) -> ClientResult<(CallId, Arc<dyn CallInvite>)> {
        match &mut self.current {
            CallSession::Invite(s) if s.accepting => Err(ClientError::in_progress("accept")),
            CallSession::Invite(s) => {
                s.accepting = true;
                Ok((s.call_id, s.invite.clone()))
            }
            _ => Err(ClientError::NoPendingInvite),
        }
    }

    /// Apply the result of `accept()` for `call_id`
    pub fn finish_accept(
        &mut self,
        call_id: CallId,
        result: Result<Arc<dyn ActiveCall>, SdkError>,
    ) -> SetupOutcome {
        let matches = matches!(&self.current, CallSession::Invite(s) if s.call_id == call_id && s.accepting);
        if !matches {
            discard_orphan(call_id, result);
            return SetupOutcome::Stale;
        }

        let CallSession::Invite(invite) = std::mem::take(&mut self.current) else {
            return SetupOutcome::Stale;
        };

        match result {
            Ok(handle) => {
                info!("Call {} accepted", call_id);
                self.current = CallSession::Active(ActiveSession {
                    call_id,
                    direction: CallDirection::Inbound,
                    remote: invite.invite.caller().to_string(),
                    started_at: Utc::now(),
                    link: CallLink::Connected(handle),
                });
                SetupOutcome::Connected
            }
            Err(e) => {
                warn!("Accepting call {} failed: {}", call_id, e);
                SetupOutcome::Failed(ClientError::CallAccept { reason: e.message })
            }
        }
    }

    /// Start an outgoing call; the session is `Active` but not yet connected
    pub fn begin_outbound(&mut self, target: String) -> ClientResult<CallId> {
        if !self.current.is_none() {
            return Err(ClientError::CallInProgress);
        }

        let call_id = Uuid::new_v4();
        info!("Placing call {} to {}", call_id, target);
        self.current = CallSession::Active(ActiveSession {
            call_id,
            direction: CallDirection::Outbound,
            remote: target,
            started_at: Utc::now(),
            link: CallLink::Connecting,
        });
        Ok(call_id)
    }

    /// Apply the result of `connect()` for `call_id`
    pub fn finish_connect(
        &mut self,
        call_id: CallId,
        result: Result<Arc<dyn ActiveCall>, SdkError>,
    ) -> SetupOutcome {
        let session = match &mut self.current {
            CallSession::Active(s) if s.call_id == call_id && matches!(s.link, CallLink::Connecting) => s,
            _ => {
                discard_orphan(call_id, result);
                return SetupOutcome::Stale;
            }
        };

        match result {
            Ok(handle) => {
                info!("Call {} connected", call_id);
                session.link = CallLink::Connected(handle);
                SetupOutcome::Connected
            }
            Err(e) => {
                warn!("Connecting call {} failed: {}", call_id, e);
                self.current = CallSession::None;
                SetupOutcome::Failed(ClientError::CallConnect { reason: e.message })
            }
        }
    }

    /// The SDK reported the call disconnected
    pub fn disconnected(&mut self) -> Option<EndedCall> {
        let call_id = self.current.call_id()?;
        info!("Call {} disconnected", call_id);
        self.current = CallSession::None;
        Some(EndedCall {
            call_id,
            reason: EndReason::RemoteDisconnected,
        })
    }

    /// End the session on the user's behalf
    ///
    /// Invites are rejected, connected calls disconnected. The state is
    /// `None` afterwards whatever the SDK returns.
    pub fn end_call(&mut self) -> Option<EndedCall> {
        self.drop_session(None)
    }

    /// Drop the session because the identity changed or the client is going away
    pub fn force_drop(&mut self, reason: EndReason) -> Option<EndedCall> {
        self.drop_session(Some(reason))
    }

    fn drop_session(&mut self, forced: Option<EndReason>) -> Option<EndedCall> {
        match std::mem::take(&mut self.current) {
            CallSession::None => None,
            CallSession::Invite(s) => {
                if let Err(e) = s.invite.reject() {
                    warn!("Rejecting invite {} failed: {}", s.call_id, e);
                }
                Some(EndedCall {
                    call_id: s.call_id,
                    reason: forced.unwrap_or(EndReason::Rejected),
                })
            }
            CallSession::Active(s) => {
                if let CallLink::Connected(handle) = &s.link {
                    if let Err(e) = handle.disconnect() {
                        warn!("Disconnecting call {} failed: {}", s.call_id, e);
                    }
                }
                Some(EndedCall {
                    call_id: s.call_id,
                    reason: forced.unwrap_or(EndReason::LocalHangup),
                })
            }
        }
    }
}

fn discard_orphan(call_id: CallId, result: Result<Arc<dyn ActiveCall>, SdkError>) {
    match result {
        Ok(handle) => {
            debug!("Disconnecting orphaned call {}", call_id);
            if let Err(e) = handle.disconnect() {
                warn!("Disconnecting orphaned call {} failed: {}", call_id, e);
            }
        }
        Err(e) => debug!("Ignoring stale failure for call {}: {}", call_id, e),
    }
}
