//! # voice-session-core
//!
//! Call-session lifecycle manager for a single voice call on top of a
//! third-party telephony SDK.
//!
//! The crate tracks who the local user is, whether the SDK is registered,
//! and what the current call is, and reconciles asynchronous SDK
//! notifications with user commands:
//!
//! - **Identity** - the caller name; changing it drops the call and re-registers
//! - **Token provider** - fetches a short-lived credential for the identity
//! - **Registration manager** - owns the SDK handle; registers and unregisters
//! - **Event bridge** - turns the SDK's incoming-invite, call-disconnected and
//!   call-ringing notifications into typed session events
//! - **Session state machine** - `None`, `Invite` or `Active`, never more than one
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │   Presentation layer    │  set_identity / place_call / end_call
//! └───────────┬─────────────┘         ▲ snapshots + events
//!             │                       │
//! ┌───────────▼───────────────────────┴─┐
//! │  VoiceClient ──► ClientManager actor │
//! └───────────┬─────────────────────────┘
//!             │ traits
//! ┌───────────▼─────────────┐
//! │ VoiceSdk / TokenProvider │
//! │ PermissionGate           │
//! └──────────────────────────┘
//! ```
//!
//! The concrete SDK is supplied by the application through [`VoiceSdk`],
//! [`CallInvite`] and [`ActiveCall`].

pub mod bridge;
pub mod client;
pub mod error;
pub mod events;
pub mod identity;
pub mod registration;
pub mod sdk;
pub mod session;
pub mod token;

pub use client::{ClientConfig, ClientSnapshot, Failure, VoiceClient, VoiceClientBuilder};
pub use error::{ClientError, ClientResult, ErrorCategory, SdkError};
pub use events::{ClientEvent, EndReason, EventStream, InviteRejectReason};
pub use identity::Identity;
pub use registration::RegistrationStatus;
pub use sdk::{
    ActiveCall, AlwaysGranted, CallInvite, ConnectOptions, PermissionGate, PermissionStatus,
    SdkFactory, SdkNotification, VoiceSdk,
};
pub use session::{CallDirection, CallId, SessionState};
pub use token::{Credential, HttpTokenProvider, TokenProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
