//! Client actor - serializes commands, completions and SDK events
//!
//! ```text
//! ┌──────────────┐  Command   ┌─────────────────────────────┐
//! │ VoiceClient  ├───────────►│        ClientManager        │
//! └──────────────┘            │  IdentityStore              │
//!                             │  RegistrationManager ──┐    │
//! ┌──────────────┐ Completion │  SessionStateMachine   │    │
//! │ spawned jobs ├───────────►│  EventBridge ◄─────────┘    │
//! └──────────────┘            └──────┬──────────────┬───────┘
//! ┌──────────────┐ BridgedEvent      │ watch        │ broadcast
//! │ EventBridge  ├──────────────────►│ snapshot     │ ClientEvent
//! └──────────────┘                   ▼              ▼
//! ```
//!
//! The actor owns every piece of mutable state. Asynchronous steps run on
//! spawned tasks and report back as [`Completion`]s, so the loop keeps
//! serving commands and events while a registration or call setup is
//! outstanding. The only await inside the loop is the bounded unregister
//! during teardown.
//!
//! Every reply is sent after the snapshot it implies has been published, so
//! a caller that resumes from a command sees matching state.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeEvent, BridgedEvent, EventBridge};
use crate::client::config::ClientConfig;
use crate::client::types::{ClientSnapshot, Failure};
use crate::error::{ClientError, ClientResult, SdkError};
use crate::events::{ClientEvent, EndReason, EventEmitter, InviteRejectReason};
use crate::identity::{Identity, IdentityStore};
use crate::registration::{RegistrationManager, RegistrationOutcome};
use crate::sdk::{ActiveCall, CallInvite, ConnectOptions};
use crate::session::{
    CallId, EndedCall, InviteOutcome, SessionState, SessionStateMachine, SetupOutcome,
};
use crate::token::Credential;

/// User intents forwarded by [`VoiceClient`](crate::VoiceClient)
pub(crate) enum Command {
    SetIdentity {
        identity: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    PlaceCall {
        target: String,
        reply: oneshot::Sender<ClientResult<CallId>>,
    },
    AcceptCall {
        reply: oneshot::Sender<ClientResult<CallId>>,
    },
    EndCall {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Results of spawned asynchronous steps
pub(crate) enum Completion {
    Registration {
        generation: u64,
        result: ClientResult<Credential>,
    },
    Accept {
        call_id: CallId,
        result: Result<Arc<dyn ActiveCall>, SdkError>,
    },
    Connect {
        call_id: CallId,
        result: Result<Arc<dyn ActiveCall>, SdkError>,
    },
}

struct PendingRegistration {
    generation: u64,
    identity: String,
    reply: oneshot::Sender<ClientResult<()>>,
}

struct PendingSetup {
    call_id: CallId,
    reply: oneshot::Sender<ClientResult<CallId>>,
}

pub(crate) struct ClientManager {
    config: ClientConfig,
    identity: IdentityStore,
    registration: RegistrationManager,
    bridge: EventBridge,
    session: SessionStateMachine,
    events: EventEmitter,
    snapshot_tx: watch::Sender<ClientSnapshot>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    pending_registration: Option<PendingRegistration>,
    pending_accept: Option<PendingSetup>,
    pending_connect: Option<PendingSetup>,
    last_failure: Option<Failure>,
}

/// Receiving ends the actor loop selects over
pub(crate) struct Inbox {
    pub commands: mpsc::Receiver<Command>,
    pub completions: mpsc::UnboundedReceiver<Completion>,
    pub bridged: mpsc::UnboundedReceiver<BridgedEvent>,
}

impl ClientManager {
    pub(crate) fn new(
        config: ClientConfig,
        registration: RegistrationManager,
        events: EventEmitter,
        snapshot_tx: watch::Sender<ClientSnapshot>,
        commands: mpsc::Receiver<Command>,
    ) -> (Self, Inbox) {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (bridge_tx, bridged) = mpsc::unbounded_channel();

        let manager = Self {
            config,
            identity: IdentityStore::new(),
            registration,
            bridge: EventBridge::new(bridge_tx),
            session: SessionStateMachine::new(),
            events,
            snapshot_tx,
            completion_tx,
            pending_registration: None,
            pending_accept: None,
            pending_connect: None,
            last_failure: None,
        };

        let inbox = Inbox {
            commands,
            completions,
            bridged,
        };
        (manager, inbox)
    }

    /// Run until every `VoiceClient` handle is dropped, then tear down
    pub(crate) async fn run(mut self, mut inbox: Inbox) {
        info!("Voice client started");

        loop {
            tokio::select! {
                command = inbox.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(completion) = inbox.completions.recv() => self.handle_completion(completion),
                Some(bridged) = inbox.bridged.recv() => self.handle_bridged(bridged),
            }
            self.publish();
        }

        self.teardown().await;
        self.publish();
        info!("Voice client stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetIdentity { identity, reply } => self.set_identity(identity, reply),
            Command::PlaceCall { target, reply } => self.place_call(target, reply),
            Command::AcceptCall { reply } => self.accept_call(reply),
            Command::EndCall { reply } => {
                if let Some(ended) = self.session.end_call() {
                    self.on_ended(ended);
                }
                self.respond(reply, Ok(()));
            }
            Command::Teardown { reply } => {
                self.teardown().await;
                self.respond(reply, ());
            }
        }
    }

    fn set_identity(&mut self, raw: String, reply: oneshot::Sender<ClientResult<()>>) {
        let identity = match Identity::parse(&raw) {
            Ok(identity) => identity,
            Err(e) => {
                self.respond(reply, Err(e));
                return;
            }
        };

        info!("Setting identity to '{}'", identity);

        // The old call cannot survive the identity it was made under
        if let Some(ended) = self.session.force_drop(EndReason::IdentityChanged) {
            self.on_ended(ended);
        }
        self.bridge.unsubscribe();
        self.cancel_pending_registration();
        self.identity.replace(identity.clone());
        self.last_failure = None;

        let job = self.registration.begin(identity.clone());
        let generation = job.generation;
        self.emit_status(None);

        self.pending_registration = Some(PendingRegistration {
            generation,
            identity: identity.to_string(),
            reply,
        });

        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = job.run().await;
            let _ = completions.send(Completion::Registration { generation, result });
        });
    }

    fn place_call(&mut self, raw: String, reply: oneshot::Sender<ClientResult<CallId>>) {
        let status = self.registration.status();
        let (Some(sdk), Some(credential)) = (
            self.registration.sdk().cloned(),
            self.registration.credential().cloned(),
        ) else {
            self.respond(reply, Err(ClientError::NotReady { status }));
            return;
        };
        if !status.is_ready() {
            self.respond(reply, Err(ClientError::NotReady { status }));
            return;
        }

        let target = raw.trim();
        if target.is_empty() {
            self.respond(reply, Err(ClientError::MissingTarget));
            return;
        }

        let call_id = match self.session.begin_outbound(target.to_string()) {
            Ok(call_id) => call_id,
            Err(e) => {
                self.respond(reply, Err(e));
                return;
            }
        };
        self.pending_connect = Some(PendingSetup { call_id, reply });

        let options = ConnectOptions {
            target: target.to_string(),
            display_name: self.config.display_name.clone(),
        };
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = sdk.connect(&credential, options).await;
            let _ = completions.send(Completion::Connect { call_id, result });
        });
    }

    fn accept_call(&mut self, reply: oneshot::Sender<ClientResult<CallId>>) {
        match self.session.begin_accept() {
            Ok((call_id, invite)) => {
                self.pending_accept = Some(PendingSetup { call_id, reply });
                self.spawn_accept(call_id, invite);
            }
            Err(e) => {
                self.respond(reply, Err(e));
            }
        }
    }

    fn spawn_accept(&self, call_id: CallId, invite: Arc<dyn CallInvite>) {
        debug!("Accepting invite {}", call_id);
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = invite.accept().await;
            let _ = completions.send(Completion::Accept { call_id, result });
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Registration { generation, result } => {
                self.finish_registration(generation, result)
            }
            Completion::Accept { call_id, result } => {
                let outcome = self.session.finish_accept(call_id, result);
                let pending = take_pending(&mut self.pending_accept, call_id);
                self.finish_setup(call_id, outcome, pending, EndReason::AcceptFailed);
            }
            Completion::Connect { call_id, result } => {
                let outcome = self.session.finish_connect(call_id, result);
                let pending = take_pending(&mut self.pending_connect, call_id);
                self.finish_setup(call_id, outcome, pending, EndReason::ConnectFailed);
            }
        }
    }

    fn finish_registration(&mut self, generation: u64, result: ClientResult<Credential>) {
        let outcome = self.registration.complete(generation, result);
        let reply = if self
            .pending_registration
            .as_ref()
            .is_some_and(|p| p.generation == generation)
        {
            self.pending_registration.take().map(|p| p.reply)
        } else {
            None
        };

        match outcome {
            RegistrationOutcome::Ready => {
                if let Some(sdk) = self.registration.sdk().cloned() {
                    self.bridge.subscribe(&sdk);
                }
                self.emit_status(None);
                if let Some(reply) = reply {
                    self.respond(reply, Ok(()));
                }
            }
            RegistrationOutcome::Failed(e) => {
                error!("Registration failed: {}", e);
                self.emit_status(Some(e.to_string()));
                self.fail(None, &e);
                if let Some(reply) = reply {
                    self.respond(reply, Err(e));
                }
            }
            RegistrationOutcome::Stale(credential) => {
                if let Some(credential) = credential {
                    self.registration
                        .release_stale(credential, self.config.unregister_timeout());
                }
            }
        }
    }

    fn finish_setup(
        &mut self,
        call_id: CallId,
        outcome: SetupOutcome,
        pending: Option<oneshot::Sender<ClientResult<CallId>>>,
        failure_reason: EndReason,
    ) {
        match outcome {
            SetupOutcome::Connected => {
                if let SessionState::Active { direction, remote, .. } = self.session.snapshot() {
                    self.events.emit(ClientEvent::CallConnected {
                        call_id,
                        direction,
                        remote,
                    });
                }
                if let Some(reply) = pending {
                    self.respond(reply, Ok(call_id));
                }
            }
            SetupOutcome::Failed(e) => {
                self.events.emit(ClientEvent::CallEnded {
                    call_id,
                    reason: failure_reason,
                });
                self.fail(Some(call_id), &e);
                if let Some(reply) = pending {
                    self.respond(reply, Err(e));
                }
            }
            SetupOutcome::Stale => debug!("Stale call setup completion for {}", call_id),
        }
    }

    fn handle_bridged(&mut self, bridged: BridgedEvent) {
        if !self.bridge.accepts(bridged.subscription) {
            debug!(
                "Dropping event from stale bridge subscription {}",
                bridged.subscription
            );
            return;
        }

        match bridged.event {
            BridgeEvent::InviteReceived(invite) => match self.session.receive_invite(invite.clone()) {
                InviteOutcome::Stored { call_id } => {
                    self.events.emit(ClientEvent::IncomingInvite {
                        call_id,
                        from: invite.caller().to_string(),
                        to: invite.callee().to_string(),
                    });
                    if self.config.auto_accept {
                        match self.session.begin_accept() {
                            Ok((call_id, invite)) => self.spawn_accept(call_id, invite),
                            Err(e) => warn!("Auto-accept of {} not started: {}", call_id, e),
                        }
                    }
                }
                InviteOutcome::Busy => {
                    self.events.emit(ClientEvent::InviteRejected {
                        from: invite.caller().to_string(),
                        reason: InviteRejectReason::Busy,
                    });
                }
            },
            BridgeEvent::Disconnected => {
                if let Some(ended) = self.session.disconnected() {
                    self.on_ended(ended);
                }
            }
            BridgeEvent::Ringing => {
                let call_id = self.session.current().call_id();
                debug!("Call ringing ({:?})", call_id);
                self.events.emit(ClientEvent::CallRinging { call_id });
            }
        }
    }

    /// Unsubscribe, drop the session, cancel registration and unregister. Idempotent.
    async fn teardown(&mut self) {
        self.bridge.unsubscribe();
        if let Some(ended) = self.session.force_drop(EndReason::Teardown) {
            self.on_ended(ended);
        }
        self.cancel_pending_registration();

        let previous = self.registration.status();
        self.registration
            .teardown(self.config.unregister_timeout())
            .await;

        if previous != self.registration.status() {
            info!("Voice client torn down");
            self.emit_status(Some("teardown".to_string()));
        }
        self.identity.clear();
    }

    fn on_ended(&mut self, ended: EndedCall) {
        let reason = match ended.reason {
            EndReason::Teardown | EndReason::IdentityChanged => "session dropped",
            _ => "call ended before it connected",
        };
        if let Some(reply) = take_pending(&mut self.pending_accept, ended.call_id) {
            self.respond(reply, Err(ClientError::CallAccept {
                reason: reason.to_string(),
            }));
        }
        if let Some(reply) = take_pending(&mut self.pending_connect, ended.call_id) {
            self.respond(reply, Err(ClientError::CallConnect {
                reason: reason.to_string(),
            }));
        }

        self.events.emit(ClientEvent::CallEnded {
            call_id: ended.call_id,
            reason: ended.reason,
        });
    }

    fn cancel_pending_registration(&mut self) {
        if let Some(pending) = self.pending_registration.take() {
            debug!("Cancelling registration for '{}'", pending.identity);
            self.respond(pending.reply, Err(ClientError::RegistrationCancelled {
                identity: pending.identity,
            }));
        }
    }

    fn fail(&mut self, call_id: Option<CallId>, error: &ClientError) {
        self.last_failure = Some(Failure::from(error));
        self.events.emit(ClientEvent::Error {
            call_id,
            category: error.category(),
            message: error.to_string(),
        });
    }

    fn emit_status(&self, reason: Option<String>) {
        self.events.emit(ClientEvent::RegistrationStatusChanged {
            identity: self.identity.current().map(|i| i.to_string()),
            status: self.registration.status(),
            reason,
        });
    }

    fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            identity: self.identity.current().map(|i| i.to_string()),
            registration: self.registration.status(),
            session: self.session.snapshot(),
            last_failure: self.last_failure.clone(),
        }
    }

    /// Publish the current state, then answer the waiting caller
    fn respond<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }
}

fn take_pending(
    slot: &mut Option<PendingSetup>,
    call_id: CallId,
) -> Option<oneshot::Sender<ClientResult<CallId>>> {
    if slot.as_ref().is_some_and(|p| p.call_id == call_id) {
        slot.take().map(|p| p.reply)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::sdk::{AlwaysGranted, SdkNotification, VoiceSdk};
    use crate::token::TokenProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    struct ChannelSdk {
        tx: broadcast::Sender<SdkNotification>,
    }

    #[async_trait]
    impl VoiceSdk for ChannelSdk {
        async fn register(&self, _credential: &Credential) -> Result<(), SdkError> {
            Ok(())
        }
        async fn unregister(&self, _credential: &Credential) -> Result<(), SdkError> {
            Ok(())
        }
        async fn connect(
            &self,
            _credential: &Credential,
            _options: ConnectOptions,
        ) -> Result<Arc<dyn ActiveCall>, SdkError> {
            Err(SdkError::new("not used"))
        }
        fn notifications(&self) -> broadcast::Receiver<SdkNotification> {
            self.tx.subscribe()
        }
    }

    struct Tokens;

    #[async_trait]
    impl TokenProvider for Tokens {
        async fn fetch_token(&self, identity: &Identity) -> ClientResult<Credential> {
            Ok(Credential::new(format!("token-{}", identity)))
        }
    }

    #[derive(Debug, Default)]
    struct CountingInvite {
        accepts: AtomicUsize,
        rejects: AtomicUsize,
    }

    #[async_trait]
    impl CallInvite for CountingInvite {
        fn caller(&self) -> &str {
            "carol"
        }
        fn callee(&self) -> &str {
            "alice"
        }
        async fn accept(&self) -> Result<Arc<dyn ActiveCall>, SdkError> {
            self.accepts.fetch_add(1, Ordering::SeqCst);
            Err(SdkError::new("not used"))
        }
        fn reject(&self) -> Result<(), SdkError> {
            self.rejects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager() -> (ClientManager, Inbox, broadcast::Sender<SdkNotification>) {
        let (native, _) = broadcast::channel(8);
        let sdk: Arc<dyn VoiceSdk> = Arc::new(ChannelSdk { tx: native.clone() });
        let factory = move || sdk.clone();
        let registration = RegistrationManager::new(Arc::new(factory), Arc::new(AlwaysGranted), Arc::new(Tokens));
        let (_command_tx, command_rx) = mpsc::channel(8);
        let (snapshot_tx, _snapshot_rx) = watch::channel(ClientSnapshot::default());
        let (manager, inbox) = ClientManager::new(
            ClientConfig::default(),
            registration,
            EventEmitter::new(16),
            snapshot_tx,
            command_rx,
        );
        (manager, inbox, native)
    }

    async fn register(manager: &mut ClientManager, inbox: &mut Inbox, identity: &str) {
        let (reply, response) = oneshot::channel();
        manager
            .handle_command(Command::SetIdentity {
                identity: identity.to_string(),
                reply,
            })
            .await;
        let completion = inbox.completions.recv().await.unwrap();
        manager.handle_completion(completion);
        response.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queued_event_from_previous_identity_is_dropped() {
        let (mut manager, mut inbox, native) = manager();
        register(&mut manager, &mut inbox, "alice").await;

        // Forwarded under alice's subscription but not yet applied
        let invite = Arc::new(CountingInvite::default());
        native.send(SdkNotification::IncomingInvite(invite.clone())).unwrap();
        let stale = inbox.bridged.recv().await.unwrap();

        register(&mut manager, &mut inbox, "bob").await;
        assert!(!manager.bridge.accepts(stale.subscription));

        manager.handle_bridged(stale);
        assert!(manager.snapshot().session.is_none());
        assert_eq!(invite.accepts.load(Ordering::SeqCst), 0);
        assert_eq!(invite.rejects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reply_sees_published_state() {
        let (mut manager, mut inbox, _native) = manager();
        let watcher = manager.snapshot_tx.subscribe();

        register(&mut manager, &mut inbox, "alice").await;
        // No explicit publish: the reply already carried the update
        assert!(watcher.borrow().is_ready());
        assert_eq!(watcher.borrow().identity.as_deref(), Some("alice"));
    }
}
