//! Fake collaborators shared by the scenario tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio_stream::StreamExt;

use voice_session_core::{
    ActiveCall, CallInvite, ClientConfig, ClientError, ClientEvent, ClientResult, ClientSnapshot,
    ConnectOptions, Credential, EventStream, Identity, PermissionGate, PermissionStatus, SdkError,
    SdkNotification, TokenProvider, VoiceClient, VoiceSdk,
};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("voice_session_core=debug")
        .with_test_writer()
        .try_init();
}

// ===== CALLS =====

#[derive(Debug, Default)]
pub struct FakeCall {
    pub disconnects: AtomicUsize,
    pub fail_disconnect: AtomicBool,
}

impl FakeCall {
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

impl ActiveCall for FakeCall {
    fn disconnect(&self) -> Result<(), SdkError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            Err(SdkError::new("disconnect failed"))
        } else {
            Ok(())
        }
    }
}

/// How a fake invite answers `accept()`
#[derive(Debug)]
pub enum AcceptBehavior {
    Succeed,
    Fail(&'static str),
    /// Wait until the test sends the result
    Deferred(oneshot::Receiver<Result<(), &'static str>>),
}

#[derive(Debug)]
pub struct FakeInvite {
    pub from: String,
    pub to: String,
    pub call: Arc<FakeCall>,
    pub rejects: AtomicUsize,
    pub fail_reject: AtomicBool,
    pub accepts: AtomicUsize,
    behavior: Mutex<Option<AcceptBehavior>>,
}

impl FakeInvite {
    pub fn new(from: &str, behavior: AcceptBehavior) -> Arc<Self> {
        Arc::new(Self {
            from: from.to_string(),
            to: "alice".to_string(),
            call: Arc::new(FakeCall::default()),
            rejects: AtomicUsize::new(0),
            fail_reject: AtomicBool::new(false),
            accepts: AtomicUsize::new(0),
            behavior: Mutex::new(Some(behavior)),
        })
    }

    pub fn reject_count(&self) -> usize {
        self.rejects.load(Ordering::SeqCst)
    }

    pub fn accept_count(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallInvite for FakeInvite {
    fn caller(&self) -> &str {
        &self.from
    }

    fn callee(&self) -> &str {
        &self.to
    }

    async fn accept(&self) -> Result<Arc<dyn ActiveCall>, SdkError> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().take();
        let outcome = match behavior {
            Some(AcceptBehavior::Succeed) => Ok(()),
            Some(AcceptBehavior::Fail(msg)) => Err(msg),
            Some(AcceptBehavior::Deferred(rx)) => rx.await.unwrap_or(Err("abandoned")),
            None => Err("accepted twice"),
        };
        match outcome {
            Ok(()) => Ok(self.call.clone() as Arc<dyn ActiveCall>),
            Err(msg) => Err(SdkError::new(msg)),
        }
    }

    fn reject(&self) -> Result<(), SdkError> {
        self.rejects.fetch_add(1, Ordering::SeqCst);
        if self.fail_reject.load(Ordering::SeqCst) {
            Err(SdkError::new("reject failed"))
        } else {
            Ok(())
        }
    }
}

// ===== SDK =====

pub struct FakeSdk {
    notifications: broadcast::Sender<SdkNotification>,
    pub registered: Mutex<Vec<String>>,
    pub unregistered: Mutex<Vec<String>>,
    pub connects: Mutex<Vec<ConnectOptions>>,
    pub calls: Mutex<Vec<Arc<FakeCall>>>,
    pub fail_register: AtomicBool,
    pub fail_unregister: AtomicBool,
    pub fail_connect: AtomicBool,
    connect_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeSdk {
    pub fn new() -> Arc<Self> {
        let (notifications, _) = broadcast::channel(16);
        Arc::new(Self {
            notifications,
            registered: Mutex::new(Vec::new()),
            unregistered: Mutex::new(Vec::new()),
            connects: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fail_register: AtomicBool::new(false),
            fail_unregister: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            connect_gate: Mutex::new(None),
        })
    }

    /// Deliver a native notification to current subscribers
    pub fn emit(&self, notification: SdkNotification) {
        let _ = self.notifications.send(notification);
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifications.receiver_count()
    }

    /// Hold the next connect() until the returned sender fires
    pub fn hold_next_connect(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.connect_gate.lock() = Some(rx);
        tx
    }

    pub fn last_call(&self) -> Option<Arc<FakeCall>> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceSdk for FakeSdk {
    async fn register(&self, credential: &Credential) -> Result<(), SdkError> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(SdkError::new("invalid access token"));
        }
        self.registered.lock().push(credential.as_str().to_string());
        Ok(())
    }

    async fn unregister(&self, credential: &Credential) -> Result<(), SdkError> {
        self.unregistered.lock().push(credential.as_str().to_string());
        if self.fail_unregister.load(Ordering::SeqCst) {
            return Err(SdkError::new("network unreachable"));
        }
        Ok(())
    }

    async fn connect(
        &self,
        _credential: &Credential,
        options: ConnectOptions,
    ) -> Result<Arc<dyn ActiveCall>, SdkError> {
        self.connects.lock().push(options);
        let gate = self.connect_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SdkError::new("callee unreachable"));
        }
        let call = Arc::new(FakeCall::default());
        self.calls.lock().push(call.clone());
        Ok(call)
    }

    fn notifications(&self) -> broadcast::Receiver<SdkNotification> {
        self.notifications.subscribe()
    }
}

// ===== PERMISSIONS & TOKENS =====

#[derive(Clone)]
pub struct FakePermissions {
    pub requests: Arc<AtomicUsize>,
    status: Arc<Mutex<PermissionStatus>>,
    gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

impl FakePermissions {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            requests: Arc::new(AtomicUsize::new(0)),
            status: Arc::new(Mutex::new(status)),
            gate: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set(&self, status: PermissionStatus) {
        *self.status.lock() = status;
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Hold the next permission request until the returned sender fires
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }
}

#[async_trait]
impl PermissionGate for FakePermissions {
    async fn request_microphone(&self) -> PermissionStatus {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        *self.status.lock()
    }
}

#[derive(Clone, Default)]
pub struct FakeTokens {
    pub requested: Arc<Mutex<Vec<String>>>,
    pub fail: Arc<AtomicBool>,
}

impl FakeTokens {
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_token(&self, identity: &Identity) -> ClientResult<Credential> {
        self.requested.lock().push(identity.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::token_fetch("token endpoint returned 500 Internal Server Error"));
        }
        Ok(Credential::new(format!("token-{}", identity)))
    }
}

// ===== HARNESS =====

pub struct Harness {
    pub client: VoiceClient,
    pub sdk: Arc<FakeSdk>,
    pub permissions: FakePermissions,
    pub tokens: FakeTokens,
    pub sdk_created: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        init_tracing();
        let sdk = FakeSdk::new();
        let permissions = FakePermissions::new(PermissionStatus::Granted);
        let tokens = FakeTokens::default();
        let sdk_created = Arc::new(AtomicUsize::new(0));

        let factory_sdk = sdk.clone();
        let counter = sdk_created.clone();
        let client = VoiceClient::builder()
            .config(config)
            .sdk_factory(move || -> Arc<dyn VoiceSdk> {
                counter.fetch_add(1, Ordering::SeqCst);
                factory_sdk.clone()
            })
            .permission_gate(permissions.clone())
            .token_provider(tokens.clone())
            .build()
            .expect("client should build");

        Self {
            client,
            sdk,
            permissions,
            tokens,
            sdk_created,
        }
    }

    /// Register as `identity` and wait until the bridge is listening
    pub async fn ready_as(&self, identity: &str) {
        self.client
            .set_identity(identity)
            .await
            .expect("registration should succeed");
        assert!(self.client.is_ready());
        assert!(self.sdk.subscriber_count() >= 1, "bridge should be subscribed");
    }

    pub async fn wait_for(&self, predicate: impl FnMut(&ClientSnapshot) -> bool) -> ClientSnapshot {
        wait_for(self.client.watch(), predicate).await
    }
}

pub async fn wait_for(
    mut rx: watch::Receiver<ClientSnapshot>,
    predicate: impl FnMut(&ClientSnapshot) -> bool,
) -> ClientSnapshot {
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for client state")
        .expect("client stopped")
        .clone()
}

/// Poll `condition` until it holds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Next event matching `predicate`, skipping others
pub async fn next_event(
    events: &mut EventStream,
    mut predicate: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(WAIT, async {
        while let Some(event) = events.next().await {
            if let Ok(event) = event {
                if predicate(&event) {
                    return event;
                }
            }
        }
        panic!("event stream closed");
    })
    .await
    .expect("timed out waiting for event")
}
