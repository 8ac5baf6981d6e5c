//! Event bridge - native SDK notifications to typed session events
//!
//! While registration is ready the bridge runs one forwarding task that reads
//! the SDK's notification channel and sends [`BridgedEvent`]s to the client
//! actor. Each event carries the id of the subscription that produced it;
//! the actor applies only events whose id is still current, so anything
//! queued before [`EventBridge::unsubscribe`] is dropped rather than
//! delivered to a reset session.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::sdk::{CallInvite, SdkNotification, VoiceSdk};

/// Typed session event produced from a native notification
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    InviteReceived(Arc<dyn CallInvite>),
    Disconnected,
    Ringing,
}

impl From<SdkNotification> for BridgeEvent {
    fn from(notification: SdkNotification) -> Self {
        match notification {
            SdkNotification::IncomingInvite(invite) => BridgeEvent::InviteReceived(invite),
            SdkNotification::CallDisconnected => BridgeEvent::Disconnected,
            SdkNotification::CallRinging => BridgeEvent::Ringing,
        }
    }
}

/// A bridge event tagged with the subscription that forwarded it
#[derive(Debug)]
pub struct BridgedEvent {
    pub subscription: u64,
    pub event: BridgeEvent,
}

struct Subscription {
    id: u64,
    task: JoinHandle<()>,
}

/// Owns the single forwarding subscription to the SDK notification channel
pub struct EventBridge {
    sink: mpsc::UnboundedSender<BridgedEvent>,
    next_id: u64,
    active: Option<Subscription>,
}

impl EventBridge {
    pub fn new(sink: mpsc::UnboundedSender<BridgedEvent>) -> Self {
        Self {
            sink,
            next_id: 0,
            active: None,
        }
    }

    /// Subscribe to all three notifications, replacing any previous subscription
    pub fn subscribe(&mut self, sdk: &Arc<dyn VoiceSdk>) -> u64 {
        self.unsubscribe();

        self.next_id += 1;
        let id = self.next_id;
        let mut notifications = sdk.notifications();
        let sink = self.sink.clone();

        let task = tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(notification) => {
                        trace!("Bridge {} forwarding {}", id, notification.channel());
                        let event = BridgedEvent {
                            subscription: id,
                            event: notification.into(),
                        };
                        if sink.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Bridge {} lagged, {} notifications dropped", id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("SDK notification channel closed");
                        break;
                    }
                }
            }
        });

        debug!("Event bridge subscribed ({})", id);
        self.active = Some(Subscription { id, task });
        id
    }

    /// Drop the subscription. Returns whether one was active.
    pub fn unsubscribe(&mut self) -> bool {
        match self.active.take() {
            Some(subscription) => {
                subscription.task.abort();
                debug!("Event bridge unsubscribed ({})", subscription.id);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    /// Whether an event from `subscription` may still be applied
    pub fn accepts(&self, subscription: u64) -> bool {
        self.active.as_ref().is_some_and(|s| s.id == subscription)
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;
    use crate::sdk::{ActiveCall, ConnectOptions};
    use crate::token::Credential;
    use async_trait::async_trait;

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

    fn channel_sdk() -> (Arc<dyn VoiceSdk>, broadcast::Sender<SdkNotification>) {
        let (tx, _) = broadcast::channel(8);
        (Arc::new(ChannelSdk { tx: tx.clone() }), tx)
    }

    #[tokio::test]
    async fn test_forwards_tagged_events() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let (sdk, native) = channel_sdk();
        let mut bridge = EventBridge::new(sink);

        let id = bridge.subscribe(&sdk);
        native.send(SdkNotification::CallRinging).unwrap();
        native.send(SdkNotification::CallDisconnected).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.subscription, id);
        assert!(matches!(first.event, BridgeEvent::Ringing));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, BridgeEvent::Disconnected));
        assert!(bridge.accepts(id));
    }

    #[tokio::test]
    async fn test_resubscribe_invalidates_previous_id() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let (sdk, _native) = channel_sdk();
        let mut bridge = EventBridge::new(sink);

        let first = bridge.subscribe(&sdk);
        let second = bridge.subscribe(&sdk);
        assert_ne!(first, second);
        assert!(!bridge.accepts(first));
        assert!(bridge.accepts(second));

        assert!(bridge.unsubscribe());
        assert!(!bridge.unsubscribe());
        assert!(!bridge.accepts(second));
        assert!(!bridge.is_subscribed());
    }
}
