use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::chat::protocol::{ClientEvent, ServerEvent};
use crate::error::ChatError;

/// Bidirectional realtime event channel shared by all sessions.
///
/// Every subscriber sees every inbound event; sessions filter by chat id
/// themselves.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Queue an event for the server.
    async fn emit(&self, event: ClientEvent) -> Result<(), ChatError>;

    /// Register a new listener for inbound events. Dropping the receiver
    /// unsubscribes.
    async fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent>;
}

/// Fan-out of inbound events to every live subscription.
#[derive(Debug, Default)]
pub struct Subscribers {
    senders: RwLock<Vec<mpsc::UnboundedSender<ServerEvent>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return its receiving end.
    pub async fn join(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.push(tx);
        rx
    }

    /// Deliver `event` to every subscriber, pruning the ones that went away.
    pub async fn broadcast(&self, event: ServerEvent) {
        let mut senders = self.senders.write().await;
        // If the send fails the receiver has been dropped.
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-process channel: records what was emitted and lets the caller inject
/// inbound events. Used to run sessions without a server.
#[derive(Debug, Default)]
pub struct LocalChannel {
    subscribers: Subscribers,
    emitted: Mutex<Vec<ClientEvent>>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an inbound event to all subscribers, as if the server sent it.
    pub async fn deliver(&self, event: ServerEvent) {
        self.subscribers.broadcast(event).await;
    }

    /// Everything emitted so far, oldest first.
    pub async fn emitted(&self) -> Vec<ClientEvent> {
        self.emitted.lock().await.clone()
    }

    pub async fn take_emitted(&self) -> Vec<ClientEvent> {
        std::mem::take(&mut *self.emitted.lock().await)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.len().await
    }
}

#[async_trait]
impl RealtimeChannel for LocalChannel {
    async fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        self.emitted.lock().await.push(event);
        Ok(())
    }

    async fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.subscribers.join().await
    }
}
