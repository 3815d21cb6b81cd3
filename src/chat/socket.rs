use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::auth::TokenStore;
use crate::chat::channel::{RealtimeChannel, Subscribers};
use crate::chat::protocol::{ClientEvent, ServerEvent};
use crate::error::ChatError;

/// WebSocket implementation of [`RealtimeChannel`].
///
/// A background task owns the connection and reconnects after
/// `reconnect_delay` whenever it drops. Emitted events queue while the socket
/// is down and are flushed once it is back. Call [`SocketChannel::close`] to
/// flush the queue before going away; dropping the channel discards it.
pub struct SocketChannel {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    subscribers: Arc<Subscribers>,
    closing: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SocketChannel {
    /// Start connecting to `url`. Returns immediately; the connection is
    /// established in the background.
    pub fn connect(url: impl Into<String>, tokens: TokenStore, reconnect_delay: Duration) -> Self {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (closing, closing_rx) = watch::channel(false);
        let subscribers = Arc::new(Subscribers::new());

        let task = tokio::spawn(run_connection(
            url.into(),
            tokens,
            reconnect_delay,
            subscribers.clone(),
            rx,
            closing_rx,
        ));

        Self {
            outbound,
            subscribers,
            closing,
            task: Mutex::new(Some(task)),
        }
    }

    /// Send every queued event, close the socket and stop reconnecting.
    ///
    /// Gives up after `grace` if the server cannot be reached; whatever is
    /// still queued then is dropped.
    pub async fn close(&self, grace: Duration) {
        let _ = self.closing.send(true);
        let Some(mut task) = self.task.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!("Realtime channel did not flush in time, dropping queued events");
            task.abort();
        }
        info!("Realtime channel closed");
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl RealtimeChannel for SocketChannel {
    async fn emit(&self, event: ClientEvent) -> Result<(), ChatError> {
        self.outbound
            .send(event)
            .map_err(|_| ChatError::ChannelClosed)
    }

    async fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.subscribers.join().await
    }
}

/// Connect, pump frames both ways until the socket drops, wait, repeat.
async fn run_connection(
    url: String,
    tokens: TokenStore,
    reconnect_delay: Duration,
    subscribers: Arc<Subscribers>,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    mut closing: watch::Receiver<bool>,
) {
    loop {
        // Re-read the token on every attempt so a refreshed one is picked up.
        let handshake = tokens.handshake_url(&url).await;

        match connect_async(handshake.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, "Realtime channel connected");
                let (mut writer, mut reader) = stream.split();

                loop {
                    tokio::select! {
                        frame = reader.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                dispatch_frame(text.as_str(), &subscribers).await;
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            // Pings are answered by tungstenite itself.
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Realtime channel receive failed: {e}");
                                break;
                            }
                        },
                        event = outbound.recv() => {
                            // Every sender is gone: the channel was dropped.
                            let Some(event) = event else {
                                let _ = writer.close().await;
                                return;
                            };
                            if !send_event(&mut writer, event).await {
                                break;
                            }
                        }
                        _ = closing.changed() => {
                            while let Ok(event) = outbound.try_recv() {
                                if !send_event(&mut writer, event).await {
                                    return;
                                }
                            }
                            let _ = writer.close().await;
                            return;
                        }
                    }
                }
                warn!(url = %url, "Realtime channel disconnected");
            }
            Err(e) => warn!(url = %url, "Failed to connect realtime channel: {e}"),
        }

        if *closing.borrow() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = closing.changed() => return,
        }
    }
}

/// Encode and write one event. Returns `false` once the socket is unusable.
async fn send_event<W>(writer: &mut W, event: ClientEvent) -> bool
where
    W: Sink<WsMessage> + Unpin,
    W::Error: fmt::Display,
{
    let json = match event.encode() {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode event: {e}");
            return true;
        }
    };
    match writer.send(WsMessage::text(json)).await {
        Ok(()) => true,
        Err(e) => {
            warn!(event = ?event, "Failed to send event: {e}");
            false
        }
    }
}

async fn dispatch_frame(text: &str, subscribers: &Subscribers) {
    match ServerEvent::decode(text) {
        Ok(Some(event)) => subscribers.broadcast(event).await,
        Ok(None) => debug!("Ignoring unknown realtime event"),
        Err(e) => warn!("Dropping malformed realtime frame: {e}"),
    }
}
