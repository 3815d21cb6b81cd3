use chat_client::ClientConfig;
use chat_client::api::HttpMessageService;
use chat_client::auth::TokenStore;
use chat_client::chat::{ChatSessionController, SessionRuntime, SocketChannel};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Follows one chat from the terminal: joins it, keeps receipts flowing and
/// logs every new message and failure until interrupted.
#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ClientConfig::from_env();
    let token = std::env::var("CHAT_TOKEN").expect("CHAT_TOKEN must be set");
    let user_id = std::env::var("CHAT_USER_ID").expect("CHAT_USER_ID must be set");
    let chat_id = std::env::var("CHAT_ID").expect("CHAT_ID must be set");

    let tokens = TokenStore::new(Some(token));
    let service = Arc::new(HttpMessageService::new(&config.api_url, tokens.clone()));
    let channel = Arc::new(SocketChannel::connect(
        &config.socket_url,
        tokens,
        config.reconnect_delay,
    ));
    tracing::info!("Using API at {} and socket at {}", config.api_url, config.socket_url);

    let controller = ChatSessionController::new(user_id, config.session);
    let mut session = SessionRuntime::spawn(controller, service, channel.clone()).await;
    session.activate(chat_id).expect("session task is running");

    let mut view = session.view();
    let mut last_printed: Option<String> = None;
    let mut notices_printed = 0;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                // Older pages land above the last printed message and are skipped.
                let start = match &last_printed {
                    Some(id) => current
                        .messages
                        .iter()
                        .position(|m| &m.id == id)
                        .map_or(current.messages.len().saturating_sub(1), |i| i + 1),
                    None => 0,
                };
                for message in &current.messages[start..] {
                    tracing::info!(
                        "[{}] {}: {} ({:?})",
                        message.created_at.format("%H:%M"),
                        message.sender_id,
                        message.content.as_deref().unwrap_or("<attachment>"),
                        current.tick_for(message),
                    );
                }
                if let Some(last) = current.messages.last() {
                    last_printed = Some(last.id.clone());
                }
                for notice in current.notices.iter().skip(notices_printed) {
                    tracing::info!(
                        "[{}] {}: {}",
                        notice.received_at.format("%H:%M"),
                        notice.sender,
                        notice.content,
                    );
                }
                notices_printed = current.notices.len();

                if current.typing.remote_is_typing {
                    tracing::info!("Someone is typing...");
                }
                if !current.smart_replies.suggestions.is_empty() {
                    tracing::info!("Suggestions: {:?}", current.smart_replies.suggestions);
                }
            }
            Some(failure) = session.next_failure() => {
                tracing::error!("Failed to {}: {}", failure.operation, failure.error);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving chat");
                break;
            }
        }
    }

    // Leave the chat, then give the socket a moment to deliver the leave event.
    session.shutdown().await;
    channel.close(Duration::from_secs(2)).await;
}
