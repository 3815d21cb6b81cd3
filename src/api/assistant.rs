use std::sync::Arc;
use tracing::warn;

use crate::api::RemoteMessageService;
use crate::models::ai::{DEFAULT_SUMMARY_MESSAGE_COUNT, ImproveStyle};

/// On-demand AI text helpers for dialogs.
///
/// Every call resolves to `None` on failure or empty input; the failure is
/// logged and nothing is retried.
#[derive(Clone)]
pub struct TextAssistant {
    service: Arc<dyn RemoteMessageService>,
}

impl TextAssistant {
    pub fn new(service: Arc<dyn RemoteMessageService>) -> Self {
        Self { service }
    }

    /// Summarize the last `message_count` messages (default 50).
    pub async fn summarize(&self, chat_id: &str, message_count: Option<u32>) -> Option<String> {
        let count = message_count.unwrap_or(DEFAULT_SUMMARY_MESSAGE_COUNT);
        match self.service.summarize(chat_id, count).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(chat_id, "Failed to summarize chat: {e}");
                None
            }
        }
    }

    pub async fn ask(&self, query: &str, chat_id: Option<&str>) -> Option<String> {
        if query.trim().is_empty() {
            return None;
        }
        match self.service.ask(query, chat_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to get AI response: {e}");
                None
            }
        }
    }

    pub async fn improve(&self, message: &str, style: ImproveStyle) -> Option<String> {
        if message.trim().is_empty() {
            return None;
        }
        match self.service.improve(message, style).await {
            Ok(improved) => improved,
            Err(e) => {
                warn!(style = style.as_str(), "Failed to improve message: {e}");
                None
            }
        }
    }

    pub async fn translate(&self, message: &str, target_language: &str) -> Option<String> {
        if message.trim().is_empty() || target_language.trim().is_empty() {
            return None;
        }
        match self.service.translate(message, target_language).await {
            Ok(translated) => translated,
            Err(e) => {
                warn!(target_language, "Failed to translate message: {e}");
                None
            }
        }
    }
}
