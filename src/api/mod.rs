pub mod assistant;
pub mod http;

pub use assistant::TextAssistant;
pub use http::HttpMessageService;

use async_trait::async_trait;

use crate::error::ChatError;
use crate::models::ai::ImproveStyle;
use crate::models::{ChatDetails, Message, MessagePage, Reaction};

/// Remote operations on messages, reactions, receipts and the AI helpers.
///
/// All calls are addressed by server ids and authenticated by the
/// implementation.
#[async_trait]
pub trait RemoteMessageService: Send + Sync {
    /// One page of history, oldest first. Page 1 is the newest.
    async fn fetch_messages(&self, chat_id: &str, page: u32) -> Result<MessagePage, ChatError>;

    async fn chat_details(&self, chat_id: &str) -> Result<ChatDetails, ChatError>;

    /// Edit a message. Returns the updated message when the server sends it back.
    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<Option<Message>, ChatError>;

    async fn delete_message(&self, message_id: &str) -> Result<(), ChatError>;

    async fn mark_delivered(&self, message_id: &str) -> Result<(), ChatError>;

    async fn mark_seen(&self, message_id: &str) -> Result<(), ChatError>;

    /// Set this user's reaction. Returns the new summary if the server sent one.
    async fn upsert_reaction(
        &self,
        message_id: &str,
        emoji: &str,
    ) -> Result<Option<Vec<Reaction>>, ChatError>;

    async fn remove_reaction(&self, message_id: &str) -> Result<Option<Vec<Reaction>>, ChatError>;

    async fn smart_replies(&self, chat_id: &str) -> Result<Vec<String>, ChatError>;

    async fn summarize(
        &self,
        chat_id: &str,
        message_count: u32,
    ) -> Result<Option<String>, ChatError>;

    async fn ask(&self, query: &str, chat_id: Option<&str>) -> Result<Option<String>, ChatError>;

    async fn improve(
        &self,
        message: &str,
        style: ImproveStyle,
    ) -> Result<Option<String>, ChatError>;

    async fn translate(
        &self,
        message: &str,
        target_language: &str,
    ) -> Result<Option<String>, ChatError>;
}
