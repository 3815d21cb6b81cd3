use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;

use crate::api::RemoteMessageService;
use crate::auth::TokenStore;
use crate::error::ChatError;
use crate::models::ai::{
    AskRequest, AskResponse, ImproveRequest, ImproveResponse, ImproveStyle, SmartRepliesRequest,
    SmartRepliesResponse, SummarizeRequest, SummaryResponse, TranslateRequest, TranslateResponse,
};
use crate::models::messages::{
    DeleteMessageResponse, ReactionRequest, ReactionResponse, UpdateMessageRequest,
    UpdateMessageResponse,
};
use crate::models::{ChatDetails, Message, MessagePage, Reaction};

/// `{"chat": {...}}` wrapper of the chat details endpoint.
#[derive(Deserialize)]
struct ChatEnvelope {
    chat: ChatDetails,
}

/// Error body shape; the server uses either key.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`RemoteMessageService`] over the REST API.
#[derive(Debug, Clone)]
pub struct HttpMessageService {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl HttpMessageService {
    pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Authenticate, send and decode a request.
    ///
    /// Non-2xx statuses become [`ChatError::Status`] carrying the server's
    /// error message when it sent one. An empty 2xx body decodes as `{}`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ChatError> {
        let request = match self.tokens.bearer().await {
            Some(bearer) => request.header(AUTHORIZATION, bearer),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.message.or(body.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(ChatError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = if text.trim().is_empty() { "{}" } else { &text };
        Ok(serde_json::from_str(body)?)
    }
}

#[async_trait]
impl RemoteMessageService for HttpMessageService {
    /// GET /message/{chat_id}?page=N
    async fn fetch_messages(&self, chat_id: &str, page: u32) -> Result<MessagePage, ChatError> {
        debug!(chat_id, page, "Fetching messages");
        let request = self
            .client
            .get(self.url(&format!("/message/{chat_id}")))
            .query(&[("page", page)]);
        self.send(request).await
    }

    /// GET /chat/{chat_id}
    async fn chat_details(&self, chat_id: &str) -> Result<ChatDetails, ChatError> {
        let request = self.client.get(self.url(&format!("/chat/{chat_id}")));
        let ChatEnvelope { mut chat } = self.send(request).await?;
        if chat.chat_id.is_empty() {
            chat.chat_id = chat_id.to_string();
        }
        Ok(chat)
    }

    /// PUT /message/{message_id}
    async fn update_message(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<Option<Message>, ChatError> {
        let request = self
            .client
            .put(self.url(&format!("/message/{message_id}")))
            .json(&UpdateMessageRequest {
                content: content.to_string(),
            });
        let response: UpdateMessageResponse = self.send(request).await?;
        if response.success != Some(true) {
            return Err(ChatError::Rejected(format!(
                "update of message {message_id} was not applied"
            )));
        }
        Ok(response.message)
    }

    /// DELETE /message/{message_id}
    async fn delete_message(&self, message_id: &str) -> Result<(), ChatError> {
        let request = self
            .client
            .delete(self.url(&format!("/message/{message_id}")));
        let response: DeleteMessageResponse = self.send(request).await?;
        if response.success != Some(true) {
            return Err(ChatError::Rejected(format!(
                "delete of message {message_id} was not applied"
            )));
        }
        Ok(())
    }

    /// PUT /message/{message_id}/delivered
    async fn mark_delivered(&self, message_id: &str) -> Result<(), ChatError> {
        let request = self
            .client
            .put(self.url(&format!("/message/{message_id}/delivered")));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    /// PUT /message/{message_id}/seen
    async fn mark_seen(&self, message_id: &str) -> Result<(), ChatError> {
        let request = self
            .client
            .put(self.url(&format!("/message/{message_id}/seen")));
        let _: IgnoredAny = self.send(request).await?;
        Ok(())
    }

    /// PUT /reaction
    async fn upsert_reaction(
        &self,
        message_id: &str,
        emoji: &str,
    ) -> Result<Option<Vec<Reaction>>, ChatError> {
        let request = self.client.put(self.url("/reaction")).json(&ReactionRequest {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        let response: ReactionResponse = self.send(request).await?;
        Ok(response.reactions)
    }

    /// DELETE /reaction/{message_id}
    async fn remove_reaction(&self, message_id: &str) -> Result<Option<Vec<Reaction>>, ChatError> {
        let request = self
            .client
            .delete(self.url(&format!("/reaction/{message_id}")));
        let response: ReactionResponse = self.send(request).await?;
        Ok(response.reactions)
    }

    /// POST /ai/smart-replies
    async fn smart_replies(&self, chat_id: &str) -> Result<Vec<String>, ChatError> {
        let request = self
            .client
            .post(self.url("/ai/smart-replies"))
            .json(&SmartRepliesRequest {
                chat_id: chat_id.to_string(),
            });
        let response: SmartRepliesResponse = self.send(request).await?;
        Ok(response.suggestions)
    }

    /// POST /ai/summarize
    async fn summarize(
        &self,
        chat_id: &str,
        message_count: u32,
    ) -> Result<Option<String>, ChatError> {
        let request = self
            .client
            .post(self.url("/ai/summarize"))
            .json(&SummarizeRequest {
                chat_id: chat_id.to_string(),
                message_count,
            });
        let response: SummaryResponse = self.send(request).await?;
        Ok(response.summary)
    }

    /// POST /ai/chat
    async fn ask(&self, query: &str, chat_id: Option<&str>) -> Result<Option<String>, ChatError> {
        let request = self.client.post(self.url("/ai/chat")).json(&AskRequest {
            query: query.to_string(),
            chat_id: chat_id.map(str::to_string),
        });
        let response: AskResponse = self.send(request).await?;
        Ok(response.response)
    }

    /// POST /ai/improve
    async fn improve(
        &self,
        message: &str,
        style: ImproveStyle,
    ) -> Result<Option<String>, ChatError> {
        let request = self.client.post(self.url("/ai/improve")).json(&ImproveRequest {
            message: message.to_string(),
            style,
        });
        let response: ImproveResponse = self.send(request).await?;
        Ok(response.improved)
    }

    /// POST /ai/translate
    async fn translate(
        &self,
        message: &str,
        target_language: &str,
    ) -> Result<Option<String>, ChatError> {
        let request = self
            .client
            .post(self.url("/ai/translate"))
            .json(&TranslateRequest {
                message: message.to_string(),
                target_language: target_language.to_string(),
            });
        let response: TranslateResponse = self.send(request).await?;
        Ok(response.translated)
    }
}
