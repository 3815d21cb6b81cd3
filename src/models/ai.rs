use serde::{Deserialize, Serialize};

use super::{ChatId, nullable};

/// Number of recent messages summarized when the caller does not choose.
pub const DEFAULT_SUMMARY_MESSAGE_COUNT: u32 = 50;

/// Rewrite style accepted by the improve endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImproveStyle {
    #[default]
    Professional,
    Casual,
    Concise,
    Elaborate,
}

impl ImproveStyle {
    pub const ALL: [ImproveStyle; 4] = [
        ImproveStyle::Professional,
        ImproveStyle::Casual,
        ImproveStyle::Concise,
        ImproveStyle::Elaborate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImproveStyle::Professional => "professional",
            ImproveStyle::Casual => "casual",
            ImproveStyle::Concise => "concise",
            ImproveStyle::Elaborate => "elaborate",
        }
    }
}

// ── Requests ──

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartRepliesRequest {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub chat_id: ChatId,
    pub message_count: u32,
}

/// Free-form question to the assistant, optionally grounded in a chat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub query: String,
    pub chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImproveRequest {
    pub message: String,
    pub style: ImproveStyle,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    pub message: String,
    pub target_language: String,
}

// ── Responses ──

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmartRepliesResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImproveResponse {
    #[serde(default)]
    pub improved: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub translated: Option<String>,
}
