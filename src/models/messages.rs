use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

use super::{ChatId, MessageId, UserId, nullable};

/// Rendering category of an attachment, inferred from its URL when the server
/// does not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
}

impl AttachmentKind {
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "mp4" | "webm" | "ogg" => Self::Video,
            "mp3" | "wav" => Self::Audio,
            "png" | "jpg" | "jpeg" | "gif" => Self::Image,
            _ => Self::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireAttachment")]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
}

#[derive(Deserialize)]
struct WireAttachment {
    #[serde(default, deserialize_with = "nullable")]
    url: String,
    #[serde(default)]
    kind: Option<AttachmentKind>,
}

impl From<WireAttachment> for Attachment {
    fn from(w: WireAttachment) -> Self {
        let kind = w.kind.unwrap_or_else(|| AttachmentKind::from_url(&w.url));
        Self { url: w.url, kind }
    }
}

/// One entry of a server-computed reaction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    #[serde(default)]
    pub count: u32,
}

/// Collapse duplicate emoji, keeping the last occurrence's count in the
/// position the emoji first appeared.
pub fn normalize_reactions(reactions: Vec<Reaction>) -> Vec<Reaction> {
    let mut out: Vec<Reaction> = Vec::with_capacity(reactions.len());
    for reaction in reactions {
        match out.iter_mut().find(|r| r.emoji == reaction.emoji) {
            Some(existing) => *existing = reaction,
            None => out.push(reaction),
        }
    }
    out
}

/// A user reference as the server sends it: either a bare id or a populated
/// user document.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum UserRef {
    Id(String),
    Populated {
        #[serde(rename = "_id", alias = "id")]
        id: String,
    },
}

impl UserRef {
    pub(crate) fn into_id(self) -> UserId {
        match self {
            UserRef::Id(id) | UserRef::Populated { id } => id,
        }
    }
}

fn user_set(refs: Vec<UserRef>) -> BTreeSet<UserId> {
    refs.into_iter()
        .map(UserRef::into_id)
        .filter(|id| !id.is_empty())
        .collect()
}

/// A chat message as held in the reconciled view.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Present once the message has been edited.
    pub updated_at: Option<DateTime<Utc>>,
    pub reactions: Vec<Reaction>,
    pub delivered_to: BTreeSet<UserId>,
    pub seen_by: BTreeSet<UserId>,
}

impl Message {
    /// A plain text message with no receipts, reactions or attachments.
    pub fn text(
        id: impl Into<MessageId>,
        sender_id: impl Into<UserId>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            content: Some(content.into()),
            attachments: Vec::new(),
            created_at,
            updated_at: None,
            reactions: Vec::new(),
            delivered_to: BTreeSet::new(),
            seen_by: BTreeSet::new(),
        }
    }

    pub fn is_edited(&self) -> bool {
        self.updated_at.is_some_and(|u| u != self.created_at)
    }
}

/// The server's message document. Every collection tolerates `null` or absence.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "_id", alias = "id", default)]
    id: Option<String>,
    #[serde(default)]
    sender: Option<UserRef>,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    attachments: Vec<Attachment>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    reactions: Vec<Reaction>,
    #[serde(default, deserialize_with = "nullable")]
    delivered_to: Vec<UserRef>,
    #[serde(default, deserialize_with = "nullable")]
    seen_by: Vec<UserRef>,
}

impl TryFrom<WireMessage> for Message {
    type Error = String;

    fn try_from(w: WireMessage) -> Result<Self, Self::Error> {
        let id = w
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "message without an id".to_string())?;

        let sender_id = w
            .sender
            .map(UserRef::into_id)
            .or(w.sender_id)
            .unwrap_or_default();

        Ok(Self {
            id,
            sender_id,
            content: w.content,
            attachments: w.attachments,
            created_at: w.created_at.unwrap_or(DateTime::UNIX_EPOCH),
            updated_at: w.updated_at,
            reactions: normalize_reactions(w.reactions),
            delivered_to: user_set(w.delivered_to),
            seen_by: user_set(w.seen_by),
        })
    }
}

/// Sender name shown on server notices.
pub const NOTICE_SENDER: &str = "Admin";

/// A server notice shown inline with the chat. Notices have no server id, so
/// they live beside the reconciled view and never trigger receipts or
/// suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub sender: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl Notice {
    pub fn from_server(content: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            sender: NOTICE_SENDER.to_string(),
            content: content.into(),
            received_at,
        }
    }
}

/// Decode a message list, dropping entries that cannot be reconciled instead of
/// failing the whole list.
pub(crate) fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Message>(value) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Skipping malformed message: {e}");
                None
            }
        })
        .collect())
}

/// Decode an optional message, treating one that cannot be reconciled as absent.
pub(crate) fn lenient_message<'de, D>(deserializer: D) -> Result<Option<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value::<Message>(value) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Ignoring malformed message: {e}");
            None
        }
    }))
}

/// One page of history, oldest message first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Chat metadata needed by the session: who to address and how many members
/// must see a message before it counts as seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "WireChat")]
pub struct ChatDetails {
    pub chat_id: ChatId,
    pub name: Option<String>,
    pub group_chat: bool,
    pub members: Vec<UserId>,
}

impl ChatDetails {
    /// Member count including the local user, if the server reported any members.
    pub fn member_count(&self) -> Option<usize> {
        (!self.members.is_empty()).then_some(self.members.len())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChat {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "nullable")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    group_chat: bool,
    #[serde(default, deserialize_with = "nullable")]
    members: Vec<UserRef>,
}

impl From<WireChat> for ChatDetails {
    fn from(w: WireChat) -> Self {
        Self {
            chat_id: w.id,
            name: w.name,
            group_chat: w.group_chat,
            members: w
                .members
                .into_iter()
                .map(UserRef::into_id)
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }
}

// ── DTOs ──

/// Body of `PUT /message/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

/// Response of `PUT /message/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMessageResponse {
    /// Anything but `true` means the change was not applied.
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "lenient_message")]
    pub message: Option<Message>,
}

/// Response of `DELETE /message/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteMessageResponse {
    /// Anything but `true` means the change was not applied.
    #[serde(default)]
    pub success: Option<bool>,
}

/// Body of `PUT /reaction`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub message_id: MessageId,
    pub emoji: String,
}

/// Response of the reaction endpoints. `reactions` is absent on older servers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactionResponse {
    #[serde(default)]
    pub reactions: Option<Vec<Reaction>>,
}
