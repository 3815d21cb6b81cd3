use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::models::{ChatId, Message, MessageId, Reaction, UserId, nullable};

// Every frame is `{"event": "<name>", "data": {...}}` and every payload
// carries the chat it belongs to.

// ── Client -> Server events ──

/// Events this client emits over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// The user opened a chat.
    #[serde(rename = "chat.joined")]
    ChatJoined {
        user_id: UserId,
        chat_id: ChatId,
        members: Vec<UserId>,
    },
    /// The user left a chat.
    #[serde(rename = "chat.leaved")]
    ChatLeaved {
        user_id: UserId,
        chat_id: ChatId,
        members: Vec<UserId>,
    },
    /// Send a text message. The server echoes it back as `message.new`.
    #[serde(rename = "message.new")]
    NewMessage {
        chat_id: ChatId,
        members: Vec<UserId>,
        message: String,
    },
    #[serde(rename = "typing.start")]
    TypingStart {
        chat_id: ChatId,
        members: Vec<UserId>,
    },
    #[serde(rename = "typing.stop")]
    TypingStop {
        chat_id: ChatId,
        members: Vec<UserId>,
    },
}

impl ClientEvent {
    pub fn chat_id(&self) -> &str {
        match self {
            ClientEvent::ChatJoined { chat_id, .. }
            | ClientEvent::ChatLeaved { chat_id, .. }
            | ClientEvent::NewMessage { chat_id, .. }
            | ClientEvent::TypingStart { chat_id, .. }
            | ClientEvent::TypingStop { chat_id, .. } => chat_id,
        }
    }

    pub fn encode(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Server -> Client events ──

/// Events the server pushes to this client.
///
/// Optional fields are ones older servers omit; handlers treat a missing id as
/// an event that references nothing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A new message, including the echo of our own sends.
    #[serde(rename = "message.new")]
    NewMessage {
        #[serde(default)]
        chat_id: ChatId,
        message: Message,
    },
    /// Another member started typing.
    #[serde(rename = "typing.start")]
    TypingStart {
        #[serde(default)]
        chat_id: ChatId,
    },
    /// Another member stopped typing.
    #[serde(rename = "typing.stop")]
    TypingStop {
        #[serde(default)]
        chat_id: ChatId,
    },
    #[serde(rename = "message.deleted")]
    MessageDeleted {
        #[serde(default)]
        chat_id: ChatId,
        #[serde(default)]
        message_id: Option<MessageId>,
    },
    #[serde(rename = "message.updated")]
    MessageUpdated {
        #[serde(default)]
        chat_id: ChatId,
        message: Message,
    },
    /// Full reaction summary for a message. Servers that omit `reactions`
    /// expect the client to refetch.
    #[serde(rename = "message.reaction.updated")]
    ReactionUpdated {
        #[serde(default)]
        chat_id: ChatId,
        #[serde(default)]
        message_id: Option<MessageId>,
        #[serde(default)]
        reactions: Option<Vec<Reaction>>,
    },
    #[serde(rename = "message.delivered")]
    Delivered {
        #[serde(default)]
        chat_id: ChatId,
        #[serde(default)]
        message_id: Option<MessageId>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    #[serde(rename = "message.seen")]
    Seen {
        #[serde(default)]
        chat_id: ChatId,
        #[serde(default)]
        message_id: Option<MessageId>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    /// A system notice for the chat, such as a member joining.
    #[serde(rename = "ALERT")]
    Alert {
        #[serde(default)]
        chat_id: ChatId,
        #[serde(default, deserialize_with = "nullable")]
        message: String,
    },
}

impl ServerEvent {
    /// Event names this client understands. Anything else on the wire is ignored.
    pub const NAMES: [&'static str; 9] = [
        "message.new",
        "typing.start",
        "typing.stop",
        "message.deleted",
        "message.updated",
        "message.reaction.updated",
        "message.delivered",
        "message.seen",
        "ALERT",
    ];

    pub fn chat_id(&self) -> &str {
        match self {
            ServerEvent::NewMessage { chat_id, .. }
            | ServerEvent::TypingStart { chat_id }
            | ServerEvent::TypingStop { chat_id }
            | ServerEvent::MessageDeleted { chat_id, .. }
            | ServerEvent::MessageUpdated { chat_id, .. }
            | ServerEvent::ReactionUpdated { chat_id, .. }
            | ServerEvent::Delivered { chat_id, .. }
            | ServerEvent::Seen { chat_id, .. }
            | ServerEvent::Alert { chat_id, .. } => chat_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "message.new",
            ServerEvent::TypingStart { .. } => "typing.start",
            ServerEvent::TypingStop { .. } => "typing.stop",
            ServerEvent::MessageDeleted { .. } => "message.deleted",
            ServerEvent::MessageUpdated { .. } => "message.updated",
            ServerEvent::ReactionUpdated { .. } => "message.reaction.updated",
            ServerEvent::Delivered { .. } => "message.delivered",
            ServerEvent::Seen { .. } => "message.seen",
            ServerEvent::Alert { .. } => "ALERT",
        }
    }

    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames carrying an event this client
    /// does not handle, and an error for frames that cannot be decoded.
    pub fn decode(text: &str) -> Result<Option<ServerEvent>, ChatError> {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        if !Self::NAMES.contains(&envelope.event.as_str()) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(text)?))
    }
}
