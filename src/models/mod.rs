pub mod ai;
pub mod messages;

pub use messages::{
    Attachment, AttachmentKind, ChatDetails, Message, MessagePage, Notice, Reaction,
    normalize_reactions,
};

use serde::{Deserialize, Deserializer};

/// Server-assigned chat identifier.
pub type ChatId = String;
/// Server-assigned user identifier.
pub type UserId = String;
/// Server-assigned message identifier.
pub type MessageId = String;

/// Backward pagination state for the active chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCursor {
    /// Highest page requested so far. Pages count backwards from the newest.
    pub current_page: u32,
    /// Known once the first page has loaded.
    pub total_pages: Option<u32>,
}

impl Default for SessionCursor {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: None,
        }
    }
}

impl SessionCursor {
    /// Whether an older page exists beyond `current_page`.
    pub fn has_more(&self) -> bool {
        matches!(self.total_pages, Some(total) if self.current_page < total)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
