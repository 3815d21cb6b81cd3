use serde::Serialize;

use crate::models::Message;

/// Delivery indicator rendered next to an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tick {
    /// Not an outgoing message; nothing is rendered.
    None,
    Sent,
    Delivered,
    Seen,
}

/// Derive the tick state of a message from its receipt sets.
///
/// `member_count` is the chat's member count as reported by chat details,
/// which includes the local user; a message counts as seen once every other
/// member has seen it (at least one). With no member count, any seen receipt
/// is enough. `seen_by` is not assumed to be a subset of `delivered_to`.
pub fn derive_tick(message: &Message, is_own: bool, member_count: Option<usize>) -> Tick {
    if !is_own {
        return Tick::None;
    }

    let seen_count = message.seen_by.len();
    let delivered_count = message.delivered_to.len();

    let is_fully_seen = match member_count {
        Some(count) => seen_count >= count.saturating_sub(1).max(1),
        None => seen_count > 0,
    };

    if is_fully_seen {
        Tick::Seen
    } else if delivered_count > 0 {
        Tick::Delivered
    } else {
        Tick::Sent
    }
}
