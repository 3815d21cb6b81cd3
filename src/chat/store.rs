use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{Message, MessageId, Reaction, UserId, normalize_reactions};

/// Result of applying a mutation to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The view changed and observers were notified.
    Changed,
    /// The target exists but already had this state.
    Unchanged,
    /// The target is not in the local view. Not an error: the event may have
    /// raced a page load or referenced a message that was paged out.
    NotFoundLocally,
}

/// Identity of the last message in the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tail {
    pub id: MessageId,
    /// `None` when the server did not say who sent it.
    pub sender_id: Option<UserId>,
}

/// Notification published after every change to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChange {
    /// Monotonic per store, survives `reset`.
    pub revision: u64,
    pub tail: Option<Tail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Historical,
    Live,
}

/// Reconciled message view for one chat.
///
/// Holds the historical buffer (pages loaded backwards, oldest first) and the
/// live buffer (messages received after joining, in arrival order). Each id
/// appears exactly once across both; the bucket an id was first seen in fixes
/// its position.
#[derive(Debug, Default)]
pub struct MessageStore {
    historical: Vec<Message>,
    live: Vec<Message>,
    index: HashMap<MessageId, Bucket>,
    revision: u64,
    observers: Vec<mpsc::UnboundedSender<ViewChange>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ViewChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Prepend an older page.
    ///
    /// Ids already in the view keep their position and take the page's copy;
    /// the rest are prepended in page order. Returns how many were prepended.
    pub fn load_historical_page(&mut self, messages: Vec<Message>) -> usize {
        let mut fresh: Vec<Message> = Vec::new();
        let mut changed = false;

        for message in messages {
            if let Some(slot) = fresh.iter_mut().find(|m| m.id == message.id) {
                *slot = message;
                continue;
            }

            match self.index.get(&message.id).copied() {
                Some(bucket) => {
                    if let Some(slot) = self.slot_mut(bucket, &message.id) {
                        if *slot != message {
                            *slot = message;
                            changed = true;
                        }
                    }
                }
                None => {
                    self.index.insert(message.id.clone(), Bucket::Historical);
                    fresh.push(message);
                }
            }
        }

        let prepended = fresh.len();
        if prepended > 0 {
            self.historical.splice(0..0, fresh);
            changed = true;
        }
        if changed {
            self.notify();
        }
        prepended
    }

    /// Append a message received in real time. Replays of a known id are ignored.
    pub fn append_live(&mut self, message: Message) -> Applied {
        if self.index.contains_key(&message.id) {
            debug!(message_id = %message.id, "Ignoring replayed message");
            return Applied::Unchanged;
        }
        self.index.insert(message.id.clone(), Bucket::Live);
        self.live.push(message);
        self.notify();
        Applied::Changed
    }

    pub fn apply_edit(
        &mut self,
        id: &str,
        content: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Applied {
        self.modify(id, |m| {
            if m.content == content && m.updated_at == updated_at {
                return false;
            }
            m.content = content;
            m.updated_at = updated_at;
            true
        })
    }

    /// Remove a message from whichever buffer holds it.
    pub fn apply_delete(&mut self, id: &str) -> Applied {
        let Some(bucket) = self.index.remove(id) else {
            debug!(message_id = %id, "Delete for unknown message");
            return Applied::NotFoundLocally;
        };
        self.bucket_mut(bucket).retain(|m| m.id != id);
        self.notify();
        Applied::Changed
    }

    /// Replace the reaction summary wholesale. Counts are never adjusted locally.
    pub fn apply_reaction_summary(&mut self, id: &str, reactions: Vec<Reaction>) -> Applied {
        let reactions = normalize_reactions(reactions);
        self.modify(id, |m| {
            if m.reactions == reactions {
                return false;
            }
            m.reactions = reactions;
            true
        })
    }

    pub fn apply_delivered(&mut self, id: &str, user_id: &str) -> Applied {
        self.modify(id, |m| m.delivered_to.insert(user_id.to_string()))
    }

    /// Seen implies delivered.
    pub fn apply_seen(&mut self, id: &str, user_id: &str) -> Applied {
        self.modify(id, |m| {
            let delivered = m.delivered_to.insert(user_id.to_string());
            let seen = m.seen_by.insert(user_id.to_string());
            delivered || seen
        })
    }

    /// Historical buffer followed by the live buffer.
    pub fn snapshot(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.historical.iter().chain(self.live.iter())
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        let bucket = self.index.get(id)?;
        match bucket {
            Bucket::Historical => self.historical.iter().find(|m| m.id == id),
            Bucket::Live => self.live.iter().find(|m| m.id == id),
        }
    }

    pub fn last(&self) -> Option<&Message> {
        self.live.last().or_else(|| self.historical.last())
    }

    pub fn tail(&self) -> Option<Tail> {
        self.last().map(|m| Tail {
            id: m.id.clone(),
            sender_id: (!m.sender_id.is_empty()).then(|| m.sender_id.clone()),
        })
    }

    pub fn len(&self) -> usize {
        self.historical.len() + self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drop both buffers. Subscriptions stay registered.
    pub fn reset(&mut self) {
        let was_empty = self.is_empty();
        self.historical.clear();
        self.live.clear();
        self.index.clear();
        if !was_empty {
            self.notify();
        }
    }

    fn modify(&mut self, id: &str, apply: impl FnOnce(&mut Message) -> bool) -> Applied {
        let Some(bucket) = self.index.get(id).copied() else {
            debug!(message_id = %id, "Mutation for unknown message");
            return Applied::NotFoundLocally;
        };
        let Some(message) = self.slot_mut(bucket, id) else {
            return Applied::NotFoundLocally;
        };
        if apply(message) {
            self.notify();
            Applied::Changed
        } else {
            Applied::Unchanged
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Message> {
        match bucket {
            Bucket::Historical => &mut self.historical,
            Bucket::Live => &mut self.live,
        }
    }

    fn slot_mut(&mut self, bucket: Bucket, id: &str) -> Option<&mut Message> {
        self.bucket_mut(bucket).iter_mut().find(|m| m.id == id)
    }

    fn notify(&mut self) {
        self.revision += 1;
        let change = ViewChange {
            revision: self.revision,
            tail: self.tail(),
        };
        // A failed send means the receiver was dropped.
        self.observers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
