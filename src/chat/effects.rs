use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chat::store::{MessageStore, Tail, ViewChange};
use crate::chat::timer::DebounceTimer;
use crate::error::ChatError;
use crate::models::{MessageId, UserId};

/// Smart-reply suggestions for the current chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmartReplyState {
    pub suggestions: Vec<String>,
    /// Message that produced (or is producing) the current suggestions.
    pub last_trigger_message_id: Option<MessageId>,
    /// A generation request is outstanding.
    pub loading: bool,
}

/// Remote work the coordinator wants done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Mark the message delivered, then seen.
    MarkReceipts { message_id: MessageId },
    /// Generate smart replies for the chat, triggered by `trigger_id`.
    FetchSmartReplies { trigger_id: MessageId },
}

/// Decides which automatic remote calls a view change warrants.
///
/// Only the last message of the view is ever inspected, so the cost per change
/// does not grow with history length.
#[derive(Debug)]
pub struct SideEffectCoordinator {
    local_user: UserId,
    debounce_delay: Duration,
    changes: mpsc::UnboundedReceiver<ViewChange>,
    smart_replies: SmartReplyState,
    debounce: DebounceTimer<MessageId>,
}

impl SideEffectCoordinator {
    /// Create a coordinator subscribed to `store`.
    pub fn new(local_user: UserId, debounce_delay: Duration, store: &mut MessageStore) -> Self {
        Self {
            local_user,
            debounce_delay,
            changes: store.subscribe(),
            smart_replies: SmartReplyState::default(),
            debounce: DebounceTimer::new(),
        }
    }

    /// React to every view change published since the last call, in order.
    pub fn process_changes(&mut self, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            self.on_change(change.tail.as_ref(), now, &mut effects);
        }
        effects
    }

    fn on_change(&mut self, tail: Option<&Tail>, now: Instant, effects: &mut Vec<Effect>) {
        let Some(tail) = tail else {
            self.debounce.cancel_pending();
            return;
        };

        if tail.sender_id.as_deref() == Some(self.local_user.as_str()) {
            // Suggestions only answer the other side; our own message ends them.
            self.debounce.cancel_pending();
            self.smart_replies.suggestions.clear();
            self.smart_replies.loading = false;
            self.smart_replies.last_trigger_message_id = Some(tail.id.clone());
            return;
        }

        // Receipts need a known sender.
        if tail.sender_id.is_some() {
            effects.push(Effect::MarkReceipts {
                message_id: tail.id.clone(),
            });
        }

        if self.smart_replies.last_trigger_message_id.as_deref() == Some(tail.id.as_str()) {
            self.debounce.cancel_pending();
        } else {
            self.debounce.schedule(now, self.debounce_delay, tail.id.clone());
        }
    }

    /// Fire the smart-reply debounce if it is due.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<Effect> {
        let Some(trigger_id) = self.debounce.poll(now) else {
            return Vec::new();
        };
        // Recorded before the call so a failure is never retried for this trigger.
        self.smart_replies.last_trigger_message_id = Some(trigger_id.clone());
        self.smart_replies.loading = true;
        vec![Effect::FetchSmartReplies { trigger_id }]
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Install the result of a generation call.
    ///
    /// Returns `false` when the result belongs to a superseded trigger and was
    /// discarded.
    pub fn apply_suggestions(
        &mut self,
        trigger_id: &str,
        result: Result<Vec<String>, ChatError>,
    ) -> bool {
        if self.smart_replies.last_trigger_message_id.as_deref() != Some(trigger_id) {
            debug!(trigger_id, "Discarding smart replies for superseded trigger");
            return false;
        }
        self.smart_replies.loading = false;
        match result {
            Ok(suggestions) => self.smart_replies.suggestions = suggestions,
            Err(e) => {
                warn!(trigger_id, "Smart replies failed: {e}");
                self.smart_replies.suggestions.clear();
            }
        }
        true
    }

    pub fn clear_suggestions(&mut self) {
        self.smart_replies.suggestions.clear();
    }

    /// Take one suggestion for the input box, clearing the rest.
    pub fn take_suggestion(&mut self, index: usize) -> Option<String> {
        let picked = self.smart_replies.suggestions.get(index).cloned();
        self.clear_suggestions();
        picked
    }

    pub fn smart_replies(&self) -> &SmartReplyState {
        &self.smart_replies
    }

    /// Forget everything about the previous chat, including queued changes.
    pub fn reset(&mut self) {
        while self.changes.try_recv().is_ok() {}
        self.debounce.cancel_pending();
        self.smart_replies = SmartReplyState::default();
    }
}
