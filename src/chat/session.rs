use chrono::Utc;
use std::fmt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chat::effects::{Effect, SideEffectCoordinator, SmartReplyState};
use crate::chat::protocol::{ClientEvent, ServerEvent};
use crate::chat::receipts::{Tick, derive_tick};
use crate::chat::store::{MessageStore, ViewChange};
use crate::chat::timer::DebounceTimer;
use crate::config::SessionConfig;
use crate::error::ChatError;
use crate::models::{
    ChatDetails, ChatId, Message, MessageId, MessagePage, Notice, Reaction, SessionCursor, UserId,
};
use tokio::sync::mpsc;

/// Lifecycle of the session's chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Join emitted, first page not loaded yet. Live events are already applied.
    Joining,
    Active,
    Leaving,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypingState {
    /// This client has emitted typing.start and not yet typing.stop.
    pub local_is_typing: bool,
    /// Another member is typing, per received start/stop events.
    pub remote_is_typing: bool,
}

/// Remote operations whose failure is reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LoadChatDetails,
    LoadHistory,
    SmartReplies,
    EditMessage,
    DeleteMessage,
    React,
    RemoveReaction,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::LoadChatDetails => "load chat details",
            Operation::LoadHistory => "load messages",
            Operation::SmartReplies => "get smart replies",
            Operation::EditMessage => "update message",
            Operation::DeleteMessage => "delete message",
            Operation::React => "react",
            Operation::RemoveReaction => "remove reaction",
        };
        f.write_str(name)
    }
}

/// A remote call that failed. State was left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub chat_id: ChatId,
    pub operation: Operation,
    pub error: ChatError,
}

/// Work the controller asks its driver to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Send an event over the realtime channel.
    Emit(ClientEvent),
    FetchChatDetails { chat_id: ChatId },
    FetchPage { chat_id: ChatId, page: u32 },
    /// Mark delivered, then seen.
    MarkReceipts { chat_id: ChatId, message_id: MessageId },
    FetchSmartReplies { chat_id: ChatId, trigger_id: MessageId },
    UpdateMessage { chat_id: ChatId, message_id: MessageId, content: String },
    DeleteMessage { chat_id: ChatId, message_id: MessageId },
    UpsertReaction { chat_id: ChatId, message_id: MessageId, emoji: String },
    RemoveReaction { chat_id: ChatId, message_id: MessageId },
    /// Surface a failure to the user.
    Report(Failure),
}

/// Completion of a [`SessionCommand`], fed back to the controller. Every
/// outcome names the chat it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    ChatDetails {
        chat_id: ChatId,
        result: Result<ChatDetails, ChatError>,
    },
    Page {
        chat_id: ChatId,
        page: u32,
        result: Result<MessagePage, ChatError>,
    },
    SmartReplies {
        chat_id: ChatId,
        trigger_id: MessageId,
        result: Result<Vec<String>, ChatError>,
    },
    /// Upsert or removal of a reaction. `None` when the server sent no summary.
    Reactions {
        chat_id: ChatId,
        message_id: MessageId,
        removal: bool,
        result: Result<Option<Vec<Reaction>>, ChatError>,
    },
    Updated {
        chat_id: ChatId,
        message_id: MessageId,
        result: Result<Option<Message>, ChatError>,
    },
    Deleted {
        chat_id: ChatId,
        message_id: MessageId,
        result: Result<(), ChatError>,
    },
    Receipts {
        chat_id: ChatId,
        message_id: MessageId,
        result: Result<(), ChatError>,
    },
}

impl RemoteOutcome {
    pub fn chat_id(&self) -> &str {
        match self {
            RemoteOutcome::ChatDetails { chat_id, .. }
            | RemoteOutcome::Page { chat_id, .. }
            | RemoteOutcome::SmartReplies { chat_id, .. }
            | RemoteOutcome::Reactions { chat_id, .. }
            | RemoteOutcome::Updated { chat_id, .. }
            | RemoteOutcome::Deleted { chat_id, .. }
            | RemoteOutcome::Receipts { chat_id, .. } => chat_id,
        }
    }
}

/// Per-chat session state machine.
///
/// Performs no I/O. Every entry point takes the current instant and returns
/// the commands the caller must execute; results come back through
/// [`ChatSessionController::handle_outcome`]. Anything tagged with a chat other
/// than the active one is dropped, which keeps late responses from a previous
/// chat out of the current view.
#[derive(Debug)]
pub struct ChatSessionController {
    local_user: UserId,
    config: SessionConfig,
    phase: SessionPhase,
    chat_id: Option<ChatId>,
    details: Option<ChatDetails>,
    store: MessageStore,
    cursor: SessionCursor,
    typing: TypingState,
    effects: SideEffectCoordinator,
    typing_timer: DebounceTimer<()>,
    page_in_flight: Option<u32>,
    notices: Vec<Notice>,
}

impl ChatSessionController {
    pub fn new(local_user: impl Into<UserId>, config: SessionConfig) -> Self {
        let local_user = local_user.into();
        let mut store = MessageStore::new();
        let effects =
            SideEffectCoordinator::new(local_user.clone(), config.smart_reply_debounce, &mut store);

        Self {
            local_user,
            config,
            phase: SessionPhase::Idle,
            chat_id: None,
            details: None,
            store,
            cursor: SessionCursor::default(),
            typing: TypingState::default(),
            effects,
            typing_timer: DebounceTimer::new(),
            page_in_flight: None,
            notices: Vec::new(),
        }
    }

    // ── Lifecycle ──

    /// Open `chat_id`, leaving the current chat first if there is one.
    pub fn activate(&mut self, chat_id: impl Into<ChatId>, now: Instant) -> Vec<SessionCommand> {
        let chat_id = chat_id.into();
        let mut commands = Vec::new();

        if self.chat_id.is_some() {
            commands.extend(self.deactivate(now));
        }
        self.reset_state();

        info!(chat_id = %chat_id, "Joining chat");
        self.phase = SessionPhase::Joining;
        self.chat_id = Some(chat_id.clone());
        self.page_in_flight = Some(1);

        commands.push(SessionCommand::Emit(ClientEvent::ChatJoined {
            user_id: self.local_user.clone(),
            chat_id: chat_id.clone(),
            members: Vec::new(),
        }));
        commands.push(SessionCommand::FetchChatDetails {
            chat_id: chat_id.clone(),
        });
        commands.push(SessionCommand::FetchPage { chat_id, page: 1 });
        commands
    }

    /// Leave the current chat and drop all of its state.
    ///
    /// Always resets, even when no chat is active or its details never loaded.
    pub fn deactivate(&mut self, _now: Instant) -> Vec<SessionCommand> {
        let mut commands = Vec::new();

        if let Some(chat_id) = self.chat_id.clone() {
            self.phase = SessionPhase::Leaving;
            let members = self.members();

            if self.typing.local_is_typing {
                commands.push(SessionCommand::Emit(ClientEvent::TypingStop {
                    chat_id: chat_id.clone(),
                    members: members.clone(),
                }));
            }
            commands.push(SessionCommand::Emit(ClientEvent::ChatLeaved {
                user_id: self.local_user.clone(),
                chat_id: chat_id.clone(),
                members,
            }));
            info!(chat_id = %chat_id, "Left chat");
        }

        self.chat_id = None;
        self.reset_state();
        self.phase = SessionPhase::Idle;
        commands
    }

    fn reset_state(&mut self) {
        // Store first: its reset publishes a change the coordinator must not see.
        self.store.reset();
        self.effects.reset();
        self.cursor.reset();
        self.typing = TypingState::default();
        self.typing_timer.cancel_pending();
        self.page_in_flight = None;
        self.details = None;
        self.notices.clear();
    }

    fn guard(&self, chat_id: &str) -> Result<&ChatId, ChatError> {
        match (&self.chat_id, self.phase) {
            (Some(active), SessionPhase::Joining | SessionPhase::Active) if active == chat_id => {
                Ok(active)
            }
            _ => Err(ChatError::StaleEvent {
                chat_id: chat_id.to_string(),
            }),
        }
    }

    // ── Inbound events ──

    /// Apply a realtime event.
    pub fn handle_event(&mut self, event: ServerEvent, now: Instant) -> Vec<SessionCommand> {
        let chat_id = match self.guard(event.chat_id()) {
            Ok(chat_id) => chat_id.clone(),
            Err(e) => {
                debug!(event = event.name(), "Dropping event: {e}");
                return Vec::new();
            }
        };

        let mut commands = Vec::new();
        match event {
            ServerEvent::NewMessage { message, .. } => {
                self.store.append_live(message);
            }
            ServerEvent::TypingStart { .. } => self.typing.remote_is_typing = true,
            ServerEvent::TypingStop { .. } => self.typing.remote_is_typing = false,
            ServerEvent::MessageDeleted {
                message_id: Some(id),
                ..
            } => {
                self.store.apply_delete(&id);
            }
            ServerEvent::MessageUpdated { message, .. } => {
                self.store
                    .apply_edit(&message.id, message.content, message.updated_at);
            }
            ServerEvent::ReactionUpdated {
                message_id: Some(id),
                reactions: Some(reactions),
                ..
            } => {
                self.store.apply_reaction_summary(&id, reactions);
            }
            ServerEvent::ReactionUpdated {
                message_id: Some(_),
                reactions: None,
                ..
            } => {
                // No summary in the payload: refetch and let the page merge fold it in.
                debug!(chat_id = %chat_id, "Reaction update without summary, refetching");
                commands.extend(self.retry_history());
            }
            ServerEvent::Delivered {
                message_id: Some(id),
                user_id: Some(user),
                ..
            } => {
                self.store.apply_delivered(&id, &user);
            }
            ServerEvent::Seen {
                message_id: Some(id),
                user_id: Some(user),
                ..
            } => {
                self.store.apply_seen(&id, &user);
            }
            ServerEvent::Alert { message, .. } => {
                self.notices.push(Notice::from_server(message, Utc::now()));
            }
            ServerEvent::MessageDeleted { .. }
            | ServerEvent::ReactionUpdated { .. }
            | ServerEvent::Delivered { .. }
            | ServerEvent::Seen { .. } => {
                debug!(chat_id = %chat_id, "Ignoring event without a message or user id");
            }
        }

        self.collect_effects(now, &mut commands);
        commands
    }

    /// Apply the result of a remote call issued earlier.
    pub fn handle_outcome(&mut self, outcome: RemoteOutcome, now: Instant) -> Vec<SessionCommand> {
        let chat_id = match self.guard(outcome.chat_id()) {
            Ok(chat_id) => chat_id.clone(),
            Err(e) => {
                debug!("Dropping remote outcome: {e}");
                return Vec::new();
            }
        };

        let mut commands = Vec::new();
        let mut fail = |operation: Operation, error: ChatError| {
            warn!(chat_id = %chat_id, "Failed to {operation}: {error}");
            commands.push(SessionCommand::Report(Failure {
                chat_id: chat_id.clone(),
                operation,
                error,
            }));
        };

        match outcome {
            RemoteOutcome::ChatDetails { result, .. } => match result {
                Ok(details) => self.details = Some(details),
                Err(e) => fail(Operation::LoadChatDetails, e),
            },
            RemoteOutcome::Page { page, result, .. } => {
                if self.page_in_flight == Some(page) {
                    self.page_in_flight = None;
                }
                match result {
                    Ok(loaded) => {
                        if loaded.total_pages.is_some() {
                            self.cursor.total_pages = loaded.total_pages;
                        }
                        let prepended = self.store.load_historical_page(loaded.messages);
                        debug!(page, prepended, "Loaded history page");
                    }
                    Err(e) => {
                        // Roll back so reaching the top again re-requests this page.
                        if page > 1 && page == self.cursor.current_page {
                            self.cursor.current_page -= 1;
                        }
                        fail(Operation::LoadHistory, e);
                    }
                }
                if self.phase == SessionPhase::Joining {
                    self.phase = SessionPhase::Active;
                }
            }
            RemoteOutcome::SmartReplies {
                trigger_id, result, ..
            } => {
                let failed = result.as_ref().err().cloned();
                if self.effects.apply_suggestions(&trigger_id, result) {
                    if let Some(e) = failed {
                        fail(Operation::SmartReplies, e);
                    }
                }
            }
            RemoteOutcome::Reactions {
                message_id,
                removal,
                result,
                ..
            } => match result {
                Ok(Some(reactions)) => {
                    self.store.apply_reaction_summary(&message_id, reactions);
                }
                Ok(None) => {}
                Err(e) if removal => fail(Operation::RemoveReaction, e),
                Err(e) => fail(Operation::React, e),
            },
            RemoteOutcome::Updated {
                message_id, result, ..
            } => match result {
                Ok(Some(message)) => {
                    self.store
                        .apply_edit(&message_id, message.content, message.updated_at);
                }
                Ok(None) => {}
                Err(e) => fail(Operation::EditMessage, e),
            },
            RemoteOutcome::Deleted {
                message_id, result, ..
            } => match result {
                Ok(()) => {
                    self.store.apply_delete(&message_id);
                }
                Err(e) => fail(Operation::DeleteMessage, e),
            },
            RemoteOutcome::Receipts {
                message_id, result, ..
            } => {
                if let Err(e) = result {
                    warn!(message_id = %message_id, "Failed to mark receipts: {e}");
                }
            }
        }

        self.collect_effects(now, &mut commands);
        commands
    }

    // ── Local input ──

    /// Note a keystroke in the input box.
    ///
    /// Emits typing.start on the first keystroke and re-arms the idle timer on
    /// every keystroke.
    pub fn on_local_input(&mut self, now: Instant) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };

        let mut commands = Vec::new();
        if !self.typing.local_is_typing {
            self.typing.local_is_typing = true;
            commands.push(SessionCommand::Emit(ClientEvent::TypingStart {
                chat_id,
                members: self.members(),
            }));
        }
        self.typing_timer.schedule(now, self.config.typing_idle, ());
        commands
    }

    /// Send a message. Blank input is ignored.
    pub fn submit_message(&mut self, text: &str) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.effects.clear_suggestions();
        vec![SessionCommand::Emit(ClientEvent::NewMessage {
            chat_id,
            members: self.members(),
            message: text.to_string(),
        })]
    }

    /// Pick a suggestion for the input box. All suggestions are cleared.
    pub fn select_suggestion(&mut self, index: usize) -> Option<String> {
        self.effects.take_suggestion(index)
    }

    pub fn dismiss_suggestions(&mut self) {
        self.effects.clear_suggestions();
    }

    /// React to someone else's message.
    pub fn react(&mut self, message_id: &str, emoji: &str) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        match self.store.get(message_id) {
            Some(message) if message.sender_id != self.local_user => {
                vec![SessionCommand::UpsertReaction {
                    chat_id,
                    message_id: message_id.to_string(),
                    emoji: emoji.to_string(),
                }]
            }
            Some(_) => {
                debug!(message_id, "Refusing to react to own message");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    pub fn remove_reaction(&mut self, message_id: &str) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if self.store.get(message_id).is_none() {
            return Vec::new();
        }
        vec![SessionCommand::RemoveReaction {
            chat_id,
            message_id: message_id.to_string(),
        }]
    }

    /// Edit one of our own messages.
    pub fn request_edit(&mut self, message_id: &str, content: &str) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if content.trim().is_empty() || !self.is_own(message_id) {
            return Vec::new();
        }
        vec![SessionCommand::UpdateMessage {
            chat_id,
            message_id: message_id.to_string(),
            content: content.to_string(),
        }]
    }

    /// Delete one of our own messages.
    pub fn request_delete(&mut self, message_id: &str) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if !self.is_own(message_id) {
            return Vec::new();
        }
        vec![SessionCommand::DeleteMessage {
            chat_id,
            message_id: message_id.to_string(),
        }]
    }

    // ── Pagination ──

    /// The scroll-top sentinel became visible: request the next older page.
    pub fn reached_top(&mut self) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if self.page_in_flight.is_some() || !self.cursor.has_more() {
            return Vec::new();
        }

        self.cursor.current_page += 1;
        let page = self.cursor.current_page;
        self.page_in_flight = Some(page);
        vec![SessionCommand::FetchPage { chat_id, page }]
    }

    /// Re-request the current page, e.g. after a failed load.
    pub fn retry_history(&mut self) -> Vec<SessionCommand> {
        let Some(chat_id) = self.active_chat() else {
            return Vec::new();
        };
        if self.page_in_flight.is_some() {
            return Vec::new();
        }

        let page = self.cursor.current_page;
        self.page_in_flight = Some(page);
        vec![SessionCommand::FetchPage { chat_id, page }]
    }

    // ── Timers ──

    /// Fire whichever timers are due.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<SessionCommand> {
        let mut commands = Vec::new();

        if self.typing_timer.poll(now).is_some() && self.typing.local_is_typing {
            self.typing.local_is_typing = false;
            if let Some(chat_id) = self.active_chat() {
                commands.push(SessionCommand::Emit(ClientEvent::TypingStop {
                    chat_id,
                    members: self.members(),
                }));
            }
        }

        self.collect_effects(now, &mut commands);
        commands
    }

    /// Earliest instant at which [`ChatSessionController::poll_timers`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.typing_timer.deadline(), self.effects.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn collect_effects(&mut self, now: Instant, commands: &mut Vec<SessionCommand>) {
        let mut effects = self.effects.process_changes(now);
        effects.extend(self.effects.poll_timers(now));

        let Some(chat_id) = self.active_chat() else {
            return;
        };
        commands.extend(effects.into_iter().map(|effect| match effect {
            Effect::MarkReceipts { message_id } => SessionCommand::MarkReceipts {
                chat_id: chat_id.clone(),
                message_id,
            },
            Effect::FetchSmartReplies { trigger_id } => SessionCommand::FetchSmartReplies {
                chat_id: chat_id.clone(),
                trigger_id,
            },
        }));
    }

    // ── Read access ──

    pub fn local_user(&self) -> &str {
        &self.local_user
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn details(&self) -> Option<&ChatDetails> {
        self.details.as_ref()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Subscribe to changes of the message view.
    pub fn subscribe_view(&mut self) -> mpsc::UnboundedReceiver<ViewChange> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    /// Server notices received since the chat was opened, oldest first.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn typing(&self) -> TypingState {
        self.typing
    }

    pub fn smart_replies(&self) -> &SmartReplyState {
        self.effects.smart_replies()
    }

    pub fn cursor(&self) -> SessionCursor {
        self.cursor
    }

    pub fn member_count(&self) -> Option<usize> {
        self.details.as_ref().and_then(ChatDetails::member_count)
    }

    pub fn tick_for(&self, message: &Message) -> Tick {
        derive_tick(
            message,
            message.sender_id == self.local_user,
            self.member_count(),
        )
    }

    fn active_chat(&self) -> Option<ChatId> {
        match self.phase {
            SessionPhase::Joining | SessionPhase::Active => self.chat_id.clone(),
            SessionPhase::Idle | SessionPhase::Leaving => None,
        }
    }

    fn members(&self) -> Vec<UserId> {
        self.details
            .as_ref()
            .map(|d| d.members.clone())
            .unwrap_or_default()
    }

    fn is_own(&self, message_id: &str) -> bool {
        self.store
            .get(message_id)
            .is_some_and(|m| m.sender_id == self.local_user)
    }
}
