use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::api::RemoteMessageService;
use crate::chat::channel::RealtimeChannel;
use crate::chat::effects::SmartReplyState;
use crate::chat::protocol::ServerEvent;
use crate::chat::receipts::{Tick, derive_tick};
use crate::chat::session::{
    ChatSessionController, Failure, RemoteOutcome, SessionCommand, SessionPhase, TypingState,
};
use crate::error::ChatError;
use crate::models::{ChatDetails, ChatId, Message, MessageId, Notice, SessionCursor, UserId};

/// A user action forwarded to the session task.
#[derive(Debug)]
pub enum Intent {
    Activate(ChatId),
    Deactivate,
    /// A keystroke in the input box.
    Input,
    Submit(String),
    SelectSuggestion {
        index: usize,
        reply: oneshot::Sender<Option<String>>,
    },
    DismissSuggestions,
    React {
        message_id: MessageId,
        emoji: String,
    },
    RemoveReaction {
        message_id: MessageId,
    },
    Edit {
        message_id: MessageId,
        content: String,
    },
    Delete {
        message_id: MessageId,
    },
    ReachedTop,
    RetryHistory,
}

/// Everything the presentation layer renders, published after each step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub local_user: UserId,
    pub chat_id: Option<ChatId>,
    pub phase: SessionPhase,
    pub details: Option<ChatDetails>,
    pub messages: Vec<Message>,
    /// Store revision `messages` was captured at.
    pub revision: u64,
    /// Server notices, kept apart from `messages`.
    pub notices: Vec<Notice>,
    pub typing: TypingState,
    pub smart_replies: SmartReplyState,
    pub cursor: SessionCursor,
}

impl SessionView {
    pub fn tick_for(&self, message: &Message) -> Tick {
        derive_tick(
            message,
            message.sender_id == self.local_user,
            self.details.as_ref().and_then(ChatDetails::member_count),
        )
    }

    /// Bring the view up to date. Returns whether anything changed.
    fn refresh(&mut self, controller: &ChatSessionController) -> bool {
        let mut changed = false;

        let revision = controller.store().revision();
        if self.revision != revision {
            self.messages = controller.snapshot();
            self.revision = revision;
            changed = true;
        }

        changed |= replace(&mut self.local_user, controller.local_user().to_string());
        changed |= replace(&mut self.chat_id, controller.chat_id().map(str::to_string));
        changed |= replace(&mut self.phase, controller.phase());
        changed |= replace(&mut self.details, controller.details().cloned());
        if self.notices.as_slice() != controller.notices() {
            self.notices = controller.notices().to_vec();
            changed = true;
        }
        changed |= replace(&mut self.typing, controller.typing());
        changed |= replace(&mut self.smart_replies, controller.smart_replies().clone());
        changed |= replace(&mut self.cursor, controller.cursor());
        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Handle to a running session task.
pub struct SessionHandle {
    intents: mpsc::UnboundedSender<Intent>,
    view: watch::Receiver<SessionView>,
    failures: mpsc::UnboundedReceiver<Failure>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn send(&self, intent: Intent) -> Result<(), ChatError> {
        self.intents
            .send(intent)
            .map_err(|_| ChatError::ChannelClosed)
    }

    pub fn activate(&self, chat_id: impl Into<ChatId>) -> Result<(), ChatError> {
        self.send(Intent::Activate(chat_id.into()))
    }

    pub fn deactivate(&self) -> Result<(), ChatError> {
        self.send(Intent::Deactivate)
    }

    pub fn input(&self) -> Result<(), ChatError> {
        self.send(Intent::Input)
    }

    pub fn submit(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.send(Intent::Submit(text.into()))
    }

    /// Take a smart-reply suggestion for the input box.
    pub async fn select_suggestion(&self, index: usize) -> Result<Option<String>, ChatError> {
        let (reply, rx) = oneshot::channel();
        self.send(Intent::SelectSuggestion { index, reply })?;
        rx.await.map_err(|_| ChatError::ChannelClosed)
    }

    pub fn dismiss_suggestions(&self) -> Result<(), ChatError> {
        self.send(Intent::DismissSuggestions)
    }

    pub fn react(
        &self,
        message_id: impl Into<MessageId>,
        emoji: impl Into<String>,
    ) -> Result<(), ChatError> {
        self.send(Intent::React {
            message_id: message_id.into(),
            emoji: emoji.into(),
        })
    }

    pub fn remove_reaction(&self, message_id: impl Into<MessageId>) -> Result<(), ChatError> {
        self.send(Intent::RemoveReaction {
            message_id: message_id.into(),
        })
    }

    pub fn edit(
        &self,
        message_id: impl Into<MessageId>,
        content: impl Into<String>,
    ) -> Result<(), ChatError> {
        self.send(Intent::Edit {
            message_id: message_id.into(),
            content: content.into(),
        })
    }

    pub fn delete(&self, message_id: impl Into<MessageId>) -> Result<(), ChatError> {
        self.send(Intent::Delete {
            message_id: message_id.into(),
        })
    }

    pub fn reached_top(&self) -> Result<(), ChatError> {
        self.send(Intent::ReachedTop)
    }

    pub fn retry_history(&self) -> Result<(), ChatError> {
        self.send(Intent::RetryHistory)
    }

    /// A receiver of view updates.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// The latest published view.
    pub fn current(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Wait for the next reported failure.
    pub async fn next_failure(&mut self) -> Option<Failure> {
        self.failures.recv().await
    }

    /// A failure that was already reported, without waiting.
    pub fn try_failure(&mut self) -> Option<Failure> {
        self.failures.try_recv().ok()
    }

    /// Leave the active chat and stop the task.
    pub async fn shutdown(self) {
        let Self { intents, task, .. } = self;
        drop(intents);
        if let Err(e) = task.await {
            warn!("Session task ended abnormally: {e}");
        }
    }
}

/// Drives a [`ChatSessionController`] against a service and a channel.
///
/// The controller is owned by a single task; remote calls run in their own
/// tasks and report back as [`RemoteOutcome`]s, so the session keeps handling
/// events while calls are outstanding.
pub struct SessionRuntime<S: ?Sized, C: ?Sized> {
    controller: ChatSessionController,
    service: Arc<S>,
    channel: Arc<C>,
    outcomes: mpsc::UnboundedSender<RemoteOutcome>,
    failures: mpsc::UnboundedSender<Failure>,
    view: watch::Sender<SessionView>,
}

impl<S, C> SessionRuntime<S, C>
where
    S: RemoteMessageService + ?Sized + 'static,
    C: RealtimeChannel + ?Sized + 'static,
{
    /// Subscribe to `channel` and start the session task.
    pub async fn spawn(
        controller: ChatSessionController,
        service: Arc<S>,
        channel: Arc<C>,
    ) -> SessionHandle {
        let events = channel.subscribe().await;
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let mut initial = SessionView::default();
        initial.refresh(&controller);
        let (view_tx, view_rx) = watch::channel(initial);

        let runtime = Self {
            controller,
            service,
            channel,
            outcomes: outcomes_tx,
            failures: failures_tx,
            view: view_tx,
        };
        let task = tokio::spawn(runtime.run(intents_rx, events, outcomes_rx));

        SessionHandle {
            intents: intents_tx,
            view: view_rx,
            failures: failures_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        mut events: mpsc::UnboundedReceiver<ServerEvent>,
        mut outcomes: mpsc::UnboundedReceiver<RemoteOutcome>,
    ) {
        loop {
            let deadline = self.controller.next_deadline();

            let commands = tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => self.apply_intent(intent),
                    None => break,
                },
                Some(event) = events.recv() => {
                    self.controller.handle_event(event, Instant::now())
                }
                Some(outcome) = outcomes.recv() => {
                    self.controller.handle_outcome(outcome, Instant::now())
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.controller.poll_timers(Instant::now())
                }
            };

            self.execute(commands).await;
            self.publish();
        }

        // Handle dropped: leave whatever chat is still open.
        let commands = self.controller.deactivate(Instant::now());
        self.execute(commands).await;
        self.publish();
        info!("Session task stopped");
    }

    fn apply_intent(&mut self, intent: Intent) -> Vec<SessionCommand> {
        let now = Instant::now();
        let controller = &mut self.controller;
        match intent {
            Intent::Activate(chat_id) => controller.activate(chat_id, now),
            Intent::Deactivate => controller.deactivate(now),
            Intent::Input => controller.on_local_input(now),
            Intent::Submit(text) => controller.submit_message(&text),
            Intent::SelectSuggestion { index, reply } => {
                let _ = reply.send(controller.select_suggestion(index));
                Vec::new()
            }
            Intent::DismissSuggestions => {
                controller.dismiss_suggestions();
                Vec::new()
            }
            Intent::React { message_id, emoji } => controller.react(&message_id, &emoji),
            Intent::RemoveReaction { message_id } => controller.remove_reaction(&message_id),
            Intent::Edit {
                message_id,
                content,
            } => controller.request_edit(&message_id, &content),
            Intent::Delete { message_id } => controller.request_delete(&message_id),
            Intent::ReachedTop => controller.reached_top(),
            Intent::RetryHistory => controller.retry_history(),
        }
    }

    async fn execute(&self, commands: Vec<SessionCommand>) {
        for command in commands {
            match command {
                SessionCommand::Emit(event) => {
                    let chat_id = event.chat_id().to_string();
                    if let Err(e) = self.channel.emit(event).await {
                        warn!(chat_id = %chat_id, "Failed to emit event: {e}");
                    }
                }
                SessionCommand::Report(failure) => {
                    // Nobody listening is fine: the failure was already logged.
                    let _ = self.failures.send(failure);
                }
                SessionCommand::FetchChatDetails { chat_id } => {
                    self.dispatch(|service| async move {
                        let result = service.chat_details(&chat_id).await;
                        RemoteOutcome::ChatDetails { chat_id, result }
                    });
                }
                SessionCommand::FetchPage { chat_id, page } => {
                    self.dispatch(move |service| async move {
                        let result = service.fetch_messages(&chat_id, page).await;
                        RemoteOutcome::Page {
                            chat_id,
                            page,
                            result,
                        }
                    });
                }
                SessionCommand::MarkReceipts {
                    chat_id,
                    message_id,
                } => {
                    self.dispatch(|service| async move {
                        let result = match service.mark_delivered(&message_id).await {
                            Ok(()) => service.mark_seen(&message_id).await,
                            Err(e) => Err(e),
                        };
                        RemoteOutcome::Receipts {
                            chat_id,
                            message_id,
                            result,
                        }
                    });
                }
                SessionCommand::FetchSmartReplies {
                    chat_id,
                    trigger_id,
                } => {
                    debug!(chat_id = %chat_id, trigger_id = %trigger_id, "Requesting smart replies");
                    self.dispatch(|service| async move {
                        let result = service.smart_replies(&chat_id).await;
                        RemoteOutcome::SmartReplies {
                            chat_id,
                            trigger_id,
                            result,
                        }
                    });
                }
                SessionCommand::UpdateMessage {
                    chat_id,
                    message_id,
                    content,
                } => {
                    self.dispatch(|service| async move {
                        let result = service.update_message(&message_id, &content).await;
                        RemoteOutcome::Updated {
                            chat_id,
                            message_id,
                            result,
                        }
                    });
                }
                SessionCommand::DeleteMessage {
                    chat_id,
                    message_id,
                } => {
                    self.dispatch(|service| async move {
                        let result = service.delete_message(&message_id).await;
                        RemoteOutcome::Deleted {
                            chat_id,
                            message_id,
                            result,
                        }
                    });
                }
                SessionCommand::UpsertReaction {
                    chat_id,
                    message_id,
                    emoji,
                } => {
                    self.dispatch(|service| async move {
                        let result = service.upsert_reaction(&message_id, &emoji).await;
                        RemoteOutcome::Reactions {
                            chat_id,
                            message_id,
                            removal: false,
                            result,
                        }
                    });
                }
                SessionCommand::RemoveReaction {
                    chat_id,
                    message_id,
                } => {
                    self.dispatch(|service| async move {
                        let result = service.remove_reaction(&message_id).await;
                        RemoteOutcome::Reactions {
                            chat_id,
                            message_id,
                            removal: true,
                            result,
                        }
                    });
                }
            }
        }
    }

    /// Run a remote call in its own task and feed its outcome back.
    fn dispatch<F, Fut>(&self, call: F)
    where
        F: FnOnce(Arc<S>) -> Fut,
        Fut: Future<Output = RemoteOutcome> + Send + 'static,
    {
        let future = call(self.service.clone());
        let outcomes = self.outcomes.clone();
        tokio::spawn(async move {
            // The session task may have stopped; the outcome is moot then.
            let _ = outcomes.send(future.await);
        });
    }

    fn publish(&self) {
        self.view
            .send_if_modified(|view| view.refresh(&self.controller));
    }
}
