//! Per-user messaging session.
//!
//! Owns the conversation list, at most one open conversation (store +
//! typing + send pipeline), and the event router. All mutation goes through
//! this type, and [`session_loop`] serializes it on one task: events and
//! ticks are the only entry points while the loop runs, so the state
//! containers need no locking of their own.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::backend::{BackendError, ChatBackend};
use crate::config::{SessionConfig, SESSION_TICK_MS};
use crate::inbox::{ConversationList, InboxUpdate};
use crate::rlog;
use crate::router::{EventRouter, RouteAction};
use crate::send::{SendPipeline, SubmitOutcome};
use crate::store::ConversationStore;
use crate::types::{ConversationId, Message, RealtimeEvent, UserId};
use crate::typing::{TypingPublisher, TypingTracker};
use crate::util::now_ms;

/// State owned for the one open conversation.
struct ActiveConversation {
    store: ConversationStore,
    typing_out: TypingPublisher,
    pipeline: SendPipeline,
}

pub struct ChatSession<B: ChatBackend> {
    backend: B,
    self_id: UserId,
    privileged: bool,
    inbox: ConversationList,
    router: EventRouter,
    typing_in: TypingTracker,
    active: Option<ActiveConversation>,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B, config: &SessionConfig) -> Self {
        Self {
            backend,
            self_id: config.self_id.clone(),
            privileged: config.privileged,
            inbox: ConversationList::new(config.self_id.clone()),
            router: EventRouter::new(config.self_id.clone()),
            typing_in: TypingTracker::new(config.self_id.clone()),
            active: None,
        }
    }

    pub fn inbox(&self) -> &ConversationList {
        &self.inbox
    }

    /// Messages of the open conversation, display order.
    pub fn active_messages(&self) -> Option<&[Message]> {
        self.active.as_ref().map(|a| a.store.messages())
    }

    pub fn active_store(&self) -> Option<&ConversationStore> {
        self.active.as_ref().map(|a| &a.store)
    }

    /// Who is typing in the open conversation, if anyone.
    pub fn typing_user(&self) -> Option<&UserId> {
        let active = self.router.active()?;
        self.typing_in.typing_user(active)
    }

    /// Reload all conversation summaries from the backend.
    pub fn refresh_inbox(&mut self) -> Result<(), BackendError> {
        self.inbox.refresh(&self.backend)
    }

    /// Open a conversation: load history, switch the scoped subscriptions,
    /// acknowledge delivery of inbound messages this client had not seen,
    /// and issue the batch read mark.
    pub fn open_conversation(&mut self, conversation: ConversationId) -> Result<(), BackendError> {
        self.close_conversation();

        let history = self.backend.list_messages(&conversation)?;
        let mut store = ConversationStore::new(conversation.clone(), self.self_id.clone());
        store.load(history);

        self.router.set_active(conversation.clone());

        let undelivered: Vec<_> = store
            .undelivered_inbound()
            .map(|m| m.id.clone())
            .collect();
        for id in undelivered {
            if let Err(e) = self.backend.mark_delivered(&id) {
                rlog!("open: delivered mark failed (best-effort): {e}");
            }
        }

        if store.has_unread_inbound() {
            if let Err(e) = self.inbox.mark_read(&conversation, &self.backend) {
                rlog!("open: read mark failed (best-effort): {e}");
            }
        }

        rlog!(
            "session: opened {} ({} message(s))",
            crate::logging::conv_id(&conversation.0),
            store.messages().len()
        );
        self.active = Some(ActiveConversation {
            store,
            typing_out: TypingPublisher::new(),
            pipeline: SendPipeline::new(),
        });
        Ok(())
    }

    /// Close the open conversation: clear the typing signal, release the
    /// scoped subscriptions, and cancel pending timers. An in-flight send's
    /// reconciliation is dropped silently with the store.
    pub fn close_conversation(&mut self) {
        if let Some(mut active) = self.active.take() {
            let conversation = active.store.conversation_id().clone();
            if active.typing_out.stop() == Some(false) {
                if let Err(e) = self.backend.set_typing(&conversation, false) {
                    rlog!("close: typing clear failed (best-effort): {e}");
                }
            }
            self.typing_in.clear(&conversation);
            rlog!("session: closed {}", crate::logging::conv_id(&conversation.0));
        }
        self.router.clear_active();
    }

    /// Composer text changed; publish typing signals as needed.
    pub fn input_changed(&mut self, text: &str, now: u64) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(is_typing) = active.typing_out.on_input(text, now) {
            let conversation = active.store.conversation_id().clone();
            if let Err(e) = self.backend.set_typing(&conversation, is_typing) {
                rlog!("typing: publish failed (best-effort): {e}");
            }
        }
    }

    /// Submit the composer text through the send pipeline.
    pub fn submit(&mut self, text: &str, now: u64) -> SubmitOutcome {
        let Some(active) = self.active.as_mut() else {
            return SubmitOutcome::Failed {
                reason: "no open conversation".to_string(),
                restored_text: text.to_string(),
            };
        };
        let outcome = active.pipeline.submit(
            text,
            self.privileged,
            &mut active.store,
            &mut active.typing_out,
            &self.backend,
            now,
        );
        if let SubmitOutcome::Confirmed { .. } = &outcome {
            // Keep the list's preview/order in step without waiting for the
            // echo event.
            if let Some(last) = active.store.messages().last().cloned() {
                let active_id = self.router.active().cloned();
                self.inbox.apply_message_event(&last, active_id.as_ref());
            }
        }
        outcome
    }

    /// Dispatch one realtime event through the router.
    pub fn handle_event(&mut self, event: RealtimeEvent, now: u64) {
        for action in self.router.route(event, now) {
            self.apply(action, now);
        }
    }

    fn apply(&mut self, action: RouteAction, now: u64) {
        match action {
            RouteAction::StoreInsert(message) => {
                if let Some(active) = self.active.as_mut() {
                    active.store.merge_remote(message);
                }
            }
            RouteAction::StoreUpdate(message) => {
                if let Some(active) = self.active.as_mut() {
                    active.store.apply_update(message, now);
                }
            }
            RouteAction::InboxUpdate(message) => {
                let active = self.router.active().cloned();
                if self.inbox.apply_message_event(&message, active.as_ref())
                    == InboxUpdate::Unknown
                {
                    if let Err(e) = self.refresh_inbox() {
                        rlog!("inbox: refresh after unknown conversation failed: {e}");
                    }
                }
            }
            RouteAction::MarkDelivered(id) => {
                if let Err(e) = self.backend.mark_delivered(&id) {
                    rlog!("receipts: delivered mark failed (best-effort): {e}");
                }
            }
            RouteAction::TypingObserve {
                conversation_id,
                user_id,
                is_typing,
            } => {
                self.typing_in
                    .observe(&conversation_id, &user_id, is_typing, now);
            }
        }
    }

    /// Advance deadline-based state: the typing quiet period and safety
    /// timeout, the send watchdog, and the delayed read mark.
    pub fn tick(&mut self, now: u64) {
        if let Some(active) = self.active.as_mut() {
            if let Some(is_typing) = active.typing_out.poll(now) {
                let conversation = active.store.conversation_id().clone();
                if let Err(e) = self.backend.set_typing(&conversation, is_typing) {
                    rlog!("typing: auto-clear publish failed (best-effort): {e}");
                }
            }
            for failed in active.store.sweep(now) {
                rlog!(
                    "send: no confirmation for {}, surfaced as failed",
                    crate::logging::msg_id(&failed.0)
                );
            }
        }

        self.typing_in.expire(now);

        if let Some(conversation) = self.router.due_read_mark(now) {
            if let Err(e) = self.inbox.mark_read(&conversation, &self.backend) {
                rlog!("receipts: read mark failed (best-effort): {e}");
            }
        }
    }
}

/// Drive a session from the realtime feed: applies events as they arrive and
/// ticks deadline-based state periodically. Returns when the feed channel is
/// closed for good (the feed task re-establishes dropped connections itself;
/// a lagged receiver falls back to a full inbox refresh).
pub async fn session_loop<B: ChatBackend>(
    session: &mut ChatSession<B>,
    mut events: broadcast::Receiver<RealtimeEvent>,
) {
    let mut tick = tokio::time::interval(Duration::from_millis(SESSION_TICK_MS));
    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => session.handle_event(event, now_ms()),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        rlog!("session: lagged {n} event(s), refreshing inbox");
                        if let Err(e) = session.refresh_inbox() {
                            rlog!("session: refresh after lag failed: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tick.tick() => {
                session.tick(now_ms());
            }
        }
    }
}
