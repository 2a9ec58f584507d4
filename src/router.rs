//! Realtime event router.
//!
//! Turns parsed feed events into dispatch decisions for the message store,
//! the conversation list, and the typing tracker. The router is pure — it
//! returns [`RouteAction`]s and the session executes them — which keeps the
//! scoping rules (what goes to the open conversation, what only feeds the
//! list) in one testable place.
//!
//! Duplicate delivery is expected from the feed; idempotence lives in the
//! store's dedup invariant, not here.

use crate::config::READ_MARK_DELAY_MS;
use crate::types::{ConversationId, Message, RealtimeEvent, UserId};

/// A dispatch decision for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Merge an insert into the open conversation's store.
    StoreInsert(Message),
    /// Apply an update to the open conversation's store.
    StoreUpdate(Message),
    /// Update the conversation list from the global feed.
    InboxUpdate(Message),
    /// Acknowledge delivery of an inbound message just observed in the open
    /// conversation.
    MarkDelivered(crate::types::MessageId),
    /// Forward a typing signal to the tracker.
    TypingObserve {
        conversation_id: ConversationId,
        user_id: UserId,
        is_typing: bool,
    },
}

pub struct EventRouter {
    self_id: UserId,
    active: Option<ConversationId>,
    read_mark_due: Option<(ConversationId, u64)>,
}

impl EventRouter {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            active: None,
            read_mark_due: None,
        }
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Scope the conversation-level subscriptions to `conversation`.
    pub fn set_active(&mut self, conversation: ConversationId) {
        if self.active.as_ref() != Some(&conversation) {
            self.read_mark_due = None;
        }
        self.active = Some(conversation);
    }

    /// Tear down the conversation scope; any scheduled read mark is
    /// cancelled.
    pub fn clear_active(&mut self) {
        self.active = None;
        self.read_mark_due = None;
    }

    /// Route one feed event into dispatch decisions.
    ///
    /// An inbound insert for the open conversation triggers the delivered
    /// mark immediately and schedules the batch read mark after a short
    /// delay, issued only if the conversation is still foregrounded then.
    pub fn route(&mut self, event: RealtimeEvent, now: u64) -> Vec<RouteAction> {
        let mut actions = Vec::new();
        match event {
            RealtimeEvent::MessageInserted { message } => {
                actions.push(RouteAction::InboxUpdate(message.clone()));
                if self.active.as_ref() == Some(&message.conversation_id) {
                    if message.sender_id != self.self_id {
                        actions.push(RouteAction::MarkDelivered(message.id.clone()));
                        self.read_mark_due =
                            Some((message.conversation_id.clone(), now + READ_MARK_DELAY_MS));
                    }
                    actions.push(RouteAction::StoreInsert(message));
                }
            }
            RealtimeEvent::MessageUpdated { message } => {
                if self.active.as_ref() == Some(&message.conversation_id) {
                    actions.push(RouteAction::StoreUpdate(message));
                }
            }
            RealtimeEvent::TypingStarted {
                conversation_id,
                user_id,
            } => {
                if self.active.as_ref() == Some(&conversation_id) {
                    actions.push(RouteAction::TypingObserve {
                        conversation_id,
                        user_id,
                        is_typing: true,
                    });
                }
            }
            RealtimeEvent::TypingStopped {
                conversation_id,
                user_id,
            } => {
                if self.active.as_ref() == Some(&conversation_id) {
                    actions.push(RouteAction::TypingObserve {
                        conversation_id,
                        user_id,
                        is_typing: false,
                    });
                }
            }
        }
        actions
    }

    /// Pop the scheduled read mark if its delay has elapsed and the
    /// conversation is still the active one.
    pub fn due_read_mark(&mut self, now: u64) -> Option<ConversationId> {
        match &self.read_mark_due {
            Some((conversation, due)) if now >= *due => {
                if self.active.as_ref() == Some(conversation) {
                    let conversation = conversation.clone();
                    self.read_mark_due = None;
                    Some(conversation)
                } else {
                    self.read_mark_due = None;
                    None
                }
            }
            _ => None,
        }
    }
}
