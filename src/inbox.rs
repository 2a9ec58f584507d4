//! Conversation list synchronizer.
//!
//! Maintains summaries (last message, unread count, online flag) across all
//! of the user's conversations, ordered by last activity. Summaries come
//! from the list endpoint; the global message-event feed keeps previews and
//! unread counts current for conversations that are not currently open.

use std::collections::HashSet;

use crate::backend::{BackendError, ChatBackend};
use crate::types::{ConversationId, ConversationSummary, Message, MessageId, UserId};
use crate::util::preview;

const PREVIEW_MAX_CHARS: usize = 80;

/// Result of applying a global message event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxUpdate {
    /// The affected summary was updated incrementally.
    Updated,
    /// The event targets a conversation not in the list; the caller should
    /// trigger a full refresh.
    Unknown,
}

pub struct ConversationList {
    self_id: UserId,
    summaries: Vec<ConversationSummary>,
    /// Message ids already counted toward an unread total. The feed delivers
    /// at-least-once, so the increment must be idempotent; a refresh resets
    /// the counts from the server and this set with them.
    counted_unread: HashSet<MessageId>,
}

impl ConversationList {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            summaries: Vec::new(),
            counted_unread: HashSet::new(),
        }
    }

    /// Summaries ordered by last activity, most recent first.
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn get(&self, conversation: &ConversationId) -> Option<&ConversationSummary> {
        self.summaries
            .iter()
            .find(|s| &s.conversation_id == conversation)
    }

    /// Replace all summaries from the list endpoint.
    pub fn refresh<B: ChatBackend>(&mut self, backend: &B) -> Result<(), BackendError> {
        let mut summaries = backend.list_conversations()?;
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        self.summaries = summaries;
        self.counted_unread.clear();
        Ok(())
    }

    /// Apply one message-insert event from the global feed.
    ///
    /// Updates the preview and ordering, and increments the unread count for
    /// inbound messages — except in the active conversation, whose count is
    /// zeroed by the read-mark flow instead. Duplicate delivery of the same
    /// event counts a message once.
    pub fn apply_message_event(
        &mut self,
        message: &Message,
        active: Option<&ConversationId>,
    ) -> InboxUpdate {
        let Some(pos) = self
            .summaries
            .iter()
            .position(|s| s.conversation_id == message.conversation_id)
        else {
            return InboxUpdate::Unknown;
        };

        let summary = &mut self.summaries[pos];
        if message.created_at >= summary.last_activity {
            summary.last_activity = message.created_at;
            summary.last_message = Some(preview(&message.body, PREVIEW_MAX_CHARS));
        }
        if message.sender_id != self.self_id
            && message.read_at.is_none()
            && active != Some(&message.conversation_id)
            && self.counted_unread.insert(message.id.clone())
        {
            summary.unread_count += 1;
        }

        self.summaries
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        InboxUpdate::Updated
    }

    /// Issue the batch read mark for a conversation and zero its unread
    /// count. Idempotent: with nothing unread the backend call is a no-op.
    pub fn mark_read<B: ChatBackend>(
        &mut self,
        conversation: &ConversationId,
        backend: &B,
    ) -> Result<u32, BackendError> {
        let marked = backend.mark_conversation_read(conversation)?;
        if let Some(summary) = self
            .summaries
            .iter_mut()
            .find(|s| &s.conversation_id == conversation)
        {
            summary.unread_count = 0;
        }
        Ok(marked)
    }
}
