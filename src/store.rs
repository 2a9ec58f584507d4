//! Per-conversation message store.
//!
//! An ordered, deduplicated cache of one open conversation's messages that
//! merges optimistic local sends with confirmed and realtime events. The
//! event source delivers at-least-once and possibly out of order, so the
//! store's contract is explicit about it: merges are idempotent, and an
//! update that races ahead of its insert is held until the insert arrives.
//!
//! Ordering key is `(created_at, id)` ascending — display order is by
//! creation time regardless of arrival order.

use std::collections::HashMap;

use crate::config::{ORPHAN_HOLD_MS, RECONCILE_MATCH_WINDOW_MS, SEND_WATCHDOG_MS};
use crate::types::{ConversationId, DeliveryState, Message, MessageId, UserId};

/// How a remote message was absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New message, inserted in order.
    Inserted,
    /// Already present; receipt timestamps were advanced in place.
    Updated,
    /// Already present and nothing new — duplicate delivery.
    Duplicate,
    /// Matched an outstanding optimistic send; the provisional entry with
    /// this local id was replaced.
    Reconciled(MessageId),
    /// Update for an id not seen yet; held until its insert arrives.
    Held,
    /// Event for a different conversation; not this store's concern.
    Ignored,
}

/// An optimistic send awaiting its server-confirmed counterpart.
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub local_id: MessageId,
    pub body: String,
    pub submitted_at: u64,
    /// Set by the watchdog once the confirmation window has passed; the
    /// message is surfaced as failed and can be resubmitted.
    pub failed: bool,
}

/// Display status of a message in this store, pending state included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Failed,
    Pending,
    Sent,
    Delivered,
    Read,
}

/// Where the view is anchored. On load the view anchors to the newest
/// message; appends follow only while the viewer is near the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAnchor {
    Newest,
    Pinned,
}

pub struct ConversationStore {
    conversation_id: ConversationId,
    self_id: UserId,
    messages: Vec<Message>,
    pending: Vec<PendingSend>,
    held_updates: HashMap<MessageId, (Message, u64)>,
    anchor: ScrollAnchor,
}

impl ConversationStore {
    pub fn new(conversation_id: ConversationId, self_id: UserId) -> Self {
        Self {
            conversation_id,
            self_id,
            messages: Vec::new(),
            pending: Vec::new(),
            held_updates: HashMap::new(),
            anchor: ScrollAnchor::Newest,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingSend] {
        &self.pending
    }

    pub fn anchor(&self) -> ScrollAnchor {
        self.anchor
    }

    /// Record whether the viewer is near the bottom of the transcript.
    /// While scrolled up, new arrivals do not force-jump the view.
    pub fn set_viewer_near_bottom(&mut self, near: bool) {
        self.anchor = if near {
            ScrollAnchor::Newest
        } else {
            ScrollAnchor::Pinned
        };
    }

    /// Whether the view should follow a newly appended message.
    pub fn follows_new_messages(&self) -> bool {
        self.anchor == ScrollAnchor::Newest
    }

    /// Replace contents from the history endpoint. Held updates that now
    /// have their insert are applied; the view re-anchors to the newest
    /// message.
    pub fn load(&mut self, history: Vec<Message>) {
        self.messages.clear();
        for message in history {
            if message.conversation_id != self.conversation_id {
                continue;
            }
            if self.position_of(&message.id).is_none() {
                self.insert_sorted(message);
            }
        }
        let held: Vec<MessageId> = self.held_updates.keys().cloned().collect();
        for id in held {
            if let Some(pos) = self.position_of(&id) {
                if let Some((update, _)) = self.held_updates.remove(&id) {
                    self.messages[pos].absorb(&update);
                }
            }
        }
        self.anchor = ScrollAnchor::Newest;
    }

    /// Append a provisional message for an optimistic send and return its
    /// local id.
    pub fn append_local(&mut self, body: &str, now: u64) -> MessageId {
        let local_id =
            MessageId::provisional(&self.conversation_id, &self.self_id, body, now);
        self.pending.push(PendingSend {
            local_id: local_id.clone(),
            body: body.to_string(),
            submitted_at: now,
            failed: false,
        });
        self.insert_sorted(Message {
            id: local_id.clone(),
            conversation_id: self.conversation_id.clone(),
            sender_id: self.self_id.clone(),
            body: body.to_string(),
            created_at: now,
            delivered_at: None,
            read_at: None,
        });
        local_id
    }

    /// Absorb a message-insert event.
    ///
    /// Idempotent: a second insert for a known id updates in place or is a
    /// duplicate. An insert matching an outstanding optimistic send
    /// (same sender and body, creation time within the match window)
    /// reconciles the provisional entry instead of inserting a second copy.
    pub fn merge_remote(&mut self, message: Message) -> MergeOutcome {
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Ignored;
        }

        if let Some(pos) = self.position_of(&message.id) {
            return if self.messages[pos].absorb(&message) {
                MergeOutcome::Updated
            } else {
                MergeOutcome::Duplicate
            };
        }

        if message.sender_id == self.self_id {
            if let Some(idx) = self.matching_pending(&message) {
                let local_id = self.pending.remove(idx).local_id;
                self.remove_message(&local_id);
                self.insert_with_held(message);
                return MergeOutcome::Reconciled(local_id);
            }
        }

        self.insert_with_held(message);
        MergeOutcome::Inserted
    }

    /// Absorb a message-update event. Updates for an as-yet-unseen id are
    /// held until the insert arrives.
    pub fn apply_update(&mut self, message: Message, now: u64) -> MergeOutcome {
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Ignored;
        }
        match self.position_of(&message.id) {
            Some(pos) => {
                if self.messages[pos].absorb(&message) {
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Duplicate
                }
            }
            None => {
                self.held_updates.insert(message.id.clone(), (message, now));
                MergeOutcome::Held
            }
        }
    }

    /// Replace the provisional entry with its server-confirmed counterpart
    /// (the send call's response path). Returns `false` when the local id is
    /// unknown — e.g. the realtime echo already reconciled it.
    pub fn reconcile(&mut self, local_id: &MessageId, server: Message) -> bool {
        let Some(idx) = self
            .pending
            .iter()
            .position(|p| &p.local_id == local_id)
        else {
            // Already reconciled via the echo; still absorb any newer
            // receipt state the response carries.
            self.merge_remote(server);
            return false;
        };
        self.pending.remove(idx);
        self.remove_message(local_id);
        if let Some(pos) = self.position_of(&server.id) {
            self.messages[pos].absorb(&server);
        } else {
            self.insert_with_held(server);
        }
        true
    }

    /// Roll back an optimistic send, returning the body so the composer can
    /// be restored.
    pub fn discard_local(&mut self, local_id: &MessageId) -> Option<String> {
        let idx = self
            .pending
            .iter()
            .position(|p| &p.local_id == local_id)?;
        let pending = self.pending.remove(idx);
        self.remove_message(local_id);
        Some(pending.body)
    }

    /// Expire deadline-based state: pending sends past the watchdog window
    /// are flagged failed (returned so the caller can surface them), and
    /// stale held updates are dropped as no-ops.
    pub fn sweep(&mut self, now: u64) -> Vec<MessageId> {
        let mut newly_failed = Vec::new();
        for p in &mut self.pending {
            if !p.failed && now.saturating_sub(p.submitted_at) >= SEND_WATCHDOG_MS {
                p.failed = true;
                newly_failed.push(p.local_id.clone());
            }
        }
        self.held_updates
            .retain(|_, (_, held_since)| now.saturating_sub(*held_since) < ORPHAN_HOLD_MS);
        newly_failed
    }

    /// Display status for a message in this store.
    pub fn status_of(&self, id: &MessageId) -> Option<MessageStatus> {
        if let Some(p) = self.pending.iter().find(|p| &p.local_id == id) {
            return Some(if p.failed {
                MessageStatus::Failed
            } else {
                MessageStatus::Pending
            });
        }
        let pos = self.position_of(id)?;
        Some(match self.messages[pos].delivery_state() {
            DeliveryState::Sent => MessageStatus::Sent,
            DeliveryState::Delivered => MessageStatus::Delivered,
            DeliveryState::Read => MessageStatus::Read,
        })
    }

    /// Inbound messages this client has not yet acknowledged as delivered.
    pub fn undelivered_inbound(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.sender_id != self.self_id && m.delivered_at.is_none())
    }

    /// Whether any inbound message is still unread.
    pub fn has_unread_inbound(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.sender_id != self.self_id && m.read_at.is_none())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    fn insert_sorted(&mut self, message: Message) {
        let key = (message.created_at, message.id.0.clone());
        let pos = self
            .messages
            .partition_point(|m| (m.created_at, m.id.0.clone()) <= key);
        self.messages.insert(pos, message);
    }

    fn insert_with_held(&mut self, mut message: Message) {
        if let Some((update, _)) = self.held_updates.remove(&message.id) {
            message.absorb(&update);
        }
        self.insert_sorted(message);
    }

    fn remove_message(&mut self, id: &MessageId) {
        if let Some(pos) = self.position_of(id) {
            self.messages.remove(pos);
        }
    }

    fn matching_pending(&self, message: &Message) -> Option<usize> {
        self.pending.iter().position(|p| {
            !p.failed
                && p.body == message.body
                && message.created_at.abs_diff(p.submitted_at) <= RECONCILE_MATCH_WINDOW_MS
        })
    }
}
