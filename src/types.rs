//! Core data model: identifiers, messages, conversation summaries, and the
//! realtime event variants consumed from the feed.
//!
//! Delivery/read state is *derived* from a message's two nullable timestamps;
//! no separate state field exists, so the display state can never disagree
//! with the receipts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque conversation identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Opaque user identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Message identifier. Stable once server-confirmed; locally generated
/// provisional ids carry the `local-` prefix and exist only until
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

const PROVISIONAL_PREFIX: &str = "local-";

impl MessageId {
    /// Generate a provisional id for an optimistic send: a salted digest of
    /// the message content, URL-safe base64 without padding.
    pub fn provisional(
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
        created_at: u64,
    ) -> Self {
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let mut hasher = Sha256::new();
        hasher.update(conversation.0.as_bytes());
        hasher.update(sender.0.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(created_at.to_be_bytes());
        hasher.update(salt);
        let encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
        MessageId(format!("{PROVISIONAL_PREFIX}{encoded}"))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A direct message between two participants.
///
/// Timestamps are milliseconds since the UNIX epoch. `delivered_at` and
/// `read_at` are write-once: once set they are never cleared and never moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: u64,
    #[serde(default)]
    pub delivered_at: Option<u64>,
    #[serde(default)]
    pub read_at: Option<u64>,
}

/// Displayed receipt state, derived from the two nullable timestamps.
///
/// The ordering encodes display priority: `Read` beats `Delivered` beats
/// `Sent`, and the state machine is monotonic — no merge can move a message
/// to a lower variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
}

impl Message {
    /// Current receipt state, evaluated strictly read > delivered > sent.
    pub fn delivery_state(&self) -> DeliveryState {
        if self.read_at.is_some() {
            DeliveryState::Read
        } else if self.delivered_at.is_some() {
            DeliveryState::Delivered
        } else {
            DeliveryState::Sent
        }
    }

    /// Merge a later snapshot of the same message into this one.
    ///
    /// Receipt timestamps are write-once: a set timestamp is never replaced
    /// or cleared, so duplicate and out-of-order updates are absorbed
    /// harmlessly. A read receipt implies delivery, so `delivered_at` is
    /// backfilled from `read_at` when the delivery update itself was lost.
    ///
    /// Returns `true` if any field changed.
    pub fn absorb(&mut self, update: &Message) -> bool {
        debug_assert_eq!(self.id, update.id);
        let mut changed = false;
        if self.delivered_at.is_none() {
            if let Some(t) = update.delivered_at.or(update.read_at) {
                self.delivered_at = Some(t);
                changed = true;
            }
        }
        if self.read_at.is_none() {
            if let Some(t) = update.read_at {
                self.read_at = Some(t);
                changed = true;
            }
        }
        changed
    }
}

/// One row of the conversation list: the latest known state of a thread
/// with a single counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub counterpart_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    pub last_activity: u64,
    pub unread_count: u32,
    #[serde(default)]
    pub online: bool,
}

/// Parsed events consumed from the realtime feed.
///
/// Delivery is at-least-once and possibly out of order; consumers absorb
/// duplicates idempotently and hold updates that race ahead of their insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    MessageInserted {
        message: Message,
    },
    MessageUpdated {
        message: Message,
    },
    TypingStarted {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    TypingStopped {
        conversation_id: ConversationId,
        user_id: UserId,
    },
}
