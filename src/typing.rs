//! Typing indicator channel.
//!
//! Ephemeral, best-effort presence hints: no acknowledgment, no persistence,
//! no retry. A dropped signal only delays the UI hint, it never corrupts
//! state. Both halves are deadline-based state machines polled by the
//! session tick, so teardown is simply dropping them.
//!
//! [`TypingPublisher`] is the sending side: one `true` per typing burst, an
//! automatic `false` after the quiet period, an immediate `false` when the
//! composer is cleared or the message is sent.
//!
//! [`TypingTracker`] is the receiving side: a `true` arms a safety deadline
//! that clears the indicator even if the explicit stop event never arrives
//! (covers dropped and duplicate events); signals from the local user are
//! ignored to prevent self-signal loops.

use std::collections::HashMap;

use crate::config::{TYPING_QUIET_MS, TYPING_SAFETY_MS};
use crate::types::{ConversationId, UserId};

/// Sending side of the typing channel, one per open conversation.
#[derive(Debug, Default)]
pub struct TypingPublisher {
    announced: bool,
    last_keystroke: Option<u64>,
}

impl TypingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a composer change. Returns a signal to publish: `Some(true)`
    /// on the first keystroke of a burst, `Some(false)` when the text was
    /// cleared, `None` otherwise (the debounce deadline is just pushed back).
    pub fn on_input(&mut self, text: &str, now: u64) -> Option<bool> {
        if text.trim().is_empty() {
            self.last_keystroke = None;
            if self.announced {
                self.announced = false;
                return Some(false);
            }
            return None;
        }

        self.last_keystroke = Some(now);
        if !self.announced {
            self.announced = true;
            return Some(true);
        }
        None
    }

    /// Expire the quiet period: with no keystroke for [`TYPING_QUIET_MS`],
    /// emits the automatic `false`.
    pub fn poll(&mut self, now: u64) -> Option<bool> {
        match self.last_keystroke {
            Some(last) if self.announced && now.saturating_sub(last) >= TYPING_QUIET_MS => {
                self.announced = false;
                self.last_keystroke = None;
                Some(false)
            }
            _ => None,
        }
    }

    /// Sending a message implies "stopped typing"; also used on teardown.
    /// Returns `Some(false)` if a clear signal still needs publishing.
    pub fn stop(&mut self) -> Option<bool> {
        self.last_keystroke = None;
        if self.announced {
            self.announced = false;
            Some(false)
        } else {
            None
        }
    }
}

/// Receiving side: remote typing state per conversation, with a safety
/// deadline per entry. At most one typing counterpart is surfaced per
/// conversation.
#[derive(Debug)]
pub struct TypingTracker {
    self_id: UserId,
    states: HashMap<ConversationId, (UserId, u64)>,
}

impl TypingTracker {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            states: HashMap::new(),
        }
    }

    /// Absorb a typing event. A `true` (re-)arms the safety deadline; a
    /// `false` clears immediately. Self-authored events are ignored.
    pub fn observe(
        &mut self,
        conversation: &ConversationId,
        user: &UserId,
        is_typing: bool,
        now: u64,
    ) {
        if user == &self.self_id {
            return;
        }
        if is_typing {
            self.states
                .insert(conversation.clone(), (user.clone(), now + TYPING_SAFETY_MS));
        } else if matches!(self.states.get(conversation), Some((u, _)) if u == user) {
            self.states.remove(conversation);
        }
    }

    /// Drop entries whose safety deadline has passed; returns the cleared
    /// conversations so the UI can repaint.
    pub fn expire(&mut self, now: u64) -> Vec<ConversationId> {
        let expired: Vec<ConversationId> = self
            .states
            .iter()
            .filter(|(_, (_, deadline))| now >= *deadline)
            .map(|(conv, _)| conv.clone())
            .collect();
        for conv in &expired {
            self.states.remove(conv);
        }
        expired
    }

    /// Who is currently typing in a conversation, if anyone.
    pub fn typing_user(&self, conversation: &ConversationId) -> Option<&UserId> {
        self.states.get(conversation).map(|(user, _)| user)
    }

    /// Forget a conversation's state on teardown.
    pub fn clear(&mut self, conversation: &ConversationId) {
        self.states.remove(conversation);
    }
}
