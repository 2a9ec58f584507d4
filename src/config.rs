//! Tunable constants and session configuration.

use crate::types::UserId;

/// Quiet period after the last keystroke before an automatic
/// typing-stopped signal is published (3 s).
pub const TYPING_QUIET_MS: u64 = 3_000;

/// Safety deadline for a remote typing-started signal with no follow-up;
/// the indicator is cleared locally even if the explicit stop event was
/// dropped (5 s).
pub const TYPING_SAFETY_MS: u64 = 5_000;

/// Delay between observing an inbound message in the foregrounded
/// conversation and issuing the batch read mark.
pub const READ_MARK_DELAY_MS: u64 = 400;

/// How long an optimistic send may stay unconfirmed before it is surfaced
/// as failed.
pub const SEND_WATCHDOG_MS: u64 = 10_000;

/// Maximum creation-timestamp skew when matching a server-confirmed message
/// against an outstanding optimistic send.
pub const RECONCILE_MATCH_WINDOW_MS: u64 = 30_000;

/// How long an update event targeting an as-yet-unseen message id is held
/// before being discarded as a no-op.
pub const ORPHAN_HOLD_MS: u64 = 30_000;

/// Period of the session driver tick that expires deadline-based state
/// (typing, read marks, the send watchdog).
pub const SESSION_TICK_MS: u64 = 250;

/// Capacity of the broadcast channel carrying parsed realtime events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Initial and maximum reconnect backoff for the realtime feed connection.
pub const FEED_BACKOFF_INITIAL_SECS: u64 = 2;
pub const FEED_BACKOFF_MAX_SECS: u64 = 60;

/// Configuration for one signed-in messaging session.
///
/// Configuration can be set programmatically or picked up from the
/// environment; explicit values take precedence.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the backend REST API.
    pub api_url: String,
    /// WebSocket URL of the realtime event feed.
    pub feed_url: String,
    /// The signed-in user.
    pub self_id: UserId,
    /// Coaches and staff are exempt from contact-info validation rules.
    pub privileged: bool,
}

impl SessionConfig {
    pub fn new(api_url: impl Into<String>, feed_url: impl Into<String>, self_id: UserId) -> Self {
        Self {
            api_url: api_url.into(),
            feed_url: feed_url.into(),
            self_id,
            privileged: false,
        }
    }

    /// Build a config from `RALLYCHAT_API_URL`, `RALLYCHAT_FEED_URL`, and
    /// `RALLYCHAT_USER_ID`. Returns `None` when any of the three is unset.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("RALLYCHAT_API_URL").ok()?;
        let feed_url = std::env::var("RALLYCHAT_FEED_URL").ok()?;
        let self_id = UserId(std::env::var("RALLYCHAT_USER_ID").ok()?);
        Some(Self::new(api_url, feed_url, self_id))
    }
}
