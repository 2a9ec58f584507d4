//! rallychat: client-side real-time direct-messaging core for the Rally
//! padel coaching marketplace.
//!
//! The crate owns the stateful pieces of the chat experience — the
//! conversation list, the per-conversation message store with delivery and
//! read receipts, the typing channel, and the optimistic send pipeline —
//! while the durable store stays behind the [`backend::ChatBackend`] seam
//! and pushes asynchronous changes through the realtime feed.
//!
//! All mutation is serialized by one [`session::session_loop`] task, so the
//! state containers are plain structs with no internal locking.

pub mod backend;
pub mod config;
pub mod feed;
pub mod inbox;
pub mod logging;
pub mod router;
pub mod send;
pub mod session;
pub mod store;
pub mod typing;
pub mod types;
pub mod util;
pub mod validation;
