//! External collaborator interface.
//!
//! The messaging core treats the durable store as a remote collaborator
//! reached through six request/response operations. [`ChatBackend`] is the
//! seam: production code talks to [`HttpBackend`], tests substitute a
//! recording fake.
//!
//! HTTP calls are blocking and issued with no lock held; delivery, read, and
//! typing marks are fire-and-forget, and only the send path surfaces
//! failures to the user.

use serde::Deserialize;
use serde::Serialize;

use crate::types::{ConversationId, ConversationSummary, Message, MessageId};

/// Failure modes of a backend operation.
///
/// The distinction matters to the send pipeline: a `Rejected` or `Transport`
/// send is rolled back, while a `Decode` failure is ambiguous (the message
/// may have been persisted) and leaves the optimistic entry pending for the
/// realtime echo or the watchdog to resolve.
#[derive(Debug)]
pub enum BackendError {
    /// The request never completed (connection refused, reset, timeout).
    Transport(String),
    /// The collaborator refused the operation (4xx), e.g. server-side
    /// re-validation blocked a send.
    Rejected(String),
    /// The response arrived but could not be decoded.
    Decode(serde_json::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Transport(msg) => write!(f, "transport error: {msg}"),
            BackendError::Rejected(msg) => write!(f, "rejected by server: {msg}"),
            BackendError::Decode(e) => write!(f, "malformed response: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e)
    }
}

impl From<ureq::Error> for BackendError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                if (400..500).contains(&code) {
                    BackendError::Rejected(format!("{code}: {body}"))
                } else {
                    BackendError::Transport(format!("{code}: {body}"))
                }
            }
            ureq::Error::Transport(t) => BackendError::Transport(t.to_string()),
        }
    }
}

/// Request/response operations the messaging core consumes.
pub trait ChatBackend {
    /// Fetch summaries for every conversation the user participates in.
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError>;

    /// Load one conversation's message history, ordered by creation time.
    fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>, BackendError>;

    /// Persist an outbound message; returns the created message with its
    /// server-assigned id and timestamps.
    fn send_message(
        &self,
        conversation: &ConversationId,
        body: &str,
    ) -> Result<Message, BackendError>;

    /// Record that this client has observed a message it received.
    fn mark_delivered(&self, message: &MessageId) -> Result<(), BackendError>;

    /// Batch read-receipt for a whole conversation; returns the number of
    /// messages marked. Idempotent: marking with nothing unread is a no-op.
    fn mark_conversation_read(
        &self,
        conversation: &ConversationId,
    ) -> Result<u32, BackendError>;

    /// Publish (`true`) or clear (`false`) the typing signal.
    fn set_typing(&self, conversation: &ConversationId, is_typing: bool)
        -> Result<(), BackendError>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for &B {
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        (**self).list_conversations()
    }
    fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>, BackendError> {
        (**self).list_messages(conversation)
    }
    fn send_message(
        &self,
        conversation: &ConversationId,
        body: &str,
    ) -> Result<Message, BackendError> {
        (**self).send_message(conversation, body)
    }
    fn mark_delivered(&self, message: &MessageId) -> Result<(), BackendError> {
        (**self).mark_delivered(message)
    }
    fn mark_conversation_read(
        &self,
        conversation: &ConversationId,
    ) -> Result<u32, BackendError> {
        (**self).mark_conversation_read(conversation)
    }
    fn set_typing(
        &self,
        conversation: &ConversationId,
        is_typing: bool,
    ) -> Result<(), BackendError> {
        (**self).set_typing(conversation, is_typing)
    }
}

/// REST implementation of [`ChatBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct TypingBody {
    is_typing: bool,
}

#[derive(Deserialize)]
struct MarkedResponse {
    marked: u32,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let text = ureq::get(&format!("{}{}", self.base_url, path))
            .call()?
            .into_string()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: impl Serialize,
    ) -> Result<T, BackendError> {
        let value = serde_json::to_value(body)?;
        let text = ureq::post(&format!("{}{}", self.base_url, path))
            .send_json(value)?
            .into_string()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }

    fn post_ack(&self, path: &str, body: impl Serialize) -> Result<(), BackendError> {
        let value = serde_json::to_value(body)?;
        ureq::post(&format!("{}{}", self.base_url, path)).send_json(value)?;
        Ok(())
    }
}

impl ChatBackend for HttpBackend {
    fn list_conversations(&self) -> Result<Vec<ConversationSummary>, BackendError> {
        self.get_json("/conversations")
    }

    fn list_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>, BackendError> {
        self.get_json(&format!("/conversations/{}/messages", conversation.0))
    }

    fn send_message(
        &self,
        conversation: &ConversationId,
        body: &str,
    ) -> Result<Message, BackendError> {
        self.post_json(
            &format!("/conversations/{}/messages", conversation.0),
            SendBody { body },
        )
    }

    fn mark_delivered(&self, message: &MessageId) -> Result<(), BackendError> {
        self.post_ack(&format!("/messages/{}/delivered", message.0), serde_json::json!({}))
    }

    fn mark_conversation_read(
        &self,
        conversation: &ConversationId,
    ) -> Result<u32, BackendError> {
        let resp: MarkedResponse =
            self.post_json(&format!("/conversations/{}/read", conversation.0), serde_json::json!({}))?;
        Ok(resp.marked)
    }

    fn set_typing(
        &self,
        conversation: &ConversationId,
        is_typing: bool,
    ) -> Result<(), BackendError> {
        self.post_ack(
            &format!("/conversations/{}/typing", conversation.0),
            TypingBody { is_typing },
        )
    }
}
