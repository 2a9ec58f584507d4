//! Outbound send pipeline.
//!
//! Orchestrates one submit: validation → typing clear → optimistic append →
//! network send → reconciliation or rollback. The pipeline runs to
//! completion synchronously, so two submits cannot race; the guard instead
//! covers the ambiguous aftermath: while an optimistic entry is still
//! awaiting confirmation, a further submit is dropped (ignored, not queued)
//! until the echo or the watchdog resolves it.

use crate::backend::{BackendError, ChatBackend};
use crate::rlog;
use crate::store::ConversationStore;
use crate::types::MessageId;
use crate::typing::TypingPublisher;
use crate::validation::{validate_outbound, ValidationRejection};

/// Pipeline state visible to the composer UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Composing,
    Sending,
}

/// Result of one submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Network call succeeded and the provisional entry was reconciled.
    Confirmed { message_id: MessageId },
    /// A previous send is still awaiting confirmation; this submit was
    /// dropped.
    InFlight,
    /// The gate refused the text; back to composing with the input
    /// preserved by the caller.
    Rejected(ValidationRejection),
    /// The send definitely did not go through; the provisional entry was
    /// rolled back and the composer text restored.
    Failed {
        reason: String,
        restored_text: String,
    },
    /// The response could not be decoded, so the outcome is ambiguous. The
    /// provisional entry stays pending for the realtime echo or the
    /// watchdog to resolve.
    AwaitingConfirmation { local_id: MessageId },
}

#[derive(Debug, Default)]
pub struct SendPipeline;

impl SendPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline phase, derived from the store: `Sending` while an optimistic
    /// entry is still awaiting confirmation.
    pub fn state(&self, store: &ConversationStore) -> SendState {
        if Self::outstanding(store) {
            SendState::Sending
        } else {
            SendState::Composing
        }
    }

    fn outstanding(store: &ConversationStore) -> bool {
        store.pending().iter().any(|p| !p.failed)
    }

    /// Run one submit through the pipeline.
    ///
    /// Entering the sending phase clears the typing signal (sending implies
    /// "stopped typing") before the network call, and optimistically appends
    /// to the store so the UI shows the message immediately.
    pub fn submit<B: ChatBackend>(
        &mut self,
        text: &str,
        privileged: bool,
        store: &mut ConversationStore,
        typing: &mut TypingPublisher,
        backend: &B,
        now: u64,
    ) -> SubmitOutcome {
        if Self::outstanding(store) {
            return SubmitOutcome::InFlight;
        }

        let body = match validate_outbound(text, privileged) {
            Ok(body) => body,
            Err(rejection) => {
                rlog!("send: rejected ({rejection})");
                return SubmitOutcome::Rejected(rejection);
            }
        };

        let conversation = store.conversation_id().clone();

        if typing.stop() == Some(false) {
            if let Err(e) = backend.set_typing(&conversation, false) {
                rlog!("send: typing clear failed (best-effort): {e}");
            }
        }

        let local_id = store.append_local(&body, now);

        let outcome = match backend.send_message(&conversation, &body) {
            Ok(server_message) => {
                let message_id = server_message.id.clone();
                store.reconcile(&local_id, server_message);
                rlog!(
                    "send: confirmed {} in {}",
                    crate::logging::msg_id(&message_id.0),
                    crate::logging::conv_id(&conversation.0)
                );
                SubmitOutcome::Confirmed { message_id }
            }
            Err(e @ BackendError::Decode(_)) => {
                rlog!(
                    "send: unconfirmed {} ({e}); awaiting echo or watchdog",
                    crate::logging::msg_id(&local_id.0)
                );
                SubmitOutcome::AwaitingConfirmation { local_id }
            }
            Err(e) => {
                let restored_text = store
                    .discard_local(&local_id)
                    .unwrap_or_else(|| body.clone());
                rlog!(
                    "send: failed in {} ({e}), rolled back",
                    crate::logging::conv_id(&conversation.0)
                );
                SubmitOutcome::Failed {
                    reason: e.to_string(),
                    restored_text,
                }
            }
        };

        outcome
    }
}
