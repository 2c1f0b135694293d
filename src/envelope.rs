//! Envelope lifecycle FSM for the dispatch server.
//!
//! Acknowledge-after-reply is a real sequencing requirement, so the per
//! envelope steps are driven through an explicit linear state machine
//! instead of relying on statement order.
//!
//! State diagram:
//! ```text
//!   Received → Decoded → Processed → ReplyPublished → Acknowledged
//!       ↓
//!   DecodeFailed → Acknowledged
//!
//!   Terminal state: Acknowledged
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeState {
    /// Delivery accepted from the work queue.
    Received,
    /// Body deserialized into a well-formed command.
    Decoded,
    /// Body or headers were unusable; the envelope will be acknowledged
    /// without a reply to end the redelivery loop.
    DecodeFailed,
    /// Ledger Engine produced a result (success or typed failure).
    Processed,
    /// Reply accepted by the broker.
    ReplyPublished,
    /// Input envelope acknowledged — terminal.
    Acknowledged,
}

impl EnvelopeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }

    pub fn valid_transitions(&self) -> &'static [EnvelopeState] {
        use EnvelopeState::*;
        match self {
            Received => &[Decoded, DecodeFailed],
            Decoded => &[Processed],
            DecodeFailed => &[Acknowledged],
            Processed => &[ReplyPublished],
            ReplyPublished => &[Acknowledged],
            Acknowledged => &[],
        }
    }

    pub fn can_transition_to(&self, next: &EnvelopeState) -> bool {
        self.valid_transitions().contains(next)
    }
}

impl fmt::Display for EnvelopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("illegal envelope transition {0} → {1}")]
    IllegalTransition(EnvelopeState, EnvelopeState),
}

/// Tracks one envelope through its lifecycle with transition enforcement.
#[derive(Debug, Clone)]
pub struct EnvelopeFsm {
    pub corr_id: String,
    pub state: EnvelopeState,
}

impl EnvelopeFsm {
    pub fn new(corr_id: impl Into<String>) -> Self {
        Self {
            corr_id: corr_id.into(),
            state: EnvelopeState::Received,
        }
    }

    pub fn advance(&mut self, next: EnvelopeState) -> Result<(), StateError> {
        if !self.state.can_transition_to(&next) {
            return Err(StateError::IllegalTransition(self.state, next));
        }
        debug!(
            corr_id = %self.corr_id,
            from = %self.state,
            to = %next,
            "envelope transition"
        );
        self.state = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
