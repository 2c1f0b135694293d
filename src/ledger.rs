//! Seam to the external Ledger Engine, the collaborator that owns account
//! and position state and executes the business effect of a command.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::command::Command;

/// Business-level failure. This is not a protocol error: the dispatch server
/// still replies (as an error status) and acknowledges the envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("command rejected: {0}")]
    Rejected(String),
    #[error("ledger internal failure: {0}")]
    Internal(String),
}

/// Executes one command against account/position state.
///
/// Delivery is at-least-once: a redelivered envelope reaches this trait with
/// the same `seq` (the originating workload line number) as the first
/// delivery, and implementations must treat a repeat of an already-applied
/// `(seq, user)` pair as not a new event.
///
/// Implementations must be safe for concurrent invocation on independent
/// accounts when the dispatch credit is raised above 1.
#[async_trait]
pub trait LedgerEngine: Send + Sync {
    async fn execute(&self, seq: Option<u64>, command: &Command)
        -> Result<Option<Value>, LedgerError>;
}

/// Stand-in engine wired into the server binary until a real ledger service
/// is attached. Accepts every command and echoes its identity back.
pub struct EchoLedger;

#[async_trait]
impl LedgerEngine for EchoLedger {
    async fn execute(
        &self,
        seq: Option<u64>,
        command: &Command,
    ) -> Result<Option<Value>, LedgerError> {
        Ok(Some(serde_json::json!({
            "kind": command.kind(),
            "seq": seq,
        })))
    }
}
