// Canonical subject, stream, and header catalog for the dispatch service.
// This file is the source of truth for the names both binaries default to;
// overrides come from Settings.

// -----------------------------------------------------------------------------
// WORK QUEUE
// -----------------------------------------------------------------------------

pub const CMD_STREAM: &str = "TRADE_COMMANDS";
pub const CMD_SUBJECT: &str = "trade.cmd.request.v1";
pub const CMD_CONSUMER: &str = "TRADE_DISPATCH_WORKER";

// -----------------------------------------------------------------------------
// ENVELOPE HEADERS
// -----------------------------------------------------------------------------

/// Subject the reply must be published to, unchanged.
pub const HDR_REPLY_TO: &str = "Trade-Reply-To";
/// Opaque correlation token, copied verbatim from request to reply.
pub const HDR_CORRELATION_ID: &str = "Trade-Correlation-Id";
/// Originating workload line number; stable across retries and redeliveries,
/// so the ledger can key idempotency on it.
pub const HDR_COMMAND_SEQ: &str = "Trade-Command-Seq";
