//! Workload driver: streams a workload file line by line, decodes each
//! instruction, and submits it over a `SubmitChannel`, strictly one line at
//! a time so file order is the effective request order.
//!
//! A bad line is an expected, recoverable condition: it is recorded with its
//! line number and raw text, and the run continues. Transport failures are
//! retried with a fixed backoff before the line is given up on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, BufRead};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::command::{Command, DecodeError};
use crate::model::SubmitStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("failed to subscribe for replies: {0}")]
    Subscribe(String),
    #[error("failed to encode command envelope: {0}")]
    Encode(String),
    #[error("broker did not accept the command envelope: {0}")]
    Publish(String),
    #[error("timed out waiting for a correlated reply")]
    Timeout,
    #[error("reply payload was not valid JSON: {0}")]
    BadReply(String),
    #[error("broker connection closed while awaiting a reply")]
    ConnectionClosed,
}

/// Submission channel to the processing service. Every submission yields
/// exactly one terminal status before the driver moves to the next line.
#[async_trait]
pub trait SubmitChannel: Send + Sync {
    async fn submit(&self, seq: u64, command: &Command) -> Result<SubmitStatus, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per line, including the first.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Completed(SubmitStatus),
    DecodeFailed(DecodeError),
    TransportFailed { attempts: u32, last: TransportError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineReport {
    /// 1-based line number in the workload file.
    pub seq: u64,
    pub raw: String,
    pub outcome: LineOutcome,
}

#[derive(Debug)]
pub struct WorkloadReport {
    pub lines: Vec<LineReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkloadReport {
    pub fn completed(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| matches!(l.outcome, LineOutcome::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.lines.len() - self.completed()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &LineReport> {
        self.lines
            .iter()
            .filter(|l| !matches!(l.outcome, LineOutcome::Completed(_)))
    }
}

/// Replay a workload against `channel`. Blank lines are skipped; every other
/// line produces exactly one report entry. The exit policy is the caller's.
pub async fn run_workload<R: BufRead>(
    reader: R,
    channel: &dyn SubmitChannel,
    retry: &RetryPolicy,
) -> io::Result<WorkloadReport> {
    let started_at = Utc::now();
    let mut lines = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let raw = line?;
        let seq = (idx + 1) as u64;
        if raw.trim().is_empty() {
            continue;
        }

        let outcome = match Command::decode(&raw) {
            Ok(command) => {
                info!(seq, kind = command.kind(), "submitting command");
                submit_with_retry(channel, seq, &command, retry).await
            }
            Err(e) => {
                warn!(seq, raw = %raw, error = %e, "skipping undecodable workload line");
                LineOutcome::DecodeFailed(e)
            }
        };

        match &outcome {
            LineOutcome::Completed(status) => {
                info!(seq, status = ?status.status, "submission completed");
            }
            LineOutcome::TransportFailed { attempts, last } => {
                warn!(seq, attempts, error = %last, "giving up on line after transport failures");
            }
            LineOutcome::DecodeFailed(_) => {}
        }

        lines.push(LineReport { seq, raw, outcome });
    }

    Ok(WorkloadReport {
        lines,
        started_at,
        finished_at: Utc::now(),
    })
}

async fn submit_with_retry(
    channel: &dyn SubmitChannel,
    seq: u64,
    command: &Command,
    retry: &RetryPolicy,
) -> LineOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match channel.submit(seq, command).await {
            Ok(status) => return LineOutcome::Completed(status),
            Err(e) if attempt < retry.attempts => {
                warn!(seq, attempt, error = %e, "submission failed, retrying");
                tokio::time::sleep(retry.backoff).await;
            }
            Err(e) => {
                return LineOutcome::TransportFailed {
                    attempts: attempt,
                    last: e,
                };
            }
        }
    }
}
