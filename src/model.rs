//! Reply and submission status types shared by the dispatch server and the
//! workload driver.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Result of one command, serialized back to the caller. A business-level
/// failure travels here as `status: ERROR` with a message; it is never a
/// dropped message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Reply {
    pub fn ok(payload: Option<Value>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: None,
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
            payload: None,
        }
    }
}

/// Terminal outcome of one submission as observed by the driver: the status
/// code plus whatever body the reply carried.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitStatus {
    pub status: ReplyStatus,
    pub message: Option<String>,
    pub body: Option<Value>,
}

impl From<Reply> for SubmitStatus {
    fn from(reply: Reply) -> Self {
        Self {
            status: reply.status,
            message: reply.message,
            body: reply.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_serializes_without_empty_fields() {
        let json = serde_json::to_value(Reply::ok(None)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "OK"}));
    }

    #[test]
    fn error_reply_carries_message() {
        let json = serde_json::to_value(Reply::error("insufficient funds")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "ERROR", "message": "insufficient funds"})
        );
    }
}
