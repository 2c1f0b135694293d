//! Broker-backed submission channel: publishes command envelopes onto the
//! work queue and awaits the correlated reply on a private inbox.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::command::Command;
use crate::context::IdProvider;
use crate::model::{Reply, SubmitStatus};
use crate::subjects;
use crate::workload::{SubmitChannel, TransportError};

pub struct NatsSubmitter {
    client: async_nats::Client,
    jetstream: async_nats::jetstream::Context,
    ids: Arc<dyn IdProvider>,
    subject: String,
    reply_timeout: Duration,
}

impl NatsSubmitter {
    pub fn new(
        client: async_nats::Client,
        ids: Arc<dyn IdProvider>,
        subject: String,
        reply_timeout: Duration,
    ) -> Self {
        let jetstream = async_nats::jetstream::new(client.clone());
        Self {
            client,
            jetstream,
            ids,
            subject,
            reply_timeout,
        }
    }
}

#[async_trait]
impl SubmitChannel for NatsSubmitter {
    async fn submit(&self, seq: u64, command: &Command) -> Result<SubmitStatus, TransportError> {
        let corr_id = self.ids.new_id();
        let inbox = self.client.new_inbox();

        let mut replies = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;
        // The reply subscription must be live on the broker before the
        // server can answer, or the reply races past us.
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let body = serde_json::to_vec(&command.to_wire())
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(subjects::HDR_REPLY_TO, inbox.as_str());
        headers.insert(subjects::HDR_CORRELATION_ID, corr_id.as_str());
        headers.insert(subjects::HDR_COMMAND_SEQ, seq.to_string().as_str());

        // The publish ack is the broker-accepted signal; without it the
        // submission counts as a transport failure and may be retried.
        self.jetstream
            .publish_with_headers(self.subject.clone(), headers, body.into())
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        debug!(seq, corr_id = %corr_id, "envelope accepted by broker, awaiting reply");

        let deadline = tokio::time::sleep(self.reply_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                maybe = replies.next() => match maybe {
                    Some(msg) => {
                        let matches = msg
                            .headers
                            .as_ref()
                            .and_then(|h| h.get(subjects::HDR_CORRELATION_ID))
                            .map(|v| v.as_str() == corr_id)
                            .unwrap_or(false);
                        if !matches {
                            // Not ours; keep waiting out the deadline.
                            continue;
                        }
                        let reply: Reply = serde_json::from_slice(&msg.payload)
                            .map_err(|e| TransportError::BadReply(e.to_string()))?;
                        return Ok(reply.into());
                    }
                    None => return Err(TransportError::ConnectionClosed),
                },
                _ = &mut deadline => return Err(TransportError::Timeout),
            }
        }
    }
}
