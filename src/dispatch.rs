//! Dispatch server: turns the shared command work queue into a correlated
//! RPC mechanism on top of the broker.
//!
//! Per envelope: deserialize the body, invoke the Ledger Engine, publish the
//! reply to the envelope's reply-to subject tagged with its correlation
//! token, and only then acknowledge the delivery. An unparsable envelope is
//! acknowledged without a reply so it cannot loop through redelivery
//! forever. An envelope whose reply never reaches the broker stays
//! unacknowledged and is redelivered.

use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::command::Command;
use crate::config::Settings;
use crate::envelope::{EnvelopeFsm, EnvelopeState};
use crate::ledger::LedgerEngine;
use crate::model::Reply;
use crate::subjects;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolViolation {
    #[error("envelope carries no headers")]
    MissingHeaders,
    #[error("envelope is missing the {0} header")]
    MissingHeader(&'static str),
    #[error("envelope body is not a valid wire command: {0}")]
    BadBody(String),
}

/// Routing metadata lifted from an envelope's headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRoute {
    pub reply_to: String,
    pub corr_id: String,
    pub seq: Option<u64>,
}

/// Extract the reply route from an envelope's headers. The reply subject and
/// correlation token are mandatory; the sequence header is advisory.
pub fn reply_route(headers: Option<&async_nats::HeaderMap>) -> Result<ReplyRoute, ProtocolViolation> {
    let headers = headers.ok_or(ProtocolViolation::MissingHeaders)?;
    let reply_to = headers
        .get(subjects::HDR_REPLY_TO)
        .map(|v| v.as_str().to_string())
        .ok_or(ProtocolViolation::MissingHeader(subjects::HDR_REPLY_TO))?;
    let corr_id = headers
        .get(subjects::HDR_CORRELATION_ID)
        .map(|v| v.as_str().to_string())
        .ok_or(ProtocolViolation::MissingHeader(
            subjects::HDR_CORRELATION_ID,
        ))?;
    let seq = headers
        .get(subjects::HDR_COMMAND_SEQ)
        .and_then(|v| v.as_str().parse().ok());
    Ok(ReplyRoute {
        reply_to,
        corr_id,
        seq,
    })
}

/// Decode an envelope body into a command, rejecting illegal field sets.
pub fn decode_envelope(payload: &[u8]) -> Result<Command, ProtocolViolation> {
    let wire: crate::command::WireCommand =
        serde_json::from_slice(payload).map_err(|e| ProtocolViolation::BadBody(e.to_string()))?;
    Command::try_from(wire).map_err(|e| ProtocolViolation::BadBody(e.to_string()))
}

/// Start the dispatch consumer loop. Returns a handle to the consumer task.
///
/// The connection and the ledger are constructed by the caller and passed
/// down, so tests can substitute fakes for either.
pub async fn start_dispatch(
    client: async_nats::Client,
    ledger: Arc<dyn LedgerEngine>,
    settings: Settings,
) -> Result<tokio::task::JoinHandle<()>, Box<dyn std::error::Error + Send + Sync>> {
    let jetstream = async_nats::jetstream::new(client.clone());

    let stream_name = settings.stream();
    let subject = settings.subject();

    let stream = match jetstream.get_stream(&stream_name).await {
        Ok(s) => s,
        Err(_) => {
            info!("Creating JetStream stream: {}", stream_name);
            jetstream
                .create_stream(async_nats::jetstream::stream::Config {
                    name: stream_name.clone(),
                    subjects: vec![subject.clone()],
                    storage: async_nats::jetstream::stream::StorageType::File,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    error!("Failed to create JetStream stream: {}", e);
                    e
                })?
        }
    };

    let credit = settings.credit();
    let consumer_name = settings.consumer();

    // max_ack_pending is the broker-side half of the processing credit; the
    // semaphore below is the in-process half.
    let consumer = stream
        .create_consumer(async_nats::jetstream::consumer::pull::Config {
            durable_name: Some(consumer_name.clone()),
            filter_subject: subject.clone(),
            ack_policy: async_nats::jetstream::consumer::AckPolicy::Explicit,
            max_ack_pending: credit as i64,
            ..Default::default()
        })
        .await
        .map_err(|e| {
            error!("Failed to create JetStream consumer: {}", e);
            e
        })?;

    info!(
        "Dispatch consumer '{}' listening on '{}' with credit {}",
        consumer_name, subject, credit
    );

    let mut messages = consumer.messages().await.map_err(|e| {
        error!("Failed to get messages stream: {}", e);
        e
    })?;

    let workers = Arc::new(Semaphore::new(credit));

    let handle = tokio::spawn(async move {
        while let Some(delivery) = messages.next().await {
            match delivery {
                Ok(msg) => {
                    let permit = match workers.clone().acquire_owned().await {
                        Ok(p) => p,
                        // Closed only on shutdown
                        Err(_) => break,
                    };
                    let client = client.clone();
                    let ledger = ledger.clone();
                    tokio::spawn(async move {
                        process_delivery(&client, ledger.as_ref(), msg).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error receiving delivery from the work queue: {}", e);
                }
            }
        }
    });

    Ok(handle)
}

async fn process_delivery(
    client: &async_nats::Client,
    ledger: &dyn LedgerEngine,
    msg: async_nats::jetstream::Message,
) {
    let route = match reply_route(msg.headers.as_ref()) {
        Ok(route) => route,
        Err(violation) => {
            // No reply possible: the caller's identity is unknown. Ack so
            // the envelope does not loop through redelivery.
            warn!(error = %violation, "protocol violation, acknowledging without reply");
            ack_dead_envelope(&msg).await;
            return;
        }
    };

    let mut fsm = EnvelopeFsm::new(route.corr_id.clone());
    let step = |fsm: &mut EnvelopeFsm, next| {
        if let Err(e) = fsm.advance(next) {
            error!(error = %e, "envelope state machine violated");
        }
    };

    let command = match decode_envelope(&msg.payload) {
        Ok(command) => {
            step(&mut fsm, EnvelopeState::Decoded);
            command
        }
        Err(violation) => {
            warn!(
                corr_id = %route.corr_id,
                error = %violation,
                "undecodable envelope body, acknowledging without reply"
            );
            step(&mut fsm, EnvelopeState::DecodeFailed);
            ack_dead_envelope(&msg).await;
            step(&mut fsm, EnvelopeState::Acknowledged);
            return;
        }
    };

    info!(
        corr_id = %route.corr_id,
        seq = route.seq,
        kind = command.kind(),
        "command received"
    );

    // A ledger failure is still a reply, never a dropped message.
    let reply = match ledger.execute(route.seq, &command).await {
        Ok(payload) => Reply::ok(payload),
        Err(e) => {
            warn!(corr_id = %route.corr_id, error = %e, "ledger reported failure");
            Reply::error(e.to_string())
        }
    };
    step(&mut fsm, EnvelopeState::Processed);

    let body = match serde_json::to_vec(&reply) {
        Ok(body) => body,
        Err(e) => {
            // Leave unacknowledged; the envelope will be redelivered.
            error!(corr_id = %route.corr_id, error = %e, "failed to serialize reply");
            return;
        }
    };

    let mut headers = async_nats::HeaderMap::new();
    headers.insert(subjects::HDR_CORRELATION_ID, route.corr_id.as_str());

    if let Err(e) = client
        .publish_with_headers(route.reply_to.clone(), headers, body.into())
        .await
    {
        error!(
            corr_id = %route.corr_id,
            error = %e,
            "failed to publish reply, leaving envelope for redelivery"
        );
        return;
    }
    // The reply must be on the broker before the ack, or a crash between the
    // two could lose the command without the caller ever hearing it ran.
    if let Err(e) = client.flush().await {
        error!(
            corr_id = %route.corr_id,
            error = %e,
            "failed to flush reply, leaving envelope for redelivery"
        );
        return;
    }
    step(&mut fsm, EnvelopeState::ReplyPublished);

    match msg.ack().await {
        Ok(()) => {
            step(&mut fsm, EnvelopeState::Acknowledged);
            info!(corr_id = %route.corr_id, "command acknowledged");
        }
        Err(e) => {
            error!(corr_id = %route.corr_id, error = %e, "failed to acknowledge envelope");
        }
    }
}

async fn ack_dead_envelope(msg: &async_nats::jetstream::Message) {
    if let Err(e) = msg.ack().await {
        error!(error = %e, "failed to acknowledge dead envelope");
    }
}
