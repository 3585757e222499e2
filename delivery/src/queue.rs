//! Durable per-user handoff for users without a live connection.

use async_stream::try_stream;
use futures::Stream;
use log::*;
use std::sync::Arc;

use crate::broker::Broker;
use crate::error::{queue_error, Error, QueueErrorKind};
use crate::message::Envelope;
use crate::seal::Sealer;

pub const DEFAULT_QUEUE_PREFIX: &str = "offline";

/// Bridges the router to a per-user offline queue on the broker.
///
/// Each user has exactly one logical queue, named `{prefix}.{user_id}`. When a
/// sealer is configured, payloads are sealed on the way in and opened on the
/// way out; otherwise they pass through unchanged.
#[derive(Clone)]
pub struct QueueBridge {
    broker: Arc<dyn Broker>,
    sealer: Option<Sealer>,
    prefix: String,
}

impl QueueBridge {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            sealer: None,
            prefix: DEFAULT_QUEUE_PREFIX.to_string(),
        }
    }

    pub fn with_sealer(mut self, sealer: Option<Sealer>) -> Self {
        self.sealer = sealer;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn queue_name(&self, user_id: &str) -> String {
        format!("{}.{}", self.prefix, user_id)
    }

    /// Publish `envelope` to the offline queue of `user_id`.
    pub async fn enqueue(&self, user_id: &str, mut envelope: Envelope) -> Result<(), Error> {
        // Queued copies are not addressed to any particular device.
        envelope.connection_id = None;

        let envelope = match &self.sealer {
            Some(sealer) => sealer
                .seal(envelope)
                .map_err(|e| queue_error(QueueErrorKind::PublishFailed, e))?,
            None => envelope,
        };

        let body = serde_json::to_vec(&envelope)
            .map_err(|e| queue_error(QueueErrorKind::PublishFailed, e))?;

        let queue = self.queue_name(user_id);
        self.broker
            .publish(&queue, body)
            .await
            .map_err(|e| queue_error(QueueErrorKind::PublishFailed, e))?;

        debug!("Queued {:?} envelope on {}", envelope.kind, queue);
        Ok(())
    }

    /// Lazily drain the offline queue of `user_id`.
    ///
    /// The stream ends once the queue is empty, at which point the queue is
    /// deleted. A fresh call starts a fresh drain. A message that cannot be
    /// decoded ends the stream with `DrainFailed`; it has already been taken
    /// off the queue, so the next drain continues after it.
    pub fn drain(&self, user_id: &str) -> impl Stream<Item = Result<Envelope, Error>> + Send + 'static {
        let broker = self.broker.clone();
        let sealer = self.sealer.clone();
        let queue = self.queue_name(user_id);

        try_stream! {
            let mut drained = 0usize;
            loop {
                let body = broker
                    .consume(&queue)
                    .await
                    .map_err(|e| queue_error(QueueErrorKind::DrainFailed, e))?;

                let Some(body) = body else { break };

                let envelope: Envelope = serde_json::from_slice(&body)
                    .map_err(|e| queue_error(QueueErrorKind::DrainFailed, e))?;

                let envelope = match &sealer {
                    Some(sealer) => sealer
                        .open(envelope)
                        .map_err(|e| queue_error(QueueErrorKind::DrainFailed, e))?,
                    None => envelope,
                };

                drained += 1;
                yield envelope;
            }

            let deleted = broker
                .delete_if_empty(&queue)
                .await
                .map_err(|e| queue_error(QueueErrorKind::DrainFailed, e))?;

            debug!(
                "Drained {} envelope(s) from {} (deleted: {})",
                drained, queue, deleted
            );
        }
    }
}
