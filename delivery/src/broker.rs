//! Message-broker primitives used by the offline queue bridge.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Named-queue broker. Consuming a message removes it, so each message is
/// handed to at most one consumer.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append `body` to `queue`, declaring the queue if needed.
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError>;

    /// Take the oldest message from `queue`, or `None` when it is empty or
    /// does not exist.
    async fn consume(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError>;

    /// Delete `queue` if it holds no messages. Returns whether it was deleted.
    async fn delete_if_empty(&self, queue: &str) -> Result<bool, BrokerError>;
}

/// In-process broker keeping one deque per queue name.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    queues: DashMap<String, VecDeque<Vec<u8>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_exists(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.queues.get(queue).map_or(0, |q| q.len())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(body);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        Ok(self
            .queues
            .get_mut(queue)
            .and_then(|mut q| q.pop_front()))
    }

    async fn delete_if_empty(&self, queue: &str) -> Result<bool, BrokerError> {
        Ok(self.queues.remove_if(queue, |_, q| q.is_empty()).is_some())
    }
}
