use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::Error;
use crate::model::{Message, NewMessage};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, Error>;
}
