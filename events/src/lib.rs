//! Event system infrastructure for the chat core.
//!
//! Workflows in the `domain` crate publish a [`DomainEvent`] once every step
//! has committed. Handlers (the delivery router's handler in production)
//! turn those events into per-recipient notifications.
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Entity data is carried as serialized JSON values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// User ids are opaque strings issued by the user service.
pub type UserId = String;

/// A user that should be notified about an event, along with that user's
/// "silent notification" preference for the relation or group involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: UserId,
    pub silent: bool,
}

impl Recipient {
    pub fn new(user_id: impl Into<UserId>, silent: bool) -> Self {
        Self {
            user_id: user_id.into(),
            silent,
        }
    }

    pub fn loud(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, false)
    }
}

/// Domain events that represent business-level changes in the system.
/// These events are emitted when a workflow has fully committed.
///
/// The domain layer resolves recipients (and their silent flags) before
/// publishing; handlers never look them up again.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A message was persisted in a dialog.
    MessageSent {
        dialog_id: String,
        /// True when the dialog belongs to a group.
        group: bool,
        message: Value,
        sender_id: UserId,
        /// Connection the sender wrote from, so the sender's other devices
        /// get a copy but the originating one does not.
        origin_connection: Option<u64>,
        recipients: Vec<Recipient>,
    },
    /// A friend request was stored and the receiver should be told.
    FriendRequestSent {
        request: Value,
        sender_id: UserId,
        recipients: Vec<Recipient>,
    },
    /// A friend request was accepted; relation rows and the shared dialog exist.
    FriendRequestAccepted {
        request: Value,
        dialog_id: String,
        sender_id: UserId,
        recipients: Vec<Recipient>,
    },
    /// A group and its dialog were created.
    GroupCreated {
        group: Value,
        dialog_id: String,
        sender_id: UserId,
        recipients: Vec<Recipient>,
    },
    /// A user joined an existing group.
    GroupMemberJoined {
        group_id: String,
        member: Value,
        sender_id: UserId,
        recipients: Vec<Recipient>,
    },
}

impl DomainEvent {
    pub fn recipients(&self) -> &[Recipient] {
        match self {
            DomainEvent::MessageSent { recipients, .. }
            | DomainEvent::FriendRequestSent { recipients, .. }
            | DomainEvent::FriendRequestAccepted { recipients, .. }
            | DomainEvent::GroupCreated { recipients, .. }
            | DomainEvent::GroupMemberJoined { recipients, .. } => recipients,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            DomainEvent::MessageSent { sender_id, .. }
            | DomainEvent::FriendRequestSent { sender_id, .. }
            | DomainEvent::FriendRequestAccepted { sender_id, .. }
            | DomainEvent::GroupCreated { sender_id, .. }
            | DomainEvent::GroupMemberJoined { sender_id, .. } => sender_id,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like sending notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are called sequentially and own their error handling.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
