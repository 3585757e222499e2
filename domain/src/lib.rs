//! Domain workflows for the chat platform.
//!
//! Each operation that touches more than one service's data is expressed as a
//! saga workflow over the collaborator [`gateway`] traits and executed by the
//! shared [`saga::Coordinator`]. Only after a workflow commits does the
//! operation publish a [`events::DomainEvent`] naming the users to notify.
//!
//! Domain checks ("is this request still pending", "is the sender in the
//! dialog") are explicit error returns made before any workflow starts.

use events::EventPublisher;
use saga::Coordinator;
use std::sync::Arc;

pub mod error;
pub mod friend;
pub mod gateway;
pub mod group;
pub mod message;
pub mod model;
pub mod notify;

mod steps;

#[cfg(test)]
mod test_support;

use gateway::{DialogGateway, GroupGateway, MessageGateway, RelationGateway};

/// Everything a workflow needs: collaborator clients, the coordinator and
/// the publisher used to notify users once the workflow commits.
#[derive(Clone)]
pub struct Context {
    pub relations: Arc<dyn RelationGateway>,
    pub groups: Arc<dyn GroupGateway>,
    pub dialogs: Arc<dyn DialogGateway>,
    pub messages: Arc<dyn MessageGateway>,
    pub publisher: EventPublisher,
    pub coordinator: Coordinator,
}

impl Context {
    pub fn new(
        relations: Arc<dyn RelationGateway>,
        groups: Arc<dyn GroupGateway>,
        dialogs: Arc<dyn DialogGateway>,
        messages: Arc<dyn MessageGateway>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            relations,
            groups,
            dialogs,
            messages,
            publisher,
            coordinator: Coordinator::new(),
        }
    }
}
