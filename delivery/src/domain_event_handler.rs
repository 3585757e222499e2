use crate::message::{Envelope, EventKind};
use crate::router::Router;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler, Recipient};
use futures::future::join_all;
use log::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handles domain events by converting them to envelopes and routing one
/// per recipient.
///
/// The domain layer determines which users should be notified, and whether
/// each of them muted the conversation, and includes that in the event. This
/// handler only builds envelopes and hands them to the router with offline
/// queueing enabled.
pub struct DeliveryEventHandler {
    router: Arc<Router>,
}

impl DeliveryEventHandler {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    async fn send_to_recipients(
        &self,
        kind: EventKind,
        data: Value,
        sender_id: &str,
        origin_connection: Option<u64>,
        recipients: &[Recipient],
    ) {
        let routes = recipients.iter().map(|recipient| {
            let envelope = Envelope::new(recipient.user_id.clone(), kind, data.clone())
                .from_sender(sender_id)
                .from_connection(origin_connection.map(Into::into))
                .silent(recipient.silent);
            async move {
                let outcome = self.router.route(envelope, true).await;
                (recipient, outcome)
            }
        });

        for (recipient, outcome) in join_all(routes).await {
            match outcome {
                Ok(delivery) => trace!(
                    "Routed {:?} to user {}: {:?}",
                    kind,
                    recipient.user_id,
                    delivery
                ),
                Err(e) => error!(
                    "Failed to route {:?} to user {}: {}",
                    kind, recipient.user_id, e
                ),
            }
        }

        debug!(
            "Routed {:?} from {} to {} recipient(s)",
            kind,
            sender_id,
            recipients.len()
        );
    }
}

#[async_trait]
impl EventHandler for DeliveryEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::MessageSent {
                dialog_id,
                group,
                message,
                sender_id,
                origin_connection,
                recipients,
            } => {
                debug!("Handling MessageSent event for dialog {}", dialog_id);

                let kind = if *group {
                    EventKind::GroupMessage
                } else {
                    EventKind::NewMessage
                };
                let data = json!({ "dialog_id": dialog_id, "message": message });

                self.send_to_recipients(kind, data, sender_id, *origin_connection, recipients)
                    .await;
            }

            DomainEvent::FriendRequestSent {
                request,
                sender_id,
                recipients,
            } => {
                debug!("Handling FriendRequestSent event from {}", sender_id);

                self.send_to_recipients(
                    EventKind::FriendRequest,
                    json!({ "request": request }),
                    sender_id,
                    None,
                    recipients,
                )
                .await;
            }

            DomainEvent::FriendRequestAccepted {
                request,
                dialog_id,
                sender_id,
                recipients,
            } => {
                debug!("Handling FriendRequestAccepted event for dialog {}", dialog_id);

                self.send_to_recipients(
                    EventKind::FriendAccepted,
                    json!({ "request": request, "dialog_id": dialog_id }),
                    sender_id,
                    None,
                    recipients,
                )
                .await;
            }

            DomainEvent::GroupCreated {
                group,
                dialog_id,
                sender_id,
                recipients,
            } => {
                debug!("Handling GroupCreated event for dialog {}", dialog_id);

                self.send_to_recipients(
                    EventKind::GroupCreated,
                    json!({ "group": group, "dialog_id": dialog_id }),
                    sender_id,
                    None,
                    recipients,
                )
                .await;
            }

            DomainEvent::GroupMemberJoined {
                group_id,
                member,
                sender_id,
                recipients,
            } => {
                debug!("Handling GroupMemberJoined event for group {}", group_id);

                self.send_to_recipients(
                    EventKind::GroupMemberJoined,
                    json!({ "group_id": group_id, "member": member }),
                    sender_id,
                    None,
                    recipients,
                )
                .await;
            }
        }
    }
}
