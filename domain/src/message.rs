//! Sending a message to a dialog.

use events::DomainEvent;
use log::*;
use saga::{Step, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::Error;
use crate::gateway::MessageGateway;
use crate::model::{DialogKind, Message, NewMessage};
use crate::steps;
use crate::{notify, Context};

const PERSIST_MESSAGE: &str = "persist_message";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    pub dialog_id: String,
    pub sender_id: String,
    pub content: Value,
    /// Connection the message was written from, excluded from delivery.
    pub origin_connection: Option<u64>,
}

/// Persist a message and fan it out to every dialog member.
///
/// Members who closed the dialog get it reopened first; if persisting then
/// fails, those dialogs are closed again. Silent flags are resolved before
/// the workflow starts so a failed lookup changes nothing.
pub async fn send(ctx: &Context, params: SendMessage) -> Result<Message, Error> {
    let dialog = ctx
        .dialogs
        .get_dialog(&params.dialog_id)
        .await?
        .ok_or_else(|| Error::not_found("dialog"))?;
    let users = ctx.dialogs.get_dialog_users_by_dialog_id(&dialog.id).await?;
    if !users.iter().any(|u| u.user_id == params.sender_id) {
        return Err(Error::invalid("sender is not a member of the dialog"));
    }

    let recipients = notify::dialog_recipients(ctx, &dialog, &users, &params.sender_id).await?;

    let mut workflow = Workflow::new(format!("send_message:{}", dialog.id));
    for user in users.iter().filter(|u| !u.visible) {
        workflow = workflow.step(steps::reopen_dialog(
            ctx.dialogs.clone(),
            dialog.id.clone(),
            user.user_id.clone(),
        ));
    }
    workflow = workflow.step(persist_step(
        ctx.messages.clone(),
        NewMessage {
            dialog_id: dialog.id.clone(),
            sender_id: params.sender_id.clone(),
            content: params.content,
        },
    ));

    let responses = ctx.coordinator.execute(&mut workflow).await?;
    let message: Message = responses.get_as(PERSIST_MESSAGE)?;
    trace!(
        "Message {} persisted in dialog {} for {} recipient(s)",
        message.id,
        dialog.id,
        recipients.len()
    );

    ctx.publisher
        .publish(DomainEvent::MessageSent {
            dialog_id: dialog.id.clone(),
            group: dialog.kind == DialogKind::Group,
            message: serde_json::to_value(&message)?,
            sender_id: params.sender_id,
            origin_connection: params.origin_connection,
            recipients,
        })
        .await;

    Ok(message)
}

// Last step of the workflow, so it never needs undoing.
fn persist_step(messages: Arc<dyn MessageGateway>, message: NewMessage) -> Step {
    Step::new(PERSIST_MESSAGE, move |_| {
        let messages = messages.clone();
        let message = message.clone();
        async move { messages.persist_message(message).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, InternalErrorKind};
    use crate::gateway::dialog::MockDialogGateway;
    use crate::gateway::group::MockGroupGateway;
    use crate::gateway::message::MockMessageGateway;
    use crate::gateway::relation::MockRelationGateway;
    use crate::model::{Dialog, DialogUser};
    use crate::test_support::{context, FakeServices};
    use events::{EventPublisher, Recipient};
    use serde_json::json;

    fn params(sender_id: &str) -> SendMessage {
        SendMessage {
            dialog_id: "d1".to_string(),
            sender_id: sender_id.to_string(),
            content: json!({ "text": "hello" }),
            origin_connection: Some(7),
        }
    }

    #[tokio::test]
    async fn send_persists_and_notifies_members_with_mute() {
        let fake = FakeServices::new();
        fake.add_dialog("d1", DialogKind::Direct, None, &[("alice", true), ("bob", true)]);
        fake.add_relation("bob", "alice", true);
        let (ctx, recorded) = context(&fake);

        let message = send(&ctx, params("alice")).await.unwrap();

        assert_eq!(message.dialog_id, "d1");
        assert_eq!(fake.calls(), vec!["persist_message:d1,alice"]);

        let events = recorded.events();
        match &events[0] {
            DomainEvent::MessageSent {
                group,
                origin_connection,
                recipients,
                ..
            } => {
                assert!(!group);
                assert_eq!(*origin_connection, Some(7));
                assert_eq!(
                    recipients,
                    &vec![Recipient::loud("alice"), Recipient::new("bob", true)]
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_reopens_closed_dialogs_first() {
        let fake = FakeServices::new();
        fake.add_dialog("d1", DialogKind::Direct, None, &[("alice", true), ("bob", false)]);
        let (ctx, _recorded) = context(&fake);

        send(&ctx, params("alice")).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec!["set_visible:d1,bob,true", "persist_message:d1,alice"]
        );
        assert!(fake.dialog_user("d1", "bob").unwrap().visible);
    }

    #[tokio::test]
    async fn failed_persist_closes_reopened_dialogs() {
        let fake = FakeServices::new();
        fake.add_dialog("d1", DialogKind::Direct, None, &[("alice", true), ("bob", false)]);
        fake.fail_on("persist_message");
        let (ctx, recorded) = context(&fake);

        let err = send(&ctx, params("alice")).await.unwrap_err();

        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Workflow(_))
        ));
        assert!(!fake.dialog_user("d1", "bob").unwrap().visible);
        assert_eq!(fake.message_count(), 0);
        assert!(recorded.events().is_empty());
    }

    #[tokio::test]
    async fn group_dialog_uses_group_mutes() {
        let fake = FakeServices::new();
        fake.add_group("g1", "alice");
        fake.add_member("g1", "bob", true);
        fake.add_dialog("d1", DialogKind::Group, Some("g1"), &[("alice", true), ("bob", true)]);
        let (ctx, recorded) = context(&fake);

        send(&ctx, params("alice")).await.unwrap();

        let events = recorded.events();
        assert!(matches!(events[0], DomainEvent::MessageSent { group: true, .. }));
        assert_eq!(
            events[0].recipients(),
            &[Recipient::loud("alice"), Recipient::new("bob", true)]
        );
    }

    #[tokio::test]
    async fn non_member_cannot_send() {
        let mut dialogs = MockDialogGateway::new();
        dialogs.expect_get_dialog().returning(|id| {
            Ok(Some(Dialog {
                id: id.to_string(),
                kind: DialogKind::Direct,
                group_id: None,
            }))
        });
        dialogs
            .expect_get_dialog_users_by_dialog_id()
            .returning(|id| {
                Ok(vec![DialogUser {
                    dialog_id: id.to_string(),
                    user_id: "alice".to_string(),
                    visible: true,
                }])
            });
        let mut messages = MockMessageGateway::new();
        messages.expect_persist_message().never();

        let ctx = Context::new(
            Arc::new(MockRelationGateway::new()),
            Arc::new(MockGroupGateway::new()),
            Arc::new(dialogs),
            Arc::new(messages),
            EventPublisher::new(),
        );

        let err = send(&ctx, params("mallory")).await.unwrap_err();
        assert!(matches!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Invalid(_))
        ));
    }
}
