//! Recipient resolution, including each recipient's silent-notification flag.
//!
//! These are read-only lookups. A failing lookup aborts the triggering
//! request before any workflow starts.

use events::Recipient;

use crate::error::Error;
use crate::model::{Dialog, DialogKind, DialogUser};
use crate::Context;

/// `recipient_id` muted `sender_id`?
pub async fn direct_recipient(
    ctx: &Context,
    recipient_id: &str,
    sender_id: &str,
) -> Result<Recipient, Error> {
    let relation = ctx
        .relations
        .get_user_relation(recipient_id, sender_id)
        .await?;
    Ok(Recipient::new(
        recipient_id,
        relation.is_some_and(|r| r.silent),
    ))
}

/// `recipient_id` muted the group?
pub async fn group_recipient(
    ctx: &Context,
    group_id: &str,
    recipient_id: &str,
) -> Result<Recipient, Error> {
    let membership = ctx.groups.get_group_relation(group_id, recipient_id).await?;
    Ok(Recipient::new(
        recipient_id,
        membership.is_some_and(|m| m.silent),
    ))
}

/// Everyone in the dialog. The sender is included, never silenced, so the
/// sender's other devices stay in sync.
pub async fn dialog_recipients(
    ctx: &Context,
    dialog: &Dialog,
    users: &[DialogUser],
    sender_id: &str,
) -> Result<Vec<Recipient>, Error> {
    let mut recipients = Vec::with_capacity(users.len());

    for user in users {
        if user.user_id == sender_id {
            recipients.push(Recipient::loud(sender_id));
            continue;
        }

        let recipient = match (&dialog.kind, &dialog.group_id) {
            (DialogKind::Group, Some(group_id)) => {
                group_recipient(ctx, group_id, &user.user_id).await?
            }
            _ => direct_recipient(ctx, &user.user_id, sender_id).await?,
        };
        recipients.push(recipient);
    }

    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::dialog::MockDialogGateway;
    use crate::gateway::group::MockGroupGateway;
    use crate::gateway::message::MockMessageGateway;
    use crate::gateway::relation::MockRelationGateway;
    use crate::gateway::{gateway_error, GatewayErrorKind};
    use crate::model::{GroupMember, GroupRole, RelationStatus, UserRelation};
    use events::EventPublisher;
    use std::sync::Arc;

    fn context(relations: MockRelationGateway, groups: MockGroupGateway) -> Context {
        Context::new(
            Arc::new(relations),
            Arc::new(groups),
            Arc::new(MockDialogGateway::new()),
            Arc::new(MockMessageGateway::new()),
            EventPublisher::new(),
        )
    }

    fn member(dialog_id: &str, user_id: &str) -> DialogUser {
        DialogUser {
            dialog_id: dialog_id.to_string(),
            user_id: user_id.to_string(),
            visible: true,
        }
    }

    #[tokio::test]
    async fn direct_dialog_uses_recipients_relation_to_sender() {
        let mut relations = MockRelationGateway::new();
        relations
            .expect_get_user_relation()
            .withf(|user, friend| user == "bob" && friend == "alice")
            .times(1)
            .returning(|user, friend| {
                Ok(Some(UserRelation {
                    user_id: user.to_string(),
                    friend_id: friend.to_string(),
                    status: RelationStatus::Friend,
                    silent: true,
                }))
            });
        let ctx = context(relations, MockGroupGateway::new());
        let dialog = Dialog {
            id: "d1".to_string(),
            kind: DialogKind::Direct,
            group_id: None,
        };

        let recipients =
            dialog_recipients(&ctx, &dialog, &[member("d1", "alice"), member("d1", "bob")], "alice")
                .await
                .unwrap();

        assert_eq!(
            recipients,
            vec![Recipient::loud("alice"), Recipient::new("bob", true)]
        );
    }

    #[tokio::test]
    async fn group_dialog_uses_group_membership() {
        let mut groups = MockGroupGateway::new();
        groups
            .expect_get_group_relation()
            .withf(|group, user| group == "g1" && user == "carol")
            .returning(|group, user| {
                Ok(Some(GroupMember {
                    group_id: group.to_string(),
                    user_id: user.to_string(),
                    role: GroupRole::Member,
                    silent: false,
                }))
            });
        let ctx = context(MockRelationGateway::new(), groups);
        let dialog = Dialog {
            id: "d2".to_string(),
            kind: DialogKind::Group,
            group_id: Some("g1".to_string()),
        };

        let recipients = dialog_recipients(&ctx, &dialog, &[member("d2", "carol")], "alice")
            .await
            .unwrap();

        assert_eq!(recipients, vec![Recipient::loud("carol")]);
    }

    #[tokio::test]
    async fn missing_relation_means_not_silent() {
        let mut relations = MockRelationGateway::new();
        relations
            .expect_get_user_relation()
            .returning(|_, _| Ok(None));
        let ctx = context(relations, MockGroupGateway::new());

        let recipient = direct_recipient(&ctx, "bob", "stranger").await.unwrap();
        assert_eq!(recipient, Recipient::loud("bob"));
    }

    #[tokio::test]
    async fn lookup_failure_aborts() {
        let mut relations = MockRelationGateway::new();
        relations
            .expect_get_user_relation()
            .returning(|_, _| Err(gateway_error(GatewayErrorKind::Unavailable, "down")));
        let ctx = context(relations, MockGroupGateway::new());

        assert!(direct_recipient(&ctx, "bob", "alice").await.is_err());
    }
}
