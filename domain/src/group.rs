//! Group workflows.

use events::{DomainEvent, Recipient};
use log::*;
use saga::{BoxError, Responses, Step, Workflow};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Error;
use crate::gateway::{DialogGateway, GroupGateway};
use crate::model::{Dialog, DialogKind, Group, GroupMember, GroupRole, NewGroup};
use crate::steps::{self, DialogRef};
use crate::Context;

const CREATE_GROUP: &str = "create_group";
const JOIN_OWNER: &str = "join_owner";
const CREATE_DIALOG: &str = "create_dialog";
const JOIN_OWNER_DIALOG: &str = "join_owner_dialog";
const JOIN_GROUP: &str = "join_group";
const JOIN_GROUP_DIALOG: &str = "join_group_dialog";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedGroup {
    pub group: Group,
    pub dialog: Dialog,
}

/// Create a group with its owner, its dialog and the owner's dialog
/// membership. Either all four records exist afterwards or none do.
pub async fn create(ctx: &Context, params: CreateGroup) -> Result<CreatedGroup, Error> {
    if params.name.trim().is_empty() {
        return Err(Error::invalid("group name must not be empty"));
    }
    let owner_id = params.owner_id.clone();

    let mut workflow = Workflow::new(format!("create_group:{owner_id}"))
        .step(create_group_step(
            ctx.groups.clone(),
            NewGroup {
                name: params.name,
                owner_id: owner_id.clone(),
            },
        ))
        .step(join_owner_step(ctx.groups.clone(), owner_id.clone()))
        .step(create_dialog_step(ctx.dialogs.clone()))
        .step(steps::join_dialog(
            ctx.dialogs.clone(),
            JOIN_OWNER_DIALOG,
            DialogRef::FromStep(CREATE_DIALOG),
            owner_id.clone(),
            true,
        ));

    let responses = ctx.coordinator.execute(&mut workflow).await?;
    let group: Group = responses.get_as(CREATE_GROUP)?;
    let dialog: Dialog = responses.get_as(CREATE_DIALOG)?;
    info!("Group {} created by {owner_id}", group.id);

    ctx.publisher
        .publish(DomainEvent::GroupCreated {
            group: serde_json::to_value(&group)?,
            dialog_id: dialog.id.clone(),
            sender_id: owner_id.clone(),
            recipients: vec![Recipient::loud(owner_id)],
        })
        .await;

    Ok(CreatedGroup { group, dialog })
}

/// Add `user_id` to an existing group and its dialog, then tell the
/// existing members, honouring each member's mute on the group.
pub async fn join(ctx: &Context, group_id: &str, user_id: &str) -> Result<GroupMember, Error> {
    let group = ctx
        .groups
        .get_group(group_id)
        .await?
        .ok_or_else(|| Error::not_found("group"))?;
    if ctx
        .groups
        .get_group_relation(&group.id, user_id)
        .await?
        .is_some()
    {
        return Err(Error::invalid("user is already a member of the group"));
    }
    let dialog = ctx
        .dialogs
        .find_group_dialog(&group.id)
        .await?
        .ok_or_else(|| Error::not_found("group dialog"))?;
    let members = ctx.groups.list_members(&group.id).await?;

    let mut workflow = Workflow::new(format!("join_group:{}:{user_id}", group.id))
        .step(join_group_step(
            ctx.groups.clone(),
            group.id.clone(),
            user_id.to_string(),
        ))
        .step(steps::join_dialog(
            ctx.dialogs.clone(),
            JOIN_GROUP_DIALOG,
            DialogRef::Known(dialog.id.clone()),
            user_id.to_string(),
            true,
        ));

    let responses = ctx.coordinator.execute(&mut workflow).await?;
    let member: GroupMember = responses.get_as(JOIN_GROUP)?;
    debug!("{user_id} joined group {}", group.id);

    let recipients = members
        .iter()
        .map(|m| Recipient::new(m.user_id.clone(), m.silent))
        .chain(std::iter::once(Recipient::loud(user_id)))
        .collect();

    ctx.publisher
        .publish(DomainEvent::GroupMemberJoined {
            group_id: group.id.clone(),
            member: serde_json::to_value(&member)?,
            sender_id: user_id.to_string(),
            recipients,
        })
        .await;

    Ok(member)
}

fn create_group_step(groups: Arc<dyn GroupGateway>, new_group: NewGroup) -> Step {
    let undo = groups.clone();

    Step::new(CREATE_GROUP, move |_| {
        let groups = groups.clone();
        let new_group = new_group.clone();
        async move { groups.create_group(new_group).await }
    })
    .compensate_with(move |responses: Responses| {
        let groups = undo.clone();
        async move {
            let group: Group = responses.get_as(CREATE_GROUP)?;
            groups.delete_group(&group.id).await?;
            Ok::<_, BoxError>(())
        }
    })
}

fn join_owner_step(groups: Arc<dyn GroupGateway>, owner_id: String) -> Step {
    let undo = groups.clone();
    let undo_owner = owner_id.clone();

    Step::new(JOIN_OWNER, move |responses: Responses| {
        let groups = groups.clone();
        let owner_id = owner_id.clone();
        async move {
            let group: Group = responses.get_as(CREATE_GROUP)?;
            let member = groups
                .join_group(&group.id, &owner_id, GroupRole::Owner)
                .await?;
            Ok::<_, BoxError>(member)
        }
    })
    .compensate_with(move |responses: Responses| {
        let groups = undo.clone();
        let owner_id = undo_owner.clone();
        async move {
            let group: Group = responses.get_as(CREATE_GROUP)?;
            groups.leave_group(&group.id, &owner_id).await?;
            Ok::<_, BoxError>(())
        }
    })
}

fn create_dialog_step(dialogs: Arc<dyn DialogGateway>) -> Step {
    let undo = dialogs.clone();

    Step::new(CREATE_DIALOG, move |responses: Responses| {
        let dialogs = dialogs.clone();
        async move {
            let group: Group = responses.get_as(CREATE_GROUP)?;
            let dialog = dialogs
                .create_dialog(DialogKind::Group, Some(group.id))
                .await?;
            Ok::<_, BoxError>(dialog)
        }
    })
    .compensate_with(move |responses: Responses| {
        let dialogs = undo.clone();
        async move {
            let dialog: Dialog = responses.get_as(CREATE_DIALOG)?;
            dialogs.delete_dialog(&dialog.id).await?;
            Ok::<_, BoxError>(())
        }
    })
}

fn join_group_step(groups: Arc<dyn GroupGateway>, group_id: String, user_id: String) -> Step {
    let undo = groups.clone();
    let undo_group = group_id.clone();
    let undo_user = user_id.clone();

    Step::new(JOIN_GROUP, move |_| {
        let groups = groups.clone();
        let group_id = group_id.clone();
        let user_id = user_id.clone();
        async move {
            groups
                .join_group(&group_id, &user_id, GroupRole::Member)
                .await
        }
    })
    .compensate_with(move |_| {
        let groups = undo.clone();
        let group_id = undo_group.clone();
        let user_id = undo_user.clone();
        async move { groups.leave_group(&group_id, &user_id).await }
    })
}
