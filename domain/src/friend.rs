//! Friend request workflows.

use events::{DomainEvent, Recipient};
use log::*;
use saga::{BoxError, Responses, Step, Workflow};
use std::sync::Arc;

use crate::error::Error;
use crate::gateway::{DialogGateway, RelationGateway};
use crate::model::{
    Dialog, DialogKind, FriendRequest, FriendRequestStatus, NewFriendRequest, RelationStatus,
};
use crate::steps::{self, DialogRef};
use crate::{notify, Context};

const ACCEPT_REQUEST: &str = "accept_request";
const RELATE_RECEIVER: &str = "relate_receiver";
const RELATE_SENDER: &str = "relate_sender";
const OPEN_DIALOG: &str = "open_dialog";
const JOIN_SENDER: &str = "join_sender_dialog";
const JOIN_RECEIVER: &str = "join_receiver_dialog";

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRequest {
    pub request: FriendRequest,
    pub dialog: Dialog,
}

/// Store a friend request and notify the receiver, honouring the receiver's
/// mute on the sender if the two already share a relation row.
pub async fn send_request(
    ctx: &Context,
    sender_id: &str,
    receiver_id: &str,
    remark: Option<String>,
) -> Result<FriendRequest, Error> {
    if sender_id == receiver_id {
        return Err(Error::invalid("cannot send a friend request to yourself"));
    }
    let existing = ctx
        .relations
        .get_user_relation(sender_id, receiver_id)
        .await?;
    if existing.is_some_and(|r| r.status == RelationStatus::Friend) {
        return Err(Error::invalid("users are already friends"));
    }

    let request = ctx
        .relations
        .create_friend_request(NewFriendRequest {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            remark,
        })
        .await?;
    debug!("Friend request {} from {sender_id} to {receiver_id}", request.id);

    let recipient = notify::direct_recipient(ctx, receiver_id, sender_id).await?;
    ctx.publisher
        .publish(DomainEvent::FriendRequestSent {
            request: serde_json::to_value(&request)?,
            sender_id: sender_id.to_string(),
            recipients: vec![recipient],
        })
        .await;

    Ok(request)
}

/// Accept a pending friend request on behalf of its receiver.
///
/// Marks the request accepted, creates both relation rows and makes sure
/// the pair share a direct dialog, reusing one that already exists. A dialog
/// that existed before the workflow is never deleted or left on rollback.
pub async fn accept_request(
    ctx: &Context,
    request_id: &str,
    acceptor_id: &str,
) -> Result<AcceptedRequest, Error> {
    let request = ctx
        .relations
        .get_friend_request(request_id)
        .await?
        .ok_or_else(|| Error::not_found("friend request"))?;
    if request.receiver_id != acceptor_id {
        return Err(Error::invalid("only the receiver can accept a friend request"));
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(Error::invalid("friend request is no longer pending"));
    }

    let sender_id = request.sender_id.clone();
    let receiver_id = request.receiver_id.clone();
    let existing_dialog = ctx
        .dialogs
        .find_direct_dialog(&sender_id, &receiver_id)
        .await?;
    let new_dialog = existing_dialog.is_none();

    let mut workflow = Workflow::new(format!("accept_friend_request:{request_id}"))
        .step(accept_step(ctx.relations.clone(), request.id.clone()))
        .step(relate_step(
            ctx.relations.clone(),
            RELATE_RECEIVER,
            receiver_id.clone(),
            sender_id.clone(),
        ))
        .step(relate_step(
            ctx.relations.clone(),
            RELATE_SENDER,
            sender_id.clone(),
            receiver_id.clone(),
        ))
        .step(open_dialog_step(ctx.dialogs.clone(), existing_dialog))
        .step(steps::join_dialog(
            ctx.dialogs.clone(),
            JOIN_SENDER,
            DialogRef::FromStep(OPEN_DIALOG),
            sender_id.clone(),
            new_dialog,
        ))
        .step(steps::join_dialog(
            ctx.dialogs.clone(),
            JOIN_RECEIVER,
            DialogRef::FromStep(OPEN_DIALOG),
            receiver_id.clone(),
            new_dialog,
        ));

    let responses = ctx.coordinator.execute(&mut workflow).await?;
    let request: FriendRequest = responses.get_as(ACCEPT_REQUEST)?;
    let dialog: Dialog = responses.get_as(OPEN_DIALOG)?;
    info!("{receiver_id} accepted friend request {} from {sender_id}", request.id);

    let recipient = notify::direct_recipient(ctx, &sender_id, &receiver_id).await?;
    ctx.publisher
        .publish(DomainEvent::FriendRequestAccepted {
            request: serde_json::to_value(&request)?,
            dialog_id: dialog.id.clone(),
            sender_id: receiver_id,
            recipients: vec![recipient],
        })
        .await;

    Ok(AcceptedRequest { request, dialog })
}

fn accept_step(relations: Arc<dyn RelationGateway>, request_id: String) -> Step {
    let undo = relations.clone();
    let undo_request = request_id.clone();

    Step::new(ACCEPT_REQUEST, move |_| {
        let relations = relations.clone();
        let request_id = request_id.clone();
        async move {
            relations
                .set_friend_request_status(&request_id, FriendRequestStatus::Accepted)
                .await
        }
    })
    .compensate_with(move |_| {
        let relations = undo.clone();
        let request_id = undo_request.clone();
        async move {
            relations
                .set_friend_request_status(&request_id, FriendRequestStatus::Pending)
                .await?;
            Ok::<_, BoxError>(())
        }
    })
}

fn relate_step(
    relations: Arc<dyn RelationGateway>,
    name: &'static str,
    user_id: String,
    friend_id: String,
) -> Step {
    let undo = relations.clone();
    let undo_user = user_id.clone();
    let undo_friend = friend_id.clone();

    Step::new(name, move |_| {
        let relations = relations.clone();
        let user_id = user_id.clone();
        let friend_id = friend_id.clone();
        async move { relations.create_relation(&user_id, &friend_id).await }
    })
    .compensate_with(move |_| {
        let relations = undo.clone();
        let user_id = undo_user.clone();
        let friend_id = undo_friend.clone();
        async move { relations.delete_relation(&user_id, &friend_id).await }
    })
}

/// Yields the dialog later steps join: the existing one unchanged, or a new
/// direct dialog that rollback deletes.
fn open_dialog_step(dialogs: Arc<dyn DialogGateway>, existing: Option<Dialog>) -> Step {
    if let Some(dialog) = existing {
        return Step::new(OPEN_DIALOG, move |_| {
            let dialog = dialog.clone();
            async move { Ok::<_, BoxError>(dialog) }
        });
    }

    let undo = dialogs.clone();
    Step::new(OPEN_DIALOG, move |_| {
        let dialogs = dialogs.clone();
        async move { dialogs.create_dialog(DialogKind::Direct, None).await }
    })
    .compensate_with(move |responses: Responses| {
        let dialogs = undo.clone();
        async move {
            let dialog: Dialog = responses.get_as(OPEN_DIALOG)?;
            dialogs.delete_dialog(&dialog.id).await?;
            Ok::<_, BoxError>(())
        }
    })
}
