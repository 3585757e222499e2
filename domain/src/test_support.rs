//! In-memory collaborators that record every call, for workflow tests.

use async_trait::async_trait;
use chrono::Utc;
use events::{DomainEvent, EventHandler, EventPublisher};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::gateway::{
    gateway_error, DialogGateway, Error, GatewayErrorKind, GroupGateway, MessageGateway,
    RelationGateway,
};
use crate::model::*;
use crate::Context;

#[derive(Default)]
struct State {
    next_id: u64,
    relations: HashMap<(String, String), UserRelation>,
    requests: HashMap<String, FriendRequest>,
    groups: HashMap<String, Group>,
    members: Vec<GroupMember>,
    dialogs: HashMap<String, Dialog>,
    dialog_users: Vec<DialogUser>,
    messages: Vec<Message>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// Every gateway backed by one in-memory store. Each mutating call is
/// appended to `calls` as `operation:arguments`; operations named in
/// `fail_on` return `Unavailable` without touching the store.
#[derive(Default)]
pub(crate) struct FakeServices {
    state: Mutex<State>,
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
}

impl FakeServices {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_on(&self, operation: &str) {
        self.fail_on.lock().unwrap().insert(operation.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, args: &[&str]) -> Result<(), Error> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation}:{}", args.join(",")));
        if self.fail_on.lock().unwrap().contains(operation) {
            return Err(gateway_error(GatewayErrorKind::Unavailable, operation));
        }
        Ok(())
    }

    pub(crate) fn add_relation(&self, user_id: &str, friend_id: &str, silent: bool) {
        self.state.lock().unwrap().relations.insert(
            (user_id.to_string(), friend_id.to_string()),
            UserRelation {
                user_id: user_id.to_string(),
                friend_id: friend_id.to_string(),
                status: RelationStatus::Friend,
                silent,
            },
        );
    }

    pub(crate) fn add_request(&self, id: &str, sender_id: &str, receiver_id: &str, status: FriendRequestStatus) {
        self.state.lock().unwrap().requests.insert(
            id.to_string(),
            FriendRequest {
                id: id.to_string(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                status,
                remark: None,
            },
        );
    }

    pub(crate) fn add_group(&self, id: &str, owner_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(
            id.to_string(),
            Group {
                id: id.to_string(),
                name: format!("group {id}"),
                owner_id: owner_id.to_string(),
            },
        );
        state.members.push(GroupMember {
            group_id: id.to_string(),
            user_id: owner_id.to_string(),
            role: GroupRole::Owner,
            silent: false,
        });
    }

    pub(crate) fn add_member(&self, group_id: &str, user_id: &str, silent: bool) {
        self.state.lock().unwrap().members.push(GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role: GroupRole::Member,
            silent,
        });
    }

    pub(crate) fn add_dialog(&self, id: &str, kind: DialogKind, group_id: Option<&str>, users: &[(&str, bool)]) {
        let mut state = self.state.lock().unwrap();
        state.dialogs.insert(
            id.to_string(),
            Dialog {
                id: id.to_string(),
                kind,
                group_id: group_id.map(str::to_string),
            },
        );
        for (user_id, visible) in users {
            state.dialog_users.push(DialogUser {
                dialog_id: id.to_string(),
                user_id: user_id.to_string(),
                visible: *visible,
            });
        }
    }

    pub(crate) fn request(&self, id: &str) -> Option<FriendRequest> {
        self.state.lock().unwrap().requests.get(id).cloned()
    }

    pub(crate) fn relation(&self, user_id: &str, friend_id: &str) -> Option<UserRelation> {
        self.state
            .lock()
            .unwrap()
            .relations
            .get(&(user_id.to_string(), friend_id.to_string()))
            .cloned()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    pub(crate) fn dialog_count(&self) -> usize {
        self.state.lock().unwrap().dialogs.len()
    }

    pub(crate) fn dialog_user(&self, dialog_id: &str, user_id: &str) -> Option<DialogUser> {
        self.state
            .lock()
            .unwrap()
            .dialog_users
            .iter()
            .find(|u| u.dialog_id == dialog_id && u.user_id == user_id)
            .cloned()
    }

    pub(crate) fn member_count(&self, group_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .count()
    }

    pub(crate) fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }
}

#[async_trait]
impl RelationGateway for FakeServices {
    async fn get_user_relation(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<Option<UserRelation>, Error> {
        Ok(self.relation(user_id, friend_id))
    }

    async fn create_relation(&self, user_id: &str, friend_id: &str) -> Result<UserRelation, Error> {
        self.record("create_relation", &[user_id, friend_id])?;
        self.add_relation(user_id, friend_id, false);
        self.relation(user_id, friend_id)
            .ok_or_else(|| gateway_error(GatewayErrorKind::NotFound, "relation"))
    }

    async fn delete_relation(&self, user_id: &str, friend_id: &str) -> Result<(), Error> {
        self.record("delete_relation", &[user_id, friend_id])?;
        self.state
            .lock()
            .unwrap()
            .relations
            .remove(&(user_id.to_string(), friend_id.to_string()));
        Ok(())
    }

    async fn get_friend_request(&self, request_id: &str) -> Result<Option<FriendRequest>, Error> {
        Ok(self.request(request_id))
    }

    async fn create_friend_request(&self, request: NewFriendRequest) -> Result<FriendRequest, Error> {
        self.record("create_friend_request", &[request.sender_id.as_str(), request.receiver_id.as_str()])?;
        let mut state = self.state.lock().unwrap();
        let id = state.id("r");
        let created = FriendRequest {
            id: id.clone(),
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            status: FriendRequestStatus::Pending,
            remark: request.remark,
        };
        state.requests.insert(id, created.clone());
        Ok(created)
    }

    async fn set_friend_request_status(
        &self,
        request_id: &str,
        status: FriendRequestStatus,
    ) -> Result<FriendRequest, Error> {
        self.record(
            "set_friend_request_status",
            &[request_id, format!("{status:?}").as_str()],
        )?;
        let mut state = self.state.lock().unwrap();
        let request = state
            .requests
            .get_mut(request_id)
            .ok_or_else(|| gateway_error(GatewayErrorKind::NotFound, "friend request"))?;
        request.status = status;
        Ok(request.clone())
    }
}

#[async_trait]
impl GroupGateway for FakeServices {
    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, Error> {
        Ok(self.state.lock().unwrap().groups.get(group_id).cloned())
    }

    async fn create_group(&self, group: NewGroup) -> Result<Group, Error> {
        self.record("create_group", &[group.name.as_str()])?;
        let mut state = self.state.lock().unwrap();
        let id = state.id("g");
        let created = Group {
            id: id.clone(),
            name: group.name,
            owner_id: group.owner_id,
        };
        state.groups.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), Error> {
        self.record("delete_group", &[group_id])?;
        self.state.lock().unwrap().groups.remove(group_id);
        Ok(())
    }

    async fn join_group(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember, Error> {
        self.record("join_group", &[group_id, user_id])?;
        let member = GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role,
            silent: false,
        };
        self.state.lock().unwrap().members.push(member.clone());
        Ok(member)
    }

    async fn leave_group(&self, group_id: &str, user_id: &str) -> Result<(), Error> {
        self.record("leave_group", &[group_id, user_id])?;
        self.state
            .lock()
            .unwrap()
            .members
            .retain(|m| !(m.group_id == group_id && m.user_id == user_id));
        Ok(())
    }

    async fn get_group_relation(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupMember>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .find(|m| m.group_id == group_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMember>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DialogGateway for FakeServices {
    async fn get_dialog(&self, dialog_id: &str) -> Result<Option<Dialog>, Error> {
        Ok(self.state.lock().unwrap().dialogs.get(dialog_id).cloned())
    }

    async fn find_direct_dialog(&self, user_a: &str, user_b: &str) -> Result<Option<Dialog>, Error> {
        let state = self.state.lock().unwrap();
        let in_dialog = |dialog_id: &str, user_id: &str| {
            state
                .dialog_users
                .iter()
                .any(|u| u.dialog_id == dialog_id && u.user_id == user_id)
        };
        Ok(state
            .dialogs
            .values()
            .find(|d| {
                d.kind == DialogKind::Direct && in_dialog(&d.id, user_a) && in_dialog(&d.id, user_b)
            })
            .cloned())
    }

    async fn find_group_dialog(&self, group_id: &str) -> Result<Option<Dialog>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .dialogs
            .values()
            .find(|d| d.group_id.as_deref() == Some(group_id))
            .cloned())
    }

    async fn create_dialog(
        &self,
        kind: DialogKind,
        group_id: Option<String>,
    ) -> Result<Dialog, Error> {
        self.record("create_dialog", &[format!("{kind:?}").as_str()])?;
        let mut state = self.state.lock().unwrap();
        let id = state.id("d");
        let dialog = Dialog {
            id: id.clone(),
            kind,
            group_id,
        };
        state.dialogs.insert(id, dialog.clone());
        Ok(dialog)
    }

    async fn delete_dialog(&self, dialog_id: &str) -> Result<(), Error> {
        self.record("delete_dialog", &[dialog_id])?;
        self.state.lock().unwrap().dialogs.remove(dialog_id);
        Ok(())
    }

    async fn join_dialog(&self, dialog_id: &str, user_id: &str) -> Result<DialogUser, Error> {
        self.record("join_dialog", &[dialog_id, user_id])?;
        let user = DialogUser {
            dialog_id: dialog_id.to_string(),
            user_id: user_id.to_string(),
            visible: true,
        };
        self.state.lock().unwrap().dialog_users.push(user.clone());
        Ok(user)
    }

    async fn leave_dialog(&self, dialog_id: &str, user_id: &str) -> Result<(), Error> {
        self.record("leave_dialog", &[dialog_id, user_id])?;
        self.state
            .lock()
            .unwrap()
            .dialog_users
            .retain(|u| !(u.dialog_id == dialog_id && u.user_id == user_id));
        Ok(())
    }

    async fn get_dialog_users_by_dialog_id(&self, dialog_id: &str) -> Result<Vec<DialogUser>, Error> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .dialog_users
            .iter()
            .filter(|u| u.dialog_id == dialog_id)
            .cloned()
            .collect())
    }

    async fn set_visible(&self, dialog_id: &str, user_id: &str, visible: bool) -> Result<(), Error> {
        self.record("set_visible", &[dialog_id, user_id, visible.to_string().as_str()])?;
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state
            .dialog_users
            .iter_mut()
            .find(|u| u.dialog_id == dialog_id && u.user_id == user_id)
        {
            user.visible = visible;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for FakeServices {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, Error> {
        self.record("persist_message", &[message.dialog_id.as_str(), message.sender_id.as_str()])?;
        let mut state = self.state.lock().unwrap();
        let id = state.id("m");
        let persisted = Message {
            id,
            dialog_id: message.dialog_id,
            sender_id: message.sender_id,
            content: message.content,
            created_at: Utc::now(),
        };
        state.messages.push(persisted.clone());
        Ok(persisted)
    }
}

/// Captures every published event.
#[derive(Default)]
pub(crate) struct RecordedEvents {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordedEvents {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordedEvents {
    async fn handle(&self, event: &DomainEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) fn context(fake: &Arc<FakeServices>) -> (Context, Arc<RecordedEvents>) {
    let recorded = Arc::new(RecordedEvents::default());
    let ctx = Context::new(
        fake.clone(),
        fake.clone(),
        fake.clone(),
        fake.clone(),
        EventPublisher::new().with_handler(recorded.clone()),
    );
    (ctx, recorded)
}
