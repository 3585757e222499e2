use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::Error;
use crate::model::{Group, GroupMember, GroupRole, NewGroup};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GroupGateway: Send + Sync {
    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, Error>;

    async fn create_group(&self, group: NewGroup) -> Result<Group, Error>;

    async fn delete_group(&self, group_id: &str) -> Result<(), Error>;

    async fn join_group(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember, Error>;

    async fn leave_group(&self, group_id: &str, user_id: &str) -> Result<(), Error>;

    /// Membership row of `user_id` in `group_id`, if any.
    async fn get_group_relation(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Option<GroupMember>, Error>;

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMember>, Error>;
}
