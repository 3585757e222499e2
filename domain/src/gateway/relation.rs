use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::Error;
use crate::model::{FriendRequest, FriendRequestStatus, NewFriendRequest, UserRelation};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RelationGateway: Send + Sync {
    /// Relation row owned by `user_id` towards `friend_id`, if any.
    async fn get_user_relation(
        &self,
        user_id: &str,
        friend_id: &str,
    ) -> Result<Option<UserRelation>, Error>;

    async fn create_relation(&self, user_id: &str, friend_id: &str) -> Result<UserRelation, Error>;

    async fn delete_relation(&self, user_id: &str, friend_id: &str) -> Result<(), Error>;

    async fn get_friend_request(&self, request_id: &str) -> Result<Option<FriendRequest>, Error>;

    async fn create_friend_request(&self, request: NewFriendRequest) -> Result<FriendRequest, Error>;

    async fn set_friend_request_status(
        &self,
        request_id: &str,
        status: FriendRequestStatus,
    ) -> Result<FriendRequest, Error>;
}
