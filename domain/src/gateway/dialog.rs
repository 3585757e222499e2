use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::Error;
use crate::model::{Dialog, DialogKind, DialogUser};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DialogGateway: Send + Sync {
    async fn get_dialog(&self, dialog_id: &str) -> Result<Option<Dialog>, Error>;

    /// Existing one-to-one dialog between two users, if any.
    async fn find_direct_dialog(&self, user_a: &str, user_b: &str) -> Result<Option<Dialog>, Error>;

    async fn find_group_dialog(&self, group_id: &str) -> Result<Option<Dialog>, Error>;

    async fn create_dialog(&self, kind: DialogKind, group_id: Option<String>)
        -> Result<Dialog, Error>;

    async fn delete_dialog(&self, dialog_id: &str) -> Result<(), Error>;

    async fn join_dialog(&self, dialog_id: &str, user_id: &str) -> Result<DialogUser, Error>;

    async fn leave_dialog(&self, dialog_id: &str, user_id: &str) -> Result<(), Error>;

    async fn get_dialog_users_by_dialog_id(&self, dialog_id: &str)
        -> Result<Vec<DialogUser>, Error>;

    /// Open or close the dialog in a user's dialog list.
    async fn set_visible(&self, dialog_id: &str, user_id: &str, visible: bool)
        -> Result<(), Error>;
}
