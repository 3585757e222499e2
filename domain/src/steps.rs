//! Saga steps shared by several workflows.

use saga::{BoxError, Responses, Step};
use std::sync::Arc;

use crate::gateway::DialogGateway;
use crate::model::Dialog;

/// Where a step finds the dialog it operates on.
#[derive(Debug, Clone)]
pub(crate) enum DialogRef {
    Known(String),
    /// Response of an earlier step that returned a `Dialog`.
    FromStep(&'static str),
}

impl DialogRef {
    fn resolve(&self, responses: &Responses) -> Result<String, saga::Error> {
        match self {
            DialogRef::Known(id) => Ok(id.clone()),
            DialogRef::FromStep(step) => Ok(responses.get_as::<Dialog>(step)?.id),
        }
    }
}

/// Add `user_id` to a dialog. When `compensable`, rollback removes them again;
/// joining a dialog the user may already belong to must not be undone.
pub(crate) fn join_dialog(
    dialogs: Arc<dyn DialogGateway>,
    name: impl Into<String>,
    dialog: DialogRef,
    user_id: String,
    compensable: bool,
) -> Step {
    let undo = dialogs.clone();
    let undo_dialog = dialog.clone();
    let undo_user = user_id.clone();

    let step = Step::new(name, move |responses: Responses| {
        let dialogs = dialogs.clone();
        let dialog = dialog.clone();
        let user_id = user_id.clone();
        async move {
            let dialog_id = dialog.resolve(&responses)?;
            let joined = dialogs.join_dialog(&dialog_id, &user_id).await?;
            Ok::<_, BoxError>(joined)
        }
    });

    if !compensable {
        return step;
    }

    step.compensate_with(move |responses: Responses| {
        let dialogs = undo.clone();
        let dialog = undo_dialog.clone();
        let user_id = undo_user.clone();
        async move {
            let dialog_id = dialog.resolve(&responses)?;
            dialogs.leave_dialog(&dialog_id, &user_id).await?;
            Ok::<_, BoxError>(())
        }
    })
}

/// Open a closed dialog in `user_id`'s list; rollback closes it again.
pub(crate) fn reopen_dialog(dialogs: Arc<dyn DialogGateway>, dialog_id: String, user_id: String) -> Step {
    let undo = dialogs.clone();
    let undo_dialog = dialog_id.clone();
    let undo_user = user_id.clone();

    Step::new(format!("reopen_dialog:{user_id}"), move |_| {
        let dialogs = dialogs.clone();
        let dialog_id = dialog_id.clone();
        let user_id = user_id.clone();
        async move { dialogs.set_visible(&dialog_id, &user_id, true).await }
    })
    .compensate_with(move |_| {
        let dialogs = undo.clone();
        let dialog_id = undo_dialog.clone();
        let user_id = undo_user.clone();
        async move { dialogs.set_visible(&dialog_id, &user_id, false).await }
    })
}
