use abook_core::PersonId;
use abook_remote::RemoteError;

/// Why a command did not reach the remote, or why the remote refused it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Person {0} no longer exists")]
    TargetGone(PersonId),

    #[error("Person {0} has not been confirmed by the remote yet")]
    Unconfirmed(PersonId),

    #[error("Person {id} was changed on the remote since it was loaded")]
    ChangedRemotely { id: PersonId },

    #[error("Person {id} was deleted on the remote")]
    DeletedRemotely { id: PersonId },
}

impl CommandError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CommandError::ChangedRemotely { .. } | CommandError::DeletedRemotely { .. }
        )
    }
}
