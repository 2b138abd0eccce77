//! Add, edit and delete of a person, as plugged into the command engine.

mod add;
mod delete;
mod edit;

pub use add::AddCommand;
pub use delete::DeleteCommand;
pub use edit::EditCommand;

use abook_core::{InputPrompt, Person, PersonData, PersonInput};
use tracing::debug;

use crate::engine::CommandContext;
use crate::error::CommandError;
use crate::handle::CommandHandle;

/// Ask for input until it validates. A supplied answer is tried first.
/// Returns `None` when the user dismisses the prompt.
async fn prompt_for_person(
    cx: &CommandContext,
    handle: &CommandHandle,
    initial: Option<PersonInput>,
    supplied: Option<PersonInput>,
) -> Option<(PersonInput, PersonData)> {
    let mut initial = initial;
    let mut error = None;

    if let Some(input) = supplied {
        match input.validate() {
            Ok(data) => return Some((input, data)),
            Err(err) => {
                error = Some(err.to_string());
                initial = Some(input);
            }
        }
    }

    loop {
        let prompt = InputPrompt {
            command_id: handle.id(),
            kind: handle.kind(),
            initial: initial.clone(),
            error: error.take(),
        };
        let answer = cx.input.request_input(prompt).await?;
        match answer.validate() {
            Ok(data) => return Some((answer, data)),
            Err(err) => {
                debug!(command_id = %handle.id(), error = %err, "invalid input, prompting again");
                error = Some(err.to_string());
                initial = Some(answer);
            }
        }
    }
}

/// Compare the remote's current version of `baseline` with it.
///
/// A baseline the remote never confirmed has nothing to compare against.
async fn detect_conflict(cx: &CommandContext, baseline: &Person) -> Result<(), CommandError> {
    let Some(since) = baseline.updated_at else {
        return Ok(());
    };
    if baseline.id.remote_id().is_none() {
        return Ok(());
    }

    let changes = cx
        .facade
        .list_persons_updated_since(since)
        .await
        .into_result()?;
    match changes.iter().find(|p| p.person_id() == baseline.id) {
        Some(remote) if remote.deleted => Err(CommandError::DeletedRemotely {
            id: baseline.id.clone(),
        }),
        Some(remote) if remote.data != baseline.data => Err(CommandError::ChangedRemotely {
            id: baseline.id.clone(),
        }),
        _ => Ok(()),
    }
}

/// Create the tags of `data` the local book does not know yet.
async fn ensure_new_tags(cx: &CommandContext, data: &PersonData) -> Result<(), CommandError> {
    let known = cx.book.known_tags();
    let missing: Vec<String> = data
        .tags
        .iter()
        .filter(|tag| !known.contains(*tag))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    cx.facade.ensure_tags(&missing).await?;
    cx.book.add_tags(missing);
    Ok(())
}
