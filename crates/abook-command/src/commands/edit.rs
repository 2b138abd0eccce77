use abook_core::{Person, PersonData, PersonInput};
use abook_remote::RemotePerson;
use async_trait::async_trait;

use super::{detect_conflict, ensure_new_tags, prompt_for_person};
use crate::engine::{ChangeCommand, CommandContext, InputOutcome};
use crate::error::CommandError;
use crate::handle::CommandHandle;

/// Replaces the fields of an existing person.
pub struct EditCommand {
    supplied: Option<PersonInput>,
    baseline: Option<Person>,
    data: Option<PersonData>,
    updated: Option<RemotePerson>,
}

impl EditCommand {
    pub fn new(input: Option<PersonInput>) -> Self {
        EditCommand {
            supplied: input,
            baseline: None,
            data: None,
            updated: None,
        }
    }
}

#[async_trait]
impl ChangeCommand for EditCommand {
    async fn retrieve_input(&mut self, cx: &CommandContext, handle: &CommandHandle) -> InputOutcome {
        let target = handle.target();
        let Some(baseline) = cx.book.backing(&target) else {
            return InputOutcome::Unavailable(CommandError::TargetGone(target));
        };
        let initial = Some(baseline.data.to_input());
        let supplied = self.supplied.take();
        self.baseline = Some(baseline);

        match prompt_for_person(cx, handle, initial, supplied).await {
            Some((input, data)) => {
                handle.capture_input(input);
                self.data = Some(data);
                InputOutcome::Ready
            }
            None => InputOutcome::Aborted,
        }
    }

    fn simulate(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        if let Some(data) = self.data.clone() {
            cx.book.set_visible(&handle.target(), data, cx.pending(handle));
        }
    }

    fn apply_edit(&mut self, cx: &CommandContext, handle: &CommandHandle, data: PersonData) {
        cx.book
            .set_visible(&handle.target(), data.clone(), cx.pending(handle));
        self.data = Some(data);
    }

    async fn check_conflict(&self, cx: &CommandContext) -> Result<(), CommandError> {
        match &self.baseline {
            Some(baseline) => detect_conflict(cx, baseline).await,
            None => Ok(()),
        }
    }

    async fn request_remote(&mut self, cx: &CommandContext) -> Result<(), CommandError> {
        let (Some(baseline), Some(data)) = (&self.baseline, &self.data) else {
            return Ok(());
        };
        let Some(remote_id) = baseline.id.remote_id() else {
            return Err(CommandError::Unconfirmed(baseline.id.clone()));
        };
        ensure_new_tags(cx, data).await?;
        let updated = cx
            .facade
            .update_person(remote_id, data)
            .await
            .into_result()?;
        self.updated = Some(updated);
        Ok(())
    }

    fn finish_with_success(&mut self, cx: &CommandContext, _handle: &CommandHandle) {
        if let Some(updated) = &self.updated {
            cx.book.commit(updated.to_person());
        }
    }

    fn finish_with_cancel(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        cx.book.revert(&handle.target());
    }

    fn name_before(&self) -> Option<String> {
        self.baseline.as_ref().map(|p| p.data.name.clone())
    }

    fn name_after(&self) -> Option<String> {
        self.data.as_ref().map(|d| d.name.clone())
    }
}
