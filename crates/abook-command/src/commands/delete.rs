use abook_core::Person;
use async_trait::async_trait;

use super::detect_conflict;
use crate::engine::{ChangeCommand, CommandContext, InputOutcome};
use crate::error::CommandError;
use crate::handle::CommandHandle;

/// Removes a person. Needs no input.
#[derive(Default)]
pub struct DeleteCommand {
    baseline: Option<Person>,
}

impl DeleteCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChangeCommand for DeleteCommand {
    async fn retrieve_input(&mut self, cx: &CommandContext, handle: &CommandHandle) -> InputOutcome {
        let target = handle.target();
        match cx.book.backing(&target) {
            Some(baseline) => {
                self.baseline = Some(baseline);
                InputOutcome::Ready
            }
            None => InputOutcome::Unavailable(CommandError::TargetGone(target)),
        }
    }

    fn simulate(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        cx.book.hide(&handle.target(), cx.pending(handle));
    }

    async fn check_conflict(&self, cx: &CommandContext) -> Result<(), CommandError> {
        match &self.baseline {
            Some(baseline) => detect_conflict(cx, baseline).await,
            None => Ok(()),
        }
    }

    async fn request_remote(&mut self, cx: &CommandContext) -> Result<(), CommandError> {
        let Some(baseline) = &self.baseline else {
            return Ok(());
        };
        let Some(remote_id) = baseline.id.remote_id() else {
            return Err(CommandError::Unconfirmed(baseline.id.clone()));
        };
        cx.facade.delete_person(remote_id).await.into_result()?;
        Ok(())
    }

    fn finish_with_success(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        cx.book.forget(&handle.target());
    }

    fn finish_with_cancel(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        cx.book.revert(&handle.target());
    }

    fn name_before(&self) -> Option<String> {
        self.baseline.as_ref().map(|p| p.data.name.clone())
    }

    fn name_after(&self) -> Option<String> {
        None
    }
}
