use abook_core::{Person, PersonData, PersonId, PersonInput};
use abook_remote::RemotePerson;
use async_trait::async_trait;
use tracing::debug;

use super::{ensure_new_tags, prompt_for_person};
use crate::engine::{ChangeCommand, CommandContext, InputOutcome};
use crate::error::CommandError;
use crate::handle::CommandHandle;

/// Creates a person. Shown under a provisional id until the remote assigns one.
pub struct AddCommand {
    supplied: Option<PersonInput>,
    provisional: Option<PersonId>,
    data: Option<PersonData>,
    created: Option<RemotePerson>,
}

impl AddCommand {
    pub fn new(input: Option<PersonInput>) -> Self {
        AddCommand {
            supplied: input,
            provisional: None,
            data: None,
            created: None,
        }
    }
}

#[async_trait]
impl ChangeCommand for AddCommand {
    async fn retrieve_input(&mut self, cx: &CommandContext, handle: &CommandHandle) -> InputOutcome {
        let supplied = self.supplied.take();
        match prompt_for_person(cx, handle, None, supplied).await {
            Some((input, data)) => {
                handle.capture_input(input);
                self.data = Some(data);
                InputOutcome::Ready
            }
            None => InputOutcome::Aborted,
        }
    }

    fn simulate(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        let Some(data) = self.data.clone() else {
            return;
        };
        let id = handle.target();
        cx.book
            .insert_provisional(Person::new(id.clone(), data), cx.pending(handle));
        self.provisional = Some(id);
    }

    fn apply_edit(&mut self, cx: &CommandContext, handle: &CommandHandle, data: PersonData) {
        if let Some(id) = &self.provisional {
            cx.book.set_visible(id, data.clone(), cx.pending(handle));
        }
        self.data = Some(data);
    }

    async fn check_conflict(&self, _cx: &CommandContext) -> Result<(), CommandError> {
        Ok(())
    }

    async fn request_remote(&mut self, cx: &CommandContext) -> Result<(), CommandError> {
        let Some(data) = self.data.as_ref() else {
            return Ok(());
        };
        ensure_new_tags(cx, data).await?;
        let created = cx.facade.create_person(data).await.into_result()?;
        debug!(id = created.id, "remote created person");
        self.created = Some(created);
        Ok(())
    }

    fn finish_with_success(&mut self, cx: &CommandContext, handle: &CommandHandle) {
        let (Some(provisional), Some(created)) = (&self.provisional, &self.created) else {
            return;
        };
        let confirmed = created.to_person();
        let id = confirmed.id.clone();
        cx.book.confirm_added(provisional, confirmed);
        cx.registry.remap(provisional, id.clone());
        handle.set_target(id);
    }

    fn finish_with_cancel(&mut self, cx: &CommandContext, _handle: &CommandHandle) {
        if let Some(provisional) = &self.provisional {
            cx.book.remove(provisional);
        }
    }

    fn name_before(&self) -> Option<String> {
        None
    }

    fn name_after(&self) -> Option<String> {
        self.data.as_ref().map(|d| d.name.clone())
    }
}
