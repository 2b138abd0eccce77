use std::sync::Arc;
use std::time::Duration;

use abook_core::{
    Alert, AlertSink, BookStorage, CommandId, CommandObserver, CommandResult, CommandState, CommandStatus,
    InputProvider, LocalBook, PendingChange, PersonData, PersonId, ResultSink, PERSON_TARGET,
};
use abook_remote::RemoteFacade;
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::CommandError;
use crate::handle::{CommandHandle, GraceSignal};
use crate::registry::CommandRegistry;

/// Starts follow-up commands on behalf of a running one.
pub trait CommandSpawner: Send + Sync + 'static {
    /// Submit a delete of `target`. `None` if the owner has shut down.
    fn spawn_delete(&self, target: PersonId) -> Option<CommandId>;
}

/// Everything a command needs from the outside world.
pub struct CommandContext {
    pub book: Arc<LocalBook>,
    pub facade: Arc<RemoteFacade>,
    pub registry: Arc<CommandRegistry>,
    pub input: Arc<dyn InputProvider>,
    pub alerts: Arc<dyn AlertSink>,
    pub observer: Arc<dyn CommandObserver>,
    pub results: Arc<dyn ResultSink>,
    /// Receives the book after every successful command.
    pub storage: Option<Arc<dyn BookStorage>>,
    pub spawner: Arc<dyn CommandSpawner>,
    /// Grace period length in whole seconds.
    pub grace_period: u64,
}

impl CommandContext {
    /// Pending marker for the entry a command changes.
    pub fn pending(&self, handle: &CommandHandle) -> PendingChange {
        PendingChange {
            command_id: handle.id(),
            kind: handle.kind(),
            remaining_secs: self.grace_period,
        }
    }
}

/// Result of the input retrieval step.
#[derive(Debug)]
pub enum InputOutcome {
    Ready,
    /// The user dismissed the prompt.
    Aborted,
    /// The command cannot run at all, e.g. its target is gone.
    Unavailable(CommandError),
}

/// Per-kind behaviour plugged into the [`CommandEngine`].
#[async_trait]
pub trait ChangeCommand: Send + Sync + 'static {
    async fn retrieve_input(&mut self, cx: &CommandContext, handle: &CommandHandle) -> InputOutcome;

    /// Apply the change to the visible book.
    fn simulate(&mut self, cx: &CommandContext, handle: &CommandHandle);

    /// Replace the pending change with new data during the grace period.
    /// Kinds that cannot be edited ignore it.
    fn apply_edit(&mut self, _cx: &CommandContext, _handle: &CommandHandle, _data: PersonData) {}

    /// `Err` with a conflict error if the remote moved away from the state
    /// this command was based on.
    async fn check_conflict(&self, cx: &CommandContext) -> Result<(), CommandError>;

    async fn request_remote(&mut self, cx: &CommandContext) -> Result<(), CommandError>;

    fn finish_with_success(&mut self, cx: &CommandContext, handle: &CommandHandle);

    /// Roll back the simulated change.
    fn finish_with_cancel(&mut self, cx: &CommandContext, handle: &CommandHandle);

    fn name_before(&self) -> Option<String>;

    fn name_after(&self) -> Option<String>;
}

/// Drives one command through its life cycle:
///
/// ```text
/// NewlyCreated -> RetrievingInput -> SimulatingResult -> GracePeriod
///   -> CheckingRemoteConflict -> (ConflictFound -> Cancelled)
///                             |  RequestingRemoteChange -> Successful
///                                                       |  (RequestFailed -> Cancelled)
/// ```
pub struct CommandEngine<C> {
    cx: Arc<CommandContext>,
    handle: Arc<CommandHandle>,
    command: C,
    simulated: bool,
    detail: Option<String>,
}

impl<C: ChangeCommand> CommandEngine<C> {
    pub fn new(cx: Arc<CommandContext>, handle: Arc<CommandHandle>, command: C) -> Self {
        CommandEngine {
            cx,
            handle,
            command,
            simulated: false,
            detail: None,
        }
    }

    /// Run to a terminal state, report the result and release waiters.
    pub async fn run(mut self) -> CommandResult {
        let mut state = CommandState::NewlyCreated;
        while !state.is_terminal() {
            self.enter(state);
            let next = self.step(state).await;
            debug_assert!(state.can_advance_to(next), "{state} -> {next}");
            state = next;
        }
        self.finish(state)
    }

    fn enter(&self, state: CommandState) {
        debug!(command_id = %self.handle.id(), kind = %self.handle.kind(), %state, "command transition");
        self.handle.set_state(state);
        self.cx
            .observer
            .state_changed(self.handle.id(), self.handle.kind(), state);
    }

    async fn step(&mut self, state: CommandState) -> CommandState {
        match state {
            CommandState::NewlyCreated => CommandState::RetrievingInput,
            CommandState::RetrievingInput => {
                match self.command.retrieve_input(&self.cx, &self.handle).await {
                    InputOutcome::Ready => CommandState::SimulatingResult,
                    InputOutcome::Aborted => {
                        debug!(command_id = %self.handle.id(), "input aborted");
                        CommandState::Cancelled
                    }
                    InputOutcome::Unavailable(err) => {
                        debug!(command_id = %self.handle.id(), error = %err, "command cannot run");
                        self.detail = Some(err.to_string());
                        CommandState::Cancelled
                    }
                }
            }
            CommandState::SimulatingResult => {
                self.command.simulate(&self.cx, &self.handle);
                self.simulated = true;
                CommandState::GracePeriod
            }
            CommandState::GracePeriod => self.grace_period().await,
            CommandState::CheckingRemoteConflict => match self.command.check_conflict(&self.cx).await
            {
                Ok(()) => CommandState::RequestingRemoteChange,
                Err(err) => {
                    self.detail = Some(err.to_string());
                    if err.is_conflict() {
                        CommandState::ConflictFound
                    } else {
                        CommandState::RequestFailed
                    }
                }
            },
            CommandState::ConflictFound => {
                self.handle.set_via(CommandState::ConflictFound);
                self.alert("Conflict").await;
                CommandState::Cancelled
            }
            CommandState::RequestingRemoteChange => {
                match self.command.request_remote(&self.cx).await {
                    Ok(()) => CommandState::Successful,
                    Err(err) => {
                        self.detail = Some(err.to_string());
                        CommandState::RequestFailed
                    }
                }
            }
            CommandState::RequestFailed => {
                self.handle.set_via(CommandState::RequestFailed);
                self.alert("Request failed").await;
                CommandState::Cancelled
            }
            CommandState::Successful | CommandState::Cancelled => state,
        }
    }

    /// Count down in one-second steps while listening for a signal. Each pause
    /// accepts exactly one signal; an edit restarts the full countdown.
    async fn grace_period(&mut self) -> CommandState {
        'restart: loop {
            let mut signal_rx = self.handle.open_pause();
            let mut remaining = self.cx.grace_period;

            loop {
                self.tick(remaining);
                if remaining == 0 {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => remaining -= 1,
                    signal = &mut signal_rx => match signal {
                        Ok(signal) => match self.on_signal(signal) {
                            Some(next) => return next,
                            None => continue 'restart,
                        },
                        Err(_) => {
                            warn!(command_id = %self.handle.id(), "grace period signal channel closed");
                            break;
                        }
                    },
                }
            }

            if self.handle.close_pause() {
                return CommandState::CheckingRemoteConflict;
            }
            // A signal claimed the pause just as the countdown ran out.
            match signal_rx.try_recv() {
                Ok(signal) => match self.on_signal(signal) {
                    Some(next) => return next,
                    None => continue 'restart,
                },
                Err(_) => return CommandState::CheckingRemoteConflict,
            }
        }
    }

    fn tick(&self, remaining: u64) {
        self.handle.set_grace_remaining(remaining);
        self.cx
            .book
            .set_pending_remaining(&self.handle.target(), remaining);
        self.cx.observer.grace_tick(self.handle.id(), remaining);
    }

    /// Act on a grace period signal. `None` restarts the countdown.
    fn on_signal(&mut self, signal: GraceSignal) -> Option<CommandState> {
        let id = self.handle.id();
        match signal {
            GraceSignal::Cancel => {
                info!(command_id = %id, "cancelled during grace period");
                Some(CommandState::Cancelled)
            }
            GraceSignal::Edit { input, data } => {
                info!(command_id = %id, "overridden with edit");
                self.handle.capture_input(input);
                self.command.apply_edit(&self.cx, &self.handle, data);
                None
            }
            GraceSignal::Delete => {
                let target = self.handle.target();
                let spawned = self.cx.spawner.spawn_delete(target.clone());
                info!(command_id = %id, person = %target, delete = ?spawned, "overridden with delete");
                Some(CommandState::Cancelled)
            }
        }
    }

    async fn alert(&self, title: &str) {
        let message = self.detail.clone().unwrap_or_default();
        warn!(command_id = %self.handle.id(), %title, %message, "command failed");
        self.cx
            .alerts
            .alert(Alert {
                command_id: self.handle.id(),
                title: title.to_string(),
                message,
            })
            .await;
    }

    fn finish(mut self, state: CommandState) -> CommandResult {
        if state == CommandState::Successful {
            self.command.finish_with_success(&self.cx, &self.handle);
        } else if self.simulated {
            self.command.finish_with_cancel(&self.cx, &self.handle);
        }

        let via = self.handle.via();
        let status = match (state, via) {
            (CommandState::Successful, _) => CommandStatus::Successful,
            (_, Some(_)) => CommandStatus::Failed,
            _ => CommandStatus::Cancelled,
        };
        let result = CommandResult {
            command_id: self.handle.id(),
            kind: self.handle.kind(),
            status,
            target_type: PERSON_TARGET.to_string(),
            target_id: self.handle.target().to_string(),
            name_before: self.command.name_before(),
            name_after: self.command.name_after(),
            via,
            detail: self.detail.take(),
        };
        info!(
            command_id = %result.command_id,
            kind = %result.kind,
            status = ?result.status,
            target = %result.target_id,
            "command finished"
        );

        self.handle.set_grace_remaining(0);
        self.handle.set_result(result.clone());
        if state == CommandState::Successful {
            self.save_book();
        }
        // Terminal before published: a subscriber may retry at once.
        self.cx.registry.release(&self.handle, state);
        self.cx
            .observer
            .state_changed(self.handle.id(), self.handle.kind(), state);
        self.cx.results.report(result.clone());
        result
    }

    fn save_book(&self) {
        let Some(storage) = &self.cx.storage else {
            return;
        };
        if let Err(e) = storage.save(&self.cx.book.snapshot()) {
            error!(command_id = %self.handle.id(), error = %e, "failed to save book");
        }
    }
}
