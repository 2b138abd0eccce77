use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use abook_config::CommandConfig;
use abook_core::{
    Alert, AlertSink, BookStorage, CommandId, CommandKind, CommandObserver, CommandResult,
    CommandState, InputProvider, LocalBook, NoopObserver, PersonId, PersonInput, ValidationError,
};
use abook_remote::RemoteFacade;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::commands::{AddCommand, DeleteCommand, EditCommand};
use crate::engine::{CommandContext, CommandEngine, CommandSpawner};
use crate::handle::{CommandHandle, GraceSignal};
use crate::registry::CommandRegistry;

const RESULT_FEED_CAPACITY: usize = 256;

/// Finished commands kept around for `state`, `wait_for` and `handle`.
pub const DEFAULT_FINISHED_RETENTION: usize = 64;

/// A user's request to change the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIntent {
    /// `input` skips the prompt when it validates.
    Add { input: Option<PersonInput> },
    Edit {
        target: PersonId,
        input: Option<PersonInput>,
    },
    Delete { target: PersonId },
}

impl CommandIntent {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandIntent::Add { .. } => CommandKind::Add,
            CommandIntent::Edit { .. } => CommandKind::Edit,
            CommandIntent::Delete { .. } => CommandKind::Delete,
        }
    }
}

/// Alerts nobody looks at.
struct SilentAlerts;

#[async_trait]
impl AlertSink for SilentAlerts {
    async fn alert(&self, _alert: Alert) {}
}

/// Handles of live commands, of failed commands still open to a retry, and
/// of the most recently finished others.
#[derive(Default)]
struct CommandTable {
    handles: HashMap<CommandId, Arc<CommandHandle>>,
    finished: VecDeque<CommandId>,
}

impl CommandTable {
    /// Move a finished command into the retention window, evicting the
    /// oldest. A failed request stays until it has been retried.
    fn retire(&mut self, handle: &CommandHandle, retain: usize) {
        let id = handle.id();
        if handle.via() == Some(CommandState::RequestFailed) && !handle.retried() {
            return;
        }
        if self.finished.contains(&id) {
            return;
        }
        self.finished.push_back(id);
        while self.finished.len() > retain {
            if let Some(old) = self.finished.pop_front() {
                self.handles.remove(&old);
                trace!(command_id = %old, "dropped finished command");
            }
        }
    }
}

struct ServiceSpawner(Weak<ServiceInner>);

impl CommandSpawner for ServiceSpawner {
    fn spawn_delete(&self, target: PersonId) -> Option<CommandId> {
        let inner = self.0.upgrade()?;
        Some(inner.submit(CommandIntent::Delete { target }))
    }
}

struct ServiceInner {
    cx: Arc<CommandContext>,
    next_id: AtomicU64,
    commands: Mutex<CommandTable>,
    retain_finished: usize,
    results: broadcast::Sender<CommandResult>,
    this: Weak<ServiceInner>,
}

impl ServiceInner {
    fn commands(&self) -> MutexGuard<'_, CommandTable> {
        self.commands.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn retire(&self, handle: &CommandHandle) {
        self.commands().retire(handle, self.retain_finished);
    }

    fn submit(&self, intent: CommandIntent) -> CommandId {
        let id = CommandId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let target = match &intent {
            CommandIntent::Add { .. } => PersonId::provisional(),
            CommandIntent::Edit { target, .. } | CommandIntent::Delete { target } => {
                target.clone()
            }
        };
        let handle = CommandHandle::new(id, intent.kind(), target);
        self.commands().handles.insert(id, Arc::clone(&handle));
        debug!(command_id = %id, kind = %handle.kind(), person = %handle.target(), "command submitted");

        let cx = Arc::clone(&self.cx);
        let owner = self.this.clone();
        let finished = Arc::clone(&handle);
        tokio::spawn(async move {
            cx.registry.acquire(&handle).await;
            match intent {
                CommandIntent::Add { input } => {
                    CommandEngine::new(cx, handle, AddCommand::new(input))
                        .run()
                        .await
                }
                CommandIntent::Edit { input, .. } => {
                    CommandEngine::new(cx, handle, EditCommand::new(input))
                        .run()
                        .await
                }
                CommandIntent::Delete { .. } => {
                    CommandEngine::new(cx, handle, DeleteCommand::new())
                        .run()
                        .await
                }
            };
            if let Some(owner) = owner.upgrade() {
                owner.retire(&finished);
            }
        });
        id
    }
}

/// The surface the UI drives commands through.
///
/// Every command runs on its own task. Commands on the same person run one
/// after the other; a later one waits for the earlier one to finish.
#[derive(Clone)]
pub struct CommandService {
    inner: Arc<ServiceInner>,
}

impl CommandService {
    pub fn builder(
        book: Arc<LocalBook>,
        facade: Arc<RemoteFacade>,
        input: Arc<dyn InputProvider>,
    ) -> CommandServiceBuilder {
        CommandServiceBuilder {
            book,
            facade,
            input,
            alerts: None,
            observer: None,
            storage: None,
            registry: None,
            retain_finished: DEFAULT_FINISHED_RETENTION,
            grace_period: CommandConfig::default().grace_period.as_duration().as_secs(),
        }
    }

    /// Start a command and return its id immediately.
    pub fn submit(&self, intent: CommandIntent) -> CommandId {
        self.inner.submit(intent)
    }

    /// Handle of a live command, a failed one awaiting retry, or a recently
    /// finished one.
    pub fn handle(&self, id: CommandId) -> Option<Arc<CommandHandle>> {
        self.inner.commands().handles.get(&id).cloned()
    }

    fn signal(&self, id: CommandId, signal: GraceSignal, op: &str) -> bool {
        let Some(handle) = self.handle(id) else {
            warn!(command_id = %id, op, "unknown command");
            return false;
        };
        let accepted = handle.signal(signal);
        if !accepted {
            warn!(command_id = %id, op, state = %handle.state(), "ignored: command is not in its grace period");
        }
        accepted
    }

    /// Cancel a command paused in its grace period.
    pub fn cancel(&self, id: CommandId) -> bool {
        self.signal(id, GraceSignal::Cancel, "cancel")
    }

    /// Replace the pending change of an add or edit and restart its grace
    /// period. Invalid input is rejected without touching the command.
    pub fn override_with_edit(
        &self,
        id: CommandId,
        input: PersonInput,
    ) -> Result<bool, ValidationError> {
        let data = input.validate()?;
        match self.handle(id).map(|h| h.kind()) {
            Some(CommandKind::Delete) => {
                warn!(command_id = %id, "ignored: a delete cannot be overridden with an edit");
                Ok(false)
            }
            _ => Ok(self.signal(id, GraceSignal::Edit { input, data }, "override_with_edit")),
        }
    }

    /// Abandon a command in its grace period and delete its target instead.
    pub fn override_with_delete(&self, id: CommandId) -> bool {
        match self.handle(id).map(|h| h.kind()) {
            Some(CommandKind::Delete) => {
                debug!(command_id = %id, "override with delete on a delete is a no-op");
                false
            }
            _ => self.signal(id, GraceSignal::Delete, "override_with_delete"),
        }
    }

    /// Resubmit a command whose remote request failed, with the same kind,
    /// target and input. Each failed command can be retried once.
    pub fn retry(&self, id: CommandId) -> Option<CommandId> {
        let handle = self.handle(id)?;
        if !handle.is_terminal() || handle.via() != Some(CommandState::RequestFailed) {
            warn!(command_id = %id, state = %handle.state(), "ignored: only failed requests can be retried");
            return None;
        }
        if !handle.mark_retried() {
            warn!(command_id = %id, "ignored: already retried");
            return None;
        }
        self.inner.retire(&handle);
        let input = handle.captured_input();
        let intent = match handle.kind() {
            CommandKind::Add => CommandIntent::Add { input },
            CommandKind::Edit => CommandIntent::Edit {
                target: handle.target(),
                input,
            },
            CommandKind::Delete => CommandIntent::Delete {
                target: handle.target(),
            },
        };
        let retried = self.submit(intent);
        debug!(command_id = %id, retry = %retried, "retrying");
        Some(retried)
    }

    /// Feed of terminal results.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandResult> {
        self.inner.results.subscribe()
    }

    pub fn state(&self, id: CommandId) -> Option<CommandState> {
        self.handle(id).map(|h| h.state())
    }

    /// Wait for a command to finish and return its result.
    pub async fn wait_for(&self, id: CommandId) -> Option<CommandResult> {
        let handle = self.handle(id)?;
        handle.wait_for_completion().await;
        handle.result()
    }

    /// Ids of commands that have not finished yet.
    pub fn in_flight(&self) -> Vec<CommandId> {
        let mut ids: Vec<CommandId> = self
            .inner
            .commands()
            .handles
            .values()
            .filter(|h| !h.is_terminal())
            .map(|h| h.id())
            .collect();
        ids.sort();
        ids
    }

    /// Wait until every submitted command has finished, including commands
    /// spawned while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<Arc<CommandHandle>> = self
                .inner
                .commands()
                .handles
                .values()
                .filter(|h| !h.is_terminal())
                .cloned()
                .collect();
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                handle.wait_for_completion().await;
            }
        }
    }

    /// Number of command handles still held.
    pub fn tracked(&self) -> usize {
        self.inner.commands().handles.len()
    }

    pub fn book(&self) -> &Arc<LocalBook> {
        &self.inner.cx.book
    }

    pub fn facade(&self) -> &Arc<RemoteFacade> {
        &self.inner.cx.facade
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.inner.cx.registry
    }
}

/// Wires a [`CommandService`] to its collaborators.
pub struct CommandServiceBuilder {
    book: Arc<LocalBook>,
    facade: Arc<RemoteFacade>,
    input: Arc<dyn InputProvider>,
    alerts: Option<Arc<dyn AlertSink>>,
    observer: Option<Arc<dyn CommandObserver>>,
    storage: Option<Arc<dyn BookStorage>>,
    registry: Option<Arc<CommandRegistry>>,
    retain_finished: usize,
    grace_period: u64,
}

impl CommandServiceBuilder {
    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn CommandObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Save the book here after every successful command.
    pub fn storage(mut self, storage: Arc<dyn BookStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Share a registry, e.g. with a [`crate::RemoteSync`].
    pub fn registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// How many finished commands stay reachable through the service.
    /// Failed requests that were not retried yet are kept regardless.
    pub fn retain_finished(mut self, count: usize) -> Self {
        self.retain_finished = count;
        self
    }

    pub fn grace_period_secs(mut self, secs: u64) -> Self {
        self.grace_period = secs;
        self
    }

    pub fn config(self, config: &CommandConfig) -> Self {
        let secs = config.grace_period.as_duration().as_secs();
        self.grace_period_secs(secs)
    }

    pub fn build(self) -> CommandService {
        let (tx, _) = broadcast::channel(RESULT_FEED_CAPACITY);
        let inner = Arc::new_cyclic(|weak: &Weak<ServiceInner>| ServiceInner {
            cx: Arc::new(CommandContext {
                book: self.book,
                facade: self.facade,
                registry: self.registry.unwrap_or_default(),
                input: self.input,
                alerts: self.alerts.unwrap_or_else(|| Arc::new(SilentAlerts)),
                observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
                results: Arc::new(tx.clone()),
                storage: self.storage,
                spawner: Arc::new(ServiceSpawner(weak.clone())),
                grace_period: self.grace_period,
            }),
            next_id: AtomicU64::new(1),
            commands: Mutex::new(CommandTable::default()),
            retain_finished: self.retain_finished,
            results: tx,
            this: weak.clone(),
        });
        CommandService { inner }
    }
}
