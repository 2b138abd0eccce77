use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use abook_core::{CommandId, CommandKind, CommandResult, CommandState, PersonData, PersonId, PersonInput};
use tokio::sync::{oneshot, watch};

/// Interruption delivered to a command paused in its grace period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraceSignal {
    Cancel,
    /// Replace the pending change with this input and restart the countdown.
    Edit { input: PersonInput, data: PersonData },
    /// Abandon this command in favour of deleting its target.
    Delete,
}

/// Shared, thread-safe view of one command.
///
/// Only the command's own task drives state changes; everyone else reads
/// through this handle or sends a [`GraceSignal`].
pub struct CommandHandle {
    id: CommandId,
    kind: CommandKind,
    target: RwLock<PersonId>,
    state: watch::Sender<CommandState>,
    grace_remaining: AtomicU64,
    pause: Mutex<Option<oneshot::Sender<GraceSignal>>>,
    input: RwLock<Option<PersonInput>>,
    via: RwLock<Option<CommandState>>,
    result: RwLock<Option<CommandResult>>,
    retried: AtomicBool,
}

impl CommandHandle {
    pub fn new(id: CommandId, kind: CommandKind, target: PersonId) -> Arc<Self> {
        let (state, _) = watch::channel(CommandState::NewlyCreated);
        Arc::new(CommandHandle {
            id,
            kind,
            target: RwLock::new(target),
            state,
            grace_remaining: AtomicU64::new(0),
            pause: Mutex::new(None),
            input: RwLock::new(None),
            via: RwLock::new(None),
            result: RwLock::new(None),
            retried: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Current target. An add's provisional id is replaced by the remote id
    /// once the remote confirms it.
    pub fn target(&self) -> PersonId {
        self.target.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_target(&self, target: PersonId) {
        *self.target.write().unwrap_or_else(|e| e.into_inner()) = target;
    }

    pub fn state(&self) -> CommandState {
        *self.state.borrow()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn subscribe(&self) -> watch::Receiver<CommandState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: CommandState) {
        self.state.send_replace(state);
    }

    /// Resolve once the command has reached a terminal state and finished
    /// its bookkeeping.
    pub async fn wait_for_completion(&self) -> CommandState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so it cannot be gone while we borrow it.
            Err(_) => self.state(),
        };
        state
    }

    pub fn grace_remaining(&self) -> u64 {
        self.grace_remaining.load(Ordering::Relaxed)
    }

    pub(crate) fn set_grace_remaining(&self, secs: u64) {
        self.grace_remaining.store(secs, Ordering::Relaxed);
    }

    /// Input the command ran with, once it has been retrieved.
    pub fn captured_input(&self) -> Option<PersonInput> {
        self.input.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn capture_input(&self, input: PersonInput) {
        *self.input.write().unwrap_or_else(|e| e.into_inner()) = Some(input);
    }

    /// `ConflictFound` or `RequestFailed` if the command ended through one of them.
    pub fn via(&self) -> Option<CommandState> {
        *self.via.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_via(&self, state: CommandState) {
        *self.via.write().unwrap_or_else(|e| e.into_inner()) = Some(state);
    }

    pub fn result(&self) -> Option<CommandResult> {
        self.result.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_result(&self, result: CommandResult) {
        *self.result.write().unwrap_or_else(|e| e.into_inner()) = Some(result);
    }

    pub fn retried(&self) -> bool {
        self.retried.load(Ordering::Acquire)
    }

    /// Returns true the first time it is called.
    pub(crate) fn mark_retried(&self) -> bool {
        !self.retried.swap(true, Ordering::AcqRel)
    }

    /// Open the pause point of a grace period.
    pub(crate) fn open_pause(&self) -> oneshot::Receiver<GraceSignal> {
        let (tx, rx) = oneshot::channel();
        *self.pause.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    /// Close the pause point. Returns false if a signal already claimed it.
    pub(crate) fn close_pause(&self) -> bool {
        self.pause
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    /// Deliver a signal if the command is paused. The first caller wins; the
    /// slot stays locked until the signal is in the channel.
    pub(crate) fn signal(&self, signal: GraceSignal) -> bool {
        let mut slot = self.pause.lock().unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    /// True while the grace period countdown can be interrupted.
    pub fn is_paused(&self) -> bool {
        self.pause
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl std::fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target())
            .field("state", &self.state())
            .finish()
    }
}
