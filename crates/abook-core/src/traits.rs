use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::book::BookSnapshot;
use crate::error::StorageError;
use crate::lifecycle::{CommandId, CommandKind, CommandResult, CommandState};
use crate::model::PersonInput;

/// What the user is asked to fill in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPrompt {
    pub command_id: CommandId,
    pub kind: CommandKind,
    /// Prefilled values: the current person for an edit, or the previous
    /// (rejected) answer when re-prompting.
    pub initial: Option<PersonInput>,
    /// Why the previous answer was rejected.
    pub error: Option<String>,
}

/// Supplies person input, typically by showing a form.
#[async_trait]
pub trait InputProvider: Send + Sync + 'static {
    /// Returns `None` when the user dismissed the prompt.
    async fn request_input(&self, prompt: InputPrompt) -> Option<PersonInput>;
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub command_id: CommandId,
    pub title: String,
    pub message: String,
}

/// Displays blocking alerts; the future resolves once the alert is dismissed.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn alert(&self, alert: Alert);
}

/// Progress hooks for rendering pending commands.
pub trait CommandObserver: Send + Sync + 'static {
    fn state_changed(&self, _id: CommandId, _kind: CommandKind, _state: CommandState) {}

    fn grace_tick(&self, _id: CommandId, _remaining_secs: u64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CommandObserver for NoopObserver {}

/// Receives exactly one record per terminal command.
pub trait ResultSink: Send + Sync + 'static {
    fn report(&self, result: CommandResult);
}

impl ResultSink for broadcast::Sender<CommandResult> {
    fn report(&self, result: CommandResult) {
        // No subscribers is not an error: results are fire-and-forget.
        let _ = self.send(result);
    }
}

impl ResultSink for mpsc::UnboundedSender<CommandResult> {
    fn report(&self, result: CommandResult) {
        let _ = self.send(result);
    }
}

/// Durable storage for the backing book. Implementations own all file I/O.
pub trait BookStorage: Send + Sync + 'static {
    fn load(&self) -> Result<Option<BookSnapshot>, StorageError>;

    fn save(&self, snapshot: &BookSnapshot) -> Result<(), StorageError>;
}

/// In-memory storage, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    snapshot: RwLock<Option<BookSnapshot>>,
    saves: RwLock<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: BookSnapshot) -> Self {
        MemoryStorage {
            snapshot: RwLock::new(Some(snapshot)),
            saves: RwLock::new(0),
        }
    }

    /// Number of times `save` has been called.
    pub fn save_count(&self) -> usize {
        *self.saves.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl BookStorage for MemoryStorage {
    fn load(&self) -> Result<Option<BookSnapshot>, StorageError> {
        Ok(self
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, snapshot: &BookSnapshot) -> Result<(), StorageError> {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        *self.saves.write().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
