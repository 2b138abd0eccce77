mod book;
mod error;
mod hash;
mod lifecycle;
mod model;
mod traits;

pub use book::{BookEntry, BookSnapshot, LocalBook};
pub use error::{StorageError, ValidationError};
pub use hash::{content_hash, json_hash};
pub use lifecycle::{CommandId, CommandKind, CommandResult, CommandState, CommandStatus, PendingChange};
pub use model::{Person, PersonData, PersonId, PersonInput, Tag};
pub use traits::{
    Alert, AlertSink, BookStorage, CommandObserver, InputPrompt, InputProvider, MemoryStorage,
    NoopObserver, ResultSink,
};

/// Target type reported in command results.
pub const PERSON_TARGET: &str = "Person";
