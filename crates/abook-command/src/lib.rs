//! The optimistic command life cycle.
//!
//! A [`CommandService`] turns user intents into commands. Each command is
//! driven by a [`CommandEngine`] on its own task: it applies its change to the
//! [`abook_core::LocalBook`] at once, waits out a cancellable grace period,
//! checks the remote for conflicting changes and finally asks the remote to
//! make the change for real. [`CommandRegistry`] keeps commands on the same
//! person strictly one after the other.

mod commands;
mod engine;
mod error;
mod handle;
mod registry;
mod service;
mod sync;

pub use commands::{AddCommand, DeleteCommand, EditCommand};
pub use engine::{ChangeCommand, CommandContext, CommandEngine, CommandSpawner, InputOutcome};
pub use error::CommandError;
pub use handle::{CommandHandle, GraceSignal};
pub use registry::CommandRegistry;
pub use service::{
    CommandIntent, CommandService, CommandServiceBuilder, DEFAULT_FINISHED_RETENTION,
};
pub use sync::{RemoteSync, SyncReport};
