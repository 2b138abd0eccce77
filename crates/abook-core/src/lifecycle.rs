use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic, 1-indexed command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a command does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Add,
    Edit,
    Delete,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Add => "add",
            CommandKind::Edit => "edit",
            CommandKind::Delete => "delete",
        })
    }
}

/// States of the command life cycle.
///
/// ```text
/// NewlyCreated -> RetrievingInput -> SimulatingResult -> GracePeriod
///   -> CheckingRemoteConflict -> ConflictFound -> Cancelled
///                             -> RequestingRemoteChange -> Successful
///                                                       -> RequestFailed -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    NewlyCreated,
    RetrievingInput,
    SimulatingResult,
    GracePeriod,
    CheckingRemoteConflict,
    ConflictFound,
    RequestingRemoteChange,
    RequestFailed,
    Successful,
    Cancelled,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::Successful | CommandState::Cancelled)
    }

    /// Whether the life cycle allows moving from `self` straight to `next`.
    pub fn can_advance_to(&self, next: CommandState) -> bool {
        use CommandState::*;
        matches!(
            (self, next),
            (NewlyCreated, RetrievingInput)
                | (RetrievingInput, SimulatingResult | Cancelled)
                | (SimulatingResult, GracePeriod)
                | (GracePeriod, CheckingRemoteConflict | Cancelled)
                | (
                    CheckingRemoteConflict,
                    ConflictFound | RequestingRemoteChange | RequestFailed
                )
                | (ConflictFound, Cancelled)
                | (RequestingRemoteChange, Successful | RequestFailed)
                | (RequestFailed, Cancelled)
        )
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandState::NewlyCreated => "NEWLY_CREATED",
            CommandState::RetrievingInput => "RETRIEVING_INPUT",
            CommandState::SimulatingResult => "SIMULATING_RESULT",
            CommandState::GracePeriod => "GRACE_PERIOD",
            CommandState::CheckingRemoteConflict => "CHECKING_REMOTE_CONFLICT",
            CommandState::ConflictFound => "CONFLICT_FOUND",
            CommandState::RequestingRemoteChange => "REQUESTING_REMOTE_CHANGE",
            CommandState::RequestFailed => "REQUEST_FAILED",
            CommandState::Successful => "SUCCESSFUL",
            CommandState::Cancelled => "CANCELLED",
        })
    }
}

/// Final status reported for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Successful,
    Failed,
    Cancelled,
}

/// One record per terminal transition, the single place the UI learns how a
/// command ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: CommandId,
    pub kind: CommandKind,
    pub status: CommandStatus,
    pub target_type: String,
    pub target_id: String,
    pub name_before: Option<String>,
    pub name_after: Option<String>,
    /// `ConflictFound` or `RequestFailed` when the command was cancelled
    /// because of one of them.
    pub via: Option<CommandState>,
    pub detail: Option<String>,
}

impl CommandResult {
    pub fn is_retryable(&self) -> bool {
        self.via == Some(CommandState::RequestFailed)
    }
}

/// Marker the local book keeps on an entry while a command is pending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub command_id: CommandId,
    pub kind: CommandKind,
    /// Seconds left in the grace period; zero once it has elapsed.
    pub remaining_secs: u64,
}
