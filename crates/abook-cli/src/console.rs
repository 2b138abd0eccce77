use abook_core::{
    Alert, AlertSink, CommandId, CommandKind, CommandObserver, CommandResult, CommandState,
    CommandStatus, InputPrompt, InputProvider, PersonInput,
};
use async_trait::async_trait;

/// Non-interactive sessions have no form to show: every prompt is dismissed.
pub struct NoPrompt;

#[async_trait]
impl InputProvider for NoPrompt {
    async fn request_input(&self, prompt: InputPrompt) -> Option<PersonInput> {
        if let Some(error) = prompt.error {
            eprintln!("{} {}: {}", prompt.command_id, prompt.kind, error);
        }
        None
    }
}

pub struct PrintAlerts;

#[async_trait]
impl AlertSink for PrintAlerts {
    async fn alert(&self, alert: Alert) {
        eprintln!("[{}] {}: {}", alert.command_id, alert.title, alert.message);
    }
}

/// Prints state changes and the grace countdown.
pub struct PrintProgress;

impl CommandObserver for PrintProgress {
    fn state_changed(&self, id: CommandId, kind: CommandKind, state: CommandState) {
        println!("{id} {kind:<6} {state}");
    }

    fn grace_tick(&self, id: CommandId, remaining_secs: u64) {
        if remaining_secs > 0 {
            println!("{id} {:<6} {remaining_secs}s left to cancel", "");
        }
    }
}

pub fn format_result(result: &CommandResult) -> String {
    let status = match result.status {
        CommandStatus::Successful => "successful",
        CommandStatus::Failed => "failed",
        CommandStatus::Cancelled => "cancelled",
    };
    let names = match (&result.name_before, &result.name_after) {
        (Some(before), Some(after)) if before != after => format!("{before} -> {after}"),
        (_, Some(name)) | (Some(name), None) => name.clone(),
        (None, None) => "-".to_string(),
    };
    let mut line = format!(
        "{} {} {} {} [{} {}]",
        result.command_id, result.kind, status, names, result.target_type, result.target_id
    );
    if let Some(via) = result.via {
        line.push_str(&format!(" via {via}"));
    }
    if let Some(detail) = &result.detail {
        line.push_str(&format!(": {detail}"));
    }
    line
}
