//! Stand-ins for the user: a form filler that answers at random and sinks
//! that remember what they were shown.

use std::collections::HashMap;
use std::sync::Mutex;

use abook_core::{
    Alert, AlertSink, CommandId, CommandKind, CommandObserver, CommandState, InputPrompt,
    InputProvider, PersonInput,
};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Bernice", "Charlotte", "David", "Irfan", "Roy", "Yeoh", "Li", "Wong", "Ibrahim",
];
const LAST_NAMES: &[&str] = &["Yeoh", "Yu", "Oliveiro", "Li", "Ibrahim", "Balakrishnan", "Tan"];
pub const TAGS: &[&str] = &["friends", "family", "colleagues", "neighbours"];

/// Fill in a random person form, occasionally with invalid values.
pub fn random_input(rng: &mut ChaCha8Rng, invalid_rate: f64) -> PersonInput {
    if rng.gen_bool(invalid_rate) {
        return match rng.gen_range(0..3) {
            0 => PersonInput::named("  "),
            1 => PersonInput::named("Mallory").with_email("mallory-at-nowhere"),
            _ => PersonInput::named("Mallory").with_phone("12"),
        };
    }
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Alex");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Tan");
    let mut input = PersonInput::named(format!("{first} {last}"));
    if rng.gen_bool(0.5) {
        input = input.with_phone(format!("9{:07}", rng.gen_range(0..10_000_000u32)));
    }
    if rng.gen_bool(0.3) {
        input = input.with_email(format!("{}@example.com", first.to_lowercase()));
    }
    if rng.gen_bool(0.3) {
        input = input.with_tag(TAGS.choose(rng).copied().unwrap_or("friends"));
    }
    input
}

/// Answers prompts from a seeded RNG. Some answers are invalid, some
/// dismiss the form.
pub struct RandomInput {
    rng: Mutex<ChaCha8Rng>,
    invalid_rate: f64,
    dismiss_rate: f64,
    prompts: Mutex<usize>,
}

impl RandomInput {
    pub fn new(rng: ChaCha8Rng) -> Self {
        RandomInput {
            rng: Mutex::new(rng),
            invalid_rate: 0.1,
            dismiss_rate: 0.05,
            prompts: Mutex::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        *self.prompts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl InputProvider for RandomInput {
    async fn request_input(&self, _prompt: InputPrompt) -> Option<PersonInput> {
        *self.prompts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        if rng.gen_bool(self.dismiss_rate) {
            return None;
        }
        Some(random_input(&mut rng, self.invalid_rate))
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, alert: Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
    }
}

/// Keeps every command's path through the state machine.
#[derive(Default)]
pub struct RecordingObserver {
    paths: Mutex<HashMap<CommandId, (CommandKind, Vec<CommandState>)>>,
}

impl RecordingObserver {
    pub fn path(&self, id: CommandId) -> Vec<CommandState> {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|(_, path)| path.clone())
            .unwrap_or_default()
    }

    pub fn paths(&self) -> Vec<(CommandId, CommandKind, Vec<CommandState>)> {
        let paths = self.paths.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = paths
            .iter()
            .map(|(id, (kind, path))| (*id, *kind, path.clone()))
            .collect();
        all.sort_by_key(|(id, _, _)| *id);
        all
    }
}

impl CommandObserver for RecordingObserver {
    fn state_changed(&self, id: CommandId, kind: CommandKind, state: CommandState) {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_insert_with(|| (kind, Vec::new()))
            .1
            .push(state);
    }
}
