#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use abook_command::{CommandService, CommandRegistry};
use abook_core::{
    Alert, AlertSink, BookStorage, CommandId, CommandKind, CommandObserver, CommandState, InputPrompt,
    InputProvider, LocalBook, MemoryStorage, PersonData, PersonId, PersonInput,
};
use abook_remote::{FaultConfig, RateLimitedStore, RemoteFacade, SimulatedRemote};
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub const BOOK: &str = "friends";

/// Answers prompts from a queue; an empty queue dismisses the prompt.
#[derive(Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<Option<PersonInput>>>,
    prompts: Mutex<Vec<InputPrompt>>,
}

impl ScriptedInput {
    pub fn push(&self, input: PersonInput) {
        self.answers.lock().unwrap().push_back(Some(input));
    }

    pub fn push_dismiss(&self) {
        self.answers.lock().unwrap().push_back(None);
    }

    pub fn prompts(&self) -> Vec<InputPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputProvider for ScriptedInput {
    async fn request_input(&self, prompt: InputPrompt) -> Option<PersonInput> {
        self.prompts.lock().unwrap().push(prompt);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// Records every transition. Optionally breaks the remote the moment a
/// command starts its remote request.
#[derive(Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<(CommandId, CommandState)>>,
    ticks: Mutex<Vec<(CommandId, u64)>>,
    fail_requests_on: Mutex<Option<Arc<SimulatedRemote>>>,
}

impl RecordingObserver {
    pub fn states_of(&self, id: CommandId) -> Vec<CommandState> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn ticks_of(&self, id: CommandId) -> Vec<u64> {
        self.ticks
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == id)
            .map(|(_, r)| *r)
            .collect()
    }

    pub fn fail_remote_requests(&self, remote: Arc<SimulatedRemote>) {
        *self.fail_requests_on.lock().unwrap() = Some(remote);
    }

    pub fn stop_failing(&self) {
        if let Some(remote) = self.fail_requests_on.lock().unwrap().take() {
            remote.set_faults(FaultConfig::reliable());
        }
    }
}

impl CommandObserver for RecordingObserver {
    fn state_changed(&self, id: CommandId, _kind: CommandKind, state: CommandState) {
        self.transitions.lock().unwrap().push((id, state));
        if state == CommandState::RequestingRemoteChange {
            if let Some(remote) = self.fail_requests_on.lock().unwrap().as_ref() {
                remote.set_faults(FaultConfig {
                    failure_rate: 1.0,
                    ..FaultConfig::default()
                });
            }
        }
    }

    fn grace_tick(&self, id: CommandId, remaining_secs: u64) {
        self.ticks.lock().unwrap().push((id, remaining_secs));
    }
}

pub struct Harness {
    pub service: CommandService,
    pub remote: Arc<SimulatedRemote>,
    pub facade: Arc<RemoteFacade>,
    pub book: Arc<LocalBook>,
    pub registry: Arc<CommandRegistry>,
    pub input: Arc<ScriptedInput>,
    pub alerts: Arc<RecordingAlerts>,
    pub observer: Arc<RecordingObserver>,
    pub storage: Arc<MemoryStorage>,
}

impl Harness {
    pub fn new(grace_secs: u64) -> Self {
        Self::with_retention(grace_secs, abook_command::DEFAULT_FINISHED_RETENTION)
    }

    pub fn with_retention(grace_secs: u64, retain_finished: usize) -> Self {
        let remote = Arc::new(SimulatedRemote::new(
            Arc::new(RateLimitedStore::new(1000, 100)),
            ChaCha8Rng::seed_from_u64(17),
            FaultConfig::reliable(),
        ));
        let facade = Arc::new(RemoteFacade::new(Arc::clone(&remote), BOOK, 50, 128));
        let book = Arc::new(LocalBook::new());
        let registry = Arc::new(CommandRegistry::new());
        let input = Arc::new(ScriptedInput::default());
        let alerts = Arc::new(RecordingAlerts::default());
        let observer = Arc::new(RecordingObserver::default());
        let storage = Arc::new(MemoryStorage::new());

        let service = CommandService::builder(
            Arc::clone(&book),
            Arc::clone(&facade),
            Arc::clone(&input) as Arc<dyn InputProvider>,
        )
        .alerts(Arc::clone(&alerts) as Arc<dyn AlertSink>)
        .observer(Arc::clone(&observer) as Arc<dyn CommandObserver>)
        .storage(Arc::clone(&storage) as Arc<dyn BookStorage>)
        .registry(Arc::clone(&registry))
        .grace_period_secs(grace_secs)
        .retain_finished(retain_finished)
        .build();

        Harness {
            service,
            remote,
            facade,
            book,
            registry,
            input,
            alerts,
            observer,
            storage,
        }
    }

    /// Put a person on the remote and in the local book, as if synced.
    pub fn seed_person(&self, name: &str) -> PersonId {
        let remote = self
            .remote
            .store()
            .insert_unmetered(BOOK, PersonData::named(name));
        self.book.upsert_backing(remote.to_person());
        remote.person_id()
    }

    pub fn remote_name(&self, id: &PersonId) -> Option<String> {
        let remote_id = id.remote_id()?;
        self.remote
            .store()
            .peek_person(BOOK, remote_id)
            .filter(|p| !p.deleted)
            .map(|p| p.data.name)
    }
}
