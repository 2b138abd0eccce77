use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use abook_command::{CommandIntent, CommandRegistry, CommandService, RemoteSync};
use abook_config::AbookConfig;
use abook_core::{
    AlertSink, BookStorage, CommandId, CommandKind, CommandObserver, CommandResult, CommandState,
    CommandStatus, InputProvider, LocalBook, MemoryStorage, PersonId,
};
use abook_remote::{FaultConfig, QuotaStatus, RateLimitedStore, RemoteFacade, SimulatedRemote};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::actors::{RandomInput, RecordingAlerts, RecordingObserver};
use crate::invariants::{
    check_exclusive_targets, check_final_consistency, check_paths, check_quota, Violation,
};
use crate::ops::{generate, Op, OpContext};

/// Persons on the remote before the first step.
const SEED_PERSONS: usize = 8;
/// Virtual time every step lets pass so spawned commands make progress.
const STEP_PAUSE: Duration = Duration::from_millis(50);
const INITIAL_SYNC_ATTEMPTS: usize = 20;
/// Quota the closing sync needs; below this the quota is refilled first.
const FINAL_SYNC_QUOTA: u32 = 50;

/// Outcome summary of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub steps: usize,
    pub submitted: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub alerts: usize,
    pub prompts: usize,
    pub syncs: usize,
    pub injected_failures: usize,
    pub injected_delays: usize,
    pub remote_mutations: usize,
    pub remote_insertions: usize,
    pub quota_remaining: u32,
    pub violations: Vec<Violation>,
}

/// Deterministic simulation of a user driving the command service against
/// an unreliable remote.
///
/// Drive it from a current-thread runtime with paused time: invariant checks
/// then run between command task polls and see consistent state.
pub struct Sim {
    seed: u64,
    rng: ChaCha8Rng,
    step: usize,
    service: CommandService,
    sync: RemoteSync,
    store: Arc<RateLimitedStore>,
    remote: Arc<SimulatedRemote>,
    input: Arc<RandomInput>,
    alerts: Arc<RecordingAlerts>,
    observer: Arc<RecordingObserver>,
    feed: broadcast::Receiver<CommandResult>,
    results: Vec<CommandResult>,
    quota: QuotaStatus,
    submitted: usize,
    cancelled_in_grace: HashSet<CommandId>,
    syncs: usize,
    violations: Vec<Violation>,
}

impl Sim {
    /// Build a simulation over a remote seeded with a few persons, then
    /// load them into the local book.
    pub async fn new(seed: u64, config: &AbookConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let collection = config.collection.as_str();

        let store = Arc::new(RateLimitedStore::new(
            config.remote.quota_limit,
            config.remote.max_page_size,
        ));
        for _ in 0..SEED_PERSONS {
            store.insert_random_person(collection, &mut rng);
        }
        let remote = Arc::new(SimulatedRemote::new(
            Arc::clone(&store),
            ChaCha8Rng::seed_from_u64(rng.gen()),
            FaultConfig::from(&config.remote),
        ));
        let facade = Arc::new(RemoteFacade::new(
            Arc::clone(&remote),
            collection,
            config.sync.page_size,
            config.remote.page_cache_capacity,
        ));

        let book = Arc::new(LocalBook::new());
        let registry = Arc::new(CommandRegistry::new());
        let input = Arc::new(RandomInput::new(ChaCha8Rng::seed_from_u64(rng.gen())));
        let alerts = Arc::new(RecordingAlerts::default());
        let observer = Arc::new(RecordingObserver::default());

        let service = CommandService::builder(
            Arc::clone(&book),
            Arc::clone(&facade),
            Arc::clone(&input) as Arc<dyn InputProvider>,
        )
        .alerts(Arc::clone(&alerts) as Arc<dyn AlertSink>)
        .observer(Arc::clone(&observer) as Arc<dyn CommandObserver>)
        .storage(Arc::new(MemoryStorage::new()) as Arc<dyn BookStorage>)
        .registry(Arc::clone(&registry))
        .config(&config.command)
        .build();
        let feed = service.subscribe();
        let sync = RemoteSync::new(book, facade, registry);
        let quota = store.quota_status();

        let mut sim = Sim {
            seed,
            rng,
            step: 0,
            service,
            sync,
            store,
            remote,
            input,
            alerts,
            observer,
            feed,
            results: Vec::new(),
            quota,
            submitted: 0,
            cancelled_in_grace: HashSet::new(),
            syncs: 0,
            violations: Vec::new(),
        };
        sim.initial_sync().await;
        sim
    }

    async fn initial_sync(&mut self) {
        for attempt in 1..=INITIAL_SYNC_ATTEMPTS {
            match self.sync.sync_once().await {
                Ok(report) => {
                    debug!(attempt, ?report, "initial sync");
                    break;
                }
                Err(e) => debug!(attempt, error = %e, "initial sync failed"),
            }
        }
        self.quota = self.store.quota_status();
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn service(&self) -> &CommandService {
        &self.service
    }

    pub fn remote(&self) -> &Arc<SimulatedRemote> {
        &self.remote
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Run `steps` random operations, wait for every command to finish and
    /// check the final state.
    pub async fn run(&mut self, steps: usize) -> &[Violation] {
        for _ in 0..steps {
            let ctx = self.op_context();
            let op = generate(&mut self.rng, &ctx);
            self.step_with(op).await;
        }
        self.settle().await;
        &self.violations
    }

    fn op_context(&self) -> OpContext {
        let book = self.service.book();
        let mut persons: Vec<PersonId> = book
            .visible_persons()
            .into_iter()
            .map(|(person, _)| person.id)
            .collect();
        // Hidden persons are still valid (if doomed) targets.
        for person in book.backing_persons() {
            if !persons.contains(&person.id) {
                persons.push(person.id);
            }
        }
        let retryable = self
            .results
            .iter()
            .filter(|r| r.is_retryable())
            .map(|r| r.command_id)
            .collect();
        OpContext {
            persons,
            in_flight: self.service.in_flight(),
            retryable,
        }
    }

    /// Execute one operation, let commands run briefly, then check the
    /// step invariants. Returns the violations found in this step.
    pub async fn step_with(&mut self, op: Op) -> Vec<Violation> {
        debug!(step = self.step, ?op, "sim step");
        match op {
            Op::Add => self.submit(CommandIntent::Add { input: None }),
            Op::Edit { target } => self.submit(CommandIntent::Edit {
                target,
                input: None,
            }),
            Op::Delete { target } => self.submit(CommandIntent::Delete { target }),
            Op::Cancel { command } => {
                if self.service.cancel(command) {
                    self.cancelled_in_grace.insert(command);
                }
            }
            Op::OverrideEdit { command, input } => {
                if let Err(e) = self.service.override_with_edit(command, input) {
                    debug!(command_id = %command, error = %e, "override rejected");
                }
            }
            Op::OverrideDelete { command } => {
                if self.service.override_with_delete(command) {
                    self.cancelled_in_grace.insert(command);
                }
            }
            Op::Retry { command } => {
                if self.service.retry(command).is_some() {
                    self.submitted += 1;
                }
            }
            Op::Sync => {
                self.syncs += 1;
                if let Err(e) = self.sync.sync_once().await {
                    debug!(error = %e, "sync failed");
                }
            }
            Op::Advance { millis } => tokio::time::sleep(Duration::from_millis(millis)).await,
        }
        tokio::time::sleep(STEP_PAUSE).await;
        self.drain_feed();

        let mut found = check_exclusive_targets(self.step, &self.service);
        let quota = self.store.quota_status();
        found.extend(check_quota(self.step, &self.quota, &quota));
        self.quota = quota;

        self.step += 1;
        self.violations.extend(found.iter().cloned());
        found
    }

    fn submit(&mut self, intent: CommandIntent) {
        self.service.submit(intent);
        self.submitted += 1;
    }

    fn drain_feed(&mut self) {
        loop {
            match self.feed.try_recv() {
                Ok(result) => self.results.push(result),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "simulation fell behind the result feed");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// Let every command finish, resync over a reliable remote and run the
    /// final checks.
    pub async fn settle(&mut self) {
        self.service.wait_idle().await;
        self.drain_feed();

        self.remote.set_faults(FaultConfig::reliable());
        if self.store.quota_status().remaining < FINAL_SYNC_QUOTA {
            self.store.reset_quota();
        }
        self.quota = self.store.quota_status();
        if let Err(e) = self.sync.sync_once().await {
            self.violations.push(Violation {
                step: self.step,
                invariant: "final-sync".to_string(),
                details: e.to_string(),
            });
        }

        let deleted: Vec<PersonId> = self
            .results
            .iter()
            .filter(|r| r.kind == CommandKind::Delete && r.status == CommandStatus::Successful)
            .map(|r| PersonId::new(r.target_id.clone()))
            .collect();
        let mut found = check_paths(self.step, &self.observer, &self.cancelled_in_grace);
        found.extend(check_final_consistency(
            self.step,
            &self.service,
            &self.store,
            &deleted,
        ));
        self.violations.extend(found);
    }

    pub fn report(&self) -> SimReport {
        let count = |status: CommandStatus| self.results.iter().filter(|r| r.status == status).count();
        let faults = self.remote.stats();
        SimReport {
            seed: self.seed,
            steps: self.step,
            submitted: self.submitted,
            successful: count(CommandStatus::Successful),
            failed: count(CommandStatus::Failed),
            cancelled: count(CommandStatus::Cancelled),
            alerts: self.alerts.alerts().len(),
            prompts: self.input.prompts(),
            syncs: self.syncs,
            injected_failures: faults.failures,
            injected_delays: faults.delays,
            remote_mutations: faults.mutations,
            remote_insertions: faults.insertions,
            quota_remaining: self.quota.remaining,
            violations: self.violations.clone(),
        }
    }

    /// States a command went through, as seen by the observer.
    pub fn path(&self, id: CommandId) -> Vec<CommandState> {
        self.observer.path(id)
    }
}
