use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use abook_config::RemoteConfig;
use abook_core::PersonData;
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::response::{QuotaStatus, RemotePerson, RemoteResponse, RemoteTag, StatusCode};
use crate::store::{RateLimitedStore, Stored};

/// Prefix of injected failure messages, to tell them apart from real errors.
pub const FAULT_PREFIX: &str = "[fault-injected]";

/// Unreliability knobs of the simulated remote.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultConfig {
    /// Probability of an immediate 500 per request (0.0-1.0).
    pub failure_rate: f64,
    /// Probability of a random delay per request (0.0-1.0).
    pub latency_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Probability that a list request first mutates a live person.
    pub mutation_rate: f64,
    /// Probability that a list request first inserts a new person.
    pub insertion_rate: f64,
}

impl FaultConfig {
    /// No failures, no latency, no out-of-band changes.
    pub fn reliable() -> Self {
        Self::default()
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        FaultConfig {
            failure_rate: 0.0,
            latency_rate: 0.0,
            min_latency: Duration::from_millis(50),
            max_latency: Duration::from_secs(1),
            mutation_rate: 0.0,
            insertion_rate: 0.0,
        }
    }
}

impl From<&RemoteConfig> for FaultConfig {
    fn from(config: &RemoteConfig) -> Self {
        FaultConfig {
            failure_rate: config.failure_rate,
            latency_rate: config.latency_rate,
            min_latency: config.min_latency.as_duration(),
            max_latency: config.max_latency.as_duration(),
            mutation_rate: config.mutation_rate,
            insertion_rate: config.insertion_rate,
        }
    }
}

/// Counts of injected behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub failures: usize,
    pub delays: usize,
    pub mutations: usize,
    pub insertions: usize,
}

/// Remote endpoint over a `RateLimitedStore` that fails, stalls and changes
/// data behind the client's back.
///
/// Every operation runs the same sequence: maybe fail with a 500, maybe
/// sleep, then hand over to the store, which checks the quota, performs the
/// operation and compares change tokens atomically.
pub struct SimulatedRemote {
    store: Arc<RateLimitedStore>,
    rng: Mutex<ChaCha8Rng>,
    faults: RwLock<FaultConfig>,
    failures: AtomicUsize,
    delays: AtomicUsize,
    mutations: AtomicUsize,
    insertions: AtomicUsize,
}

impl SimulatedRemote {
    pub fn new(store: Arc<RateLimitedStore>, rng: ChaCha8Rng, faults: FaultConfig) -> Self {
        SimulatedRemote {
            store,
            rng: Mutex::new(rng),
            faults: RwLock::new(faults),
            failures: AtomicUsize::new(0),
            delays: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
            insertions: AtomicUsize::new(0),
        }
    }

    /// Build a remote with its own store. Seeded when the config names a seed.
    pub fn from_config(config: &RemoteConfig) -> Self {
        let store = Arc::new(RateLimitedStore::new(
            config.quota_limit,
            config.max_page_size,
        ));
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self::new(store, rng, FaultConfig::from(config))
    }

    pub fn store(&self) -> &Arc<RateLimitedStore> {
        &self.store
    }

    pub fn faults(&self) -> FaultConfig {
        self.faults.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Swap the fault profile; applies to requests issued from now on.
    pub fn set_faults(&self, faults: FaultConfig) {
        debug!(?faults, "fault profile changed");
        *self.faults.write().unwrap_or_else(|e| e.into_inner()) = faults;
    }

    pub fn stats(&self) -> FaultStats {
        FaultStats {
            failures: self.failures.load(Ordering::Relaxed),
            delays: self.delays.load(Ordering::Relaxed),
            mutations: self.mutations.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
        }
    }

    /// Roll the RNG against a probability.
    async fn roll(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let roll: f64 = self.rng.lock().await.gen();
        roll < rate
    }

    /// Injected failure and latency shared by every operation. An `Err` is the
    /// response to return immediately.
    async fn disrupt<T>(&self, op: &str) -> Result<(), RemoteResponse<T>> {
        let faults = self.faults();

        if self.roll(faults.failure_rate).await {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(op, "{} remote failure", FAULT_PREFIX);
            return Err(RemoteResponse::error(
                StatusCode::INTERNAL_ERROR,
                format!("{} {} failed", FAULT_PREFIX, op),
                self.store.quota_status(),
            ));
        }

        if self.roll(faults.latency_rate).await {
            let delay = {
                let mut rng = self.rng.lock().await;
                if faults.max_latency > faults.min_latency {
                    rng.gen_range(faults.min_latency..=faults.max_latency)
                } else {
                    faults.min_latency
                }
            };
            self.delays.fetch_add(1, Ordering::Relaxed);
            debug!(op, delay_ms = delay.as_millis() as u64, "{} remote latency", FAULT_PREFIX);
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    /// Out-of-band changes that list requests may observe.
    /// Out-of-band changes riding on a list request. A request the quota
    /// gate will refuse touches nothing.
    async fn perturb(&self, collection: &str) {
        if self.store.quota_status().remaining == 0 {
            return;
        }
        let faults = self.faults();
        if self.roll(faults.mutation_rate).await {
            let mut rng = self.rng.lock().await;
            if let Some(id) = self.store.mutate_random_person(collection, &mut *rng) {
                self.mutations.fetch_add(1, Ordering::Relaxed);
                debug!(collection, id, "{} concurrent mutation", FAULT_PREFIX);
            }
        }
        if self.roll(faults.insertion_rate).await {
            let mut rng = self.rng.lock().await;
            let id = self.store.insert_random_person(collection, &mut *rng);
            self.insertions.fetch_add(1, Ordering::Relaxed);
            debug!(collection, id, "{} concurrent insertion", FAULT_PREFIX);
        }
    }

    fn respond<T>(&self, result: Result<Stored<T>, StoreError>, ok: StatusCode) -> RemoteResponse<T> {
        match result {
            Ok(stored) => RemoteResponse {
                status: ok,
                payload: Some(stored.value),
                etag: Some(stored.etag),
                quota: stored.quota,
                pages: stored.pages,
                message: None,
            },
            Err(err) => {
                debug!(status = %err.status(), error = %err, "remote request rejected");
                RemoteResponse::error(err.status(), err.to_string(), self.store.quota_status())
            }
        }
    }

    pub async fn create_person(
        &self,
        collection: &str,
        data: &PersonData,
    ) -> RemoteResponse<RemotePerson> {
        if let Err(resp) = self.disrupt("create_person").await {
            return resp;
        }
        self.respond(self.store.create_person(collection, data), StatusCode::CREATED)
    }

    pub async fn update_person(
        &self,
        collection: &str,
        id: u64,
        data: &PersonData,
    ) -> RemoteResponse<RemotePerson> {
        if let Err(resp) = self.disrupt("update_person").await {
            return resp;
        }
        self.respond(self.store.update_person(collection, id, data), StatusCode::OK)
    }

    pub async fn delete_person(&self, collection: &str, id: u64) -> RemoteResponse<()> {
        if let Err(resp) = self.disrupt("delete_person").await {
            return resp;
        }
        self.respond(self.store.delete_person(collection, id), StatusCode::NO_CONTENT)
    }

    pub async fn list_persons(
        &self,
        collection: &str,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> RemoteResponse<Vec<RemotePerson>> {
        if let Err(resp) = self.disrupt("list_persons").await {
            return resp;
        }
        self.perturb(collection).await;
        self.respond(
            self.store.list_persons(collection, page, size, etag),
            StatusCode::OK,
        )
    }

    pub async fn list_persons_updated_since(
        &self,
        collection: &str,
        since: DateTime<Utc>,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> RemoteResponse<Vec<RemotePerson>> {
        if let Err(resp) = self.disrupt("list_persons_updated_since").await {
            return resp;
        }
        self.perturb(collection).await;
        self.respond(
            self.store
                .list_persons_updated_since(collection, since, page, size, etag),
            StatusCode::OK,
        )
    }

    pub async fn create_tag(&self, collection: &str, name: &str) -> RemoteResponse<RemoteTag> {
        if let Err(resp) = self.disrupt("create_tag").await {
            return resp;
        }
        self.respond(self.store.create_tag(collection, name), StatusCode::CREATED)
    }

    pub async fn update_tag(
        &self,
        collection: &str,
        name: &str,
        new_name: &str,
    ) -> RemoteResponse<RemoteTag> {
        if let Err(resp) = self.disrupt("update_tag").await {
            return resp;
        }
        self.respond(
            self.store.update_tag(collection, name, new_name),
            StatusCode::OK,
        )
    }

    pub async fn delete_tag(&self, collection: &str, name: &str) -> RemoteResponse<()> {
        if let Err(resp) = self.disrupt("delete_tag").await {
            return resp;
        }
        self.respond(self.store.delete_tag(collection, name), StatusCode::NO_CONTENT)
    }

    pub async fn list_tags(
        &self,
        collection: &str,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> RemoteResponse<Vec<RemoteTag>> {
        if let Err(resp) = self.disrupt("list_tags").await {
            return resp;
        }
        self.respond(self.store.list_tags(collection, page, size, etag), StatusCode::OK)
    }

    /// Quota headers only. Never fails, never spends quota.
    pub async fn get_quota_status(&self) -> RemoteResponse<QuotaStatus> {
        let quota = self.store.quota_status();
        RemoteResponse {
            status: StatusCode::OK,
            payload: Some(quota),
            etag: None,
            quota,
            pages: None,
            message: None,
        }
    }
}
