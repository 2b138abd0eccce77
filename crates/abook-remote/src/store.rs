use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use abook_core::{json_hash, PersonData, Tag};
use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::response::{paginate, PageLinks, QuotaStatus, RemotePerson, RemoteTag};

const QUOTA_WINDOW_SECS: i64 = 3600;

const FIRST_NAMES: &[&str] = &[
    "Alex", "Bernice", "Charlotte", "David", "Irfan", "Roy", "Lina", "Marcus", "Nadia", "Oscar",
];
const LAST_NAMES: &[&str] = &[
    "Yeoh", "Yu", "Oliveiro", "Li", "Ibrahim", "Balakrishnan", "Tan", "Ng", "Kumar", "Lim",
];

/// Successful store operation, with the headers the remote reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub value: T,
    pub etag: String,
    pub quota: QuotaStatus,
    pub pages: Option<PageLinks>,
}

/// Epoch seconds of the hour boundary following `now`.
pub fn next_reset(now: i64) -> i64 {
    (now.div_euclid(QUOTA_WINDOW_SECS) + 1) * QUOTA_WINDOW_SECS
}

struct Quota {
    limit: u32,
    remaining: u32,
    reset_at: i64,
}

impl Quota {
    fn roll_over(&mut self, now: i64) {
        if now >= self.reset_at {
            debug!(limit = self.limit, "quota window rolled over");
            self.remaining = self.limit;
            self.reset_at = next_reset(now);
        }
    }

    fn status(&self) -> QuotaStatus {
        QuotaStatus {
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
        }
    }
}

#[derive(Default)]
struct Collection {
    persons: BTreeMap<u64, RemotePerson>,
    tags: BTreeSet<String>,
    next_id: u64,
}

struct StoreState {
    collections: HashMap<String, Collection>,
    quota: Quota,
    last_stamp: DateTime<Utc>,
}

impl StoreState {
    /// Strictly increasing modification timestamps, so "updated since" never
    /// misses a change made within the same clock tick.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = if now > self.last_stamp {
            now
        } else {
            self.last_stamp + chrono::Duration::microseconds(1)
        };
        self.last_stamp = stamp;
        stamp
    }
}

/// In-process data store for named collections, gated by an hourly quota.
///
/// Every request runs its quota check, its operation and its quota spend
/// under one lock, so concurrent requests can never both spend the last unit.
pub struct RateLimitedStore {
    state: Mutex<StoreState>,
    max_page_size: usize,
}

impl RateLimitedStore {
    pub fn new(quota_limit: u32, max_page_size: usize) -> Self {
        let now = Utc::now();
        RateLimitedStore {
            state: Mutex::new(StoreState {
                collections: HashMap::new(),
                quota: Quota {
                    limit: quota_limit,
                    remaining: quota_limit,
                    reset_at: next_reset(now.timestamp()),
                },
                last_stamp: now,
            }),
            max_page_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Quota check, operation, change-token comparison and quota spend as a
    /// single atomic step.
    fn execute<T, F>(
        &self,
        collection: &str,
        etag: Option<&str>,
        op: F,
    ) -> Result<Stored<T>, StoreError>
    where
        T: Serialize,
        F: FnOnce(&mut Collection, DateTime<Utc>) -> Result<(T, Option<PageLinks>), StoreError>,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.quota.roll_over(Utc::now().timestamp());
        if state.quota.remaining == 0 {
            warn!(collection, reset_at = state.quota.reset_at, "quota exhausted");
            return Err(StoreError::QuotaExceeded {
                reset_at: state.quota.reset_at,
            });
        }

        let stamp = state.next_stamp();
        let books = state.collections.entry(collection.to_string()).or_default();
        let (value, pages) = op(books, stamp)?;

        // Links are part of the token: a grown listing must not leave a
        // cached first page pointing at the old last page.
        let token =
            json_hash(&(&value, &pages)).map_err(|e| StoreError::BadRequest(e.to_string()))?;
        if etag == Some(token.as_str()) {
            return Err(StoreError::NotModified);
        }

        state.quota.remaining -= 1;
        Ok(Stored {
            value,
            etag: token,
            quota: state.quota.status(),
            pages,
        })
    }

    fn check_page_size(&self, size: usize) -> Result<(), StoreError> {
        if size == 0 || size > self.max_page_size {
            return Err(StoreError::BadRequest(format!(
                "page size must be between 1 and {}, got {}",
                self.max_page_size, size
            )));
        }
        Ok(())
    }

    pub fn create_person(
        &self,
        collection: &str,
        data: &PersonData,
    ) -> Result<Stored<RemotePerson>, StoreError> {
        self.execute(collection, None, |books, stamp| {
            check_person(books, data)?;
            books.next_id += 1;
            let person = RemotePerson {
                id: books.next_id,
                data: data.clone(),
                updated_at: stamp,
                deleted: false,
            };
            books.persons.insert(person.id, person.clone());
            debug!(id = person.id, "created person");
            Ok((person, None))
        })
    }

    pub fn update_person(
        &self,
        collection: &str,
        id: u64,
        data: &PersonData,
    ) -> Result<Stored<RemotePerson>, StoreError> {
        self.execute(collection, None, |books, stamp| {
            check_person(books, data)?;
            let person = live_person(books, id)?;
            person.data = data.clone();
            person.updated_at = stamp;
            debug!(id, "updated person");
            Ok((person.clone(), None))
        })
    }

    /// Soft delete: the record stays visible to updated-since listings.
    pub fn delete_person(&self, collection: &str, id: u64) -> Result<Stored<()>, StoreError> {
        self.execute(collection, None, |books, stamp| {
            let person = live_person(books, id)?;
            person.deleted = true;
            person.updated_at = stamp;
            debug!(id, "deleted person");
            Ok(((), None))
        })
    }

    pub fn list_persons(
        &self,
        collection: &str,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> Result<Stored<Vec<RemotePerson>>, StoreError> {
        self.check_page_size(size)?;
        self.execute(collection, etag, |books, _| {
            let live: Vec<RemotePerson> = books
                .persons
                .values()
                .filter(|p| !p.deleted)
                .cloned()
                .collect();
            let (items, links) = paginate(&live, page, size);
            Ok((items, Some(links)))
        })
    }

    /// Persons modified strictly after `since`, soft-deleted ones included.
    pub fn list_persons_updated_since(
        &self,
        collection: &str,
        since: DateTime<Utc>,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> Result<Stored<Vec<RemotePerson>>, StoreError> {
        self.check_page_size(size)?;
        self.execute(collection, etag, |books, _| {
            let changed: Vec<RemotePerson> = books
                .persons
                .values()
                .filter(|p| p.updated_at > since)
                .cloned()
                .collect();
            let (items, links) = paginate(&changed, page, size);
            Ok((items, Some(links)))
        })
    }

    pub fn create_tag(&self, collection: &str, name: &str) -> Result<Stored<RemoteTag>, StoreError> {
        self.execute(collection, None, |books, _| {
            let tag = Tag::new(name).map_err(|e| StoreError::BadRequest(e.to_string()))?;
            if !books.tags.insert(tag.name.clone()) {
                return Err(StoreError::AlreadyExists(tag.name));
            }
            Ok((RemoteTag { name: tag.name }, None))
        })
    }

    /// Rename a tag, carrying the new name over to every person using it.
    pub fn update_tag(
        &self,
        collection: &str,
        name: &str,
        new_name: &str,
    ) -> Result<Stored<RemoteTag>, StoreError> {
        self.execute(collection, None, |books, stamp| {
            let tag = Tag::new(new_name).map_err(|e| StoreError::BadRequest(e.to_string()))?;
            if !books.tags.contains(name) {
                return Err(tag_not_found(name));
            }
            if books.tags.contains(&tag.name) {
                return Err(StoreError::AlreadyExists(tag.name));
            }
            books.tags.remove(name);
            books.tags.insert(tag.name.clone());
            for person in books.persons.values_mut() {
                if person.data.tags.remove(name) {
                    person.data.tags.insert(tag.name.clone());
                    person.updated_at = stamp;
                }
            }
            Ok((RemoteTag { name: tag.name }, None))
        })
    }

    /// Delete a tag and detach it from every person.
    pub fn delete_tag(&self, collection: &str, name: &str) -> Result<Stored<()>, StoreError> {
        self.execute(collection, None, |books, stamp| {
            if !books.tags.remove(name) {
                return Err(tag_not_found(name));
            }
            for person in books.persons.values_mut() {
                if person.data.tags.remove(name) {
                    person.updated_at = stamp;
                }
            }
            Ok(((), None))
        })
    }

    pub fn list_tags(
        &self,
        collection: &str,
        page: usize,
        size: usize,
        etag: Option<&str>,
    ) -> Result<Stored<Vec<RemoteTag>>, StoreError> {
        self.check_page_size(size)?;
        self.execute(collection, etag, |books, _| {
            let tags: Vec<RemoteTag> = books
                .tags
                .iter()
                .map(|name| RemoteTag { name: name.clone() })
                .collect();
            let (items, links) = paginate(&tags, page, size);
            Ok((items, Some(links)))
        })
    }

    /// Current quota headers. Never spends quota.
    pub fn quota_status(&self) -> QuotaStatus {
        let mut state = self.lock();
        state.quota.roll_over(Utc::now().timestamp());
        state.quota.status()
    }

    /// Refill the quota and start a new window.
    pub fn reset_quota(&self) {
        let mut state = self.lock();
        state.quota.remaining = state.quota.limit;
        state.quota.reset_at = next_reset(Utc::now().timestamp());
        info!(limit = state.quota.limit, reset_at = state.quota.reset_at, "quota reset");
    }

    /// Reset the quota at every hour boundary until the store is dropped.
    pub fn spawn_quota_reset(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let wait = match store.upgrade() {
                    Some(store) => store.until_reset(),
                    None => break,
                };
                tokio::time::sleep(wait).await;
                match store.upgrade() {
                    Some(store) => store.reset_quota(),
                    None => break,
                }
            }
        })
    }

    fn until_reset(&self) -> Duration {
        let reset_at = self.lock().quota.reset_at;
        let secs = (reset_at - Utc::now().timestamp()).max(0);
        Duration::from_secs(secs as u64)
    }

    /// Change a random field of a random live person, out-of-band. Spends no
    /// quota. Returns the id of the changed person.
    pub fn mutate_random_person<R: Rng>(&self, collection: &str, rng: &mut R) -> Option<u64> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let stamp = state.next_stamp();
        let books = state.collections.get_mut(collection)?;
        let person = books.persons.values_mut().filter(|p| !p.deleted).choose(rng)?;

        match rng.gen_range(0..4) {
            0 => person.data.phone = Some(random_phone(rng)),
            1 => person.data.email = Some(format!("{}@example.com", rng.gen_range(100..1000))),
            2 => person.data.address = Some(format!("Blk {} Random Street", rng.gen_range(1..500))),
            _ => person.data.name = random_name(rng),
        }
        person.updated_at = stamp;
        debug!(collection, id = person.id, "out-of-band mutation");
        Some(person.id)
    }

    /// Insert a brand-new person, out-of-band. Spends no quota.
    pub fn insert_random_person<R: Rng>(&self, collection: &str, rng: &mut R) -> u64 {
        let mut data = PersonData::named(random_name(rng));
        data.phone = Some(random_phone(rng));
        self.insert_unmetered(collection, data).id
    }

    /// Add a person without going through the quota, e.g. to seed a collection.
    pub fn insert_unmetered(&self, collection: &str, data: PersonData) -> RemotePerson {
        let mut guard = self.lock();
        let state = &mut *guard;
        let stamp = state.next_stamp();
        let books = state.collections.entry(collection.to_string()).or_default();
        books.tags.extend(data.tags.iter().cloned());
        books.next_id += 1;
        let person = RemotePerson {
            id: books.next_id,
            data,
            updated_at: stamp,
            deleted: false,
        };
        books.persons.insert(person.id, person.clone());
        debug!(collection, id = person.id, "out-of-band insertion");
        person
    }

    /// Look at a stored person, deleted or not, without spending quota.
    pub fn peek_person(&self, collection: &str, id: u64) -> Option<RemotePerson> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|books| books.persons.get(&id).cloned())
    }

    /// Number of live persons in a collection, without spending quota.
    pub fn live_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|books| books.persons.values().filter(|p| !p.deleted).count())
            .unwrap_or(0)
    }
}

fn live_person(books: &mut Collection, id: u64) -> Result<&mut RemotePerson, StoreError> {
    match books.persons.get_mut(&id) {
        Some(person) if !person.deleted => Ok(person),
        _ => Err(StoreError::NotFound {
            resource: "person",
            id: id.to_string(),
        }),
    }
}

fn tag_not_found(name: &str) -> StoreError {
    StoreError::NotFound {
        resource: "tag",
        id: name.to_string(),
    }
}

fn check_person(books: &Collection, data: &PersonData) -> Result<(), StoreError> {
    if data.name.trim().is_empty() {
        return Err(StoreError::BadRequest("person name must not be empty".into()));
    }
    if let Some(unknown) = data.tags.iter().find(|t| !books.tags.contains(*t)) {
        return Err(StoreError::BadRequest(format!("unknown tag: {}", unknown)));
    }
    Ok(())
}

fn random_name<R: Rng>(rng: &mut R) -> String {
    format!(
        "{} {}",
        FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
        LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
    )
}

fn random_phone<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", rng.gen_range(6000..10000), rng.gen_range(1000..10000))
}
