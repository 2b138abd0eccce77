use std::sync::{Arc, Mutex};
use std::time::Duration;

use abook_core::LocalBook;
use abook_remote::{RemoteError, RemoteFacade};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::CommandRegistry;

/// What one pull changed in the local book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub removed: usize,
    /// Changes to persons with an in-flight command, left for that command.
    pub skipped: usize,
    pub tags: usize,
}

/// Pulls remote changes into the backing book.
///
/// The first pull lists everything; later pulls only ask for persons updated
/// since the newest change seen so far.
pub struct RemoteSync {
    book: Arc<LocalBook>,
    facade: Arc<RemoteFacade>,
    registry: Arc<CommandRegistry>,
    last_seen: Mutex<Option<DateTime<Utc>>>,
}

impl RemoteSync {
    pub fn new(
        book: Arc<LocalBook>,
        facade: Arc<RemoteFacade>,
        registry: Arc<CommandRegistry>,
    ) -> Self {
        RemoteSync {
            book,
            facade,
            registry,
            last_seen: Mutex::new(None),
        }
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn sync_once(&self) -> Result<SyncReport, RemoteError> {
        let since = self.last_seen();
        let persons = match since {
            Some(since) => self.facade.list_persons_updated_since(since).await,
            None => self.facade.list_persons().await,
        }
        .into_result()?;

        let mut report = SyncReport::default();
        let mut newest = since;
        let mut oldest_skipped: Option<DateTime<Utc>> = None;
        for remote in &persons {
            let id = remote.person_id();
            if self.registry.has_ongoing(&id) {
                report.skipped += 1;
                oldest_skipped = Some(
                    oldest_skipped.map_or(remote.updated_at, |t| t.min(remote.updated_at)),
                );
                continue;
            }
            newest = newest.max(Some(remote.updated_at));
            if remote.deleted {
                if self.book.remove_backing(&id) {
                    report.removed += 1;
                }
            } else if self.book.upsert_backing(remote.to_person()) {
                report.upserted += 1;
            }
        }

        if since.is_none() {
            // A full listing also tells us which confirmed persons are gone.
            for local in self.book.backing_persons() {
                let listed = persons.iter().any(|p| p.person_id() == local.id);
                if !listed
                    && !local.id.is_provisional()
                    && !self.registry.has_ongoing(&local.id)
                    && self.book.remove_backing(&local.id)
                {
                    report.removed += 1;
                }
            }
        }

        let tags = self.facade.list_tags().await.into_result()?;
        report.tags = tags.len();
        self.book.replace_tags(tags.into_iter().map(|t| t.name));

        // Skipped changes are fetched again next time.
        if let (Some(skipped), Some(current)) = (oldest_skipped, newest) {
            if skipped <= current {
                newest = Some(skipped - chrono::Duration::microseconds(1)).max(since);
            }
        }
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = newest;
        debug!(?report, "sync finished");
        Ok(report)
    }

    /// Pull on a fixed interval until the returned task is aborted.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "periodic sync started");
            loop {
                ticker.tick().await;
                match sync.sync_once().await {
                    Ok(report) => debug!(?report, "periodic sync"),
                    Err(e) if e.is_transient() => debug!(error = %e, "periodic sync will retry"),
                    Err(e) => warn!(error = %e, "periodic sync failed"),
                }
            }
        })
    }
}
