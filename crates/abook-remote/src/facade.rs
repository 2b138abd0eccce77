use std::sync::Arc;

use abook_core::PersonData;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::{debug, trace};

use crate::error::RemoteError;
use crate::response::{
    PageLinks, QuotaStatus, RemotePerson, RemoteResponse, RemoteTag, StatusCode,
};
use crate::simulated::SimulatedRemote;

/// Listing a cached page belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Persons,
    Tags,
    /// Updated-since listing, keyed by its cut-off.
    PersonsUpdatedSince(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    collection: String,
    resource: ResourceKind,
    page: usize,
}

#[derive(Debug, Clone)]
enum PageItems {
    Persons(Vec<RemotePerson>),
    Tags(Vec<RemoteTag>),
}

#[derive(Debug, Clone)]
struct CachedPage {
    etag: String,
    items: PageItems,
    pages: Option<PageLinks>,
}

/// Typed result of one logical remote operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResult<T> {
    pub status: StatusCode,
    pub data: Option<T>,
    pub quota: QuotaStatus,
    /// Links of the last page fetched, for list operations.
    pub pages: Option<PageLinks>,
    pub message: Option<String>,
}

impl<T> RemoteResult<T> {
    /// True only for 2xx statuses.
    pub fn is_valid(&self) -> bool {
        self.status.is_success()
    }

    /// The data of a successful or not-modified result, otherwise the error
    /// the status stands for.
    pub fn into_result(self) -> Result<T, RemoteError> {
        match self.data {
            Some(data) if self.status.is_success() || self.status == StatusCode::NOT_MODIFIED => {
                Ok(data)
            }
            _ => Err(RemoteError::from_status(
                self.status,
                self.message.unwrap_or_default(),
                self.quota.reset_at,
            )),
        }
    }
}

impl<T> From<RemoteResponse<T>> for RemoteResult<T> {
    fn from(resp: RemoteResponse<T>) -> Self {
        RemoteResult {
            status: resp.status,
            data: resp.payload,
            quota: resp.quota,
            pages: resp.pages,
            message: resp.message,
        }
    }
}

/// Typed client over a `SimulatedRemote` for one collection.
///
/// List operations follow next-page cursors to the end and remember the
/// change token of every page, so unchanged pages come from the local cache
/// and cost no quota.
pub struct RemoteFacade {
    remote: Arc<SimulatedRemote>,
    collection: String,
    page_size: usize,
    pages: Cache<PageKey, Arc<CachedPage>>,
}

impl RemoteFacade {
    pub fn new(
        remote: Arc<SimulatedRemote>,
        collection: impl Into<String>,
        page_size: usize,
        cache_capacity: u64,
    ) -> Self {
        RemoteFacade {
            remote,
            collection: collection.into(),
            page_size,
            pages: Cache::builder().max_capacity(cache_capacity).build(),
        }
    }

    pub fn remote(&self) -> &Arc<SimulatedRemote> {
        &self.remote
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn create_person(&self, data: &PersonData) -> RemoteResult<RemotePerson> {
        self.remote.create_person(&self.collection, data).await.into()
    }

    pub async fn update_person(&self, id: u64, data: &PersonData) -> RemoteResult<RemotePerson> {
        self.remote
            .update_person(&self.collection, id, data)
            .await
            .into()
    }

    pub async fn delete_person(&self, id: u64) -> RemoteResult<()> {
        self.remote.delete_person(&self.collection, id).await.into()
    }

    pub async fn create_tag(&self, name: &str) -> RemoteResult<RemoteTag> {
        self.remote.create_tag(&self.collection, name).await.into()
    }

    pub async fn update_tag(&self, name: &str, new_name: &str) -> RemoteResult<RemoteTag> {
        self.remote
            .update_tag(&self.collection, name, new_name)
            .await
            .into()
    }

    pub async fn delete_tag(&self, name: &str) -> RemoteResult<()> {
        self.remote.delete_tag(&self.collection, name).await.into()
    }

    /// Create every tag in `names`. An already existing tag counts as created.
    pub async fn ensure_tags<'a, I>(&self, names: I) -> Result<(), RemoteError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        for name in names {
            let result = self.create_tag(name).await;
            if result.status == StatusCode::CONFLICT {
                trace!(tag = %name, "tag already exists");
                continue;
            }
            result.into_result()?;
        }
        Ok(())
    }

    pub async fn quota_status(&self) -> RemoteResult<QuotaStatus> {
        self.remote.get_quota_status().await.into()
    }

    pub async fn list_persons(&self) -> RemoteResult<Vec<RemotePerson>> {
        self.collect_pages(ResourceKind::Persons, |items| match items {
            PageItems::Persons(persons) => persons,
            PageItems::Tags(_) => Vec::new(),
        })
        .await
    }

    /// Persons changed strictly after `since`, deletions included.
    pub async fn list_persons_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<RemotePerson>> {
        self.collect_pages(ResourceKind::PersonsUpdatedSince(since), |items| match items {
            PageItems::Persons(persons) => persons,
            PageItems::Tags(_) => Vec::new(),
        })
        .await
    }

    pub async fn list_tags(&self) -> RemoteResult<Vec<RemoteTag>> {
        self.collect_pages(ResourceKind::Tags, |items| match items {
            PageItems::Tags(tags) => tags,
            PageItems::Persons(_) => Vec::new(),
        })
        .await
    }

    async fn fetch_page(
        &self,
        resource: &ResourceKind,
        page: usize,
        etag: Option<&str>,
    ) -> RemoteResponse<PageItems> {
        let collection = &self.collection;
        let size = self.page_size;
        match resource {
            ResourceKind::Persons => self
                .remote
                .list_persons(collection, page, size, etag)
                .await
                .map(PageItems::Persons),
            ResourceKind::Tags => self
                .remote
                .list_tags(collection, page, size, etag)
                .await
                .map(PageItems::Tags),
            ResourceKind::PersonsUpdatedSince(since) => self
                .remote
                .list_persons_updated_since(collection, *since, page, size, etag)
                .await
                .map(PageItems::Persons),
        }
    }

    /// Walk every page of a listing, reusing cached pages on 304.
    ///
    /// The aggregate is 200 when any page changed and 304 when none did; any
    /// other status aborts the walk and is returned as-is.
    async fn collect_pages<T>(
        &self,
        resource: ResourceKind,
        extract: fn(PageItems) -> Vec<T>,
    ) -> RemoteResult<Vec<T>> {
        let mut all = Vec::new();
        let mut changed = false;
        let mut page = 1;

        loop {
            let key = PageKey {
                collection: self.collection.clone(),
                resource: resource.clone(),
                page,
            };
            let cached = self.pages.get(&key).await;
            let etag = cached.as_ref().map(|c| c.etag.as_str());
            let resp = self.fetch_page(&resource, page, etag).await;

            let (items, links) = match (resp.status, resp.payload, cached) {
                (status, Some(items), _) if status.is_success() => {
                    changed = true;
                    if let Some(etag) = resp.etag {
                        let entry = CachedPage {
                            etag,
                            items: items.clone(),
                            pages: resp.pages,
                        };
                        self.pages.insert(key, Arc::new(entry)).await;
                    }
                    (items, resp.pages)
                }
                (StatusCode::NOT_MODIFIED, _, Some(cached)) => {
                    trace!(page, ?resource, "page not modified, served from cache");
                    (cached.items.clone(), cached.pages)
                }
                (status, _, _) => {
                    debug!(page, ?resource, %status, "list request failed");
                    return RemoteResult {
                        status,
                        data: None,
                        quota: resp.quota,
                        pages: resp.pages,
                        message: resp.message,
                    };
                }
            };

            all.extend(extract(items));
            match links.and_then(|l| l.next) {
                Some(next) => page = next,
                None => {
                    let status = if changed {
                        StatusCode::OK
                    } else {
                        StatusCode::NOT_MODIFIED
                    };
                    return RemoteResult {
                        status,
                        data: Some(all),
                        quota: resp.quota,
                        pages: links,
                        message: None,
                    };
                }
            }
        }
    }
}
