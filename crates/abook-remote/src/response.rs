//! Raw response shape of the simulated remote and its payload records.

use std::fmt;

use abook_core::{Person, PersonData, PersonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP-like status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const INTERNAL_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quota headers attached to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds of the next hourly reset.
    pub reset_at: i64,
}

/// Page cursors of a list response. Pages are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    pub first: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub last: usize,
}

impl PageLinks {
    /// Cursors for `page` of a `total`-item listing cut into `size`-item pages.
    pub fn compute(total: usize, page: usize, size: usize) -> Self {
        let size = size.max(1);
        let last = total.div_ceil(size).max(1);
        PageLinks {
            first: 1,
            prev: (page > 1).then(|| (page - 1).min(last)),
            next: (page < last).then_some(page + 1),
            last,
        }
    }
}

/// Slice out one page. Page 0 and pages past the end are empty, not errors.
pub fn paginate<T: Clone>(items: &[T], page: usize, size: usize) -> (Vec<T>, PageLinks) {
    let links = PageLinks::compute(items.len(), page, size);
    if page == 0 {
        return (Vec::new(), links);
    }
    let start = (page - 1).saturating_mul(size.max(1));
    let slice = items
        .iter()
        .skip(start)
        .take(size.max(1))
        .cloned()
        .collect();
    (slice, links)
}

/// A person as stored on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePerson {
    pub id: u64,
    #[serde(flatten)]
    pub data: PersonData,
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion marker; only surfaced by updated-since listings.
    #[serde(default)]
    pub deleted: bool,
}

impl RemotePerson {
    pub fn person_id(&self) -> PersonId {
        PersonId::from_remote(self.id)
    }

    /// The local record for this remote state.
    pub fn to_person(&self) -> Person {
        Person {
            id: self.person_id(),
            data: self.data.clone(),
            updated_at: Some(self.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTag {
    pub name: String,
}

/// What every simulated remote operation returns.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse<T> {
    pub status: StatusCode,
    pub payload: Option<T>,
    /// Change token of `payload`, present on successful responses.
    pub etag: Option<String>,
    pub quota: QuotaStatus,
    /// Present on list responses.
    pub pages: Option<PageLinks>,
    /// Error text for non-successful responses.
    pub message: Option<String>,
}

impl<T> RemoteResponse<T> {
    pub fn error(status: StatusCode, message: impl Into<String>, quota: QuotaStatus) -> Self {
        RemoteResponse {
            status,
            payload: None,
            etag: None,
            quota,
            pages: None,
            message: Some(message.into()),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RemoteResponse<U> {
        RemoteResponse {
            status: self.status,
            payload: self.payload.map(f),
            etag: self.etag,
            quota: self.quota,
            pages: self.pages,
            message: self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_links_uneven() {
        let first = PageLinks::compute(250, 1, 100);
        assert_eq!(first.prev, None);
        assert_eq!(first.next, Some(2));
        assert_eq!(first.last, 3);

        let last = PageLinks::compute(250, 3, 100);
        assert_eq!(last.prev, Some(2));
        assert_eq!(last.next, None);
    }

    #[test]
    fn test_page_links_empty_collection() {
        let links = PageLinks::compute(0, 1, 10);
        assert_eq!(links.last, 1);
        assert_eq!(links.prev, None);
        assert_eq!(links.next, None);
    }

    #[test]
    fn test_out_of_range_pages_are_empty() {
        let items: Vec<u32> = (0..25).collect();
        let (page, links) = paginate(&items, 9, 10);
        assert!(page.is_empty());
        assert_eq!(links.prev, Some(3));
        assert_eq!(links.next, None);

        let (page, links) = paginate(&items, 0, 10);
        assert!(page.is_empty());
        assert_eq!(links.next, Some(1));
    }

    #[test]
    fn test_paginate_exact_division() {
        let items: Vec<u32> = (0..20).collect();
        let (page, links) = paginate(&items, 2, 10);
        assert_eq!(page, (10..20).collect::<Vec<_>>());
        assert_eq!(links.last, 2);
        assert_eq!(links.next, None);
    }

    #[test]
    fn test_status_classes() {
        assert!(StatusCode::CREATED.is_success());
        assert!(StatusCode::NO_CONTENT.is_success());
        assert!(!StatusCode::NOT_MODIFIED.is_success());
        assert_eq!(StatusCode::FORBIDDEN.to_string(), "403");
    }
}
