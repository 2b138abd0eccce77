//! Simulated remote endpoint for abook.
//!
//! [`RateLimitedStore`] holds the data and enforces the hourly quota,
//! [`SimulatedRemote`] wraps it with injected failures, latency and
//! out-of-band changes, and [`RemoteFacade`] is the typed, page-aggregating
//! client the commands talk to.

mod error;
mod facade;
mod response;
mod simulated;
mod store;

pub use error::{RemoteError, StoreError};
pub use facade::{RemoteFacade, RemoteResult, ResourceKind};
pub use response::{
    paginate, PageLinks, QuotaStatus, RemotePerson, RemoteResponse, RemoteTag, StatusCode,
};
pub use simulated::{FaultConfig, FaultStats, SimulatedRemote, FAULT_PREFIX};
pub use store::{next_reset, RateLimitedStore, Stored};
