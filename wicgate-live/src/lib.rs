//! Live online-player data for the WICGATE site.
//!
//! [`LiveStore`] keeps the online servers and player profiles fresh by polling
//! the stats API: bounded retries with backoff, at most one refresh in flight,
//! polling paused while the page is hidden and suspended while the API is
//! unreachable, with a single recovery attempt one interval later.

pub mod capacity;
pub mod display;
mod environment;
mod error;
mod models;
mod retry;
mod scheduler;
mod source;
mod store;

pub use environment::{EnvSignal, Environment};
pub use error::{Result, SyncError};
pub use models::{Id, OnlineProfile, OnlineResponse, ServerEntry};
pub use retry::RetryPolicy;
pub use source::{HttpSource, OnlineSource};
pub use store::{FetchOutcome, LiveStore, SyncConfig, SyncState};
