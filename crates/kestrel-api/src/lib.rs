//! Merge pipeline and repositories on top of the caching-service client.

pub mod accounts;
pub mod error;
pub mod feeds;
pub mod processors;
pub mod sync;

pub use accounts::{AccountFetcher, UsersApi};
pub use error::KestrelError;
pub use feeds::{FeedApi, FeedPage, FeedRepository, FeedWatcher};
pub use processors::{BatchReport, EventProcessor, ProcessorRegistry};
pub use sync::SyncStatsTracker;
