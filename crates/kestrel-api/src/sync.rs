use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use kestrel_types::models::FeedPostsSyncStats;

/// Per-directive count of posts that arrived since the reader last looked
/// at the top of the feed.
#[derive(Default)]
pub struct SyncStatsTracker {
    feeds: Mutex<HashMap<String, watch::Sender<FeedPostsSyncStats>>>,
}

impl SyncStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` new posts to `directive`'s tally.
    pub fn record_new_posts(&self, directive: &str, count: u32) {
        if count == 0 {
            return;
        }
        self.with_sender(directive, |tx| {
            tx.send_modify(|stats| {
                stats.new_posts_count = stats.new_posts_count.saturating_add(count);
            });
        });
    }

    /// Reader scrolled to the top: the tally goes back to zero.
    pub fn reset(&self, directive: &str) {
        self.with_sender(directive, |tx| {
            tx.send_if_modified(|stats| {
                if stats.new_posts_count == 0 {
                    return false;
                }
                stats.new_posts_count = 0;
                true
            });
        });
    }

    pub fn get(&self, directive: &str) -> FeedPostsSyncStats {
        self.with_sender(directive, |tx| tx.borrow().clone())
    }

    pub fn observe(&self, directive: &str) -> watch::Receiver<FeedPostsSyncStats> {
        self.with_sender(directive, |tx| tx.subscribe())
    }

    fn with_sender<T>(&self, directive: &str, f: impl FnOnce(&watch::Sender<FeedPostsSyncStats>) -> T) -> T {
        let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = feeds.entry(directive.to_string()).or_insert_with(|| {
            watch::Sender::new(FeedPostsSyncStats {
                directive: directive.to_string(),
                new_posts_count: 0,
            })
        });
        f(tx)
    }
}
