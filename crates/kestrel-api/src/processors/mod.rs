//! Kind-keyed dispatch of received events into the store.
//!
//! Every processor merges idempotently: posts are insert-if-absent,
//! replaceable records keep the newest `(created_at, event_id)`, and stats
//! are replaced in arrival order. A malformed item is counted and skipped,
//! never aborting the rest of its batch.

pub mod contacts;
pub mod posts;
pub mod profiles;
pub mod stats;

use std::collections::HashMap;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, warn};

use kestrel_db::Database;
use kestrel_types::events::{Event, EventKind, WireEvent};

pub use contacts::ContactsProcessor;
pub use posts::PostProcessor;
pub use profiles::ProfileProcessor;
pub use stats::{EventStatsProcessor, ProfileStatsProcessor};

/// Why a single event could not be turned into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("kind {0} event is missing its signed envelope")]
    NotSigned(u32),

    #[error("undecodable payload: {0}")]
    Envelope(String),

    #[error("event is missing {0}")]
    Missing(&'static str),

    #[error("invalid content: {0}")]
    Content(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub merged: usize,
    pub failed: usize,
}

/// Totals for one batch handed to [`ProcessorRegistry::process`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub merged: usize,
    pub failed: usize,
    /// Events of a kind no processor is registered for.
    pub dropped: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.merged + self.failed + self.dropped
    }
}

/// Merges every event of one kind into the store.
pub trait EventProcessor: Send + Sync {
    /// `events` all share this processor's kind. Decode failures are
    /// counted in the outcome; only store failures are returned as errors.
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome>;
}

pub struct ProcessorRegistry {
    processors: HashMap<EventKind, Box<dyn EventProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// Registry with a processor for every kind the client stores.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(EventKind::ShortTextNote, PostProcessor);
        registry.register(EventKind::Metadata, ProfileProcessor);
        registry.register(EventKind::Contacts, ContactsProcessor);
        registry.register(EventKind::EventStats, EventStatsProcessor);
        registry.register(EventKind::UserProfileStats, ProfileStatsProcessor);
        registry
    }

    /// Route `kind` to `processor`, replacing any earlier registration.
    pub fn register(&mut self, kind: EventKind, processor: impl EventProcessor + 'static) {
        self.processors.insert(kind, Box::new(processor));
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.processors.contains_key(&kind)
    }

    /// Group `events` by kind, in order of first appearance, and hand each
    /// group to its processor.
    ///
    /// Payloads that failed to decode on the wire count as failures, unless
    /// their kind is readable and unhandled, in which case they are dropped
    /// like any other event of that kind.
    pub fn process(&self, db: &Database, events: &[WireEvent]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut groups: Vec<(EventKind, Vec<&WireEvent>)> = Vec::new();
        for event in events {
            if let WireEvent::Invalid(invalid) = event {
                match invalid.kind.map(EventKind::from) {
                    Some(kind) if !self.handles(kind) => report.dropped += 1,
                    _ => {
                        warn!("Skipping undecodable event (kind {:?}): {}", invalid.kind, invalid.reason);
                        report.failed += 1;
                    }
                }
                continue;
            }
            let Some(kind) = event.kind() else {
                continue;
            };
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, group)) => group.push(event),
                None => groups.push((kind, vec![event])),
            }
        }

        for (kind, group) in groups {
            let Some(processor) = self.processors.get(&kind) else {
                debug!("Dropping {} events of unhandled kind {}", group.len(), kind.value());
                report.dropped += group.len();
                continue;
            };
            let outcome = processor.process(db, &group)?;
            report.merged += outcome.merged;
            report.failed += outcome.failed;
        }
        Ok(report)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Decode each event on its own, logging and counting the failures.
pub(crate) fn decode_each<T>(
    events: &[&WireEvent],
    decode: impl Fn(&WireEvent) -> std::result::Result<T, DecodeError>,
) -> (Vec<T>, usize) {
    let mut decoded = Vec::with_capacity(events.len());
    let mut failed = 0;
    for event in events {
        match decode(event) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                warn!("Skipping kind {:?} event: {}", event.raw_kind(), e);
                failed += 1;
            }
        }
    }
    (decoded, failed)
}

/// The signed envelope of `event`, with its id and author present.
pub(crate) fn signed(event: &WireEvent) -> std::result::Result<&Event, DecodeError> {
    let event = match event {
        WireEvent::Signed(event) => event,
        WireEvent::SideChannel(event) => return Err(DecodeError::NotSigned(event.kind)),
        WireEvent::Invalid(invalid) => return Err(DecodeError::Envelope(invalid.reason.clone())),
    };
    if event.id.is_empty() {
        return Err(DecodeError::Missing("id"));
    }
    if event.pubkey.is_empty() {
        return Err(DecodeError::Missing("pubkey"));
    }
    Ok(event)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{note, raw, side_channel, signed};
    use super::*;

    #[test]
    fn one_malformed_item_does_not_abort_the_batch() {
        let db = Database::open_in_memory().unwrap();
        let registry = ProcessorRegistry::standard();

        let batch = vec![
            note("n1", 10),
            signed("m1", "alice", 0, 5, r#"{"name":"alice"}"#),
            signed("m2", "bob", 0, 5, "{not json"),
            side_channel(10_000_100, r#"{"event_id":"n1","likes":4}"#),
            note("n2", 20),
        ];

        let report = registry.process(&db, &batch).unwrap();
        assert_eq!(report, BatchReport { merged: 4, failed: 1, dropped: 0 });

        assert!(db.get_post("n1").unwrap().is_some());
        assert!(db.get_post("n2").unwrap().is_some());
        assert_eq!(db.get_profile("alice").unwrap().unwrap().name.as_deref(), Some("alice"));
        assert!(db.get_profile("bob").unwrap().is_none());
        assert_eq!(db.get_post_stats("n1").unwrap().unwrap().likes, 4);
    }

    #[test]
    fn merging_twice_equals_merging_once() {
        let db = Database::open_in_memory().unwrap();
        let registry = ProcessorRegistry::standard();
        let batch = vec![
            note("n1", 10),
            signed("m1", "alice", 0, 5, r#"{"name":"alice"}"#),
            side_channel(10_000_105, r#"{"pubkey":"alice","followers_count":7}"#),
        ];

        registry.process(&db, &batch).unwrap();
        let post = db.get_post("n1").unwrap();
        let profile = db.get_profile("alice").unwrap();
        let stats = db.get_profile_stats("alice").unwrap();

        let again = registry.process(&db, &batch).unwrap();
        assert_eq!(again.failed, 0);
        assert_eq!(db.get_post("n1").unwrap(), post);
        assert_eq!(db.get_profile("alice").unwrap(), profile);
        assert_eq!(db.get_profile_stats("alice").unwrap(), stats);
    }

    #[test]
    fn undecodable_payloads_count_as_failures() {
        let db = Database::open_in_memory().unwrap();
        let registry = ProcessorRegistry::standard();
        let batch = vec![
            raw(serde_json::json!({ "id": "n1", "pubkey": "p", "created_at": 1, "content": "x", "sig": "s" })),
            raw(serde_json::json!({ "kind": "one", "content": "x" })),
            raw(serde_json::json!({ "id": "c1", "pubkey": "p", "created_at": 1, "kind": 3, "tags": [["p", 5]], "sig": "s" })),
            raw(serde_json::json!({ "kind": 30023, "content": 7 })),
            note("n2", 2),
        ];

        let report = registry.process(&db, &batch).unwrap();
        assert_eq!(report, BatchReport { merged: 1, failed: 3, dropped: 1 });
        assert!(db.get_follow_list("p").unwrap().is_none());
    }

    #[test]
    fn unknown_kinds_are_dropped() {
        let db = Database::open_in_memory().unwrap();
        let registry = ProcessorRegistry::standard();
        let batch = vec![
            signed("r1", "alice", 7, 1, "+"),
            note("n1", 1),
            side_channel(10_000_999, "{}"),
        ];

        let report = registry.process(&db, &batch).unwrap();
        assert_eq!(report, BatchReport { merged: 1, failed: 0, dropped: 2 });
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn custom_processors_can_be_registered() {
        struct Counting;
        impl EventProcessor for Counting {
            fn process(&self, _db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
                Ok(ProcessOutcome { merged: events.len(), failed: 0 })
            }
        }

        let db = Database::open_in_memory().unwrap();
        let mut registry = ProcessorRegistry::new();
        assert!(!registry.handles(EventKind::Unknown(7)));
        registry.register(EventKind::Unknown(7), Counting);

        let report = registry
            .process(&db, &[signed("r1", "a", 7, 1, "+"), signed("r2", "a", 7, 2, "+")])
            .unwrap();
        assert_eq!(report.merged, 2);
    }
}
