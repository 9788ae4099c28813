use anyhow::Result;
use tracing::debug;

use kestrel_db::Database;
use kestrel_types::events::WireEvent;
use kestrel_types::models::PostRecord;

use super::{DecodeError, EventProcessor, ProcessOutcome, decode_each, signed};

/// Text notes into `posts`. A post that is already stored is left alone.
pub struct PostProcessor;

impl EventProcessor for PostProcessor {
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
        let (posts, failed) = decode_each(events, post_from_event);
        let inserted = db.insert_posts(&posts)?;
        debug!("Merged {} posts ({} new)", posts.len(), inserted.len());
        Ok(ProcessOutcome {
            merged: posts.len(),
            failed,
        })
    }
}

pub fn post_from_event(event: &WireEvent) -> Result<PostRecord, DecodeError> {
    let event = signed(event)?;
    Ok(PostRecord {
        post_id: event.id.clone(),
        author_id: event.pubkey.clone(),
        created_at: event.created_at,
        tags: event.tags.clone(),
        content: event.content.clone(),
        sig: event.sig.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::fixtures::{note, side_channel, signed};

    #[test]
    fn first_insert_wins() {
        let db = Database::open_in_memory().unwrap();
        let original = note("n1", 10);
        let edited = signed("n1", "author", 1, 10, "edited");

        PostProcessor.process(&db, &[&original]).unwrap();
        let outcome = PostProcessor.process(&db, &[&edited]).unwrap();

        assert_eq!(outcome.merged, 1);
        assert_eq!(db.get_post("n1").unwrap().unwrap().content, "note n1");
    }

    #[test]
    fn unsigned_notes_fail_individually() {
        let db = Database::open_in_memory().unwrap();
        let bare = side_channel(1, "no envelope");
        let anonymous = signed("n2", "", 1, 10, "who?");
        let good = note("n3", 10);

        let outcome = PostProcessor.process(&db, &[&bare, &anonymous, &good]).unwrap();
        assert_eq!(outcome, ProcessOutcome { merged: 1, failed: 2 });
    }
}
