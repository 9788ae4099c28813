use anyhow::Result;

use kestrel_db::Database;
use kestrel_types::events::{Event, WireEvent};
use kestrel_types::models::FollowListRecord;

use super::{EventProcessor, ProcessOutcome, decode_each, signed};

/// Contact lists into `follow_lists`, newest version per owner.
pub struct ContactsProcessor;

impl EventProcessor for ContactsProcessor {
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
        let (lists, failed) = decode_each(events, |event| Ok(follow_list_from_event(signed(event)?)));
        db.upsert_follow_lists(&lists)?;
        Ok(ProcessOutcome {
            merged: lists.len(),
            failed,
        })
    }
}

/// `p` tag values become `following` and `t` tag values become
/// `interests`, both in tag order. Other tags are ignored.
pub fn follow_list_from_event(event: &Event) -> FollowListRecord {
    let mut following = Vec::new();
    let mut interests = Vec::new();
    for tag in &event.tags {
        let Some(value) = tag.value() else {
            continue;
        };
        if tag.is_pubkey_tag() {
            following.push(value.to_string());
        } else if tag.is_hashtag_tag() {
            interests.push(value.to_string());
        }
    }

    FollowListRecord {
        owner_id: event.pubkey.clone(),
        event_id: event.id.clone(),
        created_at: event.created_at,
        following,
        interests,
    }
}
