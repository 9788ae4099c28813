use anyhow::Result;

use kestrel_db::Database;
use kestrel_types::api::ProfileMetadataContent;
use kestrel_types::events::{Event, WireEvent};
use kestrel_types::models::ProfileRecord;

use super::{DecodeError, EventProcessor, ProcessOutcome, decode_each, signed};

/// Metadata events into `profiles`, newest version per author.
pub struct ProfileProcessor;

impl EventProcessor for ProfileProcessor {
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
        let (profiles, failed) =
            decode_each(events, |event| profile_from_event(signed(event)?));
        db.upsert_profiles(&profiles)?;
        Ok(ProcessOutcome {
            merged: profiles.len(),
            failed,
        })
    }
}

/// Parse the JSON content of a metadata event.
pub fn profile_from_event(event: &Event) -> Result<ProfileRecord, DecodeError> {
    let meta: ProfileMetadataContent = serde_json::from_str(&event.content)?;
    Ok(ProfileRecord {
        owner_id: event.pubkey.clone(),
        event_id: event.id.clone(),
        created_at: event.created_at,
        raw: event.content.clone(),
        name: meta.name,
        display_name: meta.display_name,
        about: meta.about,
        picture: meta.picture,
        banner: meta.banner,
        website: meta.website,
        internet_identifier: meta.nip05,
        lightning_address: meta.lud16,
    })
}
