use anyhow::Result;

use kestrel_db::Database;
use kestrel_types::api::{EventStatsContent, UserProfileStatsContent};
use kestrel_types::events::WireEvent;
use kestrel_types::models::{PostStatsRecord, ProfileStatsRecord};

use super::{DecodeError, EventProcessor, ProcessOutcome, decode_each};

/// Per-post counters computed by the server.
pub struct EventStatsProcessor;

impl EventProcessor for EventStatsProcessor {
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
        let (stats, failed) = decode_each(events, |event| post_stats_from_content(event.content()));
        db.upsert_post_stats(&stats)?;
        Ok(ProcessOutcome {
            merged: stats.len(),
            failed,
        })
    }
}

/// Per-profile counters computed by the server.
pub struct ProfileStatsProcessor;

impl EventProcessor for ProfileStatsProcessor {
    fn process(&self, db: &Database, events: &[&WireEvent]) -> Result<ProcessOutcome> {
        let (stats, failed) =
            decode_each(events, |event| profile_stats_from_content(event.content()));
        db.upsert_profile_stats(&stats)?;
        Ok(ProcessOutcome {
            merged: stats.len(),
            failed,
        })
    }
}

pub fn post_stats_from_content(content: &str) -> Result<PostStatsRecord, DecodeError> {
    let stats: EventStatsContent = serde_json::from_str(content)?;
    if stats.event_id.is_empty() {
        return Err(DecodeError::Missing("event_id"));
    }
    Ok(PostStatsRecord {
        post_id: stats.event_id,
        likes: stats.likes,
        replies: stats.replies,
        mentions: stats.mentions,
        reposts: stats.reposts,
        zaps: stats.zaps,
        sats_zapped: stats.sats_zapped,
        score: stats.score,
        score24h: stats.score24h,
    })
}

pub fn profile_stats_from_content(content: &str) -> Result<ProfileStatsRecord, DecodeError> {
    let stats: UserProfileStatsContent = serde_json::from_str(content)?;
    if stats.pubkey.is_empty() {
        return Err(DecodeError::Missing("pubkey"));
    }
    Ok(ProfileStatsRecord {
        profile_id: stats.pubkey,
        following: stats.follows_count,
        followers: stats.followers_count,
        notes: stats.note_count,
        replies: stats.reply_count,
        time_joined: stats.time_joined,
    })
}
