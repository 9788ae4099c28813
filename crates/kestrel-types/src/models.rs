use serde::{Deserialize, Serialize};

use crate::events::Tag;

/// A text note merged into the store. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    pub post_id: String,
    pub author_id: String,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

/// Latest profile metadata per author (last write wins on `(created_at, event_id)`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRecord {
    pub owner_id: String,
    pub event_id: String,
    pub created_at: u64,
    /// Raw JSON content of the metadata event.
    pub raw: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub banner: Option<String>,
    pub website: Option<String>,
    pub internet_identifier: Option<String>,
    pub lightning_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStatsRecord {
    pub post_id: String,
    pub likes: i64,
    pub replies: i64,
    pub mentions: i64,
    pub reposts: i64,
    pub zaps: i64,
    pub sats_zapped: i64,
    pub score: i64,
    pub score24h: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileStatsRecord {
    pub profile_id: String,
    pub following: i64,
    pub followers: i64,
    pub notes: i64,
    pub replies: i64,
    pub time_joined: Option<u64>,
}

/// Latest contact list per owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FollowListRecord {
    pub owner_id: String,
    pub event_id: String,
    pub created_at: u64,
    pub following: Vec<String>,
    pub interests: Vec<String>,
}

/// A post as served to feed readers: the note plus whatever stats and
/// author metadata have been merged for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedPost {
    pub post: PostRecord,
    pub stats: Option<PostStatsRecord>,
    pub author: Option<ProfileRecord>,
}

impl FeedPost {
    pub fn cursor(&self) -> FeedCursor {
        FeedCursor {
            created_at: self.post.created_at,
            post_id: self.post.post_id.clone(),
        }
    }
}

/// Keyset cursor into a feed ordered by `(created_at, post_id)` descending.
/// A page read with a cursor returns only posts strictly after it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at: u64,
    pub post_id: String,
}

/// Server-reported paging window of the last page fetched for a directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRemoteKey {
    pub directive: String,
    pub since: Option<u64>,
    pub until: Option<u64>,
}

/// A directive the user has saved to their feed list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFeed {
    pub directive: String,
    pub title: String,
}

/// Count of new, not-yet-seen posts at the head of a feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedPostsSyncStats {
    pub directive: String,
    pub new_posts_count: u32,
}

/// A user's profile as returned by the account fetcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub pubkey: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub banner: Option<String>,
    pub website: Option<String>,
    pub internet_identifier: Option<String>,
    pub lightning_address: Option<String>,
    pub followers_count: Option<i64>,
    pub following_count: Option<i64>,
    pub notes_count: Option<i64>,
    pub replies_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFollowList {
    pub pubkey: String,
    pub following: Vec<String>,
    pub interests: Vec<String>,
}
