use serde::{Deserialize, Serialize};

// -- Request bodies --

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedRequestBody {
    pub directive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pubkey: Option<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRequestBody {
    pub pubkey: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactListRequestBody {
    pub pubkey: String,
    pub extended_response: bool,
}

// -- Event content payloads --

/// JSON content of a metadata (kind 0) event. Every field is optional and
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileMetadataContent {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub banner: Option<String>,
    pub website: Option<String>,
    pub nip05: Option<String>,
    pub lud16: Option<String>,
}

/// Content of an event-stats side-channel event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventStatsContent {
    pub event_id: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub replies: i64,
    #[serde(default)]
    pub mentions: i64,
    #[serde(default)]
    pub reposts: i64,
    #[serde(default)]
    pub zaps: i64,
    #[serde(default, rename = "satszapped")]
    pub sats_zapped: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub score24h: i64,
}

/// Content of a user-profile-stats side-channel event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfileStatsContent {
    pub pubkey: String,
    #[serde(default)]
    pub follows_count: i64,
    #[serde(default)]
    pub followers_count: i64,
    #[serde(default)]
    pub note_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    pub time_joined: Option<u64>,
}

/// Content of the paging side-channel event sent with every feed page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedPagingContent {
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub order_by: Option<String>,
}
