use std::future::Future;

use tracing::warn;

use kestrel_gateway::{CacheClient, CacheRequest, GatewayError};
use kestrel_types::api::{ContactListRequestBody, UserRequestBody};
use kestrel_types::events::{Event, EventKind, SideChannelEvent, WireEvent};
use kestrel_types::models::{UserFollowList, UserProfile};

use crate::error::{KestrelError, Result};
use crate::processors::contacts::follow_list_from_event;
use crate::processors::profiles::profile_from_event;
use crate::processors::stats::profile_stats_from_content;

/// What the server returns for a `user_profile` query.
#[derive(Debug, Clone, Default)]
pub struct UserProfileResponse {
    pub metadata: Option<Event>,
    pub profile_stats: Option<SideChannelEvent>,
    /// Metadata events that arrived without a usable signed envelope.
    pub malformed_metadata: usize,
}

impl UserProfileResponse {
    pub fn from_events(events: Vec<WireEvent>) -> Self {
        let mut response = Self::default();
        for event in events {
            match (event.kind(), event) {
                (Some(EventKind::Metadata), WireEvent::Signed(event)) => {
                    keep_newest(&mut response.metadata, event);
                }
                (Some(EventKind::Metadata), _) => response.malformed_metadata += 1,
                (Some(EventKind::UserProfileStats), WireEvent::SideChannel(event)) => {
                    response.profile_stats = Some(event);
                }
                (Some(EventKind::UserProfileStats), _) => {
                    warn!("Ignoring profile stats without a side-channel envelope");
                }
                _ => {}
            }
        }
        response
    }
}

/// What the server returns for a `contact_list` query.
#[derive(Debug, Clone, Default)]
pub struct UserContactsResponse {
    pub follow_list: Option<Event>,
    /// Contact-list events that arrived without a usable signed envelope.
    pub malformed: usize,
}

impl UserContactsResponse {
    pub fn from_events(events: Vec<WireEvent>) -> Self {
        let mut response = Self::default();
        for event in events {
            match (event.kind(), event) {
                (Some(EventKind::Contacts), WireEvent::Signed(event)) => {
                    keep_newest(&mut response.follow_list, event);
                }
                (Some(EventKind::Contacts), _) => response.malformed += 1,
                _ => {}
            }
        }
        response
    }
}

pub trait UsersApi: Send + Sync {
    fn get_user_profile(
        &self,
        pubkey: &str,
    ) -> impl Future<Output = std::result::Result<UserProfileResponse, GatewayError>> + Send;

    fn get_user_follow_list(
        &self,
        pubkey: &str,
    ) -> impl Future<Output = std::result::Result<UserContactsResponse, GatewayError>> + Send;
}

impl UsersApi for CacheClient {
    async fn get_user_profile(
        &self,
        pubkey: &str,
    ) -> std::result::Result<UserProfileResponse, GatewayError> {
        let body = UserRequestBody {
            pubkey: pubkey.to_string(),
        };
        let result = self.query(CacheRequest::new("user_profile", &body)?).await?;
        Ok(UserProfileResponse::from_events(result.events))
    }

    async fn get_user_follow_list(
        &self,
        pubkey: &str,
    ) -> std::result::Result<UserContactsResponse, GatewayError> {
        let body = ContactListRequestBody {
            pubkey: pubkey.to_string(),
            extended_response: false,
        };
        let result = self.query(CacheRequest::new("contact_list", &body)?).await?;
        Ok(UserContactsResponse::from_events(result.events))
    }
}

fn keep_newest(slot: &mut Option<Event>, event: Event) {
    let newer = match slot {
        Some(current) => (event.created_at, &event.id) > (current.created_at, &current.id),
        None => true,
    };
    if newer {
        *slot = Some(event);
    }
}

/// Profile and follow-list lookups for a single user. `Ok(None)` means the
/// server has nothing for that user; any failure, including a record the
/// server sent but that could not be decoded, is returned as an error.
pub struct AccountFetcher<U> {
    api: U,
}

impl<U: UsersApi> AccountFetcher<U> {
    pub fn new(api: U) -> Self {
        Self { api }
    }

    pub async fn fetch_user_profile_or_null(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let response = self.api.get_user_profile(user_id).await?;
        let Some(metadata) = response.metadata else {
            return match response.malformed_metadata {
                0 => Ok(None),
                failed => {
                    warn!("Profile metadata for {} is malformed", user_id);
                    Err(KestrelError::Decode { failed, total: failed })
                }
            };
        };

        let profile = profile_from_event(&metadata).map_err(|e| {
            warn!("Profile metadata for {} is malformed: {}", user_id, e);
            KestrelError::Decode { failed: 1, total: 1 }
        })?;

        let stats = response
            .profile_stats
            .and_then(|event| match profile_stats_from_content(&event.content) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Ignoring malformed profile stats for {}: {}", user_id, e);
                    None
                }
            });

        Ok(Some(UserProfile {
            pubkey: profile.owner_id,
            name: profile.name,
            display_name: profile.display_name,
            about: profile.about,
            picture: profile.picture,
            banner: profile.banner,
            website: profile.website,
            internet_identifier: profile.internet_identifier,
            lightning_address: profile.lightning_address,
            followers_count: stats.as_ref().map(|s| s.followers),
            following_count: stats.as_ref().map(|s| s.following),
            notes_count: stats.as_ref().map(|s| s.notes),
            replies_count: stats.as_ref().map(|s| s.replies),
        }))
    }

    pub async fn fetch_user_follow_list_or_null(
        &self,
        user_id: &str,
    ) -> Result<Option<UserFollowList>> {
        let response = self.api.get_user_follow_list(user_id).await?;
        let Some(event) = response.follow_list else {
            return match response.malformed {
                0 => Ok(None),
                failed => {
                    warn!("Follow list for {} is malformed", user_id);
                    Err(KestrelError::Decode { failed, total: failed })
                }
            };
        };

        let list = follow_list_from_event(&event);
        Ok(Some(UserFollowList {
            pubkey: list.owner_id,
            following: list.following,
            interests: list.interests,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::events::Tag;

    #[derive(Default)]
    struct MockUsers {
        profile: Option<std::result::Result<UserProfileResponse, GatewayError>>,
        contacts: Option<std::result::Result<UserContactsResponse, GatewayError>>,
    }

    impl UsersApi for MockUsers {
        async fn get_user_profile(
            &self,
            _pubkey: &str,
        ) -> std::result::Result<UserProfileResponse, GatewayError> {
            self.profile.clone().unwrap_or_else(|| Ok(UserProfileResponse::default()))
        }

        async fn get_user_follow_list(
            &self,
            _pubkey: &str,
        ) -> std::result::Result<UserContactsResponse, GatewayError> {
            self.contacts.clone().unwrap_or_else(|| Ok(UserContactsResponse::default()))
        }
    }

    fn event(kind: u32, content: &str, tags: Vec<Tag>) -> Event {
        Event {
            id: "ev1".into(),
            pubkey: "alice".into(),
            created_at: 1_700_000_000,
            kind,
            tags,
            content: content.into(),
            sig: "sig".into(),
        }
    }

    fn stats(content: &str) -> SideChannelEvent {
        SideChannelEvent {
            kind: EventKind::USER_PROFILE_STATS,
            content: content.into(),
        }
    }

    fn contacts_for_alice() -> UserContactsResponse {
        UserContactsResponse {
            malformed: 0,
            follow_list: Some(event(
                3,
                "",
                vec![
                    Tag::new(["p", "A"]),
                    Tag::new(["p", "B"]),
                    Tag::new(["e", "ignored"]),
                    Tag::new(["p", "C"]),
                    Tag::new(["t", "#bitcoin"]),
                    Tag::new(["p", "A"]),
                ],
            )),
        }
    }

    #[tokio::test]
    async fn profile_combines_metadata_and_stats() {
        let fetcher = AccountFetcher::new(MockUsers {
            profile: Some(Ok(UserProfileResponse {
                metadata: Some(event(0, r#"{"name":"alice","nip05":"alice@example.com"}"#, vec![])),
                profile_stats: Some(stats(
                    r#"{"pubkey":"alice","follows_count":3,"followers_count":40,"note_count":12,"reply_count":2}"#,
                )),
                ..UserProfileResponse::default()
            })),
            ..MockUsers::default()
        });

        let profile = fetcher.fetch_user_profile_or_null("alice").await.unwrap().unwrap();
        assert_eq!(profile.pubkey, "alice");
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.internet_identifier.as_deref(), Some("alice@example.com"));
        assert_eq!(profile.followers_count, Some(40));
        assert_eq!(profile.following_count, Some(3));
        assert_eq!(profile.notes_count, Some(12));
    }

    #[tokio::test]
    async fn malformed_stats_leave_counts_empty() {
        let fetcher = AccountFetcher::new(MockUsers {
            profile: Some(Ok(UserProfileResponse {
                metadata: Some(event(0, r#"{"name":"alice"}"#, vec![])),
                profile_stats: Some(stats("{broken")),
                ..UserProfileResponse::default()
            })),
            ..MockUsers::default()
        });

        let profile = fetcher.fetch_user_profile_or_null("alice").await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("alice"));
        assert_eq!(profile.followers_count, None);
    }

    #[tokio::test]
    async fn empty_responses_are_none() {
        let fetcher = AccountFetcher::new(MockUsers::default());
        assert!(fetcher.fetch_user_profile_or_null("nobody").await.unwrap().is_none());
        assert!(fetcher.fetch_user_follow_list_or_null("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_metadata_is_a_decode_error() {
        let fetcher = AccountFetcher::new(MockUsers {
            profile: Some(Ok(UserProfileResponse {
                metadata: Some(event(0, "not json", vec![])),
                ..UserProfileResponse::default()
            })),
            ..MockUsers::default()
        });

        let err = fetcher.fetch_user_profile_or_null("alice").await.unwrap_err();
        assert!(matches!(err, KestrelError::Decode { failed: 1, total: 1 }));
    }

    #[tokio::test]
    async fn profile_failure_does_not_affect_follow_list() {
        let fetcher = AccountFetcher::new(MockUsers {
            profile: Some(Err(GatewayError::Protocol("profile unavailable".into()))),
            contacts: Some(Ok(contacts_for_alice())),
        });

        let err = fetcher.fetch_user_profile_or_null("alice").await.unwrap_err();
        assert!(matches!(err, KestrelError::Protocol(ref m) if m == "profile unavailable"));

        let list = fetcher.fetch_user_follow_list_or_null("alice").await.unwrap().unwrap();
        assert_eq!(list.pubkey, "alice");
        assert_eq!(list.following, vec!["A", "B", "C", "A"]);
        assert_eq!(list.interests, vec!["#bitcoin"]);
    }

    #[test]
    fn broken_signed_envelopes_are_counted_not_skipped() {
        let profile = UserProfileResponse::from_events(vec![
            serde_json::from_value(serde_json::json!({
                "id": "m1", "pubkey": "alice", "created_at": "yesterday",
                "kind": 0, "content": "{}", "sig": "ff"
            }))
            .unwrap(),
            serde_json::from_value(serde_json::json!({ "kind": 10000105, "content": "{}" })).unwrap(),
        ]);
        assert!(profile.metadata.is_none());
        assert_eq!(profile.malformed_metadata, 1);
        assert!(profile.profile_stats.is_some());

        let contacts = UserContactsResponse::from_events(vec![
            serde_json::from_value(serde_json::json!({
                "id": "c1", "pubkey": "alice", "created_at": 1, "kind": 3,
                "tags": [["p", "A"], ["p", 5]], "content": "", "sig": "ff"
            }))
            .unwrap(),
        ]);
        assert!(contacts.follow_list.is_none());
        assert_eq!(contacts.malformed, 1);
    }

    #[tokio::test]
    async fn undecodable_records_are_decode_errors_not_absent() {
        let fetcher = AccountFetcher::new(MockUsers {
            profile: Some(Ok(UserProfileResponse {
                malformed_metadata: 1,
                ..UserProfileResponse::default()
            })),
            contacts: Some(Ok(UserContactsResponse {
                follow_list: None,
                malformed: 1,
            })),
        });

        let err = fetcher.fetch_user_profile_or_null("alice").await.unwrap_err();
        assert!(matches!(err, KestrelError::Decode { failed: 1, total: 1 }), "got {:?}", err);
        let err = fetcher.fetch_user_follow_list_or_null("alice").await.unwrap_err();
        assert!(matches!(err, KestrelError::Decode { failed: 1, total: 1 }), "got {:?}", err);
    }

    #[test]
    fn good_metadata_outweighs_a_broken_duplicate() {
        let response = UserProfileResponse::from_events(vec![
            WireEvent::Signed(event(0, r#"{"name":"alice"}"#, vec![])),
            serde_json::from_value(serde_json::json!({ "id": "m2", "kind": 0, "sig": "ff" })).unwrap(),
        ]);
        assert_eq!(response.malformed_metadata, 1);
        assert_eq!(response.metadata.unwrap().id, "ev1");
    }

    #[tokio::test]
    async fn connection_errors_propagate() {
        let fetcher = AccountFetcher::new(MockUsers {
            contacts: Some(Err(GatewayError::Connection("reset".into()))),
            ..MockUsers::default()
        });

        let err = fetcher.fetch_user_follow_list_or_null("alice").await.unwrap_err();
        assert!(matches!(err, KestrelError::Connection(_)));
    }

    #[test]
    fn newest_replaceable_event_is_kept() {
        let mut slot = None;
        let mut old = event(0, "{}", vec![]);
        old.created_at = 10;
        let mut new = event(0, "{}", vec![]);
        new.created_at = 20;
        new.id = "ev2".into();

        keep_newest(&mut slot, new);
        keep_newest(&mut slot, old);
        assert_eq!(slot.unwrap().id, "ev2");
    }
}
