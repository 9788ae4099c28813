use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A single event tag: the first element names the tag, the rest carry data.
///
/// `["p", "<pubkey>"]` references another author, `["t", "bitcoin"]` is a
/// topic and `["e", "<event id>"]` links another event. Unknown tags are kept
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Tag name, e.g. `p` or `t`.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First data element after the name.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// `["p", <pubkey>, ...]`
    pub fn is_pubkey_tag(&self) -> bool {
        self.name() == Some("p")
    }

    /// `["t", <topic>, ...]`
    pub fn is_hashtag_tag(&self) -> bool {
        self.name() == Some("t")
    }
}

/// A signed, author-attributed event as it appears on the wire.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "9b46...",
///   "created_at": 1683463925,
///   "kind": 1,
///   "tags": [["p", "d61f..."]],
///   "content": "hello",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Content-addressed event id. Opaque to this client.
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp (seconds).
    pub created_at: u64,
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    pub sig: String,
}

/// Auxiliary event computed by the caching server (stats, paging, ...).
/// Carries no author and no signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SideChannelEvent {
    pub kind: u32,
    #[serde(default)]
    pub content: String,
}

/// An `EVENT` payload that could not be decoded into either envelope.
///
/// It is kept, not discarded, so that whoever processes the batch can count
/// it as a decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEvent {
    /// The `kind` field, when it was readable.
    pub kind: Option<u32>,
    pub reason: String,
    pub raw: Value,
}

/// Any event payload carried by an `EVENT` frame.
///
/// A payload carrying any of `id`, `pubkey` or `sig` claims a signed
/// envelope and must decode as one; anything else is a side-channel event.
/// Payloads that fail their envelope become [`WireEvent::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Signed(Event),
    SideChannel(SideChannelEvent),
    Invalid(InvalidEvent),
}

const SIGNED_FIELDS: [&str; 3] = ["id", "pubkey", "sig"];

impl WireEvent {
    /// Classify a raw payload. Never fails.
    pub fn from_value(raw: Value) -> Self {
        let claims_signature = SIGNED_FIELDS.iter().any(|field| raw.get(field).is_some());
        let decoded = if claims_signature {
            Event::deserialize(&raw).map(Self::Signed)
        } else {
            SideChannelEvent::deserialize(&raw).map(Self::SideChannel)
        };
        decoded.unwrap_or_else(|e| {
            Self::Invalid(InvalidEvent {
                kind: raw
                    .get("kind")
                    .and_then(Value::as_u64)
                    .and_then(|kind| u32::try_from(kind).ok()),
                reason: e.to_string(),
                raw,
            })
        })
    }

    /// `None` only for an invalid payload without a readable kind.
    pub fn kind(&self) -> Option<EventKind> {
        self.raw_kind().map(EventKind::from)
    }

    pub fn raw_kind(&self) -> Option<u32> {
        match self {
            Self::Signed(event) => Some(event.kind),
            Self::SideChannel(event) => Some(event.kind),
            Self::Invalid(event) => event.kind,
        }
    }

    pub fn is_kind(&self, kind: EventKind) -> bool {
        self.kind() == Some(kind)
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Signed(event) => &event.content,
            Self::SideChannel(event) => &event.content,
            Self::Invalid(event) => event.raw.get("content").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    pub fn as_signed(&self) -> Option<&Event> {
        match self {
            Self::Signed(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_invalid(&self) -> Option<&InvalidEvent> {
        match self {
            Self::Invalid(event) => Some(event),
            _ => None,
        }
    }
}

impl Serialize for WireEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Signed(event) => event.serialize(serializer),
            Self::SideChannel(event) => event.serialize(serializer),
            Self::Invalid(event) => event.raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WireEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Event kinds this client understands. Everything else is `Unknown` and is
/// dropped by the processor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Metadata,
    ShortTextNote,
    Contacts,
    EventStats,
    UserProfileStats,
    FeedPaging,
    Unknown(u32),
}

impl EventKind {
    pub const METADATA: u32 = 0;
    pub const SHORT_TEXT_NOTE: u32 = 1;
    pub const CONTACTS: u32 = 3;
    pub const EVENT_STATS: u32 = 10_000_100;
    pub const USER_PROFILE_STATS: u32 = 10_000_105;
    pub const FEED_PAGING: u32 = 10_000_113;

    pub fn value(self) -> u32 {
        match self {
            Self::Metadata => Self::METADATA,
            Self::ShortTextNote => Self::SHORT_TEXT_NOTE,
            Self::Contacts => Self::CONTACTS,
            Self::EventStats => Self::EVENT_STATS,
            Self::UserProfileStats => Self::USER_PROFILE_STATS,
            Self::FeedPaging => Self::FEED_PAGING,
            Self::Unknown(kind) => kind,
        }
    }
}

impl From<u32> for EventKind {
    fn from(kind: u32) -> Self {
        match kind {
            Self::METADATA => Self::Metadata,
            Self::SHORT_TEXT_NOTE => Self::ShortTextNote,
            Self::CONTACTS => Self::Contacts,
            Self::EVENT_STATS => Self::EventStats,
            Self::USER_PROFILE_STATS => Self::UserProfileStats,
            Self::FEED_PAGING => Self::FeedPaging,
            other => Self::Unknown(other),
        }
    }
}
