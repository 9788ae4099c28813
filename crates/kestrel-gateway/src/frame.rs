//! Wire framing for the caching service.
//!
//! ```text
//! out: ["REQ", <sub_id>, {"cache": [<verb>, <params>]}]
//!      ["CLOSE", <sub_id>]
//! in:  ["EVENT", <sub_id>, <event>]
//!      ["EOSE", <sub_id>]
//!      ["NOTICE", <sub_id>, <message>]   or   ["NOTICE", <message>]
//! ```
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use kestrel_types::events::WireEvent;

use crate::error::GatewayError;
use crate::subscriptions::SubscriptionId;

/// A cache query: a verb plus its parameter object.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub verb: String,
    pub params: Value,
}

impl CacheRequest {
    pub fn new(verb: impl Into<String>, params: &impl Serialize) -> Result<Self, GatewayError> {
        let params =
            serde_json::to_value(params).map_err(|e| GatewayError::Encode(e.to_string()))?;
        Ok(Self {
            verb: verb.into(),
            params,
        })
    }
}

pub fn encode_request(id: &SubscriptionId, request: &CacheRequest) -> String {
    serde_json::json!([
        "REQ",
        id.as_str(),
        { "cache": [request.verb, request.params] }
    ])
    .to_string()
}

pub fn encode_close(id: &SubscriptionId) -> String {
    serde_json::json!(["CLOSE", id.as_str()]).to_string()
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingFrame {
    Event {
        subscription_id: String,
        event: WireEvent,
    },
    EndOfStream {
        subscription_id: String,
    },
    Notice {
        subscription_id: Option<String>,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a non-empty array")]
    NotArray,

    #[error("unknown frame type {0:?}")]
    UnknownType(String),

    #[error("frame is missing its {0}")]
    Missing(&'static str),
}

pub fn decode(text: &str) -> Result<IncomingFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let mut parts = match value {
        Value::Array(parts) if !parts.is_empty() => parts.into_iter(),
        _ => return Err(FrameError::NotArray),
    };

    let frame_type = match parts.next() {
        Some(Value::String(s)) => s,
        _ => return Err(FrameError::Missing("type")),
    };

    match frame_type.as_str() {
        "EVENT" => {
            let subscription_id = next_string(&mut parts).ok_or(FrameError::Missing("subscription id"))?;
            let payload = parts.next().ok_or(FrameError::Missing("event"))?;
            // Undecodable payloads still reach the subscription so they are
            // counted where the batch is processed.
            Ok(IncomingFrame::Event {
                subscription_id,
                event: WireEvent::from_value(payload),
            })
        }
        "EOSE" => {
            let subscription_id = next_string(&mut parts).ok_or(FrameError::Missing("subscription id"))?;
            Ok(IncomingFrame::EndOfStream { subscription_id })
        }
        "NOTICE" => {
            let first = next_string(&mut parts).ok_or(FrameError::Missing("message"))?;
            match next_string(&mut parts) {
                Some(message) => Ok(IncomingFrame::Notice {
                    subscription_id: Some(first),
                    message,
                }),
                None => Ok(IncomingFrame::Notice {
                    subscription_id: None,
                    message: first,
                }),
            }
        }
        _ => Err(FrameError::UnknownType(frame_type)),
    }
}

fn next_string(parts: &mut impl Iterator<Item = Value>) -> Option<String> {
    match parts.next() {
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}
