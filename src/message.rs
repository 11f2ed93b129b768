//! Message protocol definitions
//!
//! Outbound commands use serde's adjacently tagged enum
//! (`{"action": ..., "params": {...}}`). Inbound frames carry no type tag
//! and no correlation id, so they are classified by payload shape in
//! [`classify`], the one place that decides what a frame means.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ClientError, DecodeError};

/// Client → Server command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Command {
    /// Subscribe to a channel
    Subscribe { channel_name: String },
    /// Unsubscribe from a channel
    Unsubscribe { channel_name: String },
    /// Publish content to a channel
    Publish {
        channel_name: String,
        content: String,
    },
    /// Ask for the authoritative list of subscribed channels
    List,
}

/// Content some client published to a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDelivery {
    pub sender: String,
    pub channel_name: String,
    pub content: String,
    /// ISO-8601 timestamp as sent by the broker
    pub sent_at: String,
}

impl ChatDelivery {
    /// Parse `sent_at` as an RFC 3339 timestamp
    pub fn sent_at_parsed(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.sent_at).ok()
    }
}

/// Broker response to a prior command
///
/// The variant is inferred from the shape of `info`.
#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    /// `info.client_name`: answers the connect
    Connected { client_name: String },
    /// `info.channel_name` + `info.total_subscribers`: answers a subscribe
    Subscribed {
        channel_name: String,
        total_subscribers: u64,
    },
    /// `info.channels`: answers a list; the authoritative resync payload
    ChannelList { channels: Vec<String> },
    /// No `info`: unsubscribe, publish
    Empty,
    /// `status: ok` with an `info` shape we do not know
    Other(Value),
    /// `status: error`
    Error { detail: Option<String> },
}

/// Fallback text for an error acknowledgment without `info.detail`
pub const UNKNOWN_ERROR: &str = "Unknown error";

impl Acknowledgment {
    /// Human-readable reason of an error acknowledgment
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Acknowledgment::Error { detail } => Some(detail.as_deref().unwrap_or(UNKNOWN_ERROR)),
            _ => None,
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Chat(ChatDelivery),
    Ack(Acknowledgment),
    /// Well-formed but matches no known shape; kept verbatim
    Unrecognized(Value),
}

/// Serialize a command to wire text (one command per frame)
pub fn encode(command: &Command) -> Result<String, ClientError> {
    Ok(serde_json::to_string(command)?)
}

/// Parse and classify an inbound frame
pub fn decode(text: &str) -> Result<Frame, DecodeError> {
    let value = serde_json::from_str::<Value>(text).map_err(|source| DecodeError {
        raw: text.to_string(),
        source,
    })?;
    Ok(classify(value))
}

/// Classify a parsed frame
///
/// Predicates are evaluated in order:
/// 1. all four chat fields present and truthy → `Chat`
/// 2. `status: "error"` → error acknowledgment
/// 3. `status: "ok"` → acknowledgment, sub-classified by `info` shape
/// 4. anything else → `Unrecognized`
pub fn classify(value: Value) -> Frame {
    let Value::Object(obj) = value else {
        return Frame::Unrecognized(value);
    };

    if let Some(chat) = chat_delivery(&obj) {
        return Frame::Chat(chat);
    }

    match obj.get("status").and_then(Value::as_str) {
        Some("error") => {
            let detail = obj
                .get("info")
                .and_then(|info| info.get("detail"))
                .filter(|d| is_truthy(d))
                .map(text_of);
            Frame::Ack(Acknowledgment::Error { detail })
        }
        Some("ok") => Frame::Ack(classify_ok_info(obj.get("info"))),
        _ => Frame::Unrecognized(Value::Object(obj)),
    }
}

fn chat_delivery(obj: &Map<String, Value>) -> Option<ChatDelivery> {
    let field = |name: &str| obj.get(name).filter(|v| is_truthy(v)).map(text_of);
    Some(ChatDelivery {
        sender: field("sender")?,
        channel_name: field("channel_name")?,
        content: field("content")?,
        sent_at: field("sent_at")?,
    })
}

fn classify_ok_info(info: Option<&Value>) -> Acknowledgment {
    let info = match info {
        None | Some(Value::Null) => return Acknowledgment::Empty,
        Some(info) => info,
    };
    let truthy = |name: &str| info.get(name).filter(|v| is_truthy(v));

    if let Some(client_name) = truthy("client_name") {
        return Acknowledgment::Connected {
            client_name: text_of(client_name),
        };
    }

    if let (Some(channel_name), Some(total_subscribers)) = (
        truthy("channel_name"),
        info.get("total_subscribers").and_then(Value::as_u64),
    ) {
        return Acknowledgment::Subscribed {
            channel_name: text_of(channel_name),
            total_subscribers,
        };
    }

    if let Some(Value::Array(items)) = info.get("channels") {
        let channels: Option<Vec<String>> = items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect();
        if let Some(channels) = channels {
            return Acknowledgment::ChannelList { channels };
        }
    }

    Acknowledgment::Other(info.clone())
}

/// JavaScript-style truthiness, which is what the broker's own client checks
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
