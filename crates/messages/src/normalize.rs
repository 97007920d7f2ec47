//! Webhook normalizer: provider delivery envelope → [`CanonicalMessage`].
//!
//! The provider has sent the same logical event in several shapes over time.
//! Each shape is one [`PayloadShape`] matcher; [`PayloadShape::PRIORITY`] is
//! the fixed order they are tried in and the first match wins.

use {
    serde_json::Value,
    sha2::{Digest, Sha256},
};

use crate::{CanonicalMessage, Direction, classify, jid};

/// Event name carrying new messages.
pub const MESSAGES_UPSERT: &str = "messages.upsert";

/// Known envelope shapes carrying a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadShape {
    /// `data.messages[]`
    MessagesArray,
    /// `data` is itself an array of messages
    DataArray,
    /// `data.{key, message}`
    DataMessage,
    /// `{key, message}` on the envelope itself, `event == "messages.upsert"`
    EnvelopeMessage,
    /// `data.data.{key, message}`
    NestedData,
    /// `data.data.messages[]`
    NestedMessagesArray,
}

impl PayloadShape {
    /// Array-of-messages first, most specific nesting last.
    pub const PRIORITY: [Self; 6] = [
        Self::MessagesArray,
        Self::DataArray,
        Self::DataMessage,
        Self::EnvelopeMessage,
        Self::NestedData,
        Self::NestedMessagesArray,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessagesArray => "data.messages[]",
            Self::DataArray => "data[]",
            Self::DataMessage => "data",
            Self::EnvelopeMessage => "envelope",
            Self::NestedData => "data.data",
            Self::NestedMessagesArray => "data.data.messages[]",
        }
    }

    /// Return the message object this shape finds in `envelope`, if any.
    #[must_use]
    pub fn locate(self, envelope: &Value) -> Option<&Value> {
        let data = envelope.get("data");
        match self {
            Self::MessagesArray => first_candidate(data?.get("messages")?),
            Self::DataArray => first_candidate(data?),
            Self::DataMessage => data.filter(|d| is_candidate(d)),
            Self::EnvelopeMessage => {
                let event = envelope.get("event").and_then(Value::as_str)?;
                (canonical_event_name(event) == MESSAGES_UPSERT && is_candidate(envelope))
                    .then_some(envelope)
            },
            Self::NestedData => data?.get("data").filter(|d| is_candidate(d)),
            Self::NestedMessagesArray => first_candidate(data?.get("data")?.get("messages")?),
        }
    }
}

impl std::fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a delivery event could not be normalized. Rejections are dropped and
/// acknowledged; a retry would never succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("instance name is empty")]
    MissingInstance,

    #[error("no known payload shape matched")]
    UnrecognizedShape,

    #[error("remoteJid '{jid}' carries no phone number")]
    EmptyPhone { jid: String },
}

impl Rejection {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingInstance => "missing_instance",
            Self::UnrecognizedShape => "unrecognized_shape",
            Self::EmptyPhone { .. } => "empty_phone",
        }
    }
}

/// Normalize a provider event name: `MESSAGES_UPSERT`, `messages-upsert` and
/// `messages.upsert` are the same event.
#[must_use]
pub fn canonical_event_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '_' | '-' => '.',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Normalize a delivery envelope, using the current time when the payload
/// carries no timestamp.
pub fn normalize(
    instance_name: &str,
    envelope: &Value,
) -> Result<(CanonicalMessage, PayloadShape), Rejection> {
    normalize_at(instance_name, envelope, switchboard_common::time::now_ms())
}

/// Normalize with an explicit receive time (epoch ms) for the timestamp fallback.
pub fn normalize_at(
    instance_name: &str,
    envelope: &Value,
    received_at_ms: i64,
) -> Result<(CanonicalMessage, PayloadShape), Rejection> {
    let instance_name = instance_name.trim();
    if instance_name.is_empty() {
        return Err(Rejection::MissingInstance);
    }

    let (shape, item) = PayloadShape::PRIORITY
        .iter()
        .find_map(|shape| shape.locate(envelope).map(|item| (*shape, item)))
        .ok_or(Rejection::UnrecognizedShape)?;

    let key = &item["key"];
    let remote_jid = key["remoteJid"].as_str().unwrap_or_default();
    let phone_number = jid::phone_from_jid(remote_jid).ok_or_else(|| Rejection::EmptyPhone {
        jid: remote_jid.to_string(),
    })?;

    let from_me = match &key["fromMe"] {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let direction = Direction::from_me(from_me);

    let provider_timestamp = parse_timestamp_ms(&item["messageTimestamp"]);
    let timestamp = provider_timestamp.unwrap_or(received_at_ms);

    let message_id = key["id"]
        .as_str()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| match provider_timestamp {
            Some(ts) => format!("syn-{instance_name}-{phone_number}-{ts}"),
            None => format!(
                "syn-{instance_name}-{phone_number}-h{}",
                content_digest(remote_jid, from_me, &item["message"])
            ),
        });

    let contact_name = match direction {
        Direction::Inbound => item["pushName"]
            .as_str()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned),
        Direction::Outbound => None,
    };

    let classified = classify(&item["message"]);

    Ok((
        CanonicalMessage {
            message_id,
            instance_name: instance_name.to_string(),
            phone_number,
            direction,
            message_type: classified.message_type,
            content: classified.content,
            media_url: classified.media_url,
            caption: classified.caption,
            timestamp,
            contact_name,
            raw_payload: envelope.clone(),
        },
        shape,
    ))
}

/// Sixteen hex digits of SHA-256 over the parts of a delivery that identify it.
fn content_digest(remote_jid: &str, from_me: bool, message: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(remote_jid.as_bytes());
    hasher.update([u8::from(from_me)]);
    hasher.update(message.to_string().as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(16);
    hex
}

fn is_candidate(value: &Value) -> bool {
    let has_jid = value
        .get("key")
        .and_then(|k| k.get("remoteJid"))
        .and_then(Value::as_str)
        .is_some_and(|jid| !jid.trim().is_empty());
    has_jid && value.get("message").is_some_and(Value::is_object)
}

fn first_candidate(value: &Value) -> Option<&Value> {
    value.as_array()?.iter().find(|item| is_candidate(item))
}

/// Values above this are already milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// `messageTimestamp` arrives as a number, a numeric string, or a protobuf
/// `Long` object `{low, high}`; all in seconds.
fn parse_timestamp_ms(value: &Value) -> Option<i64> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(obj) => {
            let low = obj.get("low").and_then(Value::as_i64)?;
            let high = obj.get("high").and_then(Value::as_i64).unwrap_or(0);
            Some((high << 32) | (low & 0xFFFF_FFFF))
        },
        _ => None,
    }?;
    if raw <= 0 {
        return None;
    }
    Some(if raw >= MILLIS_THRESHOLD {
        raw
    } else {
        raw * 1000
    })
}
