use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Map the provider's `fromMe` flag.
    #[must_use]
    pub fn from_me(from_me: bool) -> Self {
        if from_me {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(Error::invalid_input(format!("unknown direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Sticker => "sticker",
        }
    }

    /// Placeholder content for media without a caption.
    #[must_use]
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Text => "",
            Self::Image => "[Image]",
            Self::Video => "[Video]",
            Self::Audio => "[Audio]",
            Self::Document => "[Document]",
            Self::Sticker => "[Sticker]",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "sticker" => Ok(Self::Sticker),
            other => Err(Error::invalid_input(format!(
                "unknown message type '{other}'"
            ))),
        }
    }
}

/// The normalized record every downstream component operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalMessage {
    /// Provider-assigned, or synthesized deterministically when absent.
    pub message_id: String,
    pub instance_name: String,
    /// Digits only, provider suffix stripped.
    pub phone_number: String,
    pub direction: Direction,
    pub message_type: MessageType,
    /// Text body or placeholder label.
    pub content: String,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// Sender display name, inbound only.
    pub contact_name: Option<String>,
    /// The delivery envelope as received, kept for audit.
    pub raw_payload: serde_json::Value,
}

impl CanonicalMessage {
    /// The provider echoing a message this instance sent itself.
    #[must_use]
    pub fn is_own_echo(&self) -> bool {
        self.direction == Direction::Outbound
    }

    /// Copy with `raw_payload` cleared, for shape-independent comparison.
    #[must_use]
    pub fn without_raw(&self) -> Self {
        Self {
            raw_payload: serde_json::Value::Null,
            ..self.clone()
        }
    }
}

/// Rolling per-(instance, contact) aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactAggregate {
    pub instance_name: String,
    pub phone_number: String,
    pub contact_name: Option<String>,
    pub profile_picture_url: Option<String>,
    /// Epoch milliseconds of the latest message.
    pub last_message_at: i64,
    pub message_count: i64,
    pub unread_count: i64,
}
