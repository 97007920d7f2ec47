//! Real-time channel protocol definitions.
//!
//! All communication uses JSON frames over WebSocket.
//!
//! Frame types:
//! - `ClientFrame`: client → gateway request (`{"event": ..., "data": {...}}`)
//! - `EventFrame`: gateway → client server-push

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB
pub const PING_INTERVAL_MS: u64 = 25_000; // 25s
pub const IDLE_TIMEOUT_MS: u64 = 120_000; // 2 min without any frame

// ── Event names ──────────────────────────────────────────────────────────────

/// Events pushed by the gateway.
pub mod server_events {
    pub const CONNECTED: &str = "connected";
    pub const SUBSCRIPTION_CONFIRMED: &str = "subscription-confirmed";
    pub const UNSUBSCRIBED: &str = "unsubscribed";
    pub const NEW_MESSAGE: &str = "new-message";
    pub const MESSAGE_UPDATE: &str = "message-update";
    pub const CONNECTION_UPDATE: &str = "connection-update";
    pub const CONTACT_UPDATE: &str = "contact-update";
    pub const MESSAGES_MARKED_READ: &str = "messages-marked-read";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Gateway → client server-push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }
}

/// Client → gateway frame, discriminated by `event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    SubscribeInstance(SubscribeParams),
    UnsubscribeInstance(UnsubscribeParams),
    MarkMessagesRead(MarkReadParams),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    pub instance_name: String,
    pub workspace_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeParams {
    pub instance_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadParams {
    pub instance_name: String,
    pub phone_number: String,
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Payload of the `new-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub instance_name: String,
    pub phone_number: String,
    pub message_id: String,
    pub message_type: String,
    pub content: String,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub direction: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
}
