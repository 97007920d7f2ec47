//! Ingress coordinator: normalize → persist → fan out, one delivery event at
//! a time, with each stage's failure contained.

use std::sync::Arc;

use {
    serde_json::Value,
    switchboard_messages::{CanonicalMessage, MESSAGES_UPSERT, normalize},
    switchboard_protocol::{NewMessagePayload, server_events},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, fanout, store as store_metrics, webhook as webhook_metrics};

use crate::{broadcast::broadcast_to_instance, state::GatewayState};

/// What happened to the message with respect to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Inserted,
    Duplicate,
    Failed,
}

impl StoreStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Result of handling one delivery event. Every variant is acknowledged to
/// the provider with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// Normalized and broadcast as `new-message`.
    Delivered {
        message_id: String,
        stored: StoreStatus,
        recipients: usize,
    },
    /// The instance's own outbound echo: stored, not broadcast.
    Suppressed {
        message_id: String,
        stored: StoreStatus,
    },
    /// Could not be normalized; dropped.
    Rejected { reason: &'static str },
    /// A non-message event relayed to the instance room.
    Forwarded {
        event: &'static str,
        recipients: usize,
    },
    /// An event this gateway does not handle.
    Ignored,
}

impl IngressOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Suppressed { .. } => "suppressed",
            Self::Rejected { .. } => "rejected",
            Self::Forwarded { .. } => "forwarded",
            Self::Ignored => "ignored",
        }
    }

    /// Webhook acknowledgment body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = serde_json::json!({ "ok": true, "outcome": self.as_str() });
        match self {
            Self::Delivered {
                message_id,
                stored,
                recipients,
            } => {
                body["messageId"] = message_id.as_str().into();
                body["stored"] = stored.as_str().into();
                body["recipients"] = (*recipients).into();
            },
            Self::Suppressed { message_id, stored } => {
                body["messageId"] = message_id.as_str().into();
                body["stored"] = stored.as_str().into();
            },
            Self::Rejected { reason } => body["reason"] = (*reason).into(),
            Self::Forwarded { event, recipients } => {
                body["event"] = (*event).into();
                body["recipients"] = (*recipients).into();
            },
            Self::Ignored => {},
        }
        body
    }
}

/// Client event relayed for a provider event that carries no message.
#[must_use]
pub fn forwarded_event(event: &str) -> Option<&'static str> {
    match event {
        "messages.update" => Some(server_events::MESSAGE_UPDATE),
        "connection.update" => Some(server_events::CONNECTION_UPDATE),
        "contacts.update" | "contacts.upsert" => Some(server_events::CONTACT_UPDATE),
        _ => None,
    }
}

/// Build the `new-message` payload from the canonical record.
#[must_use]
pub fn new_message_payload(message: &CanonicalMessage) -> NewMessagePayload {
    NewMessagePayload {
        instance_name: message.instance_name.clone(),
        phone_number: message.phone_number.clone(),
        message_id: message.message_id.clone(),
        message_type: message.message_type.to_string(),
        content: message.content.clone(),
        media_url: message.media_url.clone(),
        caption: message.caption.clone(),
        direction: message.direction.to_string(),
        timestamp: message.timestamp,
        contact_name: message.contact_name.clone(),
    }
}

/// Handle one delivery event. `event` must already be canonical
/// (see [`switchboard_messages::canonical_event_name`]).
pub async fn ingest(
    state: &Arc<GatewayState>,
    instance_name: &str,
    event: &str,
    envelope: &Value,
) -> IngressOutcome {
    if event == MESSAGES_UPSERT {
        return ingest_message(state, instance_name, envelope).await;
    }

    match forwarded_event(event) {
        Some(client_event) => {
            let payload = serde_json::json!({
                "instanceName": instance_name,
                "data": envelope.get("data").cloned().unwrap_or(Value::Null),
            });
            let recipients =
                broadcast_to_instance(state, instance_name, client_event, payload, None).await;
            IngressOutcome::Forwarded {
                event: client_event,
                recipients,
            }
        },
        None => {
            debug!(instance = instance_name, event, "ignoring webhook event");
            IngressOutcome::Ignored
        },
    }
}

async fn ingest_message(
    state: &Arc<GatewayState>,
    instance_name: &str,
    envelope: &Value,
) -> IngressOutcome {
    let (message, shape) = match normalize(instance_name, envelope) {
        Ok(normalized) => normalized,
        Err(rejection) => {
            info!(
                instance = instance_name,
                reason = rejection.reason(),
                "webhook dropped: {rejection}"
            );
            #[cfg(feature = "metrics")]
            counter!(webhook_metrics::REJECTED_TOTAL, "reason" => rejection.reason()).increment(1);
            return IngressOutcome::Rejected {
                reason: rejection.reason(),
            };
        },
    };
    debug!(
        instance = instance_name,
        message_id = %message.message_id,
        shape = shape.as_str(),
        "webhook normalized"
    );

    // A store failure must not stop fan-out.
    let stored = match state.messages.persist(&message).await {
        Ok(outcome) if outcome.inserted => {
            #[cfg(feature = "metrics")]
            counter!(store_metrics::PERSISTED_TOTAL).increment(1);
            StoreStatus::Inserted
        },
        Ok(_) => {
            debug!(message_id = %message.message_id, "duplicate delivery");
            #[cfg(feature = "metrics")]
            counter!(store_metrics::DUPLICATE_TOTAL).increment(1);
            StoreStatus::Duplicate
        },
        Err(e) => {
            warn!(
                instance = instance_name,
                message_id = %message.message_id,
                error = %e,
                "failed to persist message"
            );
            #[cfg(feature = "metrics")]
            counter!(store_metrics::ERRORS_TOTAL).increment(1);
            StoreStatus::Failed
        },
    };

    if message.is_own_echo() {
        debug!(message_id = %message.message_id, "own outbound echo not broadcast");
        #[cfg(feature = "metrics")]
        counter!(fanout::SUPPRESSED_TOTAL).increment(1);
        return IngressOutcome::Suppressed {
            message_id: message.message_id,
            stored,
        };
    }

    let recipients = match serde_json::to_value(new_message_payload(&message)) {
        Ok(payload) => {
            broadcast_to_instance(
                state,
                instance_name,
                server_events::NEW_MESSAGE,
                payload,
                None,
            )
            .await
        },
        Err(e) => {
            warn!(message_id = %message.message_id, "failed to encode new-message payload: {e}");
            0
        },
    };

    IngressOutcome::Delivered {
        message_id: message.message_id,
        stored,
        recipients,
    }
}
