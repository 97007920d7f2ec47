use std::sync::Arc;

use {
    switchboard_protocol::EventFrame,
    tracing::{debug, warn},
};

use crate::state::{GatewayState, Room};

fn encode(state: &GatewayState, event: &str, payload: serde_json::Value) -> Option<String> {
    let frame = EventFrame::new(event, payload, state.next_seq());
    match serde_json::to_string(&frame) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event, "failed to serialize broadcast event: {e}");
            None
        },
    }
}

async fn broadcast_to_room(
    state: &Arc<GatewayState>,
    room: Room<'_>,
    event: &str,
    payload: serde_json::Value,
    exclude: Option<&str>,
) -> usize {
    let Some(json) = encode(state, event, payload) else {
        return 0;
    };
    let sent = state.sessions.send_to_room(room, &json, exclude).await;
    if sent == 0 {
        debug!(?room, event, "broadcast has no recipients");
        #[cfg(feature = "metrics")]
        switchboard_metrics::counter!(
            switchboard_metrics::fanout::NO_RECIPIENTS_TOTAL,
            "event" => event.to_string()
        )
        .increment(1);
    } else {
        debug!(?room, event, recipients = sent, "broadcasting event");
        #[cfg(feature = "metrics")]
        switchboard_metrics::counter!(
            switchboard_metrics::fanout::FRAMES_SENT_TOTAL,
            "event" => event.to_string()
        )
        .increment(sent as u64);
    }
    sent
}

/// Broadcast an event to every session subscribed to `instance_name`,
/// except `exclude`. Returns the number of recipients.
pub async fn broadcast_to_instance(
    state: &Arc<GatewayState>,
    instance_name: &str,
    event: &str,
    payload: serde_json::Value,
    exclude: Option<&str>,
) -> usize {
    broadcast_to_room(state, Room::Instance(instance_name), event, payload, exclude).await
}

/// Broadcast an event to every session bound to `workspace_id`.
pub async fn broadcast_to_workspace(
    state: &Arc<GatewayState>,
    workspace_id: &str,
    event: &str,
    payload: serde_json::Value,
    exclude: Option<&str>,
) -> usize {
    broadcast_to_room(state, Room::Workspace(workspace_id), event, payload, exclude).await
}

/// Send an event to a single session.
pub async fn send_event(
    state: &Arc<GatewayState>,
    session_id: &str,
    event: &str,
    payload: serde_json::Value,
) -> bool {
    match encode(state, event, payload) {
        Some(json) => state.sessions.send_to(session_id, &json).await,
        None => false,
    }
}
