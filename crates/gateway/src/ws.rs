use std::{sync::Arc, time::Duration};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    serde_json::json,
    switchboard_common::time::now_ms,
    switchboard_messages::jid::sanitize_digits,
    switchboard_protocol::{
        ClientFrame, IDLE_TIMEOUT_MS, MarkReadParams, PING_INTERVAL_MS, SubscribeParams,
        server_events,
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    broadcast::{broadcast_to_instance, send_event},
    state::{ClientSession, GatewayState},
};

/// Handle a single WebSocket connection through its full lifecycle:
/// register → message loop → cleanup.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    // Write loop: forwards queued frames and keeps the socket alive with pings.
    let write_session_id = session_id.clone();
    let write_handle = tokio::spawn(async move {
        let mut ping = tokio::time::interval(Duration::from_millis(PING_INTERVAL_MS));
        ping.tick().await;
        loop {
            let sent = tokio::select! {
                frame = client_rx.recv() => match frame {
                    Some(frame) => ws_tx.send(Message::Text(frame.into())).await,
                    None => break,
                },
                _ = ping.tick() => ws_tx.send(Message::Ping(Default::default())).await,
            };
            if sent.is_err() {
                debug!(session_id = %write_session_id, "ws: write loop closed");
                break;
            }
        }
    });

    state
        .sessions
        .register(ClientSession::new(session_id.clone(), client_tx))
        .await;

    #[cfg(feature = "metrics")]
    {
        switchboard_metrics::counter!(switchboard_metrics::websocket::CONNECTIONS_TOTAL)
            .increment(1);
        switchboard_metrics::gauge!(switchboard_metrics::websocket::CONNECTIONS_ACTIVE)
            .increment(1.0);
    }

    send_event(
        &state,
        &session_id,
        server_events::CONNECTED,
        json!({ "sessionId": session_id }),
    )
    .await;

    // ── Message loop ─────────────────────────────────────────────────────

    let idle = Duration::from_millis(IDLE_TIMEOUT_MS);
    loop {
        let msg = match tokio::time::timeout(idle, ws_rx.next()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(_) => {
                info!(session_id = %session_id, "ws: idle timeout");
                break;
            },
        };
        let text = match msg {
            Ok(Message::Text(t)) => t.as_str().to_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "ws: read error");
                break;
            },
        };

        #[cfg(feature = "metrics")]
        switchboard_metrics::counter!(switchboard_metrics::websocket::FRAMES_RECEIVED_TOTAL)
            .increment(1);

        // Enforce payload size limit.
        if text.len() > state.max_payload_bytes {
            warn!(session_id = %session_id, size = text.len(), "ws: payload too large");
            send_error(&state, &session_id, "payload too large").await;
            continue;
        }

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "ws: invalid frame");
                send_error(&state, &session_id, "invalid frame").await;
                continue;
            },
        };

        dispatch(&state, &session_id, frame).await;
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    let removed = state.sessions.remove(&session_id).await;

    #[cfg(feature = "metrics")]
    switchboard_metrics::gauge!(switchboard_metrics::websocket::CONNECTIONS_ACTIVE)
        .decrement(1.0);

    info!(
        session_id = %session_id,
        rooms = removed.as_ref().map_or(0, |s| s.subscribed_instances.len()),
        duration_secs = removed.map(|s| s.connected_at.elapsed().as_secs()).unwrap_or_default(),
        "ws: connection closed"
    );

    write_handle.abort();
}

async fn send_error(state: &Arc<GatewayState>, session_id: &str, message: &str) {
    send_event(
        state,
        session_id,
        server_events::ERROR,
        json!({ "message": message }),
    )
    .await;
}

async fn dispatch(state: &Arc<GatewayState>, session_id: &str, frame: ClientFrame) {
    match frame {
        ClientFrame::SubscribeInstance(params) => subscribe(state, session_id, params).await,
        ClientFrame::UnsubscribeInstance(params) => {
            let removed = state
                .sessions
                .unsubscribe(session_id, &params.instance_name)
                .await;
            debug!(session_id, instance = %params.instance_name, removed, "ws: unsubscribed");
            send_event(
                state,
                session_id,
                server_events::UNSUBSCRIBED,
                json!({ "instanceName": params.instance_name }),
            )
            .await;
        },
        ClientFrame::MarkMessagesRead(params) => mark_read(state, session_id, params).await,
        ClientFrame::Ping => {
            send_event(state, session_id, server_events::PONG, json!({ "ts": now_ms() })).await;
        },
    }
}

async fn subscribe(state: &Arc<GatewayState>, session_id: &str, params: SubscribeParams) {
    match state
        .sessions
        .subscribe(session_id, &params.instance_name, &params.workspace_uuid)
        .await
    {
        Ok(added) => {
            info!(
                session_id,
                instance = %params.instance_name,
                workspace = %params.workspace_uuid,
                added,
                "ws: subscribed"
            );
            send_event(
                state,
                session_id,
                server_events::SUBSCRIPTION_CONFIRMED,
                json!({
                    "instanceName": params.instance_name,
                    "workspaceUuid": params.workspace_uuid,
                }),
            )
            .await;
        },
        Err(e) => {
            warn!(session_id, error = %e, "ws: subscription refused");
            send_error(state, session_id, &e.to_string()).await;
        },
    }
}

async fn mark_read(state: &Arc<GatewayState>, session_id: &str, params: MarkReadParams) {
    let phone_number = sanitize_digits(&params.phone_number);
    if params.instance_name.trim().is_empty() || phone_number.is_empty() {
        send_error(state, session_id, "instanceName and phoneNumber are required").await;
        return;
    }
    if !state
        .sessions
        .is_subscribed(session_id, &params.instance_name)
        .await
    {
        warn!(session_id, instance = %params.instance_name, "ws: mark read without subscription");
        send_error(state, session_id, "not subscribed to instance").await;
        return;
    }

    if let Err(e) = state
        .messages
        .mark_read(&params.instance_name, &phone_number)
        .await
    {
        warn!(
            session_id,
            instance = %params.instance_name,
            phone = %phone_number,
            error = %e,
            "failed to reset unread count"
        );
        send_error(state, session_id, "failed to mark messages read").await;
        return;
    }

    broadcast_to_instance(
        state,
        &params.instance_name,
        server_events::MESSAGES_MARKED_READ,
        json!({
            "instanceName": params.instance_name,
            "phoneNumber": phone_number,
        }),
        Some(session_id),
    )
    .await;
}
