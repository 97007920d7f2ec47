//! Provider webhook ingress.
//!
//! `POST /webhook` takes the generic `{instance, event, data}` envelope.
//! `POST /webhook/{event}` is the per-event variant the provider can be
//! configured with; the slug stands in for a missing `event` field.

use {
    axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
    },
    serde_json::Value,
    switchboard_messages::canonical_event_name,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use switchboard_metrics::{counter, histogram, webhook as webhook_metrics};

use crate::{ingress::ingest, server::AppState};

/// Why an envelope was refused with a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("missing 'instance'")]
    MissingInstance,
    #[error("missing 'event'")]
    MissingEvent,
}

/// The routing fields of a delivery envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub instance_name: String,
    /// Canonical event name.
    pub event: String,
}

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl EnvelopeHeader {
    /// Read `instance` and `event` from the body, falling back to the route
    /// slug for the event.
    pub fn parse(body: &Value, event_slug: Option<&str>) -> Result<Self, EnvelopeError> {
        let instance_name = non_empty(body.get("instance"))
            .or_else(|| non_empty(body.get("instanceName")))
            .ok_or(EnvelopeError::MissingInstance)?;
        let event = non_empty(body.get("event"))
            .or_else(|| event_slug.map(str::trim).filter(|s| !s.is_empty()))
            .ok_or(EnvelopeError::MissingEvent)?;
        Ok(Self {
            instance_name: instance_name.to_string(),
            event: canonical_event_name(event),
        })
    }
}

pub fn webhook_router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/webhook/{event}", post(webhook_event_handler))
}

async fn webhook_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    handle(state, body, None).await
}

async fn webhook_event_handler(
    State(state): State<AppState>,
    Path(event): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    handle(state, body, Some(event)).await
}

async fn handle(state: AppState, body: Value, event_slug: Option<String>) -> Response {
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let header = match EnvelopeHeader::parse(&body, event_slug.as_deref()) {
        Ok(header) => header,
        Err(e) => {
            debug!(error = %e, "webhook envelope refused");
            #[cfg(feature = "metrics")]
            counter!(webhook_metrics::REJECTED_TOTAL, "reason" => "bad_envelope").increment(1);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response();
        },
    };

    #[cfg(feature = "metrics")]
    counter!(webhook_metrics::RECEIVED_TOTAL, "event" => header.event.clone()).increment(1);

    let outcome = ingest(&state.gateway, &header.instance_name, &header.event, &body).await;
    debug!(
        instance = %header.instance_name,
        event = %header.event,
        outcome = outcome.as_str(),
        "webhook handled"
    );

    #[cfg(feature = "metrics")]
    histogram!(webhook_metrics::HANDLE_DURATION_SECONDS, "event" => header.event.clone())
        .record(started.elapsed().as_secs_f64());

    (StatusCode::OK, Json(outcome.to_json())).into_response()
}
