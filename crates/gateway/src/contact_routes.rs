use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    serde::Deserialize,
    tracing::warn,
};

use crate::server::AppState;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

pub fn contact_router() -> Router<AppState> {
    Router::new()
        .route("/api/contacts/{instance}/{phone}", get(resolve_handler))
        .route("/api/instances/{instance}/contacts", get(list_handler))
}

async fn resolve_handler(
    State(state): State<AppState>,
    Path((instance, phone)): Path<(String, String)>,
) -> Response {
    match state.gateway.contacts.resolve(&instance, &phone).await {
        Ok(resolution) => Json(resolution).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

async fn list_handler(
    State(state): State<AppState>,
    Path(instance): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    match state.gateway.messages.list_aggregates(&instance, limit).await {
        Ok(contacts) => Json(serde_json::json!({ "contacts": contacts })).into_response(),
        Err(e) => {
            warn!(instance = %instance, error = %e, "failed to list contacts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "failed to list contacts" })),
            )
                .into_response()
        },
    }
}
