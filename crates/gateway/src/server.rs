use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use {
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        http::HeaderValue,
        response::{IntoResponse, Json},
        routing::get,
    },
    sqlx::SqlitePool,
    switchboard_config::SwitchboardConfig,
    switchboard_contacts::{CachePolicy, ContactResolver, HttpContactLookup},
    tower_http::cors::{AllowOrigin, Any, CorsLayer},
    tracing::{debug, info, warn},
};

use crate::{
    contact_routes::contact_router,
    contact_store::SqliteContactCache,
    message_store::SqliteMessageStore,
    state::{GatewayOptions, GatewayState},
    webhook::webhook_router,
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            },
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = cors_layer(&state.cors_origins);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .merge(webhook_router())
        .merge(contact_router());

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    router.layer(cors).with_state(AppState { gateway: state })
}

/// Wire stores and the contact resolver onto an open pool.
///
/// Migrations must already have run.
pub fn build_state(
    config: &SwitchboardConfig,
    pool: SqlitePool,
    options: GatewayOptions,
) -> anyhow::Result<Arc<GatewayState>> {
    let messages = Arc::new(SqliteMessageStore::new(pool.clone()));
    let lookup = HttpContactLookup::from_config(&config.provider)?;
    let contacts = ContactResolver::new(
        Arc::new(lookup),
        Arc::new(SqliteContactCache::new(pool)),
        CachePolicy::from(&config.contacts),
    )
    .with_profile_sink(messages.clone());
    Ok(GatewayState::new(messages, contacts, options))
}

async fn open_pool(config: &SwitchboardConfig, data_dir: PathBuf) -> anyhow::Result<SqlitePool> {
    let db_url = match config.database.url.as_deref() {
        Some(url) if !url.trim().is_empty() => url.to_string(),
        _ => {
            std::fs::create_dir_all(&data_dir)?;
            let db_path = data_dir.join("switchboard.db");
            format!("sqlite:{}?mode=rwc", db_path.display())
        },
    };
    debug!(url = %db_url, "opening database");
    let pool = SqlitePool::connect(&db_url).await?;
    crate::run_migrations(&pool).await?;
    Ok(pool)
}

/// Start the gateway HTTP + WebSocket server.
pub async fn start_gateway(
    config: SwitchboardConfig,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let data_dir = data_dir.unwrap_or_else(switchboard_config::data_dir);
    let pool = open_pool(&config, data_dir.clone()).await?;

    #[allow(unused_mut)]
    let mut options = GatewayOptions::from(&config.realtime);

    #[cfg(feature = "metrics")]
    {
        let handle = switchboard_metrics::init_metrics(switchboard_metrics::MetricsRecorderConfig {
            enabled: config.metrics.enabled,
            global_labels: vec![("service".to_string(), "switchboard".to_string())],
        })?;
        options.metrics_handle = Some(handle);
    }

    let state = build_state(&config, pool, options)?;
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let provider = if config.provider.base_url.trim().is_empty() {
        "not configured".to_string()
    } else {
        config.provider.base_url.clone()
    };
    info!(
        version = %state.version,
        addr = %listener.local_addr()?,
        data_dir = %data_dir.display(),
        provider = %provider,
        "switchboard gateway listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let count = state.gateway.sessions.session_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "sessions": count,
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    debug!(remote = %addr, "ws: upgrade requested");
    let max_payload = state.gateway.max_payload_bytes;
    // Oversized frames must still reach the loop, which answers with an error event.
    ws.max_message_size(max_payload.saturating_mul(4))
        .on_upgrade(move |socket| handle_connection(socket, state.gateway))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::test_support::test_pool};

    #[tokio::test]
    async fn build_state_reads_realtime_knobs() {
        let mut config = SwitchboardConfig::default();
        config.realtime.max_payload_bytes = 1024;
        config.realtime.cors_origins = vec!["https://app.example.com".into()];

        let state = build_state(
            &config,
            test_pool().await,
            GatewayOptions::from(&config.realtime),
        )
        .unwrap();
        assert_eq!(state.max_payload_bytes, 1024);
        assert_eq!(state.cors_origins, vec!["https://app.example.com".to_string()]);
        assert_eq!(state.contacts.policy(), CachePolicy::from(&config.contacts));
    }

    #[test]
    fn cors_layer_skips_bad_origins() {
        // Must not panic on values that are not valid header values.
        let _ = cors_layer(&["https://ok.example.com".into(), "bad\norigin".into()]);
    }
}
