//! Gateway: webhook ingress, real-time fan-out over WebSocket, contact routes.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Open SQLite, run migrations
//! 3. Build stores, contact resolver, session registry
//! 4. Serve HTTP (webhooks, contacts API, health, metrics) and `/ws`

pub mod broadcast;
pub mod contact_routes;
pub mod contact_store;
pub mod ingress;
pub mod message_store;
#[cfg(feature = "prometheus")]
pub mod metrics_routes;
pub mod server;
pub mod state;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;
pub mod webhook;
pub mod ws;

/// Run database migrations for the gateway crate.
///
/// Creates the `messages`, `contact_aggregates` and `contact_cache` tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
