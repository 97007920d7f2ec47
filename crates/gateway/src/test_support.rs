use std::sync::Arc;

use {
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    switchboard_contacts::{CachePolicy, ContactResolver, HttpContactLookup},
};

use crate::{
    contact_store::SqliteContactCache,
    message_store::SqliteMessageStore,
    state::{GatewayOptions, GatewayState},
};

pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::run_migrations(&pool).await.unwrap();
    pool
}

/// Gateway state over in-memory SQLite with an unconfigured provider.
pub async fn test_state() -> Arc<GatewayState> {
    let pool = test_pool().await;
    let lookup = HttpContactLookup::new("", None, std::time::Duration::from_secs(1)).unwrap();
    let resolver = ContactResolver::new(
        Arc::new(lookup),
        Arc::new(SqliteContactCache::new(pool.clone())),
        CachePolicy::default(),
    );
    GatewayState::new(
        Arc::new(SqliteMessageStore::new(pool)),
        resolver,
        GatewayOptions::default(),
    )
}
