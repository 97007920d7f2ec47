use {
    async_trait::async_trait,
    sqlx::SqlitePool,
    switchboard_contacts::{CacheEntry, ContactCacheStore, ContactError, Result},
};

/// SQLite-backed contact lookup cache.
pub struct SqliteContactCache {
    pool: SqlitePool,
}

impl SqliteContactCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    instance_name: String,
    phone_number: String,
    name: Option<String>,
    picture_url: Option<String>,
    exists_upstream: bool,
    last_updated: i64,
    last_attempt_at: Option<i64>,
}

#[async_trait]
impl ContactCacheStore for SqliteContactCache {
    async fn get(&self, instance_name: &str, phone_number: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT instance_name, phone_number, name, picture_url, exists_upstream,
                    last_updated, last_attempt_at
             FROM contact_cache
             WHERE instance_name = ? AND phone_number = ?",
        )
        .bind(instance_name)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(ContactError::storage)?;

        Ok(row.map(|r| CacheEntry {
            instance_name: r.instance_name,
            phone_number: r.phone_number,
            name: r.name,
            picture_url: r.picture_url,
            exists: r.exists_upstream,
            last_updated: r.last_updated,
            last_attempt_at: r.last_attempt_at,
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO contact_cache
             (instance_name, phone_number, name, picture_url, exists_upstream,
              last_updated, last_attempt_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (instance_name, phone_number) DO UPDATE SET
                name            = excluded.name,
                picture_url     = excluded.picture_url,
                exists_upstream = excluded.exists_upstream,
                last_updated    = excluded.last_updated,
                last_attempt_at = excluded.last_attempt_at",
        )
        .bind(&entry.instance_name)
        .bind(&entry.phone_number)
        .bind(&entry.name)
        .bind(&entry.picture_url)
        .bind(entry.exists)
        .bind(entry.last_updated)
        .bind(entry.last_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(ContactError::storage)?;
        Ok(())
    }

    async fn touch_attempt(&self, instance_name: &str, phone_number: &str, at: i64) -> Result<()> {
        sqlx::query(
            "UPDATE contact_cache SET last_attempt_at = ?
             WHERE instance_name = ? AND phone_number = ?",
        )
        .bind(at)
        .bind(instance_name)
        .bind(phone_number)
        .execute(&self.pool)
        .await
        .map_err(ContactError::storage)?;
        Ok(())
    }
}
