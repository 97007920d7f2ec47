use async_trait::async_trait;

use crate::Result;

/// One cached contact lookup result. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub instance_name: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub picture_url: Option<String>,
    pub exists: bool,
    /// When `exists`/`name`/`picture_url` were last confirmed upstream.
    pub last_updated: i64,
    /// Most recent upstream attempt, successful or not.
    pub last_attempt_at: Option<i64>,
}

impl CacheEntry {
    /// Start of the rate-limit window: the latest of the last confirmation
    /// and the last attempt.
    #[must_use]
    pub fn last_activity(&self) -> i64 {
        self.last_attempt_at
            .map_or(self.last_updated, |at| at.max(self.last_updated))
    }
}

/// Persistent contact lookup cache keyed by `(instance_name, phone_number)`.
#[async_trait]
pub trait ContactCacheStore: Send + Sync {
    async fn get(&self, instance_name: &str, phone_number: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Record a failed upstream attempt. Leaves `exists`, `name`,
    /// `picture_url` and `last_updated` untouched; no-op when no entry exists.
    async fn touch_attempt(&self, instance_name: &str, phone_number: &str, at: i64)
    -> Result<()>;
}

/// Receives resolved names and pictures for the contact aggregate.
#[async_trait]
pub trait ContactProfileSink: Send + Sync {
    /// Write non-null fields only; `None` never clears a stored value.
    async fn update_profile(
        &self,
        instance_name: &str,
        phone_number: &str,
        name: Option<&str>,
        picture_url: Option<&str>,
    ) -> Result<()>;
}
