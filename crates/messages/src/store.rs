use async_trait::async_trait;

use crate::{CanonicalMessage, ContactAggregate, Result};

/// Result of one [`MessageStore::persist`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    /// `false` when the message id was already stored.
    pub inserted: bool,
}

/// Idempotent message persistence plus the per-contact rolling aggregate.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert-or-ignore on `(instance_name, message_id)`, then upsert the
    /// aggregate. The aggregate upsert runs even when the insert was ignored.
    async fn persist(&self, message: &CanonicalMessage) -> Result<PersistOutcome>;

    /// Reset the unread counter for a contact. Returns the rows touched.
    async fn mark_read(&self, instance_name: &str, phone_number: &str) -> Result<u64>;

    async fn aggregate(
        &self,
        instance_name: &str,
        phone_number: &str,
    ) -> Result<Option<ContactAggregate>>;

    /// Aggregates for an instance, most recent message first.
    async fn list_aggregates(
        &self,
        instance_name: &str,
        limit: u32,
    ) -> Result<Vec<ContactAggregate>>;

    /// Number of stored message rows for a contact.
    async fn message_count(&self, instance_name: &str, phone_number: &str) -> Result<i64>;
}
