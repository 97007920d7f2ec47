use {
    async_trait::async_trait,
    sqlx::SqlitePool,
    switchboard_common::time::now_ms,
    switchboard_contacts::{ContactError, ContactProfileSink},
    switchboard_messages::{
        CanonicalMessage, ContactAggregate, Direction, Error, MessageStore, PersistOutcome, Result,
    },
};

/// SQLite-backed message store and contact aggregate.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    instance_name: String,
    phone_number: String,
    contact_name: Option<String>,
    profile_picture_url: Option<String>,
    last_message_at: i64,
    message_count: i64,
    unread_count: i64,
}

impl From<AggregateRow> for ContactAggregate {
    fn from(r: AggregateRow) -> Self {
        Self {
            instance_name: r.instance_name,
            phone_number: r.phone_number,
            contact_name: r.contact_name,
            profile_picture_url: r.profile_picture_url,
            last_message_at: r.last_message_at,
            message_count: r.message_count,
            unread_count: r.unread_count,
        }
    }
}

const AGGREGATE_COLUMNS: &str = "instance_name, phone_number, contact_name, profile_picture_url,
     last_message_at, message_count, unread_count";

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn persist(&self, message: &CanonicalMessage) -> Result<PersistOutcome> {
        let raw = serde_json::to_string(&message.raw_payload)?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO messages
             (instance_name, message_id, phone_number, direction, message_type, content,
              media_url, caption, contact_name, timestamp, raw_payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.instance_name)
        .bind(&message.message_id)
        .bind(&message.phone_number)
        .bind(message.direction.as_str())
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(&message.caption)
        .bind(&message.contact_name)
        .bind(message.timestamp)
        .bind(raw)
        .bind(now_ms())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage("insert message", e))?
        .rows_affected()
            == 1;

        // Not gated on `inserted`: a redelivered message counts again.
        let unread_delta = i64::from(message.direction == Direction::Inbound);
        sqlx::query(
            "INSERT INTO contact_aggregates
             (instance_name, phone_number, contact_name, last_message_at, message_count, unread_count)
             VALUES (?, ?, ?, ?, 1, ?)
             ON CONFLICT (instance_name, phone_number) DO UPDATE SET
                contact_name    = COALESCE(excluded.contact_name, contact_aggregates.contact_name),
                last_message_at = excluded.last_message_at,
                message_count   = contact_aggregates.message_count + 1,
                unread_count    = contact_aggregates.unread_count + excluded.unread_count",
        )
        .bind(&message.instance_name)
        .bind(&message.phone_number)
        .bind(&message.contact_name)
        .bind(message.timestamp)
        .bind(unread_delta)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage("upsert contact aggregate", e))?;

        Ok(PersistOutcome { inserted })
    }

    async fn mark_read(&self, instance_name: &str, phone_number: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE contact_aggregates SET unread_count = 0
             WHERE instance_name = ? AND phone_number = ?",
        )
        .bind(instance_name)
        .bind(phone_number)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage("reset unread count", e))?;
        Ok(result.rows_affected())
    }

    async fn aggregate(
        &self,
        instance_name: &str,
        phone_number: &str,
    ) -> Result<Option<ContactAggregate>> {
        let row = sqlx::query_as::<_, AggregateRow>(&format!(
            "SELECT {AGGREGATE_COLUMNS} FROM contact_aggregates
             WHERE instance_name = ? AND phone_number = ?"
        ))
        .bind(instance_name)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::storage("load contact aggregate", e))?;
        Ok(row.map(Into::into))
    }

    async fn list_aggregates(
        &self,
        instance_name: &str,
        limit: u32,
    ) -> Result<Vec<ContactAggregate>> {
        let rows = sqlx::query_as::<_, AggregateRow>(&format!(
            "SELECT {AGGREGATE_COLUMNS} FROM contact_aggregates
             WHERE instance_name = ?
             ORDER BY last_message_at DESC
             LIMIT ?"
        ))
        .bind(instance_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::storage("list contact aggregates", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn message_count(&self, instance_name: &str, phone_number: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE instance_name = ? AND phone_number = ?",
        )
        .bind(instance_name)
        .bind(phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::storage("count messages", e))?;
        Ok(count)
    }
}

/// Resolved names and pictures land on existing aggregate rows only; the
/// first message for a contact creates the row.
#[async_trait]
impl ContactProfileSink for SqliteMessageStore {
    async fn update_profile(
        &self,
        instance_name: &str,
        phone_number: &str,
        name: Option<&str>,
        picture_url: Option<&str>,
    ) -> switchboard_contacts::Result<()> {
        sqlx::query(
            "UPDATE contact_aggregates SET
                contact_name        = COALESCE(?, contact_name),
                profile_picture_url = COALESCE(?, profile_picture_url)
             WHERE instance_name = ? AND phone_number = ?",
        )
        .bind(name)
        .bind(picture_url)
        .bind(instance_name)
        .bind(phone_number)
        .execute(&self.pool)
        .await
        .map_err(ContactError::storage)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::sqlite::SqlitePoolOptions,
        switchboard_messages::MessageType,
    };

    async fn test_pool() -> SqlitePool {
        // One connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn message(id: &str, direction: Direction, name: Option<&str>, ts: i64) -> CanonicalMessage {
        CanonicalMessage {
            message_id: id.into(),
            instance_name: "front-desk".into(),
            phone_number: "5511987654321".into(),
            direction,
            message_type: MessageType::Text,
            content: "oi".into(),
            media_url: None,
            caption: None,
            timestamp: ts,
            contact_name: name.map(str::to_owned),
            raw_payload: serde_json::json!({"event": "messages.upsert"}),
        }
    }

    #[tokio::test]
    async fn persist_creates_message_and_aggregate() {
        let store = SqliteMessageStore::new(test_pool().await);
        let outcome = store
            .persist(&message("A1", Direction::Inbound, Some("Maria"), 1_000))
            .await
            .unwrap();
        assert!(outcome.inserted);

        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.message_count, 1);
        assert_eq!(agg.unread_count, 1);
        assert_eq!(agg.last_message_at, 1_000);
        assert_eq!(agg.contact_name.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn redelivery_stores_one_row() {
        let store = SqliteMessageStore::new(test_pool().await);
        let msg = message("A1", Direction::Inbound, None, 1_000);
        assert!(store.persist(&msg).await.unwrap().inserted);
        assert!(!store.persist(&msg).await.unwrap().inserted);
        assert_eq!(
            store.message_count("front-desk", "5511987654321").await.unwrap(),
            1
        );
    }

    /// Known gap: the aggregate upsert is not gated on the insert, so a
    /// redelivered message is counted twice.
    #[tokio::test]
    async fn redelivery_double_counts_aggregate() {
        let store = SqliteMessageStore::new(test_pool().await);
        let msg = message("A1", Direction::Inbound, None, 1_000);
        store.persist(&msg).await.unwrap();
        store.persist(&msg).await.unwrap();

        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.message_count, 2);
        assert_eq!(agg.unread_count, 2);
    }

    #[tokio::test]
    async fn outbound_does_not_touch_unread() {
        let store = SqliteMessageStore::new(test_pool().await);
        store
            .persist(&message("A1", Direction::Inbound, Some("Maria"), 1_000))
            .await
            .unwrap();
        store
            .persist(&message("B1", Direction::Outbound, None, 2_000))
            .await
            .unwrap();

        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.message_count, 2);
        assert_eq!(agg.unread_count, 1);
        assert_eq!(agg.last_message_at, 2_000);
        // A null name never overwrites a known one.
        assert_eq!(agg.contact_name.as_deref(), Some("Maria"));
    }

    #[tokio::test]
    async fn later_name_wins() {
        let store = SqliteMessageStore::new(test_pool().await);
        store
            .persist(&message("A1", Direction::Inbound, Some("Maria"), 1_000))
            .await
            .unwrap();
        store
            .persist(&message("A2", Direction::Inbound, Some("Maria Silva"), 2_000))
            .await
            .unwrap();
        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.contact_name.as_deref(), Some("Maria Silva"));
    }

    #[tokio::test]
    async fn mark_read_resets_unread() {
        let store = SqliteMessageStore::new(test_pool().await);
        for id in ["A1", "A2", "A3"] {
            store
                .persist(&message(id, Direction::Inbound, None, 1_000))
                .await
                .unwrap();
        }
        assert_eq!(
            store.mark_read("front-desk", "5511987654321").await.unwrap(),
            1
        );
        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.unread_count, 0);
        assert_eq!(agg.message_count, 3);

        assert_eq!(store.mark_read("front-desk", "0000").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_scoped_to_instance() {
        let pool = test_pool().await;
        let store = SqliteMessageStore::new(pool);
        let mut older = message("A1", Direction::Inbound, None, 1_000);
        older.phone_number = "5511900000001".into();
        let mut newer = message("A2", Direction::Inbound, None, 5_000);
        newer.phone_number = "5511900000002".into();
        let mut elsewhere = message("A3", Direction::Inbound, None, 9_000);
        elsewhere.instance_name = "back-office".into();
        for m in [&older, &newer, &elsewhere] {
            store.persist(m).await.unwrap();
        }

        let list = store.list_aggregates("front-desk", 10).await.unwrap();
        let phones: Vec<_> = list.iter().map(|a| a.phone_number.as_str()).collect();
        assert_eq!(phones, vec!["5511900000002", "5511900000001"]);

        assert_eq!(store.list_aggregates("front-desk", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn profile_update_never_clears_and_needs_existing_row() {
        let store = SqliteMessageStore::new(test_pool().await);
        store
            .update_profile("front-desk", "5511987654321", Some("Maria"), None)
            .await
            .unwrap();
        assert!(
            store
                .aggregate("front-desk", "5511987654321")
                .await
                .unwrap()
                .is_none()
        );

        store
            .persist(&message("A1", Direction::Inbound, Some("Maria"), 1_000))
            .await
            .unwrap();
        store
            .update_profile(
                "front-desk",
                "5511987654321",
                None,
                Some("https://pps.example/p.jpg"),
            )
            .await
            .unwrap();
        let agg = store
            .aggregate("front-desk", "5511987654321")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(agg.contact_name.as_deref(), Some("Maria"));
        assert_eq!(
            agg.profile_picture_url.as_deref(),
            Some("https://pps.example/p.jpg")
        );
    }
}
