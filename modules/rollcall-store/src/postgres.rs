//! Postgres persistence. Each collection is a table holding one JSONB
//! document per aggregate; the status column is denormalized from the doc
//! so the scheduler's working-set scan stays an index lookup.

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use rollcall_common::{Event, ParticipantDoc, Result, RollcallError};

use crate::traits::{EventCollection, LockGuard, ParticipantCollection, RegistrationLock};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(transient)?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RollcallError::TransientStore(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventCollection for PgStore {
    async fn insert_event(&self, event: &Event) -> Result<()> {
        let doc = to_doc(event)?;
        let result = sqlx::query(
            r#"
            INSERT INTO events (event_id, status, doc)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(event.event_id)
        .bind(event.status.to_string())
        .bind(&doc)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RollcallError::Conflict(format!(
                "event {} already exists",
                event.event_id
            ))),
            Err(e) => Err(transient(e)),
        }
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        let doc = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT doc FROM events WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        doc.map(from_doc).transpose()
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let doc = to_doc(event)?;
        let result = sqlx::query(
            r#"
            UPDATE events SET status = $2, doc = $3, updated_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event.event_id)
        .bind(event.status.to_string())
        .bind(&doc)
        .execute(&self.pool)
        .await
        .map_err(transient)?;

        if result.rows_affected() == 0 {
            return Err(RollcallError::NotFound(format!("event {}", event.event_id)));
        }
        Ok(())
    }

    async fn events_not_terminal(&self) -> Result<Vec<Event>> {
        let docs = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT doc FROM events
            WHERE status NOT IN ('archived', 'cancelled')
            ORDER BY (doc ->> 'created_at') ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;

        docs.into_iter().map(from_doc).collect()
    }

    async fn event_by_registration(&self, registration_id: Uuid) -> Result<Option<Event>> {
        let probe = json!([{ "registration_id": registration_id }]);
        let doc = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT doc FROM events
            WHERE doc -> 'registrations' @> $1
            LIMIT 1
            "#,
        )
        .bind(probe)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        doc.map(from_doc).transpose()
    }
}

#[async_trait]
impl ParticipantCollection for PgStore {
    async fn get_participant(&self, participant_id: &str) -> Result<Option<ParticipantDoc>> {
        let doc = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT doc FROM participants WHERE participant_id = $1
            "#,
        )
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        doc.map(|d| serde_json::from_value(d).map_err(corrupt))
            .transpose()
    }

    async fn save_participant(&self, doc: &ParticipantDoc) -> Result<()> {
        let value = serde_json::to_value(doc).map_err(corrupt)?;
        sqlx::query(
            r#"
            INSERT INTO participants (participant_id, doc)
            VALUES ($1, $2)
            ON CONFLICT (participant_id)
            DO UPDATE SET doc = EXCLUDED.doc, updated_at = now()
            "#,
        )
        .bind(&doc.participant_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PgRegistrationLock (session-level advisory locks)
// ---------------------------------------------------------------------------

/// Advisory-lock based mutual exclusion. The lock is tied to the pooled
/// connection held by the guard; explicit release returns the connection to
/// the pool, while a dropped guard detaches it so the lock dies with the
/// session instead of leaking into pool reuse.
pub struct PgRegistrationLock {
    pool: PgPool,
}

impl PgRegistrationLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationLock for PgRegistrationLock {
    async fn acquire(&self, key: &str) -> Result<Option<Box<dyn LockGuard>>> {
        let mut conn = self.pool.acquire().await.map_err(transient)?;
        let acquired: bool =
            sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1)::bigint)")
                .bind(key)
                .fetch_one(&mut *conn)
                .await
                .map_err(transient)?;

        if !acquired {
            return Ok(None);
        }
        Ok(Some(Box::new(PgLockGuard {
            conn: Some(conn),
            key: key.to_string(),
        })))
    }
}

struct PgLockGuard {
    conn: Option<sqlx::pool::PoolConnection<sqlx::Postgres>>,
    key: String,
}

#[async_trait]
impl LockGuard for PgLockGuard {
    async fn release(mut self: Box<Self>) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
                .bind(&self.key)
                .execute(&mut *conn)
                .await
                .map_err(transient)?;
        }
        Ok(())
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        // Not released: close the session rather than returning a
        // still-locked connection to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn transient(e: sqlx::Error) -> RollcallError {
    RollcallError::TransientStore(e.to_string())
}

fn corrupt(e: serde_json::Error) -> RollcallError {
    RollcallError::Consistency(format!("stored document does not deserialize: {e}"))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn to_doc(event: &Event) -> Result<serde_json::Value> {
    serde_json::to_value(event).map_err(corrupt)
}

fn from_doc(doc: serde_json::Value) -> Result<Event> {
    serde_json::from_value(doc).map_err(corrupt)
}
