//! Durable request store with time-to-live expiry

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Request;

/// Persists requests keyed by id. Every write refreshes the row's
/// time-to-live; reads treat an expired row exactly like a missing one, so
/// abandoned requests fade out on their own.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    ttl: chrono::Duration,
}

impl Store {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        Self { pool, ttl }
    }

    /// Save the full request state, refreshing its time-to-live. The id is
    /// assigned on the first successful save and never changes afterwards.
    pub async fn put(&self, request: &mut Request) -> Result<Uuid> {
        let id = request.id.unwrap_or_else(Uuid::new_v4);
        let expires_at = Utc::now() + self.ttl;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO requests
                (id, requester, channel, raw_text, task_text, user_refs, group_refs,
                 broadcast, timed_out, rejected, pending, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&request.requester)
        .bind(&request.channel)
        .bind(&request.raw_text)
        .bind(&request.task_text)
        .bind(encode_set(&request.user_refs)?)
        .bind(encode_set(&request.group_refs)?)
        .bind(request.broadcast)
        .bind(encode_set(&request.timed_out)?)
        .bind(encode_set(&request.rejected)?)
        .bind(request.pending.as_deref())
        .bind(request.created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        request.id = Some(id);
        Ok(id)
    }

    /// Load a request. An expired row is indistinguishable from a missing
    /// one.
    pub async fn get(&self, id: Uuid) -> Result<Option<Request>> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, requester, channel, raw_text, task_text, user_refs, group_refs,
                   broadcast, timed_out, rejected, pending, created_at
            FROM requests
            WHERE id = ? AND expires_at > ?
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Request::try_from).transpose()
    }

    /// Remove a request. Deleting an absent key is not an error.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM requests WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Drop rows past their expiry. Reads already filter expired rows;
    /// this keeps the table from growing without bound.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM requests WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn encode_set(set: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(set).map_err(|e| AppError::Internal(format!("Invalid set: {}", e)))
}

fn decode_set(raw: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(raw).map_err(|e| AppError::Internal(format!("Invalid set column: {}", e)))
}

// Internal row type for sqlx

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    requester: String,
    channel: String,
    raw_text: String,
    task_text: String,
    user_refs: String,
    group_refs: String,
    broadcast: bool,
    timed_out: String,
    rejected: String,
    pending: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for Request {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(Request {
            id: Some(
                Uuid::parse_str(&row.id)
                    .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            ),
            requester: row.requester,
            channel: row.channel,
            raw_text: row.raw_text,
            task_text: row.task_text,
            user_refs: decode_set(&row.user_refs)?,
            group_refs: decode_set(&row.group_refs)?,
            broadcast: row.broadcast,
            timed_out: decode_set(&row.timed_out)?,
            rejected: decode_set(&row.rejected)?,
            pending: row.pending,
            created_at: row.created_at,
        })
    }
}
