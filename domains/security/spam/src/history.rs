use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sql_connection::SqlConnect;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// How many recent outcomes per identifier the heuristics look at
pub const HISTORY_WINDOW: i64 = 5;

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Ip,
    Email,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Email => "email",
        }
    }
}

/// One prior classification outcome for an identifier
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub is_spam: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ReputationStoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Persistence seam for reputation history. Lookup failures are the
/// scorer's to handle; the store only reports them.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Most recent outcomes first, at most `limit`
    async fn recent(
        &self, kind: IdentifierKind, identifier: &str, limit: i64,
    ) -> Result<Vec<ReputationRecord>, ReputationStoreError>;

    async fn record(
        &self, kind: IdentifierKind, identifier: &str, is_spam: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ReputationStoreError>;
}

pub struct PostgresReputationStore {
    db: SqlConnect,
}

impl PostgresReputationStore {
    pub fn new(db: SqlConnect) -> Self { Self { db } }
}

#[async_trait]
impl ReputationStore for PostgresReputationStore {
    #[instrument(skip_all)]
    async fn recent(
        &self, kind: IdentifierKind, identifier: &str, limit: i64,
    ) -> Result<Vec<ReputationRecord>, ReputationStoreError> {
        let client = self
            .db
            .get_client()
            .await
            .map_err(|e| ReputationStoreError::Connection(e.to_string()))?;

        let rows = client
            .query(
                "SELECT is_spam, checked_at FROM spam_checks \
                 WHERE identifier_kind = $1 AND identifier = $2 \
                 ORDER BY checked_at DESC LIMIT $3",
                &[&kind.as_str(), &identifier, &limit],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                ReputationRecord {
                    is_spam: row.get("is_spam"),
                    checked_at: row.get("checked_at"),
                }
            })
            .collect())
    }

    #[instrument(skip_all)]
    async fn record(
        &self, kind: IdentifierKind, identifier: &str, is_spam: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ReputationStoreError> {
        let client = self
            .db
            .get_client()
            .await
            .map_err(|e| ReputationStoreError::Connection(e.to_string()))?;

        client
            .execute(
                "INSERT INTO spam_checks \
                 (id, identifier_kind, identifier, is_spam, checked_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &Uuid::now_v7(),
                    &kind.as_str(),
                    &identifier,
                    &is_spam,
                    &checked_at,
                ],
            )
            .await?;

        Ok(())
    }
}

/// Process-local store for tests and standalone runs
#[derive(Default)]
pub struct InMemoryReputationStore {
    records: RwLock<HashMap<(IdentifierKind, String), Vec<ReputationRecord>>>,
}

impl InMemoryReputationStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl ReputationStore for InMemoryReputationStore {
    async fn recent(
        &self, kind: IdentifierKind, identifier: &str, limit: i64,
    ) -> Result<Vec<ReputationRecord>, ReputationStoreError> {
        let records = self.records.read().await;
        let mut recent = records
            .get(&(kind, identifier.to_string()))
            .cloned()
            .unwrap_or_default();
        recent.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }

    async fn record(
        &self, kind: IdentifierKind, identifier: &str, is_spam: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<(), ReputationStoreError> {
        self.records
            .write()
            .await
            .entry((kind, identifier.to_string()))
            .or_default()
            .push(ReputationRecord {
                is_spam,
                checked_at,
            });
        Ok(())
    }
}
