// SQLite result store (database feature)

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::store::{CacheKey, Invalidation, ValidationResult, ValidationStore};
use crate::config::DatabaseConfig;
use crate::errors::CapabilityError;

fn storage_error(e: impl std::fmt::Display) -> CapabilityError {
    CapabilityError::Storage(e.to_string())
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, CapabilityError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| storage_error(format!("timestamp out of range: {millis}")))
}

fn row_to_result(row: &SqliteRow) -> Result<ValidationResult, CapabilityError> {
    let validated: i64 = row.try_get("validated").map_err(storage_error)?;
    let duration_ms: i64 = row.try_get("duration_ms").map_err(storage_error)?;
    Ok(ValidationResult {
        account_id: row.try_get("account_id").map_err(storage_error)?,
        agent_id: row.try_get("agent_id").map_err(storage_error)?,
        criteria: row.try_get("criteria").map_err(storage_error)?,
        validated: validated != 0,
        duration_ms: duration_ms.max(0) as u64,
        created_at: from_millis(row.try_get("created_at").map_err(storage_error)?)?,
        expires_at: from_millis(row.try_get("expires_at").map_err(storage_error)?)?,
    })
}

pub struct SqliteValidationStore {
    pool: SqlitePool,
}

impl SqliteValidationStore {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, CapabilityError> {
        let url = &config.url;
        if !sqlx::Sqlite::database_exists(url).await.map_err(storage_error)? {
            info!("Creating validation database at {}", url);
            sqlx::Sqlite::create_database(url).await.map_err(storage_error)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(storage_error)?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await.map_err(storage_error)?;
        }

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ValidationStore for SqliteValidationStore {
    async fn upsert(&self, result: ValidationResult) -> Result<(), CapabilityError> {
        sqlx::query(
            r#"
            INSERT INTO validation_results
                (account_id, agent_id, criteria, validated, duration_ms, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (account_id, agent_id, criteria) DO UPDATE SET
                validated = excluded.validated,
                duration_ms = excluded.duration_ms,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            WHERE excluded.created_at >= validation_results.created_at
            "#,
        )
        .bind(&result.account_id)
        .bind(&result.agent_id)
        .bind(&result.criteria)
        .bind(result.validated as i64)
        .bind(result.duration_ms as i64)
        .bind(result.created_at.timestamp_millis())
        .bind(result.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<ValidationResult>, CapabilityError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, agent_id, criteria, validated, duration_ms, created_at, expires_at
            FROM validation_results
            WHERE account_id = ?1 AND agent_id = ?2 AND criteria = ?3
            "#,
        )
        .bind(&key.account_id)
        .bind(&key.agent_id)
        .bind(&key.criteria)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(row_to_result).transpose()
    }

    async fn invalidate(&self, scope: Invalidation) -> Result<(), CapabilityError> {
        let query = match &scope {
            Invalidation::Agent { account_id, agent_id } => {
                sqlx::query("DELETE FROM validation_results WHERE account_id = ?1 AND agent_id = ?2")
                    .bind(account_id)
                    .bind(agent_id)
            }
            Invalidation::Criteria { account_id, criteria } => {
                sqlx::query("DELETE FROM validation_results WHERE account_id = ?1 AND criteria = ?2")
                    .bind(account_id)
                    .bind(criteria)
            }
            Invalidation::Account { account_id } => {
                sqlx::query("DELETE FROM validation_results WHERE account_id = ?1").bind(account_id)
            }
        };
        query.execute(&self.pool).await.map_err(storage_error)?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CapabilityError> {
        let done = sqlx::query("DELETE FROM validation_results WHERE expires_at <= ?1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(done.rows_affected())
    }
}
