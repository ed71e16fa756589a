//! Postgres-backed identity store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | `(provider, provider_id)` already taken |
//! | Database (other) | Any other | `Backend` | Constraint or schema problems |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use passage_core::{Clock, Identity, IdentityId, JsonMap, ProviderIdentity, SystemClock};
use passage_store::{IdentityFilter, IdentityKey, IdentityPatch, IdentityStore, NewIdentity, StoreError};

/// Idempotent schema for the `identities` table.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS identities (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    user_type     TEXT NOT NULL,
    provider      TEXT NOT NULL,
    provider_id   TEXT NOT NULL,
    provider_data JSONB,
    disabled      BOOLEAN NOT NULL DEFAULT FALSE,
    created_at    TIMESTAMPTZ NOT NULL,
    UNIQUE (provider, provider_id)
);
CREATE INDEX IF NOT EXISTS identities_user_id_idx ON identities (user_id);
"#;

const COLUMNS: &str = "id, user_id, user_type, provider, provider_id, provider_data, disabled, created_at";

#[derive(Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for PostgresIdentityStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresIdentityStore").finish_non_exhaustive()
    }
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool: Arc::new(pool),
            clock,
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the table and indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn fetch(&self, key: &IdentityKey) -> Result<Option<Identity>, StoreError> {
        let row = match key {
            IdentityKey::Id(id) => {
                sqlx::query(&format!("SELECT {COLUMNS} FROM identities WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&*self.pool)
                    .await
            }
            IdentityKey::Provider {
                provider,
                provider_id,
            } => {
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM identities WHERE provider = $1 AND provider_id = $2"
                ))
                .bind(provider)
                .bind(provider_id)
                .fetch_optional(&*self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("find", e))?;

        row.map(|r| IdentityRow::from_row(&r).map(Identity::from))
            .transpose()
            .map_err(|e| StoreError::Serialization(format!("failed to decode identity row: {e}")))
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self), err)]
    async fn find(&self, key: &IdentityKey) -> Result<Option<Identity>, StoreError> {
        self.fetch(key).await
    }

    #[instrument(
        skip(self, data),
        fields(provider = %data.provider, user_id = %data.user_id),
        err
    )]
    async fn create(&self, data: NewIdentity) -> Result<Identity, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO identities ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(IdentityId::new().to_string())
        .bind(&data.user_id)
        .bind(&data.user_type)
        .bind(&data.provider)
        .bind(&data.provider_id)
        .bind(data.provider_data.map(JsonValue::Object))
        .bind(data.disabled)
        .bind(self.clock.now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        IdentityRow::from_row(&row)
            .map(Identity::from)
            .map_err(|e| StoreError::Serialization(format!("failed to decode identity row: {e}")))
    }

    #[instrument(skip(self, patch), err)]
    async fn update(&self, key: &IdentityKey, patch: IdentityPatch) -> Result<Identity, StoreError> {
        let current = self.fetch(key).await?.ok_or(StoreError::NotFound)?;

        let (set_data, data) = match patch.provider_data {
            Some(data) => (true, data.map(JsonValue::Object)),
            None => (false, None),
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE identities SET
                disabled = COALESCE($2, disabled),
                user_type = COALESCE($3, user_type),
                provider_data = CASE WHEN $4 THEN $5 ELSE provider_data END
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&current.id)
        .bind(patch.disabled)
        .bind(patch.user_type)
        .bind(set_data)
        .bind(data)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?
        .ok_or(StoreError::NotFound)?;

        IdentityRow::from_row(&row)
            .map(Identity::from)
            .map_err(|e| StoreError::Serialization(format!("failed to decode identity row: {e}")))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, filter: &IdentityFilter) -> Result<u64, StoreError> {
        if filter.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            DELETE FROM identities
            WHERE ($1::text[] IS NULL OR id = ANY($1))
              AND ($2::text[] IS NULL OR user_id = ANY($2))
              AND ($3::text[] IS NULL OR provider = ANY($3))
              AND ($4::text[] IS NULL OR provider_id = ANY($4))
            "#,
        )
        .bind(filter.ids.as_deref())
        .bind(filter.user_ids.as_deref())
        .bind(filter.providers.as_deref())
        .bind(filter.provider_ids.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete", e))?;

        Ok(result.rows_affected())
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) if code.as_ref() == "23505" => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[derive(Debug)]
struct IdentityRow {
    id: String,
    user_id: String,
    user_type: String,
    provider: String,
    provider_id: String,
    provider_data: Option<JsonValue>,
    disabled: bool,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for IdentityRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(IdentityRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            user_type: row.try_get("user_type")?,
            provider: row.try_get("provider")?,
            provider_id: row.try_get("provider_id")?,
            provider_data: row.try_get("provider_data")?,
            disabled: row.try_get("disabled")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        let provider_data = match row.provider_data {
            Some(JsonValue::Object(map)) => Some(map),
            _ => None::<JsonMap>,
        };
        Identity {
            id: row.id,
            user_id: row.user_id,
            user_type: row.user_type,
            disabled: row.disabled,
            created_at: row.created_at,
            source: ProviderIdentity {
                provider: row.provider,
                provider_id: row.provider_id,
                provider_data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_identity() {
        let mut data = JsonMap::new();
        data.insert("email".into(), JsonValue::String("a@example.com".into()));
        let row = IdentityRow {
            id: "id-1".into(),
            user_id: "u-1".into(),
            user_type: "customer".into(),
            provider: "local".into(),
            provider_id: "a@example.com".into(),
            provider_data: Some(JsonValue::Object(data.clone())),
            disabled: true,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let identity = Identity::from(row);
        assert_eq!(identity.ident(), "customer:u-1");
        assert_eq!(identity.source.ident(), "local:a@example.com");
        assert_eq!(identity.source.provider_data, Some(data));
        assert!(identity.disabled);
    }

    #[test]
    fn non_object_provider_data_is_dropped() {
        let row = IdentityRow {
            id: "id-1".into(),
            user_id: "u-1".into(),
            user_type: "customer".into(),
            provider: "local".into(),
            provider_id: "a".into(),
            provider_data: Some(JsonValue::Null),
            disabled: false,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        assert_eq!(Identity::from(row).source.provider_data, None);
    }

    #[test]
    fn sqlx_errors_map_to_store_errors() {
        assert_eq!(
            map_sqlx_error("find", sqlx::Error::RowNotFound),
            StoreError::NotFound
        );
        assert!(matches!(
            map_sqlx_error("create", sqlx::Error::PoolClosed),
            StoreError::Backend(_)
        ));
    }
}
