//! SQLite token storage over the gateway's own database.
//!
//! The gateway owns the schema. This store only reads `users` and reads and
//! inserts into `tokens`, using the gateway's column names.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::{GatewayToken, InsertOutcome, NewGatewayToken, StoreError, TokenOwner, TokenStore};
use crate::secret::Secret;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal gateway schema, for development databases and tests.
const BOOTSTRAP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT,
    oidc_id TEXT,
    deleted_at DATETIME
);
CREATE TABLE IF NOT EXISTS tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    key CHAR(48),
    status INTEGER DEFAULT 1,
    name TEXT,
    created_time INTEGER,
    accessed_time INTEGER,
    expired_time INTEGER DEFAULT -1,
    remain_quota INTEGER DEFAULT 0,
    unlimited_quota NUMERIC,
    used_quota INTEGER DEFAULT 0,
    "group" TEXT DEFAULT '',
    deleted_at DATETIME
);
"#;

#[derive(sqlx::FromRow)]
struct OwnerRow {
    id: i64,
    username: Option<String>,
    oidc_id: String,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    user_id: i64,
    key: String,
    name: String,
    group: Option<String>,
}

/// Token store backed by the gateway's SQLite database.
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Open an existing database file.
    ///
    /// The file must already exist; the gateway creates it.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path.as_ref(), false).await
    }

    /// Open a database file, creating it if missing.
    pub async fn connect_or_create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path.as_ref(), true).await
    }

    async fn open(path: &Path, create: bool) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open {
                message: format!("{}: {}", path.display(), e),
            })?;

        debug!(path = %path.display(), "opened gateway database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the `users` and `tokens` tables if they do not exist.
    pub async fn bootstrap_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(BOOTSTRAP_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTokenStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn find_owner(
        &self,
        external_subject_id: &str,
    ) -> Result<Option<TokenOwner>, StoreError> {
        let row = sqlx::query_as::<_, OwnerRow>(
            r#"
            SELECT id, username, oidc_id
            FROM users
            WHERE oidc_id = ? AND deleted_at IS NULL
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(external_subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TokenOwner {
            id: r.id,
            username: r.username,
            external_subject_id: r.oidc_id,
        }))
    }

    async fn insert_token_if_absent(
        &self,
        token: &NewGatewayToken,
    ) -> Result<InsertOutcome, StoreError> {
        // One statement, so SQLite's write lock covers check and insert.
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (user_id, key, name, created_time, accessed_time, unlimited_quota, "group")
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM tokens
                WHERE user_id = ? AND name = ? AND deleted_at IS NULL
            )
            "#,
        )
        .bind(token.owner_id)
        .bind(token.secret.expose())
        .bind(&token.name)
        .bind(token.created_time)
        .bind(token.created_time)
        .bind(token.unlimited_quota)
        .bind(&token.group)
        .bind(token.owner_id)
        .bind(&token.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Created)
        }
    }

    async fn find_token(
        &self,
        owner_id: i64,
        name: &str,
    ) -> Result<Option<GatewayToken>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT id, user_id, key, name, "group"
            FROM tokens
            WHERE user_id = ? AND name = ? AND deleted_at IS NULL
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| GatewayToken {
            id: r.id,
            owner_id: r.user_id,
            name: r.name,
            group: r.group,
            secret: Secret::new(r.key),
        }))
    }
}
