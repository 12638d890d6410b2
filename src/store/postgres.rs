//! PostgreSQL review store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Locking
//!
//! `get_pull_request_for_update` issues `SELECT ... FOR UPDATE`, so two
//! transactions touching the same pull request's reviewers are serialized on
//! that row. Dropping a [`PostgresTx`] without committing rolls it back when
//! the connection returns to the pool.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{Queries, ReviewStore, StoreTx};
use crate::error::StoreError;
use crate::types::{
    PrAssignmentCount, PrStatus, PullRequest, PullRequestId, Team, TeamId, User,
    UserAssignmentCount, UserId,
};

/// DDL for the four relations, applied in order by [`PostgresReviewStore::migrate`].
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        team_id     UUID NOT NULL REFERENCES teams(id),
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS users_team_id_idx ON users (team_id)",
    r#"
    CREATE TABLE IF NOT EXISTS pull_requests (
        id          UUID PRIMARY KEY,
        title       TEXT NOT NULL,
        author_id   UUID NOT NULL REFERENCES users(id),
        status      TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'MERGED')),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pr_reviewers (
        position    BIGSERIAL PRIMARY KEY,
        pr_id       UUID NOT NULL REFERENCES pull_requests(id),
        user_id     UUID NOT NULL REFERENCES users(id),
        UNIQUE (pr_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS pr_reviewers_user_id_idx ON pr_reviewers (user_id)",
];

/// Open-assignment load of `u`, shared by both candidate queries.
const OPEN_LOAD: &str = r#"
    (SELECT COUNT(*)
       FROM pr_reviewers r
       JOIN pull_requests p ON p.id = r.pr_id
      WHERE r.user_id = u.id AND p.status = 'OPEN') AS open_load
"#;

const PR_COLUMNS: &str = "id, title, author_id, status, created_at, updated_at";

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/pr_reviewer".to_string()),
            max_connections: crate::config::env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: crate::config::env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: crate::config::env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: crate::config::env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: crate::config::env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL review store.
pub struct PostgresReviewStore {
    pool: PgPool,
}

impl PostgresReviewStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!(statements = SCHEMA_STATEMENTS.len(), "Schema applied");
        Ok(())
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Classify a driver error by SQLSTATE.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        let constraint = db.constraint().unwrap_or_default().to_string();
        match db.code().as_deref() {
            Some("23505") => return StoreError::UniqueViolation { constraint },
            Some("23503") => return StoreError::ForeignKeyViolation { constraint },
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn parse_team_row(row: &PgRow) -> Result<Team, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    Ok(Team::new(TeamId::new(id), name))
}

fn parse_user_row(row: &PgRow) -> Result<User, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let team_id: Uuid = row.try_get("team_id")?;
    let active: bool = row.try_get("is_active")?;
    Ok(User::new(UserId::new(id), name, TeamId::new(team_id), active))
}

fn parse_pr_row(row: &PgRow) -> Result<PullRequest, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let author_id: Uuid = row.try_get("author_id")?;
    let status: String = row.try_get("status")?;
    let status: PrStatus = status.parse().map_err(StoreError::Corrupt)?;

    Ok(PullRequest {
        id: PullRequestId::new(id),
        title: row.try_get("title")?,
        author_id: UserId::new(author_id),
        status,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ReviewStore for PostgresReviewStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

/// Transaction over a [`PostgresReviewStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    fn queries(&mut self) -> &mut dyn Queries {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(classify)
    }
}

#[async_trait]
impl Queries for PostgresTx {
    async fn create_team(&mut self, name: &str) -> Result<Team, StoreError> {
        let row = sqlx::query("INSERT INTO teams (id, name) VALUES ($1, $2) RETURNING id, name")
            .bind(TeamId::generate().as_uuid())
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(classify)?;
        parse_team_row(&row)
    }

    async fn get_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM teams WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(parse_team_row).transpose()
    }

    async fn get_team_by_name(&mut self, name: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM teams WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(parse_team_row).transpose()
    }

    async fn get_users_by_team(&mut self, team_id: TeamId) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, team_id, is_active FROM users WHERE team_id = $1 ORDER BY id",
        )
        .bind(team_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.iter().map(parse_user_row).collect()
    }

    async fn upsert_user(&mut self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, name, team_id, is_active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name,
                   team_id = EXCLUDED.team_id,
                   is_active = EXCLUDED.is_active
            RETURNING id, name, team_id, is_active
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(user.team_id.as_uuid())
        .bind(user.active)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;
        parse_user_row(&row)
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, team_id, is_active FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(parse_user_row).transpose()
    }

    async fn set_user_active(&mut self, id: UserId, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_pull_request_with_id(
        &mut self,
        id: PullRequestId,
        title: &str,
        author_id: UserId,
    ) -> Result<PullRequest, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO pull_requests (id, title, author_id, status) \
             VALUES ($1, $2, $3, 'OPEN') RETURNING {PR_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(title)
        .bind(author_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;
        parse_pr_row(&row)
    }

    async fn get_pull_request(&mut self, id: PullRequestId) -> Result<Option<PullRequest>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PR_COLUMNS} FROM pull_requests WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(classify)?;
        row.as_ref().map(parse_pr_row).transpose()
    }

    async fn get_pull_request_for_update(
        &mut self,
        id: PullRequestId,
    ) -> Result<Option<PullRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PR_COLUMNS} FROM pull_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;
        row.as_ref().map(parse_pr_row).transpose()
    }

    async fn update_pull_request_status(
        &mut self,
        id: PullRequestId,
        status: PrStatus,
    ) -> Result<Option<PullRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE pull_requests SET status = $2, updated_at = now() \
             WHERE id = $1 AND status <> $2 RETURNING {PR_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        match row {
            Some(ref r) => Ok(Some(parse_pr_row(r)?)),
            // Already in the target status, or missing.
            None => self.get_pull_request(id).await,
        }
    }

    async fn get_open_pull_requests_for_reviewer(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<PullRequest>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.title, p.author_id, p.status, p.created_at, p.updated_at
            FROM pull_requests p
            JOIN pr_reviewers r ON r.pr_id = p.id
            WHERE r.user_id = $1 AND p.status = 'OPEN'
            ORDER BY p.created_at, p.id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.iter().map(parse_pr_row).collect()
    }

    async fn add_reviewer_to_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO pr_reviewers (pr_id, user_id) VALUES ($1, $2)")
            .bind(pr_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn remove_reviewer_from_pr(&mut self, pr_id: PullRequestId, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pr_reviewers WHERE pr_id = $1 AND user_id = $2")
            .bind(pr_id.as_uuid())
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_reviewers_for_pr(&mut self, pr_id: PullRequestId) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.team_id, u.is_active
            FROM pr_reviewers r
            JOIN users u ON u.id = r.user_id
            WHERE r.pr_id = $1
            ORDER BY r.position
            "#,
        )
        .bind(pr_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.iter().map(parse_user_row).collect()
    }

    async fn get_candidates_for_initial_review(&mut self, author_id: UserId) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT u.id, u.name, u.team_id, u.is_active, {OPEN_LOAD}
            FROM users u
            JOIN users a ON a.id = $1 AND a.team_id = u.team_id
            WHERE u.is_active AND u.id <> $1
            ORDER BY open_load, u.id
            "#
        ))
        .bind(author_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.iter().map(parse_user_row).collect()
    }

    async fn get_candidates_for_reassignment(
        &mut self,
        old_reviewer_id: UserId,
        pr_id: PullRequestId,
    ) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT u.id, u.name, u.team_id, u.is_active, {OPEN_LOAD}
            FROM pull_requests pr
            JOIN users a ON a.id = pr.author_id
            JOIN users u ON u.team_id = a.team_id
            WHERE pr.id = $2
              AND u.is_active
              AND u.id <> $1
              AND u.id <> pr.author_id
              AND NOT EXISTS (
                  SELECT 1 FROM pr_reviewers x WHERE x.pr_id = pr.id AND x.user_id = u.id
              )
            ORDER BY open_load, u.id
            "#
        ))
        .bind(old_reviewer_id.as_uuid())
        .bind(pr_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;
        rows.iter().map(parse_user_row).collect()
    }

    async fn get_assignment_counts_by_user(&mut self) -> Result<Vec<UserAssignmentCount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, COUNT(r.pr_id) AS assignments
            FROM users u
            LEFT JOIN pr_reviewers r ON r.user_id = u.id
            GROUP BY u.id, u.name
            ORDER BY u.id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;

        rows.iter()
            .map(|row| -> Result<UserAssignmentCount, StoreError> {
                let id: Uuid = row.try_get("id")?;
                Ok(UserAssignmentCount {
                    user_id: UserId::new(id),
                    username: row.try_get("name")?,
                    assignments: row.try_get("assignments")?,
                })
            })
            .collect()
    }

    async fn get_assignment_counts_by_pr(&mut self) -> Result<Vec<PrAssignmentCount>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.title, COUNT(r.user_id) AS reviewers
            FROM pull_requests p
            LEFT JOIN pr_reviewers r ON r.pr_id = p.id
            GROUP BY p.id, p.title
            ORDER BY p.id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(classify)?;

        rows.iter()
            .map(|row| -> Result<PrAssignmentCount, StoreError> {
                let id: Uuid = row.try_get("id")?;
                Ok(PrAssignmentCount {
                    pull_request_id: PullRequestId::new(id),
                    title: row.try_get("title")?,
                    reviewers: row.try_get("reviewers")?,
                })
            })
            .collect()
    }
}
