//! # mixcat-db
//!
//! PostgreSQL database layer for mixcat.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for staging, catalog, rules, and jobs
//! - The atomic job-lease primitive (`FOR UPDATE SKIP LOCKED`)
//! - Embedded schema migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use mixcat_db::Database;
//! use mixcat_core::{JobRepository, WorkerType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/mixcat").await?;
//!     db.migrate().await?;
//!
//!     let job_id = db.jobs.queue(WorkerType::Canonicalize, None, None).await?;
//!     println!("Queued job: {}", job_id);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod jobs;
pub mod pool;
pub mod rules;
pub mod staging;

// Test fixtures for integration tests.
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use mixcat_core::*;

pub use catalog::PgCatalogRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use rules::PgRuleRepository;
pub use staging::PgStagingRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Bundle of the connection pool and all repository implementations.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Staged-record repository, written by fetch workers.
    pub staging: PgStagingRepository,
    /// Canonical catalog repository.
    pub catalog: PgCatalogRepository,
    /// Context rule store (read-only from this workspace).
    pub rules: PgRuleRepository,
    /// Job queue repository with the atomic lease primitive.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            staging: PgStagingRepository::new(pool.clone()),
            catalog: PgCatalogRepository::new(pool.clone()),
            rules: PgRuleRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::new(pool))
    }

    /// Apply any pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }
}
