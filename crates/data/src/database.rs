use crate::repositories::PgTestStore;
use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Connects to `PostgreSQL` and applies pending migrations.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or a migration fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(max_connections, "Connected to PostgreSQL and applied migrations");

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Store over this client's pool.
    #[must_use]
    pub fn test_store(&self) -> PgTestStore {
        PgTestStore::new(self.pool.clone())
    }

    /// Checks connectivity with a trivial query.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
