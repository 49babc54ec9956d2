use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;

use sqlsync_core::config::ConnectionConfig;
use sqlsync_core::error::{Result, SyncError};
use sqlsync_core::migration::ConnectionId;

/// Connection pool for one configured target.
#[derive(Clone)]
pub struct Database {
    id: ConnectionId,
    pool: PgPool,
}

impl Database {
    /// Connect using the connection's configuration.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        // One connection holds the migration lock while another runs the migrations.
        let size = config.pool_size.max(2);

        let pool = PgPoolOptions::new()
            .max_connections(size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                SyncError::Database(format!("Failed to connect to {}: {}", config.id, e))
            })?;

        Ok(Self {
            id: config.id.clone(),
            pool,
        })
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Take a dedicated connection out of the pool.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(|e| {
            SyncError::Database(format!("Failed to acquire connection to {}: {}", self.id, e))
        })
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_failure_names_connection() {
        let mut config = ConnectionConfig::new("broken", "postgres://127.0.0.1:1/none");
        config.connect_timeout_secs = 1;

        let err = match Database::connect(&config).await {
            Ok(_) => panic!("connecting to a closed port should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, SyncError::Database(_)));
        assert!(err.to_string().contains("broken"));
    }
}
