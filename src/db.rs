use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Tables this service reads from or writes to.
const REQUIRED_TABLES: [&str; 2] = ["reservations", "ai_follow_ups"];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        for table in REQUIRED_TABLES {
            let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(table)
                .fetch_one(&pool)
                .await?;
            if !exists {
                tracing::warn!("Table '{}' not found; related operations will fail", table);
            }
        }

        Ok(Self { pool })
    }
}
