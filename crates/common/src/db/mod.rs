//! Database layer for Cognify
//!
//! Provides:
//! - SeaORM entity models (users, courses, documents)
//! - Repository pattern for data access
//! - Connection pool management and schema bootstrap

pub mod models;
mod repository;

pub use repository::{CourseWithDocuments, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::{CourseEntity, DocumentEntity, UserEntity};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// Private in-memory SQLite database with the schema applied.
    ///
    /// Uses a single pooled connection since every SQLite memory
    /// connection opens its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let pool = Self { conn };
        pool.ensure_schema().await?;
        Ok(pool)
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Create missing tables and indexes for all entities
    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut tables = vec![
            schema.create_table_from_entity(UserEntity),
            schema.create_table_from_entity(CourseEntity),
            schema.create_table_from_entity(DocumentEntity),
        ];
        for table in tables.iter_mut() {
            table.if_not_exists();
            self.conn.execute(backend.build(&*table)).await?;
        }

        let indexes = schema
            .create_index_from_entity(CourseEntity)
            .into_iter()
            .chain(schema.create_index_from_entity(DocumentEntity));
        for mut index in indexes {
            index.if_not_exists();
            self.conn.execute(backend.build(&index)).await?;
        }

        info!("Database schema ensured");
        Ok(())
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }
}
