//! PostgreSQL + pgvector backend
//!
//! Chunks live in a single table with the tenant columns indexed; the
//! tenant predicate is part of every query's WHERE clause.

use super::{ChunkMetadata, ChunkRecord, TenantFilter, VectorIndex, VectorMatch};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub struct PgVectorIndex {
    pool: PgPool,
    table: String,
    dimension: usize,
}

fn index_error(e: sqlx::Error) -> AppError {
    AppError::VectorIndexError {
        message: e.to_string(),
    }
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PgVectorIndex {
    pub async fn connect(database_url: &str, table: &str, dimension: usize) -> Result<Self> {
        if !valid_table_name(table) {
            return Err(AppError::Configuration {
                message: format!("Invalid vector table name '{}'", table),
            });
        }

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("pgvector pool: {}", e),
            })?;

        Ok(Self {
            pool,
            table: table.to_string(),
            dimension,
        })
    }

    /// Create the extension, table and tenant index if missing
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(index_error)?;

        let create = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                document_id UUID NOT NULL,
                user_id UUID NOT NULL,
                course_id UUID NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding vector({dim}) NOT NULL
            )
            "#,
            table = self.table,
            dim = self.dimension
        );
        sqlx::query(&create)
            .execute(&self.pool)
            .await
            .map_err(index_error)?;

        let tenant_index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_tenant_idx ON {table} (user_id, course_id)",
            table = self.table
        );
        sqlx::query(&tenant_index)
            .execute(&self.pool)
            .await
            .map_err(index_error)?;

        info!(table = %self.table, dimension = self.dimension, "pgvector table ready");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, document_id, user_id, course_id, chunk_index, content, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding
            "#,
            self.table
        );

        let mut tx = self.pool.begin().await.map_err(index_error)?;
        for record in records {
            sqlx::query(&sql)
                .bind(&record.id)
                .bind(record.metadata.document_id)
                .bind(record.metadata.user_id)
                .bind(record.metadata.course_id)
                .bind(record.metadata.chunk_index as i32)
                .bind(&record.metadata.text)
                .bind(Vector::from(record.values.clone()))
                .execute(&mut *tx)
                .await
                .map_err(index_error)?;
        }
        tx.commit().await.map_err(index_error)?;

        Ok(records.len())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &TenantFilter,
    ) -> Result<Vec<VectorMatch>> {
        let sql = format!(
            r#"
            SELECT id, document_id, user_id, course_id, chunk_index, content,
                   (1 - (embedding <=> $1))::float8 AS score
            FROM {}
            WHERE user_id = $2 AND course_id = $3
            ORDER BY embedding <=> $1
            LIMIT $4
            "#,
            self.table
        );

        let rows = sqlx::query(&sql)
            .bind(Vector::from(vector.to_vec()))
            .bind(filter.user_id)
            .bind(filter.course_id)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(index_error)?;

        rows.into_iter()
            .map(|row| {
                let chunk_index: i32 = row.try_get("chunk_index").map_err(index_error)?;
                let score: f64 = row.try_get("score").map_err(index_error)?;
                Ok(VectorMatch {
                    id: row.try_get("id").map_err(index_error)?,
                    score: score as f32,
                    metadata: ChunkMetadata {
                        document_id: row.try_get("document_id").map_err(index_error)?,
                        user_id: row.try_get("user_id").map_err(index_error)?,
                        course_id: row.try_get("course_id").map_err(index_error)?,
                        chunk_index: chunk_index.max(0) as u32,
                        text: row.try_get("content").map_err(index_error)?,
                    },
                })
            })
            .collect()
    }

    async fn delete_document(&self, document_id: Uuid, filter: &TenantFilter) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE document_id = $1 AND user_id = $2 AND course_id = $3",
            self.table
        );
        sqlx::query(&sql)
            .bind(document_id)
            .bind(filter.user_id)
            .bind(filter.course_id)
            .execute(&self.pool)
            .await
            .map_err(index_error)?;
        Ok(())
    }

    fn provider(&self) -> &str {
        "pgvector"
    }
}
