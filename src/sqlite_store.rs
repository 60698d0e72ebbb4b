//! SQLite-backed [`DocumentStore`] implementation.
//!
//! The store owns its connection pool. Callers open it with
//! [`SqliteStore::connect`], create the schema with
//! [`SqliteStore::migrate`] and release it with [`SqliteStore::close`];
//! nothing here is process-global.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use filing_intel_core::models::{
    Document, Insight, InsightFilter, NewDocument, Segment, StoredInsight, StoredSegment,
};
use filing_intel_core::store::DocumentStore;

use crate::config::DbConfig;
use crate::{db, migrate};

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self> {
        Ok(Self::new(db::connect(config).await?))
    }

    pub async fn migrate(&self) -> Result<()> {
        migrate::run_migrations(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn document_exists(&self, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn row_to_document(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        company: row.get("company"),
        doc_type: row.get("doc_type"),
        filing_date: row.get("filing_date"),
        source: row.get("source"),
        content_hash: row.get("content_hash"),
        ingestion_timestamp: row.get("ingestion_timestamp"),
        processed: row.get::<i64, _>("processed") != 0,
    }
}

fn row_to_insight(row: &SqliteRow) -> StoredInsight {
    let pages: String = row.get("page_numbers");
    StoredInsight {
        id: row.get("id"),
        insight: Insight {
            metric_name: row.get("metric_name"),
            value: row.get("value"),
            timestamp: row.get("timestamp"),
            company: row.get("company"),
            document_id: row.get("document_id"),
            model_version: row.get("model_version"),
            original_text: row.get("original_text"),
            page_numbers: serde_json::from_str(&pages).unwrap_or_default(),
        },
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn save_document(&self, doc: &NewDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO documents (id, company, doc_type, filing_date, source,
                                   content_hash, ingestion_timestamp, processed)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&doc.company)
        .bind(&doc.doc_type)
        .bind(&doc.filing_date)
        .bind(&doc.source)
        .bind(&doc.content_hash)
        .bind(doc.ingestion_timestamp)
        .bind(doc.processed as i64)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY ingestion_timestamp, rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn mark_processed(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET processed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("document not found: {}", id);
        }
        Ok(())
    }

    async fn save_segments(&self, segments: &[Segment], document_id: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            bail!("document not found: {}", document_id);
        }

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM segments WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut ids = Vec::with_capacity(segments.len());
        for (offset, seg) in segments.iter().enumerate() {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO segments (id, document_id, position, section_type, text,
                                      start_page, end_page)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(document_id)
            .bind(next + offset as i64)
            .bind(&seg.section_type)
            .bind(&seg.text)
            .bind(seg.start_page as i64)
            .bind(seg.end_page as i64)
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn get_document_segments(&self, document_id: &str) -> Result<Vec<StoredSegment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, section_type, text, start_page, end_page
            FROM segments
            WHERE document_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredSegment {
                id: row.get("id"),
                document_id: row.get("document_id"),
                section_type: row.get("section_type"),
                text: row.get("text"),
                start_page: row.get::<i64, _>("start_page") as u32,
                end_page: row.get::<i64, _>("end_page") as u32,
            })
            .collect())
    }

    async fn save_insight(&self, insight: &Insight) -> Result<String> {
        if !self.document_exists(&insight.document_id).await? {
            bail!("document not found: {}", insight.document_id);
        }
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO insights (id, document_id, metric_name, value, timestamp, company,
                                  model_version, original_text, page_numbers)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&insight.document_id)
        .bind(&insight.metric_name)
        .bind(&insight.value)
        .bind(&insight.timestamp)
        .bind(&insight.company)
        .bind(&insight.model_version)
        .bind(&insight.original_text)
        .bind(serde_json::to_string(&insight.page_numbers)?)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn query_insights(&self, filter: &InsightFilter) -> Result<Vec<StoredInsight>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM insights WHERE 1 = 1");
        if let Some(metric) = &filter.metric_name {
            qb.push(" AND metric_name = ").push_bind(metric.clone());
        }
        if let Some(date) = &filter.date {
            qb.push(" AND timestamp LIKE ").push_bind(format!("{}%", date));
        }
        if let Some(company) = &filter.company {
            qb.push(" AND company = ").push_bind(company.clone());
        }
        if let Some(doc_id) = &filter.document_id {
            qb.push(" AND document_id = ").push_bind(doc_id.clone());
        }
        qb.push(" ORDER BY rowid ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_insight).collect())
    }
}
