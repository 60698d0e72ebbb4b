use anyhow::Result;
use sqlx::SqlitePool;

/// Create tables and indexes. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            company TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            filing_date TEXT NOT NULL,
            source TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            ingestion_timestamp INTEGER NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create segments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            section_type TEXT NOT NULL,
            text TEXT NOT NULL,
            start_page INTEGER NOT NULL DEFAULT 0,
            end_page INTEGER NOT NULL DEFAULT 0,
            UNIQUE(document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Insights keep a weak reference to their document: existence is
    // checked on insert but there is no FK.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS insights (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            metric_name TEXT NOT NULL,
            value TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            company TEXT NOT NULL,
            model_version TEXT NOT NULL,
            original_text TEXT NOT NULL,
            page_numbers TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_segments_document_id ON segments(document_id, position)",
        "CREATE INDEX IF NOT EXISTS idx_segments_section_type ON segments(section_type)",
        "CREATE INDEX IF NOT EXISTS idx_insights_metric_name ON insights(metric_name)",
        "CREATE INDEX IF NOT EXISTS idx_insights_company ON insights(company)",
        "CREATE INDEX IF NOT EXISTS idx_insights_timestamp ON insights(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_insights_document_id ON insights(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_documents_ingested ON documents(ingestion_timestamp)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
