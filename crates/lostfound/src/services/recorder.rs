//! Record service - durable storage of finalized reports and their tags

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{LostFoundError, LostFoundResult};
use crate::models::{
    ItemRecord, RecordFilter, RecordId, RecordQuery, RecordStatus, Report, ReportKind,
};
use crate::services::DbPool;

/// Durable append and lookup of reports
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Store a finalized report with its tags
    async fn add_record(&self, report: &Report) -> LostFoundResult<RecordId>;

    /// Records matching a browse query, oldest first
    async fn find_records(&self, query: &RecordQuery) -> LostFoundResult<Vec<ItemRecord>>;

    /// Tag vocabulary of one kind of record, sorted
    async fn list_tags(&self, kind: ReportKind) -> LostFoundResult<Vec<String>>;
}

/// Database row struct for item records
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: i64,
    kind: i64,
    item_name: String,
    reporter: String,
    complete_user: Option<String>,
    tags: String,
    city: String,
    description: String,
    img_name: Option<String>,
    status: String,
    created_at: String,
}

impl TryFrom<RecordRow> for ItemRecord {
    type Error = LostFoundError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let kind = ReportKind::from_i64(row.kind).ok_or_else(|| {
            LostFoundError::Database(format!("record {} has unknown kind {}", row.id, row.kind))
        })?;
        let status = row
            .status
            .parse::<RecordStatus>()
            .map_err(LostFoundError::Database)?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LostFoundError::Database(format!("bad created_at: {}", e)))?;

        Ok(ItemRecord {
            id: row.id,
            kind,
            item_name: row.item_name,
            reporter: row.reporter,
            complete_user: row.complete_user.filter(|s| !s.is_empty()),
            tags: row
                .tags
                .split(',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            city: row.city,
            description: row.description,
            img_name: row.img_name.filter(|s| !s.is_empty()),
            status,
            created_at,
        })
    }
}

const RECORD_COLUMNS: &str = "id, kind, item_name, reporter, complete_user, tags, city, \
    description, img_name, status, created_at";

/// SQLite-backed recorder
pub struct SqliteRecorder {
    pool: DbPool,
}

impl SqliteRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Recorder for SqliteRecorder {
    async fn add_record(&self, report: &Report) -> LostFoundResult<RecordId> {
        let kind = report.kind.as_i64();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO item_records (kind, item_name, reporter, tags, city, description, img_name, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind)
        .bind(&report.item_name)
        .bind(&report.reporter_id)
        .bind(report.tags.join(","))
        .bind(&report.city)
        .bind(&report.description)
        .bind(&report.image_name)
        .bind(report.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        let record_id = result.last_insert_rowid();

        for tag in &report.tags {
            sqlx::query("INSERT INTO tags (tag_name) VALUES (?) ON CONFLICT(tag_name) DO NOTHING")
                .bind(tag)
                .execute(&mut *tx)
                .await?;
            let (tag_id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE tag_name = ?")
                .bind(tag)
                .fetch_one(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO tag_items (tag_id, item_id, kind) VALUES (?, ?, ?)",
            )
            .bind(tag_id)
            .bind(record_id)
            .bind(kind)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(record_id, tags = report.tags.len(), "Record stored");
        Ok(record_id)
    }

    async fn find_records(&self, query: &RecordQuery) -> LostFoundResult<Vec<ItemRecord>> {
        let kind = query.kind.as_i64();
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM item_records WHERE kind = ",
            RECORD_COLUMNS
        ));
        builder.push_bind(kind);

        match &query.filter {
            RecordFilter::All => {}
            RecordFilter::Status(status) => {
                builder.push(" AND status = ").push_bind(status.as_str());
            }
            RecordFilter::Tags(tags) => {
                let wanted: BTreeSet<&str> = tags
                    .iter()
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .collect();
                if wanted.is_empty() {
                    return Ok(Vec::new());
                }
                builder.push(
                    " AND id IN (SELECT ti.item_id FROM tag_items ti JOIN tags t ON t.id = ti.tag_id WHERE ti.kind = ",
                );
                builder.push_bind(kind);
                builder.push(" AND t.tag_name IN (");
                let mut separated = builder.separated(", ");
                for tag in &wanted {
                    separated.push_bind(tag.to_string());
                }
                separated.push_unseparated(") GROUP BY ti.item_id HAVING COUNT(DISTINCT t.tag_name) = ");
                builder.push_bind(wanted.len() as i64);
                builder.push(")");
            }
        }
        builder.push(" ORDER BY id");

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(self.pool.as_ref()).await?;
        rows.into_iter().map(ItemRecord::try_from).collect()
    }

    async fn list_tags(&self, kind: ReportKind) -> LostFoundResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT t.tag_name
            FROM tags t
            JOIN tag_items ti ON ti.tag_id = t.id
            WHERE ti.kind = ?
            ORDER BY t.tag_name
            "#,
        )
        .bind(kind.as_i64())
        .fetch_all(self.pool.as_ref())
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}
