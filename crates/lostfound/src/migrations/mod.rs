//! Database migrations for the record store

/// Migration SQL for record tables
pub const MIGRATION_SQL: &str = r#"
-- item_records: 失物记录 (kind 1 = 丢失, 2 = 捡到)
CREATE TABLE IF NOT EXISTS item_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    reporter TEXT NOT NULL,
    complete_user TEXT,
    tags TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL,
    description TEXT NOT NULL,
    img_name TEXT,
    status TEXT NOT NULL DEFAULT '未完成',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_records_kind ON item_records(kind);
CREATE INDEX IF NOT EXISTS idx_records_status ON item_records(kind, status);

-- tags: 标签
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_name TEXT NOT NULL UNIQUE
);

-- tag_items: 标签与记录的关联, 丢失和捡到的记录分开
CREATE TABLE IF NOT EXISTS tag_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    item_id INTEGER NOT NULL REFERENCES item_records(id) ON DELETE CASCADE,
    kind INTEGER NOT NULL,
    UNIQUE(tag_id, item_id)
);
CREATE INDEX IF NOT EXISTS idx_tag_items_tag ON tag_items(tag_id, kind);
CREATE INDEX IF NOT EXISTS idx_tag_items_item ON tag_items(item_id)
"#;

/// Run all migrations. Every statement is idempotent.
pub async fn run_migration(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    for statement in MIGRATION_SQL.split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement).execute(pool).await?;
        }
    }
    Ok(())
}
