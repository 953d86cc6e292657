use crate::domain::value_objects::EntityKind;
use crate::shared::error::AppError;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub struct Database;

impl Database {
    pub async fn initialize(url: &str, max_connections: u32) -> Result<SqlitePool, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Self::create_schema(&pool).await?;
        Self::recover_interrupted(&pool).await?;
        Ok(pool)
    }

    /// 単一コネクションのインメモリ DB。テストおよび AppContext の
    /// エフェメラル構成で使用する。
    pub async fn in_memory() -> Result<SqlitePool, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::create_schema(&pool).await?;
        Ok(pool)
    }

    /// クラッシュや途中シャットダウンで in_flight / uploading のまま残った
    /// レコードを pending へ戻す。リモートは localId で冪等なので再送は安全。
    pub async fn recover_interrupted(pool: &SqlitePool) -> Result<(), AppError> {
        let released =
            sqlx::query("UPDATE mutation_queue SET status = 'pending' WHERE status = 'in_flight'")
                .execute(pool)
                .await?
                .rows_affected();
        let reset = sqlx::query(
            "UPDATE attachments SET sync_status = 'pending' WHERE sync_status = 'uploading'",
        )
        .execute(pool)
        .await?
        .rows_affected();
        if released > 0 || reset > 0 {
            tracing::info!(released, reset, "recovered interrupted sync records");
        }
        Ok(())
    }

    async fn create_schema(pool: &SqlitePool) -> Result<(), AppError> {
        // ドメインエンティティは種別ごとに同一スキーマのテーブルを持つ
        for kind in EntityKind::all() {
            let table = kind.table();
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    local_id TEXT PRIMARY KEY,
                    remote_id TEXT,
                    payload TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    synced_at INTEGER,
                    is_deleted INTEGER NOT NULL DEFAULT 0
                )
                "#
            );
            sqlx::query(&ddl).execute(pool).await?;

            let idx = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_remote_id ON {table} (remote_id)"
            );
            sqlx::query(&idx).execute(pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mutation_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_kind TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 5,
                enqueued_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_error TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_mutation_queue_key
            ON mutation_queue (entity_kind, entity_id, status)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                data BLOB NOT NULL,
                remote_id TEXT,
                remote_path TEXT,
                sync_status TEXT NOT NULL DEFAULT 'pending',
                upload_attempts INTEGER NOT NULL DEFAULT 0,
                last_upload_error TEXT,
                delete_requested INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_attachments_owner
            ON attachments (owner_id, sync_status)
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                entity_kind TEXT PRIMARY KEY,
                last_pulled_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}
