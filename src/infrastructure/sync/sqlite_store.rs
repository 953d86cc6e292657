use crate::application::ports::local_store::LocalStore;
use crate::application::ports::mutation_queue::MutationQueue;
use crate::application::ports::remote_gateway::RemoteEntity;
use crate::domain::entities::{EntityRecord, EntityWrite, MutationRecord};
use crate::domain::value_objects::{EntityKind, LocalId, MutationOperation};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use super::rows::{entity_record_from_row, mutation_record_from_row, EntityRow, MutationRow};

/// sqlx/SQLite 実装。エンティティテーブルと mutation_queue を
/// 同一プール上で扱い、書き込みとキュー投入を単一トランザクションに載せる。
pub struct SqliteLocalStore {
    pool: Pool<Sqlite>,
    max_attempts: u32,
}

impl SqliteLocalStore {
    pub fn new(pool: Pool<Sqlite>, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }

    async fn get_mutation(&self, id: i64) -> Result<MutationRecord, AppError> {
        let row = sqlx::query_as::<_, MutationRow>("SELECT * FROM mutation_queue WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        mutation_record_from_row(row)
    }

    /// 既存 pending をどの操作で上書きするか。
    /// リモート未到達の create はどこまでも create のまま、
    /// pending delete の後の create は復元なので update になる。
    fn superseded_operation(
        existing: MutationOperation,
        incoming: MutationOperation,
    ) -> MutationOperation {
        match (existing, incoming) {
            (MutationOperation::Create, _) => MutationOperation::Create,
            (MutationOperation::Delete, MutationOperation::Create) => MutationOperation::Update,
            (_, incoming) => incoming,
        }
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn commit_write(&self, write: EntityWrite) -> Result<Option<MutationRecord>, AppError> {
        let table = write.kind.table();
        let now_ms = Utc::now().timestamp_millis();
        let payload_json = serde_json::to_string(write.payload.as_json())?;

        let mut tx = self.pool.begin().await?;

        // 楽観的ローカルコミット
        match write.operation {
            MutationOperation::Create | MutationOperation::Update => {
                let sql = format!(
                    r#"
                    INSERT INTO {table} (local_id, remote_id, payload, updated_at, synced_at, is_deleted)
                    VALUES (?1, NULL, ?2, ?3, NULL, 0)
                    ON CONFLICT(local_id) DO UPDATE SET
                        payload = excluded.payload,
                        updated_at = excluded.updated_at,
                        is_deleted = 0
                    "#
                );
                sqlx::query(&sql)
                    .bind(write.local_id.as_str())
                    .bind(&payload_json)
                    .bind(now_ms)
                    .execute(&mut *tx)
                    .await?;
            }
            MutationOperation::Delete => {
                let sql =
                    format!("UPDATE {table} SET is_deleted = 1, updated_at = ?2 WHERE local_id = ?1");
                sqlx::query(&sql)
                    .bind(write.local_id.as_str())
                    .bind(now_ms)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        // 同期キュー投入。pending だけでなく failed も新しい書き込みに
        // 吸収させる。さもないとキーごとの FIFO が壊れ、手動リトライで
        // 古いスナップショットが新しい書き込みの後に届いてしまう。
        let existing = sqlx::query_as::<_, MutationRow>(
            r#"
            SELECT * FROM mutation_queue
            WHERE entity_kind = ?1 AND entity_id = ?2 AND status IN ('pending', 'failed')
            ORDER BY enqueued_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(write.kind.as_str())
        .bind(write.local_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let record_id = match existing {
            Some(row) => {
                let existing_op =
                    MutationOperation::parse(&row.operation).map_err(AppError::ValidationError)?;

                if existing_op == MutationOperation::Create
                    && write.operation == MutationOperation::Delete
                {
                    // リモートは一度もこのエンティティを見ていないので no-op に畳む
                    sqlx::query("DELETE FROM mutation_queue WHERE id = ?1")
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await?;
                    let sql = format!("DELETE FROM {table} WHERE local_id = ?1");
                    sqlx::query(&sql)
                        .bind(write.local_id.as_str())
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                    return Ok(None);
                }

                let operation = Self::superseded_operation(existing_op, write.operation);
                // 新しい意図なので failed からでも pending へ戻し、試行回数も白紙にする
                sqlx::query(
                    r#"
                    UPDATE mutation_queue
                    SET operation = ?2, payload = ?3, status = 'pending', attempts = 0,
                        updated_at = ?4, last_error = NULL
                    WHERE id = ?1
                    "#,
                )
                .bind(row.id)
                .bind(operation.as_str())
                .bind(&payload_json)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
                row.id
            }
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO mutation_queue (
                        entity_kind, entity_id, operation, payload,
                        status, attempts, max_attempts, enqueued_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?6)
                    "#,
                )
                .bind(write.kind.as_str())
                .bind(write.local_id.as_str())
                .bind(write.operation.as_str())
                .bind(&payload_json)
                .bind(i64::from(self.max_attempts))
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
                result.last_insert_rowid()
            }
        };

        tx.commit().await?;

        self.get_mutation(record_id).await.map(Some)
    }

    async fn get_entity(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
    ) -> Result<Option<EntityRecord>, AppError> {
        let sql = format!(
            "SELECT * FROM {} WHERE local_id = ?1 AND is_deleted = 0",
            kind.table()
        );
        let row = sqlx::query_as::<_, EntityRow>(&sql)
            .bind(local_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| entity_record_from_row(kind, row)).transpose()
    }

    async fn list_entities(&self, kind: EntityKind) -> Result<Vec<EntityRecord>, AppError> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_deleted = 0 ORDER BY updated_at DESC",
            kind.table()
        );
        let rows = sqlx::query_as::<_, EntityRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| entity_record_from_row(kind, row))
            .collect()
    }

    async fn mark_synced(
        &self,
        kind: EntityKind,
        local_id: &LocalId,
        remote_id: Option<&str>,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let sql = format!(
            r#"
            UPDATE {} SET synced_at = ?2, remote_id = COALESCE(?3, remote_id)
            WHERE local_id = ?1
            "#,
            kind.table()
        );
        sqlx::query(&sql)
            .bind(local_id.as_str())
            .bind(synced_at.timestamp_millis())
            .bind(remote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_remote_batch(
        &self,
        kind: EntityKind,
        entities: Vec<RemoteEntity>,
    ) -> Result<u32, AppError> {
        let table = kind.table();
        let mut tx = self.pool.begin().await?;
        let mut applied = 0u32;

        for entity in entities {
            // remote_id / local_id の突き合わせ
            let local_id: Option<String> = match &entity.local_id {
                Some(id) => Some(id.clone()),
                None => {
                    let sql = format!("SELECT local_id FROM {table} WHERE remote_id = ?1");
                    sqlx::query_scalar(&sql)
                        .bind(&entity.remote_id)
                        .fetch_optional(&mut *tx)
                        .await?
                }
            };

            // 未送信のローカル意図があるキーには触れない
            // （pending delete の復活も pending update の上書きも防ぐ）
            if let Some(ref lid) = local_id {
                let blocked: Option<i64> = sqlx::query_scalar(
                    r#"
                    SELECT id FROM mutation_queue
                    WHERE entity_kind = ?1 AND entity_id = ?2
                      AND status IN ('pending', 'in_flight', 'failed')
                    LIMIT 1
                    "#,
                )
                .bind(kind.as_str())
                .bind(lid)
                .fetch_optional(&mut *tx)
                .await?;
                if blocked.is_some() {
                    continue;
                }
            }

            let updated_ms = entity.updated_at.timestamp_millis();

            if entity.deleted {
                if let Some(lid) = local_id {
                    let sql = format!(
                        "UPDATE {table} SET is_deleted = 1, updated_at = ?2, synced_at = ?2 WHERE local_id = ?1"
                    );
                    sqlx::query(&sql)
                        .bind(&lid)
                        .bind(updated_ms)
                        .execute(&mut *tx)
                        .await?;
                    applied += 1;
                }
                continue;
            }

            let lid = local_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let payload_json = serde_json::to_string(&entity.payload)?;
            let sql = format!(
                r#"
                INSERT INTO {table} (local_id, remote_id, payload, updated_at, synced_at, is_deleted)
                VALUES (?1, ?2, ?3, ?4, ?4, 0)
                ON CONFLICT(local_id) DO UPDATE SET
                    remote_id = excluded.remote_id,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at,
                    synced_at = excluded.synced_at,
                    is_deleted = 0
                "#
            );
            sqlx::query(&sql)
                .bind(&lid)
                .bind(&entity.remote_id)
                .bind(&payload_json)
                .bind(updated_ms)
                .execute(&mut *tx)
                .await?;
            applied += 1;
        }

        tx.commit().await?;
        Ok(applied)
    }

    async fn pull_cursor(&self, kind: EntityKind) -> Result<Option<DateTime<Utc>>, AppError> {
        let cursor: Option<i64> =
            sqlx::query_scalar("SELECT last_pulled_at FROM sync_cursors WHERE entity_kind = ?1")
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor.map(super::rows::datetime_from_millis))
    }

    async fn store_pull_cursor(
        &self,
        kind: EntityKind,
        pulled_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // ウォーターマークは前進のみ
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (entity_kind, last_pulled_at)
            VALUES (?1, ?2)
            ON CONFLICT(entity_kind) DO UPDATE SET
                last_pulled_at = MAX(last_pulled_at, excluded.last_pulled_at)
            "#,
        )
        .bind(kind.as_str())
        .bind(pulled_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MutationQueue for SqliteLocalStore {
    async fn dequeue_next_batch(
        &self,
        kind: EntityKind,
        max: u32,
    ) -> Result<Vec<MutationRecord>, AppError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, MutationRow>(
            r#"
            SELECT * FROM mutation_queue q
            WHERE q.entity_kind = ?1 AND q.status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM mutation_queue f
                  WHERE f.entity_kind = q.entity_kind
                    AND f.entity_id = q.entity_id
                    AND f.status IN ('in_flight', 'failed')
              )
            ORDER BY q.enqueued_at ASC, q.id ASC
            LIMIT ?2
            "#,
        )
        .bind(kind.as_str())
        .bind(i64::from(max))
        .fetch_all(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query("UPDATE mutation_queue SET status = 'in_flight', updated_at = ?2 WHERE id = ?1")
                .bind(row.id)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        rows.into_iter()
            .map(|mut row| {
                row.status = "in_flight".to_string();
                row.updated_at = now_ms;
                mutation_record_from_row(row)
            })
            .collect()
    }

    async fn mark_applied(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE mutation_queue SET status = 'applied', updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        permanent: bool,
    ) -> Result<MutationRecord, AppError> {
        let record = self.get_mutation(id).await?;
        let attempts = record.attempts + 1;
        let status = if permanent || attempts >= record.max_attempts {
            "failed"
        } else {
            "pending"
        };

        sqlx::query(
            r#"
            UPDATE mutation_queue
            SET status = ?2, attempts = ?3, last_error = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(i64::from(attempts))
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.get_mutation(id).await
    }

    async fn release_in_flight(&self, id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE mutation_queue SET status = 'pending', updated_at = ?2
            WHERE id = ?1 AND status = 'in_flight'
            "#,
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry_failed(
        &self,
        kind: EntityKind,
        entity_id: &LocalId,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE mutation_queue
            SET status = 'pending', attempts = 0, updated_at = ?3
            WHERE entity_kind = ?1 AND entity_id = ?2 AND status = 'failed'
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_applied(&self, before: DateTime<Utc>) -> Result<u32, AppError> {
        let result = sqlx::query(
            "DELETE FROM mutation_queue WHERE status = 'applied' AND updated_at < ?1",
        )
        .bind(before.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as u32)
    }

    async fn count_pending(&self) -> Result<u32, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mutation_queue WHERE status IN ('pending', 'in_flight')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn count_failed(&self) -> Result<u32, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM mutation_queue WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    async fn has_pending_for(
        &self,
        kind: EntityKind,
        entity_id: &LocalId,
    ) -> Result<bool, AppError> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM mutation_queue
            WHERE entity_kind = ?1 AND entity_id = ?2
              AND status IN ('pending', 'in_flight', 'failed')
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}
