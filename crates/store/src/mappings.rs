use anyhow::Result;

use babelink_common::types::{DeliveryId, MessageId, ServerId, TranslationMapping};

#[derive(sqlx::FromRow)]
struct MappingRow {
    server_id: i64,
    src_msg_id: i64,
    src_channel_id: i64,
    tgt_msg_id: i64,
    tgt_channel_id: i64,
    delivery_id: i64,
    created_at: i64,
    last_edit_at: Option<i64>,
}

impl From<MappingRow> for TranslationMapping {
    fn from(r: MappingRow) -> Self {
        Self {
            server_id: r.server_id as ServerId,
            src_msg_id: r.src_msg_id as MessageId,
            src_channel_id: r.src_channel_id as _,
            tgt_msg_id: r.tgt_msg_id as MessageId,
            tgt_channel_id: r.tgt_channel_id as _,
            delivery_id: r.delivery_id as DeliveryId,
            created_at: r.created_at,
            last_edit_at: r.last_edit_at,
        }
    }
}

/// Source-message → delivered-translation mapping store. One row per source
/// message; rows age out via [`MappingStore::purge_older_than`].
#[derive(Clone)]
pub struct MappingStore {
    pool: sqlx::SqlitePool,
}

impl MappingStore {
    #[must_use]
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Record (or overwrite) the mapping for a source message.
    pub async fn record(&self, m: &TranslationMapping) -> Result<()> {
        sqlx::query(
            "INSERT INTO translation_mappings
                 (server_id, src_msg_id, src_channel_id, tgt_msg_id, tgt_channel_id, delivery_id, created_at, last_edit_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (server_id, src_msg_id) DO UPDATE SET
                 src_channel_id = excluded.src_channel_id,
                 tgt_msg_id     = excluded.tgt_msg_id,
                 tgt_channel_id = excluded.tgt_channel_id,
                 delivery_id    = excluded.delivery_id,
                 created_at     = excluded.created_at,
                 last_edit_at   = excluded.last_edit_at",
        )
        .bind(m.server_id as i64)
        .bind(m.src_msg_id as i64)
        .bind(m.src_channel_id as i64)
        .bind(m.tgt_msg_id as i64)
        .bind(m.tgt_channel_id as i64)
        .bind(m.delivery_id as i64)
        .bind(m.created_at)
        .bind(m.last_edit_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_src(
        &self,
        server_id: ServerId,
        src_msg_id: MessageId,
    ) -> Result<Option<TranslationMapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            "SELECT server_id, src_msg_id, src_channel_id, tgt_msg_id, tgt_channel_id,
                    delivery_id, created_at, last_edit_at
             FROM translation_mappings WHERE server_id = ? AND src_msg_id = ?",
        )
        .bind(server_id as i64)
        .bind(src_msg_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Stamp the time of the latest propagated edit.
    pub async fn touch_edit(
        &self,
        server_id: ServerId,
        src_msg_id: MessageId,
        at: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE translation_mappings SET last_edit_at = ? WHERE server_id = ? AND src_msg_id = ?",
        )
        .bind(at)
        .bind(server_id as i64)
        .bind(src_msg_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, server_id: ServerId, src_msg_id: MessageId) -> Result<()> {
        sqlx::query("DELETE FROM translation_mappings WHERE server_id = ? AND src_msg_id = ?")
            .bind(server_id as i64)
            .bind(src_msg_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop mappings created before `cutoff_ts`. Returns the number removed.
    pub async fn purge_older_than(&self, cutoff_ts: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM translation_mappings WHERE created_at < ?")
            .bind(cutoff_ts)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
