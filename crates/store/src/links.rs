use anyhow::Result;

use babelink_common::types::{ChannelId, ChannelLink, ServerId, UserId};

/// Channel-link store. Links are written by the link-management commands and
/// read by the relay; each logical link is stored as two directed rows so
/// lookup by either channel is a single indexed query.
#[derive(Clone)]
pub struct LinkStore {
    pool: sqlx::SqlitePool,
}

impl LinkStore {
    #[must_use]
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a link between two channels. Any prior link touching either
    /// channel in this server is removed in the same transaction, keeping
    /// the "one link per channel" invariant.
    pub async fn link_pair(
        &self,
        server_id: ServerId,
        channel_a: ChannelId,
        lang_a: &str,
        channel_b: ChannelId,
        lang_b: &str,
        owner_id: UserId,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM links WHERE server_id = ? AND (channel_a IN (?, ?) OR channel_b IN (?, ?))",
        )
        .bind(server_id as i64)
        .bind(channel_a as i64)
        .bind(channel_b as i64)
        .bind(channel_a as i64)
        .bind(channel_b as i64)
        .execute(&mut *tx)
        .await?;
        for (ch_from, lang_from, ch_to, lang_to) in
            [(channel_a, lang_a, channel_b, lang_b), (channel_b, lang_b, channel_a, lang_a)]
        {
            sqlx::query(
                "INSERT OR REPLACE INTO links (server_id, channel_a, lang_a, channel_b, lang_b, owner_id)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(server_id as i64)
            .bind(ch_from as i64)
            .bind(lang_from)
            .bind(ch_to as i64)
            .bind(lang_to)
            .bind(owner_id as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Directed lookup: the link whose source side is `channel_id`.
    pub async fn get_link(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
    ) -> Result<Option<ChannelLink>> {
        let row = sqlx::query_as::<_, (String, i64, String)>(
            "SELECT lang_a, channel_b, lang_b FROM links WHERE server_id = ? AND channel_a = ?",
        )
        .bind(server_id as i64)
        .bind(channel_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(src_lang, target, tgt_lang)| ChannelLink {
            target_channel: target as ChannelId,
            src_lang,
            tgt_lang,
        }))
    }

    /// Remove the link between two specific channels (either direction).
    pub async fn unlink_pair(
        &self,
        server_id: ServerId,
        ch1: ChannelId,
        ch2: ChannelId,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM links WHERE server_id = ?
             AND ((channel_a = ? AND channel_b = ?) OR (channel_a = ? AND channel_b = ?))",
        )
        .bind(server_id as i64)
        .bind(ch1 as i64)
        .bind(ch2 as i64)
        .bind(ch2 as i64)
        .bind(ch1 as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove every link in a server.
    pub async fn unlink_all(&self, server_id: ServerId) -> Result<u64> {
        let res = sqlx::query("DELETE FROM links WHERE server_id = ?")
            .bind(server_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Remove any link that involves the channel on either side. Used when a
    /// channel is deleted out from under us.
    pub async fn unlink_any_for_channel(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
    ) -> Result<u64> {
        let res =
            sqlx::query("DELETE FROM links WHERE server_id = ? AND (channel_a = ? OR channel_b = ?)")
                .bind(server_id as i64)
                .bind(channel_id as i64)
                .bind(channel_id as i64)
                .execute(&self.pool)
                .await?;
        Ok(res.rows_affected())
    }

    /// Distinct logical links in a server (each pair reported once).
    pub async fn list_links(
        &self,
        server_id: ServerId,
    ) -> Result<Vec<(ChannelId, String, ChannelId, String)>> {
        let rows = sqlx::query_as::<_, (i64, String, i64, String)>(
            "SELECT channel_a, lang_a, channel_b, lang_b FROM links WHERE server_id = ?",
        )
        .bind(server_id as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (a, la, b, lb) in rows {
            let key = if a <= b { (a, b) } else { (b, a) };
            if seen.insert(key) {
                out.push((a as ChannelId, la, b as ChannelId, lb));
            }
        }
        Ok(out)
    }
}
