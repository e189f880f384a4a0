use anyhow::Result;

use babelink_common::types::{ChannelId, DeliveryCredential, DeliveryId, ServerId};

#[derive(sqlx::FromRow)]
struct CredentialRow {
    delivery_id: i64,
    server_id: i64,
    channel_id: i64,
    secret_token: String,
    created_at: i64,
}

impl From<CredentialRow> for DeliveryCredential {
    fn from(r: CredentialRow) -> Self {
        Self {
            delivery_id: r.delivery_id as DeliveryId,
            server_id: r.server_id as ServerId,
            channel_id: r.channel_id as ChannelId,
            secret_token: r.secret_token,
            created_at: r.created_at,
        }
    }
}

/// Persisted delivery identities (id + secret token per channel) so restarts
/// reuse identities instead of minting new ones.
#[derive(Clone)]
pub struct CredentialStore {
    pool: sqlx::SqlitePool,
}

impl CredentialStore {
    #[must_use]
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, cred: &DeliveryCredential) -> Result<()> {
        sqlx::query(
            "INSERT INTO delivery_credentials (delivery_id, server_id, channel_id, secret_token, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (delivery_id) DO UPDATE SET
                 server_id    = excluded.server_id,
                 channel_id   = excluded.channel_id,
                 secret_token = excluded.secret_token",
        )
        .bind(cred.delivery_id as i64)
        .bind(cred.server_id as i64)
        .bind(cred.channel_id as i64)
        .bind(&cred.secret_token)
        .bind(cred.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, delivery_id: DeliveryId) -> Result<Option<DeliveryCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT delivery_id, server_id, channel_id, secret_token, created_at
             FROM delivery_credentials WHERE delivery_id = ?",
        )
        .bind(delivery_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_for_channel(&self, channel_id: ChannelId) -> Result<Option<DeliveryCredential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT delivery_id, server_id, channel_id, secret_token, created_at
             FROM delivery_credentials WHERE channel_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(channel_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn delete(&self, delivery_id: DeliveryId) -> Result<()> {
        sqlx::query("DELETE FROM delivery_credentials WHERE delivery_id = ?")
            .bind(delivery_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    fn cred(delivery_id: DeliveryId, channel_id: ChannelId, created_at: i64) -> DeliveryCredential {
        DeliveryCredential {
            delivery_id,
            server_id: 1,
            channel_id,
            secret_token: format!("tok-{delivery_id}"),
            created_at,
        }
    }

    #[tokio::test]
    async fn upsert_and_lookup_by_id_and_channel() {
        let store = CredentialStore::new(test_pool().await);
        store.upsert(&cred(77, 200, 1000)).await.unwrap();

        let by_id = store.get_by_id(77).await.unwrap().unwrap();
        assert_eq!(by_id.secret_token, "tok-77");

        let by_channel = store.get_for_channel(200).await.unwrap().unwrap();
        assert_eq!(by_channel.delivery_id, 77);
        assert!(store.get_for_channel(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn newest_credential_wins_for_channel() {
        let store = CredentialStore::new(test_pool().await);
        store.upsert(&cred(77, 200, 1000)).await.unwrap();
        store.upsert(&cred(88, 200, 2000)).await.unwrap();
        let got = store.get_for_channel(200).await.unwrap().unwrap();
        assert_eq!(got.delivery_id, 88);
    }

    #[tokio::test]
    async fn delete_evicts() {
        let store = CredentialStore::new(test_pool().await);
        store.upsert(&cred(77, 200, 1000)).await.unwrap();
        store.delete(77).await.unwrap();
        assert!(store.get_by_id(77).await.unwrap().is_none());
    }
}
