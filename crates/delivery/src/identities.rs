use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    anyhow::{Context, Result},
    tracing::{debug, warn},
};

use {
    babelink_common::{
        now_ts,
        types::{ChannelId, DeliveryCredential, DeliveryId, ServerId, UserId},
    },
    babelink_platform::{ChatPlatform, WebhookInfo},
    babelink_store::CredentialStore,
};

/// A usable send/edit handle: webhook id plus its secret token.
#[derive(Debug, Clone)]
pub struct DeliveryIdentity {
    pub delivery_id: DeliveryId,
    pub token: String,
}

/// Per-channel delivery identity manager.
///
/// Resolution order: in-memory cache, persisted credential (validated
/// against the live webhook list), adoption of an existing owned webhook,
/// creation of a new one. Foreign webhooks are never adopted — a hook we did
/// not create and did not name is someone else's.
pub struct DeliveryIdentities {
    platform: Arc<dyn ChatPlatform>,
    credentials: CredentialStore,
    delivery_name: String,
    own_user_id: AtomicU64,
    cache: Mutex<HashMap<ChannelId, DeliveryIdentity>>,
}

impl DeliveryIdentities {
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        credentials: CredentialStore,
        delivery_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            credentials,
            delivery_name: delivery_name.into(),
            own_user_id: AtomicU64::new(0),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Record our own user id once the gateway reports it. Ownership checks
    /// fall back to name matching until this is set.
    pub fn set_own_user(&self, user_id: UserId) {
        self.own_user_id.store(user_id, Ordering::SeqCst);
    }

    /// Whether a webhook id is one of our persisted identities. Store errors
    /// read as "not ours" so a flaky read can only under-filter.
    pub async fn is_own_delivery(&self, delivery_id: DeliveryId) -> bool {
        matches!(self.credentials.get_by_id(delivery_id).await, Ok(Some(_)))
    }

    fn owned(&self, hook: &WebhookInfo) -> bool {
        let own = self.own_user_id.load(Ordering::SeqCst);
        (own != 0 && hook.creator_id == Some(own))
            || hook.name.as_deref() == Some(self.delivery_name.as_str())
    }

    /// Resolve the identity for a channel, creating one if needed.
    pub async fn get_or_create(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
    ) -> Result<DeliveryIdentity> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(identity) = cache.get(&channel_id) {
                return Ok(identity.clone());
            }
        }

        let hooks = match self.platform.list_webhooks(channel_id).await {
            Ok(hooks) => Some(hooks),
            Err(e) => {
                debug!(channel_id, error = %e, "webhook listing failed");
                None
            },
        };

        if let Ok(Some(cred)) = self.credentials.get_for_channel(channel_id).await {
            match &hooks {
                // Listing unavailable: trust the persisted credential.
                None => return Ok(self.remember(channel_id, cred.delivery_id, cred.secret_token)),
                Some(hooks) => match hooks.iter().find(|h| h.id == cred.delivery_id) {
                    Some(h) if self.owned(h) => {
                        return Ok(self.remember(channel_id, cred.delivery_id, cred.secret_token));
                    },
                    found => {
                        // Gone or foreign; the stored secret is useless.
                        warn!(
                            channel_id,
                            delivery_id = cred.delivery_id,
                            foreign = found.is_some(),
                            "dropping stale delivery credential"
                        );
                        if let Err(e) = self.credentials.delete(cred.delivery_id).await {
                            warn!(delivery_id = cred.delivery_id, error = %e, "credential delete failed");
                        }
                    },
                },
            }
        }

        if let Some(hooks) = &hooks
            && let Some(hook) = hooks.iter().find(|h| self.owned(h) && h.token.is_some())
        {
            let token = hook.token.clone().unwrap_or_default();
            self.persist(server_id, channel_id, hook.id, &token).await;
            return Ok(self.remember(channel_id, hook.id, token));
        }

        let hook = self
            .platform
            .create_webhook(channel_id, &self.delivery_name)
            .await
            .context("webhook creation failed")?;
        let token = hook
            .token
            .context("platform returned a webhook without a token")?;
        self.persist(server_id, channel_id, hook.id, &token).await;
        Ok(self.remember(channel_id, hook.id, token))
    }

    /// Rebuild a handle purely from its persisted credential. Used by edit
    /// propagation, where the mapping pins a specific identity.
    pub async fn get_by_id(&self, delivery_id: DeliveryId) -> Result<Option<DeliveryIdentity>> {
        Ok(self
            .credentials
            .get_by_id(delivery_id)
            .await?
            .map(|cred| DeliveryIdentity {
                delivery_id: cred.delivery_id,
                token: cred.secret_token,
            }))
    }

    /// Forget an identity whose webhook no longer exists.
    pub async fn evict(&self, channel_id: ChannelId, delivery_id: DeliveryId) {
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.remove(&channel_id);
        }
        if let Err(e) = self.credentials.delete(delivery_id).await {
            warn!(delivery_id, error = %e, "credential delete failed");
        }
    }

    fn remember(
        &self,
        channel_id: ChannelId,
        delivery_id: DeliveryId,
        token: String,
    ) -> DeliveryIdentity {
        let identity = DeliveryIdentity { delivery_id, token };
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(channel_id, identity.clone());
        identity
    }

    async fn persist(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
        delivery_id: DeliveryId,
        token: &str,
    ) {
        let cred = DeliveryCredential {
            delivery_id,
            server_id,
            channel_id,
            secret_token: token.to_string(),
            created_at: now_ts(),
        };
        // Best-effort: a failed write costs one extra webhook after restart.
        if let Err(e) = self.credentials.upsert(&cred).await {
            warn!(delivery_id, error = %e, "credential persist failed");
        }
    }
}
