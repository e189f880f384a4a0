//! Shared in-memory platform fake for delivery tests.

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

use async_trait::async_trait;

use {
    babelink_common::types::{ChannelId, DeliveryId, MessageId, ServerId, UserId},
    babelink_platform::{
        ChatPlatform, InboundMessage, MessageRef, WebhookInfo,
        error::{Error as PlatformError, Result as PlatformResult},
    },
};

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub delivery_id: DeliveryId,
    pub content: String,
    pub avatar: bool,
    pub replied: bool,
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    pub sent: Mutex<Vec<Sent>>,
    pub plain: Mutex<Vec<String>>,
    pub hooks: Mutex<Vec<WebhookInfo>>,
    /// Remaining webhook sends that should fail.
    pub webhook_failures: AtomicU32,
    pub fail_with_not_found: bool,
    pub next_hook_id: AtomicU32,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            next_hook_id: AtomicU32::new(70),
            ..Default::default()
        }
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn current_user(&self) -> PlatformResult<UserId> {
        Ok(42)
    }

    async fn fetch_message(&self, _c: ChannelId, _m: MessageId) -> PlatformResult<InboundMessage> {
        Err(PlatformError::NotFound { context: "fetch" })
    }

    async fn send_message(
        &self,
        _channel_id: ChannelId,
        content: &str,
        _reply_to: Option<&MessageRef>,
    ) -> PlatformResult<MessageId> {
        self.plain.lock().unwrap().push(content.to_string());
        Ok(900)
    }

    async fn edit_message(&self, _c: ChannelId, _m: MessageId, _t: &str) -> PlatformResult<()> {
        Ok(())
    }

    async fn list_webhooks(&self, _channel_id: ChannelId) -> PlatformResult<Vec<WebhookInfo>> {
        Ok(self.hooks.lock().unwrap().clone())
    }

    async fn create_webhook(&self, _channel_id: ChannelId, name: &str) -> PlatformResult<WebhookInfo> {
        let id = u64::from(self.next_hook_id.fetch_add(1, Ordering::SeqCst));
        let hook = WebhookInfo {
            id,
            token: Some(format!("tok-{id}")),
            name: Some(name.to_string()),
            creator_id: Some(42),
        };
        self.hooks.lock().unwrap().push(hook.clone());
        Ok(hook)
    }

    async fn execute_webhook(
        &self,
        delivery_id: DeliveryId,
        _token: &str,
        content: &str,
        _username: &str,
        avatar_url: Option<&str>,
        reply_to: Option<&MessageRef>,
    ) -> PlatformResult<MessageId> {
        if self.webhook_failures.load(Ordering::SeqCst) > 0 {
            self.webhook_failures.fetch_sub(1, Ordering::SeqCst);
            if self.fail_with_not_found {
                // The hook is gone server-side as well.
                self.hooks.lock().unwrap().retain(|h| h.id != delivery_id);
                return Err(PlatformError::NotFound { context: "webhook" });
            }
            return Err(PlatformError::Api {
                context: "webhook",
                status: 500,
                body: String::new(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent {
            delivery_id,
            content: content.to_string(),
            avatar: avatar_url.is_some(),
            replied: reply_to.is_some(),
        });
        Ok(1000 + sent.len() as u64)
    }

    async fn edit_webhook_message(
        &self,
        _d: DeliveryId,
        _t: &str,
        _m: MessageId,
        _c: &str,
    ) -> PlatformResult<()> {
        Ok(())
    }

    async fn server_has_member_matching(
        &self,
        _s: ServerId,
        _ids: &HashSet<UserId>,
        _p: &str,
    ) -> PlatformResult<Option<UserId>> {
        Ok(None)
    }

    async fn leave_server(&self, _s: ServerId) -> PlatformResult<()> {
        Ok(())
    }

    async fn send_notice(&self, _c: ChannelId, _t: &str) {}
}
