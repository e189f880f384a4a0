//! Chat-platform access: inbound event types, the [`ChatPlatform`] trait,
//! a Discord-style REST implementation, and a minimal gateway event source.

pub mod error;
pub mod gateway;
mod rest;
pub mod types;

pub use {
    error::{Error, Result},
    rest::RestPlatform,
    types::{
        ChannelKind, InboundMessage, MessageAuthor, MessageRef, PlatformEvent, WebhookInfo,
    },
};

use std::collections::HashSet;

use async_trait::async_trait;

use babelink_common::types::{ChannelId, DeliveryId, MessageId, ServerId, UserId};

/// Everything the relay needs from the chat platform. One REST-backed
/// implementation in production; tests substitute fakes.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// The bot's own user id.
    async fn current_user(&self) -> Result<UserId>;

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<InboundMessage>;

    /// Plain send as the bot itself. All mention pings are suppressed.
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        reply_to: Option<&MessageRef>,
    ) -> Result<MessageId>;

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()>;

    async fn list_webhooks(&self, channel_id: ChannelId) -> Result<Vec<WebhookInfo>>;

    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookInfo>;

    /// Send through a webhook with a per-message display identity. Waits for
    /// the created message and returns its id. Pings suppressed.
    #[allow(clippy::too_many_arguments)]
    async fn execute_webhook(
        &self,
        delivery_id: DeliveryId,
        token: &str,
        content: &str,
        username: &str,
        avatar_url: Option<&str>,
        reply_to: Option<&MessageRef>,
    ) -> Result<MessageId>;

    async fn edit_webhook_message(
        &self,
        delivery_id: DeliveryId,
        token: &str,
        message_id: MessageId,
        content: &str,
    ) -> Result<()>;

    /// Scan the server's bot members for a known id or a display-name
    /// prefix. Returns the first matching member's id.
    async fn server_has_member_matching(
        &self,
        server_id: ServerId,
        ids: &HashSet<UserId>,
        name_prefix: &str,
    ) -> Result<Option<UserId>>;

    async fn leave_server(&self, server_id: ServerId) -> Result<()>;

    /// Operational notice to a channel. Never fails: errors are logged and
    /// swallowed so notices cannot break the pipeline they annotate.
    async fn send_notice(&self, channel_id: ChannelId, content: &str);
}
