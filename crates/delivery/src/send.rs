use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use {
    babelink_common::types::{Attachment, ChannelId, DeliveryId, MessageId, ServerId},
    babelink_compose::{
        apply_relay_marker, compose_blocks, resolve_gallery_direct, rewrite_links,
        rewrite_urls_in_text, split_by_limit, split_attachment_urls, strip_filename_only_text,
        url_host,
    },
    babelink_platform::{ChatPlatform, MessageRef, error::Error as PlatformError},
};

use crate::identities::{DeliveryIdentities, DeliveryIdentity};

/// Display identity for a relayed message: the original author's name and
/// avatar, presented by the delivery webhook.
#[derive(Debug, Clone)]
pub struct SpeakerProfile {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Outbound send paths. Wraps identity resolution and the recovery ladder:
/// handle-gone gets one transparent recreate, any other webhook failure gets
/// one retry without the avatar, and the last resort is a plain bot message
/// with the speaker's name bolded in front (`delivery_id = 0`).
pub struct Deliverer {
    platform: Arc<dyn ChatPlatform>,
    identities: Arc<DeliveryIdentities>,
    probe_client: reqwest::Client,
    direct_embed_domains: HashSet<String>,
}

impl Deliverer {
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        identities: Arc<DeliveryIdentities>,
        probe_client: reqwest::Client,
        direct_embed_domains: HashSet<String>,
    ) -> Self {
        Self {
            platform,
            identities,
            probe_client,
            direct_embed_domains,
        }
    }

    async fn exec(
        &self,
        identity: &DeliveryIdentity,
        content: &str,
        profile: &SpeakerProfile,
        with_avatar: bool,
        reply_to: Option<&MessageRef>,
    ) -> Result<MessageId, PlatformError> {
        let avatar = if with_avatar {
            profile.avatar_url.as_deref()
        } else {
            None
        };
        self.platform
            .execute_webhook(
                identity.delivery_id,
                &identity.token,
                content,
                &profile.username,
                avatar,
                reply_to,
            )
            .await
    }

    async fn fallback(
        &self,
        channel_id: ChannelId,
        content: &str,
        profile: &SpeakerProfile,
        reply_to: Option<&MessageRef>,
    ) -> anyhow::Result<(MessageId, DeliveryId)> {
        let text = format!("**{}**: {content}", profile.username);
        let message_id = self.platform.send_message(channel_id, &text, reply_to).await?;
        Ok((message_id, 0))
    }

    /// Send one block under the speaker's identity.
    pub async fn send_as_member(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
        content: &str,
        profile: &SpeakerProfile,
        reply_to: Option<&MessageRef>,
    ) -> anyhow::Result<(MessageId, DeliveryId)> {
        let identity = match self.identities.get_or_create(server_id, channel_id).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(channel_id, error = %e, "no delivery identity, sending plain");
                return self.fallback(channel_id, content, profile, reply_to).await;
            },
        };

        match self.exec(&identity, content, profile, true, reply_to).await {
            Ok(message_id) => return Ok((message_id, identity.delivery_id)),
            Err(e) if e.is_not_found() => {
                debug!(channel_id, delivery_id = identity.delivery_id, "delivery handle gone, recreating");
                self.identities.evict(channel_id, identity.delivery_id).await;
                if let Ok(fresh) = self.identities.get_or_create(server_id, channel_id).await
                    && let Ok(message_id) = self.exec(&fresh, content, profile, true, reply_to).await
                {
                    return Ok((message_id, fresh.delivery_id));
                }
            },
            Err(e) => {
                debug!(channel_id, error = %e, "identity send failed, retrying without avatar");
                if let Ok(message_id) = self.exec(&identity, content, profile, false, reply_to).await
                {
                    return Ok((message_id, identity.delivery_id));
                }
            },
        }
        self.fallback(channel_id, content, profile, reply_to).await
    }

    /// Compose and send a full translated message: text, extracted links,
    /// and attachments, chunked to the platform limit. Returns the ids of
    /// the first chunk, or `None` if nothing was worth sending.
    #[allow(clippy::too_many_arguments)]
    pub async fn send_translation(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
        text: &str,
        source_urls: &[String],
        attachments: &[Attachment],
        profile: &SpeakerProfile,
        reply_to: Option<&MessageRef>,
    ) -> anyhow::Result<Option<(MessageId, DeliveryId)>> {
        // Translation can reintroduce URLs into the body; normalize those too.
        let text = rewrite_urls_in_text(&strip_filename_only_text(text, attachments));
        let urls = rewrite_links(source_urls);
        let (media, other) = split_attachment_urls(attachments);

        // A lone gallery-host link embeds better as the direct asset.
        if text.trim().is_empty()
            && media.is_empty()
            && other.is_empty()
            && urls.len() == 1
            && self.is_direct_embed_host(&urls[0])
        {
            let link = resolve_gallery_direct(&self.probe_client, &urls[0], None)
                .await
                .unwrap_or_else(|| urls[0].clone());
            let ids = self
                .send_as_member(server_id, channel_id, &link, profile, reply_to)
                .await?;
            return Ok(Some(ids));
        }

        let mut lines: Vec<String> = Vec::new();
        if !text.trim().is_empty() {
            lines.extend(text.lines().map(str::to_string));
        }
        lines.extend(urls.iter().cloned());

        let mut blocks = if lines.is_empty() {
            Vec::new()
        } else {
            split_by_limit(&lines)
        };
        blocks.extend(compose_blocks("", &media, &other));
        if blocks.is_empty() {
            return Ok(None);
        }
        apply_relay_marker(&mut blocks);

        let mut first: Option<(MessageId, DeliveryId)> = None;
        for block in &blocks {
            let reply = if first.is_none() { reply_to } else { None };
            let ids = self
                .send_as_member(server_id, channel_id, block, profile, reply)
                .await?;
            if first.is_none() {
                first = Some(ids);
            }
        }
        Ok(first)
    }

    fn is_direct_embed_host(&self, url: &str) -> bool {
        let host = url_host(url);
        self.direct_embed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}
