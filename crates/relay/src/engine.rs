use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, warn};

use {
    babelink_common::{
        now_ts,
        types::{ChannelLink, ServerId, TranslationMapping, UserId},
    },
    babelink_compose::{
        MAX_MSG_LEN, RELAY_MARKER, clamp_text, clamp_text_to, extract_urls, is_pure_url_block,
        rewrite_links,
    },
    babelink_delivery::{Deliverer, DeliveryIdentities, SpeakerProfile},
    babelink_glossary::Glossary,
    babelink_platform::{ChannelKind, ChatPlatform, InboundMessage, MessageRef, PlatformEvent},
    babelink_quota::QuotaLedger,
    babelink_store::{LinkStore, MappingStore},
    babelink_translate::ResilientTranslator,
};

use crate::state::{CooldownMap, DedupeCache};

const NOTICE_DISABLED: &str = "Translation is disabled for this server.";
const NOTICE_COMMIT_FAILED: &str =
    "Could not record translation usage; relaying is paused for this message.";
const NOTICE_COMPETITOR: &str =
    "Another translation bot is active on this server; leaving to avoid double-posting.";

/// Source text shorter than this (after URL extraction) is passed through
/// without calling the provider.
const MIN_TRANSLATE_CHARS: usize = 4;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub user_cooldown: Duration,
    pub channel_cooldown: Duration,
    /// Zero disables duplicate suppression (non-event mode).
    pub dedupe_window: Duration,
    /// Minimum stripped-text length for a text-only message to be relayed.
    pub min_relay_chars: usize,
    /// Delay before the proxy double-post re-fetch. Zero skips the check.
    pub proxy_check_delay: Duration,
    pub edit_window_secs: i64,
    pub block_competitor: bool,
    pub competitor_ids: HashSet<UserId>,
    pub competitor_name_prefix: String,
    /// Throttle for the per-server "translation disabled" notice.
    pub notice_throttle: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            user_cooldown: Duration::from_secs(2),
            channel_cooldown: Duration::from_millis(150),
            dedupe_window: Duration::ZERO,
            min_relay_chars: 4,
            proxy_check_delay: Duration::from_secs(1),
            edit_window_secs: 3600,
            block_competitor: true,
            competitor_ids: HashSet::new(),
            competitor_name_prefix: "rita".to_string(),
            notice_throttle: Duration::from_secs(60),
        }
    }
}

/// The relay engine. One instance per process; every inbound event is handed
/// to [`Relay::handle_event`] on its own task, and no per-message failure
/// escapes it.
pub struct Relay {
    platform: Arc<dyn ChatPlatform>,
    translator: Arc<ResilientTranslator>,
    glossary: Arc<Glossary>,
    quota: Arc<QuotaLedger>,
    links: LinkStore,
    mappings: MappingStore,
    identities: Arc<DeliveryIdentities>,
    deliverer: Arc<Deliverer>,
    cfg: RelayConfig,

    own_user: AtomicU64,
    user_gate: CooldownMap,
    channel_gate: CooldownMap,
    dedupe: DedupeCache,
    quota_notice_gate: CooldownMap,
    /// Per-server competitor verdicts; absent = not yet scanned.
    competitor_blocked: Mutex<HashMap<ServerId, bool>>,
    /// Per-server scan locks so concurrent events trigger only one scan.
    competitor_locks: tokio::sync::Mutex<HashMap<ServerId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        translator: Arc<ResilientTranslator>,
        glossary: Arc<Glossary>,
        quota: Arc<QuotaLedger>,
        links: LinkStore,
        mappings: MappingStore,
        identities: Arc<DeliveryIdentities>,
        deliverer: Arc<Deliverer>,
        cfg: RelayConfig,
    ) -> Self {
        Self {
            platform,
            translator,
            glossary,
            quota,
            links,
            mappings,
            identities,
            deliverer,
            user_gate: CooldownMap::new(cfg.user_cooldown),
            channel_gate: CooldownMap::new(cfg.channel_cooldown),
            dedupe: DedupeCache::new(cfg.dedupe_window),
            quota_notice_gate: CooldownMap::new(cfg.notice_throttle),
            cfg,
            own_user: AtomicU64::new(0),
            competitor_blocked: Mutex::new(HashMap::new()),
            competitor_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Event entry point. Failures are logged, never propagated.
    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Ready { user_id } => {
                self.own_user.store(user_id, Ordering::SeqCst);
                self.identities.set_own_user(user_id);
                info!(user_id, "gateway ready");
            },
            PlatformEvent::MessageCreate(msg) => {
                let (server, channel, id) = (msg.server_id, msg.channel_id, msg.id);
                if let Err(e) = self.on_message(msg).await {
                    warn!(?server, channel, message = id, error = %e, "message relay failed");
                }
            },
            PlatformEvent::MessageUpdate(msg) => {
                let (server, channel, id) = (msg.server_id, msg.channel_id, msg.id);
                if let Err(e) = self.on_edit(msg).await {
                    warn!(?server, channel, message = id, error = %e, "edit propagation failed");
                }
            },
            PlatformEvent::ServerJoin { server_id, name } => self.on_server_join(server_id, &name).await,
            PlatformEvent::ServerLeave { server_id } => self.on_server_leave(server_id),
        }
    }

    // ── inbound guard chain ──

    async fn on_message(&self, msg: InboundMessage) -> anyhow::Result<()> {
        let own = self.own_user.load(Ordering::SeqCst);
        if own != 0 && msg.author.id == own {
            return Ok(());
        }
        if let Some(webhook_id) = msg.webhook_id
            && self.identities.is_own_delivery(webhook_id).await
        {
            return Ok(());
        }
        if msg.content.contains(RELAY_MARKER) {
            return Ok(());
        }
        // Plain bots are ignored; webhook posts (proxy services speaking for
        // a user) pass through.
        if msg.author.bot && msg.webhook_id.is_none() {
            return Ok(());
        }
        let Some(server_id) = msg.server_id else {
            return Ok(());
        };
        if msg.channel_kind != ChannelKind::Text {
            return Ok(());
        }
        if self.competitor_present(server_id, msg.channel_id).await {
            return Ok(());
        }
        if !msg.author.bot
            && msg.webhook_id.is_none()
            && !self.cfg.proxy_check_delay.is_zero()
        {
            // Proxy services delete the user's post and repost it through a
            // webhook; if the original is gone after a beat, skip it here
            // and relay the webhook copy instead.
            tokio::time::sleep(self.cfg.proxy_check_delay).await;
            if let Err(e) = self.platform.fetch_message(msg.channel_id, msg.id).await
                && e.is_not_found()
            {
                debug!(message = msg.id, "source deleted before relay, assuming proxy repost");
                return Ok(());
            }
        }
        let Some(link) = self.links.get_link(server_id, msg.channel_id).await? else {
            return Ok(());
        };
        let (text, urls) = extract_urls(&msg.content);
        if text.trim().chars().count() < self.cfg.min_relay_chars
            && urls.is_empty()
            && msg.attachments.is_empty()
        {
            return Ok(());
        }
        if !self.user_gate.try_pass(msg.author.id) {
            debug!(user = msg.author.id, "user cooldown drop");
            return Ok(());
        }
        if !self.channel_gate.try_pass(msg.channel_id) {
            debug!(channel = msg.channel_id, "channel cooldown drop");
            return Ok(());
        }
        if self.dedupe.is_duplicate(msg.channel_id, msg.author.id, &msg.content) {
            debug!(message = msg.id, "duplicate drop");
            return Ok(());
        }
        self.relay_message(server_id, &msg, &link, &text, &urls).await
    }

    // ── pipeline ──

    async fn relay_message(
        &self,
        server_id: ServerId,
        msg: &InboundMessage,
        link: &ChannelLink,
        text: &str,
        urls: &[String],
    ) -> anyhow::Result<()> {
        let needed = text.trim().chars().count() as i64;
        if !self.quota_allows(server_id, msg.channel_id, needed).await {
            return Ok(());
        }
        let Some(translated) = self.translate_text(text, &link.src_lang, &link.tgt_lang).await
        else {
            debug!(message = msg.id, "translation unavailable, dropping");
            return Ok(());
        };
        let reply = self.resolve_reply(server_id, msg, link).await;
        let profile = SpeakerProfile {
            username: msg.author.shown_name().to_string(),
            avatar_url: msg.author.avatar_url.clone(),
        };
        let Some((tgt_msg_id, delivery_id)) = self
            .deliverer
            .send_translation(
                server_id,
                link.target_channel,
                &translated,
                urls,
                &msg.attachments,
                &profile,
                reply.as_ref(),
            )
            .await?
        else {
            return Ok(());
        };

        if !self.quota.commit(server_id, needed).await {
            self.platform.send_notice(msg.channel_id, NOTICE_COMMIT_FAILED).await;
            return Ok(());
        }
        if let Some(w) = self.quota.check_90pct(server_id).await {
            let notice = format!(
                "Heads up: over 90% of this server's translation quota is used ({}/{} characters).",
                w.used, w.cap
            );
            self.platform.send_notice(msg.channel_id, &notice).await;
        }

        let mapping = TranslationMapping {
            server_id,
            src_msg_id: msg.id,
            src_channel_id: msg.channel_id,
            tgt_msg_id,
            tgt_channel_id: link.target_channel,
            delivery_id,
            created_at: now_ts(),
            last_edit_at: None,
        };
        // A lost mapping only costs edit/reply fidelity; the relay stands.
        if let Err(e) = self.mappings.record(&mapping).await {
            warn!(message = msg.id, error = %e, "mapping persist failed");
        }
        Ok(())
    }

    async fn quota_allows(&self, server_id: ServerId, notice_channel: u64, needed: i64) -> bool {
        let pre = self.quota.precheck(server_id, needed).await;
        if pre.ok {
            return true;
        }
        if pre.cap <= 0 {
            // Disabled servers would otherwise hear this on every message.
            if self.quota_notice_gate.try_pass(server_id) {
                self.platform.send_notice(notice_channel, NOTICE_DISABLED).await;
            }
        } else {
            // Exhaustion is told on every denied attempt.
            let notice = format!(
                "Translation quota exhausted for this server ({} of {} characters used).",
                pre.used, pre.cap
            );
            self.platform.send_notice(notice_channel, &notice).await;
        }
        false
    }

    /// Glossary-protected translation with soft failure. Very short inputs
    /// pass through untouched.
    async fn translate_text(&self, text: &str, src_lang: &str, tgt_lang: &str) -> Option<String> {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_TRANSLATE_CHARS {
            return Some(trimmed.to_string());
        }
        let (marked, tags) = self.glossary.protect(trimmed, src_lang, tgt_lang);
        let out = self.translator.translate(&marked, src_lang, tgt_lang).await?;
        Some(clamp_text(&self.glossary.restore(&out, &tags)))
    }

    // ── reply threading ──

    async fn resolve_reply(
        &self,
        server_id: ServerId,
        msg: &InboundMessage,
        link: &ChannelLink,
    ) -> Option<MessageRef> {
        let reference = msg.reference?;
        let ref_id = reference.message_id?;
        if let Ok(Some(m)) = self.mappings.get_by_src(server_id, ref_id).await {
            return Some(MessageRef::to_message(server_id, m.tgt_channel_id, m.tgt_msg_id));
        }
        match self.backfill_reference(server_id, msg.channel_id, ref_id, link).await {
            Ok(reference) => reference,
            Err(e) => {
                debug!(reference = ref_id, error = %e, "reply backfill failed");
                None
            },
        }
    }

    /// The referenced message predates the link (or its mapping aged out):
    /// relay it as a root post so the reply has something to point at.
    async fn backfill_reference(
        &self,
        server_id: ServerId,
        channel_id: u64,
        ref_id: u64,
        link: &ChannelLink,
    ) -> anyhow::Result<Option<MessageRef>> {
        let src = self.platform.fetch_message(channel_id, ref_id).await?;
        let (text, urls) = extract_urls(&src.content);
        let needed = text.trim().chars().count() as i64;
        if !self.quota.precheck(server_id, needed).await.ok {
            return Ok(None);
        }
        let Some(translated) = self.translate_text(&text, &link.src_lang, &link.tgt_lang).await
        else {
            return Ok(None);
        };
        let profile = SpeakerProfile {
            username: src.author.shown_name().to_string(),
            avatar_url: src.author.avatar_url.clone(),
        };
        let Some((tgt_msg_id, delivery_id)) = self
            .deliverer
            .send_translation(
                server_id,
                link.target_channel,
                &translated,
                &urls,
                &src.attachments,
                &profile,
                None,
            )
            .await?
        else {
            return Ok(None);
        };
        if !self.quota.commit(server_id, needed).await {
            warn!(reference = ref_id, "quota commit failed on reply backfill");
        }
        let mapping = TranslationMapping {
            server_id,
            src_msg_id: ref_id,
            src_channel_id: channel_id,
            tgt_msg_id,
            tgt_channel_id: link.target_channel,
            delivery_id,
            created_at: now_ts(),
            last_edit_at: None,
        };
        if let Err(e) = self.mappings.record(&mapping).await {
            warn!(reference = ref_id, error = %e, "backfill mapping persist failed");
        }
        Ok(Some(MessageRef::to_message(server_id, link.target_channel, tgt_msg_id)))
    }

    // ── edit propagation ──

    async fn on_edit(&self, msg: InboundMessage) -> anyhow::Result<()> {
        if msg.author.bot || msg.webhook_id.is_some() {
            return Ok(());
        }
        let Some(server_id) = msg.server_id else {
            return Ok(());
        };
        let Some(link) = self.links.get_link(server_id, msg.channel_id).await? else {
            return Ok(());
        };
        let Some(mapping) = self.mappings.get_by_src(server_id, msg.id).await? else {
            return Ok(());
        };
        if now_ts() - mapping.created_at > self.cfg.edit_window_secs {
            debug!(message = msg.id, "edit outside window, ignoring");
            return Ok(());
        }

        let (text, urls) = extract_urls(&msg.content);
        let needed = text.trim().chars().count() as i64;
        if !self.quota_allows(server_id, msg.channel_id, needed).await {
            return Ok(());
        }
        let Some(translated) = self.translate_text(&text, &link.src_lang, &link.tgt_lang).await
        else {
            return Ok(());
        };
        let content = compose_edit_content(&translated, &urls);

        let result = if mapping.delivery_id == 0 {
            self.platform
                .edit_message(mapping.tgt_channel_id, mapping.tgt_msg_id, &content)
                .await
        } else {
            let identity = match self.identities.get_by_id(mapping.delivery_id).await? {
                Some(identity) => identity,
                None => {
                    self.identities
                        .get_or_create(server_id, mapping.tgt_channel_id)
                        .await?
                },
            };
            self.platform
                .edit_webhook_message(identity.delivery_id, &identity.token, mapping.tgt_msg_id, &content)
                .await
        };

        match result {
            Ok(()) => {
                if !self.quota.commit(server_id, needed).await {
                    warn!(message = msg.id, "quota commit failed after edit");
                }
                if let Err(e) = self.mappings.touch_edit(server_id, msg.id, now_ts()).await {
                    warn!(message = msg.id, error = %e, "edit timestamp persist failed");
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(message = msg.id, "edit target gone, dropping mapping");
                if let Err(e) = self.mappings.delete(server_id, msg.id).await {
                    warn!(message = msg.id, error = %e, "mapping delete failed");
                }
            },
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    // ── competing-bot guard ──

    async fn competitor_present(&self, server_id: ServerId, notice_channel: u64) -> bool {
        if !self.cfg.block_competitor {
            return false;
        }
        if let Some(blocked) = self.cached_verdict(server_id) {
            return blocked;
        }
        let lock = {
            let mut locks = self.competitor_locks.lock().await;
            locks.entry(server_id).or_default().clone()
        };
        let _guard = lock.lock().await;
        // Another task may have finished the scan while we waited.
        if let Some(blocked) = self.cached_verdict(server_id) {
            return blocked;
        }

        let found = match self
            .platform
            .server_has_member_matching(
                server_id,
                &self.cfg.competitor_ids,
                &self.cfg.competitor_name_prefix,
            )
            .await
        {
            Ok(found) => found,
            Err(e) => {
                debug!(server_id, error = %e, "competitor scan failed");
                None
            },
        };
        let blocked = found.is_some();
        {
            let mut verdicts = self.competitor_blocked.lock().unwrap_or_else(|e| e.into_inner());
            verdicts.insert(server_id, blocked);
        }
        if let Some(bot_id) = found {
            warn!(server_id, bot_id, "competing translation bot detected, leaving server");
            self.platform.send_notice(notice_channel, NOTICE_COMPETITOR).await;
            if let Err(e) = self.platform.leave_server(server_id).await {
                warn!(server_id, error = %e, "server leave failed");
            }
        }
        blocked
    }

    fn cached_verdict(&self, server_id: ServerId) -> Option<bool> {
        let verdicts = self.competitor_blocked.lock().unwrap_or_else(|e| e.into_inner());
        verdicts.get(&server_id).copied()
    }

    // ── server lifecycle ──

    async fn on_server_join(&self, server_id: ServerId, name: &str) {
        info!(server_id, name, "joined server");
        self.invalidate_server(server_id);
        // Make sure the quota row exists so the first message doesn't race
        // row creation.
        let _ = self.quota.ensure_and_snapshot(server_id, name).await;
    }

    fn on_server_leave(&self, server_id: ServerId) {
        info!(server_id, "left server");
        self.invalidate_server(server_id);
    }

    fn invalidate_server(&self, server_id: ServerId) {
        let mut verdicts = self.competitor_blocked.lock().unwrap_or_else(|e| e.into_inner());
        verdicts.remove(&server_id);
    }
}

/// Edited targets are a single message, so the edit content is one block:
/// text, re-appended links, and the marker unless the result is a bare URL.
/// The text portion is shortened so the whole block fits the platform limit.
fn compose_edit_content(text: &str, urls: &[String]) -> String {
    let links = rewrite_links(urls);
    let appended: usize =
        links.iter().map(|u| u.chars().count() + 1).sum::<usize>() + RELAY_MARKER.chars().count();
    let mut out = clamp_text_to(text.trim(), MAX_MSG_LEN.saturating_sub(appended));
    for url in &links {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(url);
    }
    if !out.is_empty()
        && !is_pure_url_block(&out)
        && out.chars().count() + RELAY_MARKER.chars().count() <= MAX_MSG_LEN
    {
        out.push_str(RELAY_MARKER);
    }
    out
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests;
