use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering as AtomicOrdering};

use async_trait::async_trait;

use {
    babelink_common::types::{Attachment, ChannelId, DeliveryId, MessageId},
    babelink_platform::{
        MessageAuthor, WebhookInfo,
        error::{Error as PlatformError, Result as PlatformResult},
    },
    babelink_quota::{QuotaSnapshot, QuotaStore},
    babelink_resilience::BackoffConfig,
    babelink_store::{CredentialStore, run_migrations},
    babelink_translate::{ControlsConfig, Translator},
};

use super::*;

// ── fakes ──

#[derive(Debug, Clone)]
struct Sent {
    delivery_id: DeliveryId,
    content: String,
    replied_to: Option<MessageId>,
}

#[derive(Default)]
struct FakePlatform {
    sent: Mutex<Vec<Sent>>,
    notices: Mutex<Vec<(ChannelId, String)>>,
    edits: Mutex<Vec<(DeliveryId, MessageId, String)>>,
    hooks: Mutex<Vec<WebhookInfo>>,
    next_hook_id: AtomicU32,
    messages: Mutex<HashMap<(ChannelId, MessageId), InboundMessage>>,
    competitor: Option<UserId>,
    scan_count: AtomicU32,
    left: Mutex<Vec<ServerId>>,
    edit_not_found: AtomicBool,
}

impl FakePlatform {
    fn new(competitor: Option<UserId>) -> Self {
        Self {
            next_hook_id: AtomicU32::new(70),
            competitor,
            ..Default::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn notices(&self) -> Vec<(ChannelId, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn current_user(&self) -> PlatformResult<UserId> {
        Ok(42)
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> PlatformResult<InboundMessage> {
        self.messages
            .lock()
            .unwrap()
            .get(&(channel_id, message_id))
            .cloned()
            .ok_or(PlatformError::NotFound { context: "fetch" })
    }

    async fn send_message(
        &self,
        _channel_id: ChannelId,
        content: &str,
        reply_to: Option<&MessageRef>,
    ) -> PlatformResult<MessageId> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent {
            delivery_id: 0,
            content: content.to_string(),
            replied_to: reply_to.and_then(|r| r.message_id),
        });
        Ok(1000 + sent.len() as u64)
    }

    async fn edit_message(
        &self,
        _channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> PlatformResult<()> {
        self.edits.lock().unwrap().push((0, message_id, content.to_string()));
        Ok(())
    }

    async fn list_webhooks(&self, _channel_id: ChannelId) -> PlatformResult<Vec<WebhookInfo>> {
        Ok(self.hooks.lock().unwrap().clone())
    }

    async fn create_webhook(&self, _channel_id: ChannelId, name: &str) -> PlatformResult<WebhookInfo> {
        let id = u64::from(self.next_hook_id.fetch_add(1, AtomicOrdering::SeqCst));
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
        _avatar_url: Option<&str>,
        reply_to: Option<&MessageRef>,
    ) -> PlatformResult<MessageId> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(Sent {
            delivery_id,
            content: content.to_string(),
            replied_to: reply_to.and_then(|r| r.message_id),
        });
        Ok(1000 + sent.len() as u64)
    }

    async fn edit_webhook_message(
        &self,
        delivery_id: DeliveryId,
        _token: &str,
        message_id: MessageId,
        content: &str,
    ) -> PlatformResult<()> {
        if self.edit_not_found.load(AtomicOrdering::SeqCst) {
            return Err(PlatformError::NotFound { context: "edit" });
        }
        self.edits
            .lock()
            .unwrap()
            .push((delivery_id, message_id, content.to_string()));
        Ok(())
    }

    async fn server_has_member_matching(
        &self,
        _server_id: ServerId,
        _ids: &HashSet<UserId>,
        _name_prefix: &str,
    ) -> PlatformResult<Option<UserId>> {
        self.scan_count.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(self.competitor)
    }

    async fn leave_server(&self, server_id: ServerId) -> PlatformResult<()> {
        self.left.lock().unwrap().push(server_id);
        Ok(())
    }

    async fn send_notice(&self, channel_id: ChannelId, content: &str) {
        self.notices.lock().unwrap().push((channel_id, content.to_string()));
    }
}

struct EchoTranslator;

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(
        &self,
        text: &str,
        _src: &str,
        _tgt: &str,
    ) -> babelink_translate::Result<String> {
        Ok(format!("T:{text}"))
    }
}

struct DownTranslator;

#[async_trait]
impl Translator for DownTranslator {
    async fn translate(
        &self,
        _text: &str,
        _src: &str,
        _tgt: &str,
    ) -> babelink_translate::Result<String> {
        Err(babelink_translate::Error::RateLimited)
    }
}

struct FakeQuotaStore {
    limit: i64,
    used: AtomicI64,
}

impl FakeQuotaStore {
    fn new(limit: i64, used: i64) -> Arc<Self> {
        Arc::new(Self {
            limit,
            used: AtomicI64::new(used),
        })
    }
}

#[async_trait]
impl QuotaStore for FakeQuotaStore {
    async fn ensure_row(&self, _server_id: ServerId, _name: &str) -> babelink_quota::Result<()> {
        Ok(())
    }

    async fn get_quota(&self, _server_id: ServerId) -> babelink_quota::Result<QuotaSnapshot> {
        let used = self.used.load(AtomicOrdering::SeqCst);
        Ok(QuotaSnapshot {
            translate_enabled: self.limit > 0,
            char_limit: self.limit,
            used_chars: used,
            remaining: self.limit - used,
            ..Default::default()
        })
    }

    async fn consume_chars(
        &self,
        _server_id: ServerId,
        amount: i64,
    ) -> babelink_quota::Result<(bool, i64)> {
        let used = self.used.fetch_add(amount, AtomicOrdering::SeqCst) + amount;
        Ok((used <= self.limit, self.limit - used))
    }
}

// ── harness ──

struct Harness {
    relay: Relay,
    platform: Arc<FakePlatform>,
    mappings: MappingStore,
    quota_store: Arc<FakeQuotaStore>,
}

fn fast_controls() -> ControlsConfig {
    ControlsConfig {
        concurrency: 2,
        timeout: Duration::from_millis(200),
        jitter_ms: 0,
        backoff: BackoffConfig {
            attempts: 2,
            base: 0.001,
            factor: 1.0,
            max_delay: 0.001,
            jitter_ms: 0,
        },
        provider_rate: 1000.0,
        provider_burst: 1000.0,
        breaker_threshold: 100,
        breaker_cooldown: Duration::from_secs(1),
    }
}

fn test_cfg() -> RelayConfig {
    RelayConfig {
        user_cooldown: Duration::ZERO,
        channel_cooldown: Duration::ZERO,
        dedupe_window: Duration::ZERO,
        proxy_check_delay: Duration::ZERO,
        ..RelayConfig::default()
    }
}

async fn build(
    translator: Arc<dyn Translator>,
    quota_store: Arc<FakeQuotaStore>,
    competitor: Option<UserId>,
    cfg: RelayConfig,
) -> Harness {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let links = LinkStore::new(pool.clone());
    links.link_pair(1, 100, "pt", 200, "en", 9).await.unwrap();
    let mappings = MappingStore::new(pool.clone());

    let platform = Arc::new(FakePlatform::new(competitor));
    let identities = Arc::new(DeliveryIdentities::new(
        platform.clone(),
        CredentialStore::new(pool.clone()),
        "Babelink Relay",
    ));
    let deliverer = Arc::new(Deliverer::new(
        platform.clone(),
        identities.clone(),
        reqwest::Client::new(),
        HashSet::new(),
    ));
    let relay = Relay::new(
        platform.clone(),
        Arc::new(ResilientTranslator::new(translator, fast_controls())),
        Arc::new(Glossary::empty("pt", "en")),
        Arc::new(QuotaLedger::new(quota_store.clone())),
        links,
        mappings.clone(),
        identities,
        deliverer,
        cfg,
    );
    relay.handle_event(PlatformEvent::Ready { user_id: 42 }).await;
    Harness {
        relay,
        platform,
        mappings,
        quota_store,
    }
}

async fn harness() -> Harness {
    build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        None,
        test_cfg(),
    )
    .await
}

fn msg(id: MessageId, channel: ChannelId, author: UserId, content: &str) -> InboundMessage {
    InboundMessage {
        id,
        server_id: Some(1),
        channel_id: channel,
        author: MessageAuthor {
            id: author,
            username: "ana".to_string(),
            display_name: Some("Ana".to_string()),
            avatar_url: None,
            bot: false,
        },
        content: content.to_string(),
        attachments: Vec::new(),
        webhook_id: None,
        reference: None,
        channel_kind: ChannelKind::Text,
    }
}

// ── message relay ──

#[tokio::test]
async fn relays_linked_message() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;

    let sent = h.platform.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].content.starts_with("T:olá mundo"));
    assert!(sent[0].content.ends_with(RELAY_MARKER));
    assert_eq!(sent[0].delivery_id, 70);

    let mapping = h.mappings.get_by_src(1, 11).await.unwrap().unwrap();
    assert_eq!(mapping.tgt_channel_id, 200);
    assert_eq!(mapping.delivery_id, 70);
    assert_eq!(mapping.tgt_msg_id, 1001);
}

#[tokio::test]
async fn marker_messages_are_ignored() {
    let h = harness().await;
    let content = format!("T:olá{RELAY_MARKER}");
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, &content)))
        .await;
    assert!(h.platform.sent().is_empty());
}

#[tokio::test]
async fn plain_bots_are_ignored() {
    let h = harness().await;
    let mut m = msg(11, 100, 9, "beep boop");
    m.author.bot = true;
    h.relay.handle_event(PlatformEvent::MessageCreate(m)).await;
    assert!(h.platform.sent().is_empty());
}

#[tokio::test]
async fn unlinked_channels_are_ignored() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 300, 9, "olá mundo")))
        .await;
    assert!(h.platform.sent().is_empty());
}

#[tokio::test]
async fn own_delivery_echo_is_ignored() {
    let h = harness().await;
    // First relay persists credential 70.
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    assert_eq!(h.platform.sent().len(), 1);

    // The relayed copy arrives back over the gateway with our webhook id.
    let mut echo = msg(1001, 200, 0, "T:olá mundo");
    echo.author.bot = true;
    echo.webhook_id = Some(70);
    h.relay.handle_event(PlatformEvent::MessageCreate(echo)).await;
    assert_eq!(h.platform.sent().len(), 1);
}

#[tokio::test]
async fn short_messages_are_not_relayed() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "x")))
        .await;
    // Three characters is still below the floor.
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "oi!")))
        .await;
    assert!(h.platform.sent().is_empty());
}

#[tokio::test]
async fn attachment_only_message_passes_short_gate() {
    let h = harness().await;
    let mut m = msg(11, 100, 9, "");
    m.attachments.push(Attachment {
        url: "https://cdn.example/photo.png".to_string(),
        filename: "photo.png".to_string(),
        content_type: Some("image/png".to_string()),
        spoiler: false,
    });
    h.relay.handle_event(PlatformEvent::MessageCreate(m)).await;
    let sent = h.platform.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].content.contains("https://cdn.example/photo.png"));
}

// ── quota behavior ──

#[tokio::test]
async fn near_cap_message_is_denied_with_notice_each_attempt() {
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 999_990),
        None,
        test_cfg(),
    )
    .await;
    // 20 characters needed, 10 remaining.
    let text = "vinte caracteres aqui";
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, text)))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, text)))
        .await;

    assert!(h.platform.sent().is_empty());
    let notices = h.platform.notices();
    assert_eq!(notices.len(), 2, "every denied attempt is told");
    assert!(notices.iter().all(|(_, n)| n.contains("quota exhausted")));
}

#[tokio::test]
async fn disabled_server_notice_is_throttled() {
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(0, 0),
        None,
        test_cfg(),
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "ainda aqui")))
        .await;

    assert!(h.platform.sent().is_empty());
    let notices = h.platform.notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("disabled"));
}

#[tokio::test]
async fn successful_relay_commits_used_chars() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    assert_eq!(h.quota_store.used.load(AtomicOrdering::SeqCst), 9);
}

#[tokio::test]
async fn provider_outage_drops_without_notice() {
    let h = build(
        Arc::new(DownTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        None,
        test_cfg(),
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    assert!(h.platform.sent().is_empty());
    assert!(h.platform.notices().is_empty());
    // Nothing was charged for the failed attempt.
    assert_eq!(h.quota_store.used.load(AtomicOrdering::SeqCst), 0);
    assert!(h.mappings.get_by_src(1, 11).await.unwrap().is_none());
}

// ── reply threading ──

#[tokio::test]
async fn reply_references_mapped_counterpart() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    let root = h.mappings.get_by_src(1, 11).await.unwrap().unwrap();

    let mut reply = msg(12, 100, 9, "respondendo aqui");
    reply.reference = Some(MessageRef::to_message(1, 100, 11));
    h.relay.handle_event(PlatformEvent::MessageCreate(reply)).await;

    let sent = h.platform.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].replied_to, Some(root.tgt_msg_id));
}

#[tokio::test]
async fn reply_to_unmapped_message_backfills_root_post() {
    let h = harness().await;
    // The referenced message predates the link; only the platform knows it.
    h.platform
        .messages
        .lock()
        .unwrap()
        .insert((100, 5), msg(5, 100, 8, "mensagem antiga"));

    let mut reply = msg(12, 100, 9, "respondendo ao passado");
    reply.reference = Some(MessageRef::to_message(1, 100, 5));
    h.relay.handle_event(PlatformEvent::MessageCreate(reply)).await;

    let sent = h.platform.sent();
    assert_eq!(sent.len(), 2);
    // Backfilled root goes out first, unreferenced.
    assert!(sent[0].content.starts_with("T:mensagem antiga"));
    assert_eq!(sent[0].replied_to, None);
    assert_eq!(sent[1].replied_to, Some(1001));
    // And it now has a mapping of its own.
    assert!(h.mappings.get_by_src(1, 5).await.unwrap().is_some());
}

#[tokio::test]
async fn unfetchable_reference_degrades_to_plain_send() {
    let h = harness().await;
    let mut reply = msg(12, 100, 9, "respondendo ao nada");
    reply.reference = Some(MessageRef::to_message(1, 100, 5));
    h.relay.handle_event(PlatformEvent::MessageCreate(reply)).await;

    let sent = h.platform.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].replied_to, None);
}

// ── edit propagation ──

#[tokio::test]
async fn edit_within_window_updates_target() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageUpdate(msg(11, 100, 9, "olá mundo editado")))
        .await;

    let edits = h.platform.edits.lock().unwrap().clone();
    assert_eq!(edits.len(), 1);
    let (delivery_id, target, content) = &edits[0];
    assert_eq!(*delivery_id, 70);
    assert_eq!(*target, 1001);
    assert!(content.starts_with("T:olá mundo editado"));
    assert!(content.ends_with(RELAY_MARKER));

    let mapping = h.mappings.get_by_src(1, 11).await.unwrap().unwrap();
    assert!(mapping.last_edit_at.is_some());
}

#[tokio::test]
async fn stale_edit_is_ignored() {
    let h = harness().await;
    h.mappings
        .record(&TranslationMapping {
            server_id: 1,
            src_msg_id: 11,
            src_channel_id: 100,
            tgt_msg_id: 1001,
            tgt_channel_id: 200,
            delivery_id: 70,
            created_at: now_ts() - 7200,
            last_edit_at: None,
        })
        .await
        .unwrap();
    h.relay
        .handle_event(PlatformEvent::MessageUpdate(msg(11, 100, 9, "tarde demais")))
        .await;
    assert!(h.platform.edits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn edit_of_unmapped_message_is_ignored() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageUpdate(msg(11, 100, 9, "nunca visto")))
        .await;
    assert!(h.platform.edits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn gone_edit_target_deletes_mapping() {
    let h = harness().await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    h.platform.edit_not_found.store(true, AtomicOrdering::SeqCst);
    h.relay
        .handle_event(PlatformEvent::MessageUpdate(msg(11, 100, 9, "olá de novo")))
        .await;
    assert!(h.mappings.get_by_src(1, 11).await.unwrap().is_none());
}

// ── competing bot ──

#[tokio::test]
async fn competitor_causes_notice_and_departure() {
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        Some(6),
        test_cfg(),
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "ainda aqui")))
        .await;

    assert!(h.platform.sent().is_empty());
    assert_eq!(h.platform.left.lock().unwrap().len(), 1);
    // Verdict is cached: one scan, one notice.
    assert_eq!(h.platform.scan_count.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(h.platform.notices().len(), 1);
}

#[tokio::test]
async fn server_join_invalidates_competitor_verdict() {
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        None,
        test_cfg(),
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "olá mundo")))
        .await;
    assert_eq!(h.platform.scan_count.load(AtomicOrdering::SeqCst), 1);
    h.relay
        .handle_event(PlatformEvent::ServerJoin {
            server_id: 1,
            name: "Guild".to_string(),
        })
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "de novo")))
        .await;
    assert_eq!(h.platform.scan_count.load(AtomicOrdering::SeqCst), 2);
}

// ── cooldowns and dedupe ──

#[tokio::test]
async fn user_cooldown_drops_rapid_second_message() {
    let cfg = RelayConfig {
        user_cooldown: Duration::from_secs(60),
        ..test_cfg()
    };
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        None,
        cfg,
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "primeira")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "segunda")))
        .await;
    // A different user is unaffected.
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(13, 100, 8, "terceira")))
        .await;
    assert_eq!(h.platform.sent().len(), 2);
}

#[tokio::test]
async fn event_mode_dedupe_drops_identical_repost() {
    let cfg = RelayConfig {
        dedupe_window: Duration::from_secs(3),
        ..test_cfg()
    };
    let h = build(
        Arc::new(EchoTranslator),
        FakeQuotaStore::new(1_000_000, 0),
        None,
        cfg,
    )
    .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(11, 100, 9, "gol do brasil")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(12, 100, 9, "gol do brasil")))
        .await;
    h.relay
        .handle_event(PlatformEvent::MessageCreate(msg(13, 100, 9, "outro assunto")))
        .await;
    assert_eq!(h.platform.sent().len(), 2);
}

// ── edit content composition ──

#[test]
fn edit_content_appends_links_and_marker() {
    let out = compose_edit_content(
        "texto editado",
        &["https://imgur.com/abc12".to_string()],
    );
    assert!(out.starts_with("texto editado\nhttps://i.imgur.com/abc12"));
    assert!(out.ends_with(RELAY_MARKER));
}

#[test]
fn pure_url_edit_gets_no_marker() {
    let out = compose_edit_content("", &["https://example.com/x".to_string()]);
    assert_eq!(out, "https://example.com/x");
}

#[test]
fn oversized_edit_fits_platform_limit() {
    let text = "a".repeat(MAX_MSG_LEN + 50);
    let out = compose_edit_content(&text, &["https://example.org/pic.png".to_string()]);
    assert!(out.chars().count() <= MAX_MSG_LEN);
    assert!(out.contains("https://example.org/pic.png"));
    assert!(out.ends_with(RELAY_MARKER));
}
