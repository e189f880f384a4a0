use std::{sync::Arc, time::Duration};

use {
    clap::Parser,
    tokio::sync::mpsc,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    babelink_config::Settings,
    babelink_delivery::{Deliverer, DeliveryIdentities},
    babelink_glossary::Glossary,
    babelink_platform::{RestPlatform, gateway},
    babelink_quota::{HttpQuotaStore, QuotaLedger},
    babelink_relay::{Relay, RelayConfig, retention_sweep},
    babelink_resilience::BackoffConfig,
    babelink_store::{CredentialStore, LinkStore, MappingStore, TermStore, run_migrations},
    babelink_translate::{ControlsConfig, GoogleWebTranslator, ResilientTranslator},
};

#[derive(Parser)]
#[command(name = "babelink", about = "Babelink — bilingual channel translation relay")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// SQLite database path (overrides BABELINK_DB).
    #[arg(long)]
    db: Option<String>,

    /// Load environment from this file instead of ./.env.
    #[arg(long)]
    env_file: Option<std::path::PathBuf>,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .init();
    }
}

fn controls_config(s: &Settings) -> ControlsConfig {
    ControlsConfig {
        concurrency: s.concurrency,
        timeout: s.translate_timeout,
        jitter_ms: s.jitter_ms,
        backoff: BackoffConfig {
            attempts: s.retry_attempts,
            base: s.retry_base,
            factor: s.retry_factor,
            max_delay: s.retry_max_delay,
            jitter_ms: s.retry_jitter_ms,
        },
        provider_rate: s.provider_rate,
        provider_burst: s.provider_burst,
        breaker_threshold: s.cb_fail_threshold,
        breaker_cooldown: s.cb_cooldown,
    }
}

fn relay_config(s: &Settings) -> RelayConfig {
    RelayConfig {
        user_cooldown: s.effective_user_cooldown(),
        channel_cooldown: s.effective_channel_cooldown(),
        dedupe_window: if s.event_mode {
            s.dedupe_window
        } else {
            Duration::ZERO
        },
        edit_window_secs: s.edit_window_secs,
        block_competitor: s.block_competitor,
        competitor_ids: s.competitor_ids.clone(),
        competitor_name_prefix: s.competitor_name_prefix.clone(),
        ..RelayConfig::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        },
        None => {
            dotenvy::dotenv().ok();
        },
    }
    init_telemetry(&cli);

    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %settings.db_path,
        event_mode = settings.event_mode,
        "babelink starting"
    );

    let opts = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&settings.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(opts).await?;
    run_migrations(&pool).await?;

    let terms = TermStore::new(pool.clone()).load_all().await?;
    info!(terms = terms.len(), "glossary loaded");
    let glossary = Arc::new(Glossary::compile(
        &terms,
        &settings.glossary_lang_a,
        &settings.glossary_lang_b,
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let platform = Arc::new(RestPlatform::new(
        settings.api_base.clone(),
        settings.token.clone(),
        http.clone(),
    ));
    let quota = Arc::new(QuotaLedger::new(Arc::new(HttpQuotaStore::new(
        settings.quota_url.clone(),
        settings.quota_key.clone(),
        http.clone(),
    ))));
    let translator = Arc::new(ResilientTranslator::new(
        Arc::new(GoogleWebTranslator::new(
            GoogleWebTranslator::DEFAULT_BASE,
            http.clone(),
        )),
        controls_config(&settings),
    ));
    let identities = Arc::new(DeliveryIdentities::new(
        platform.clone(),
        CredentialStore::new(pool.clone()),
        settings.delivery_name.clone(),
    ));
    let deliverer = Arc::new(Deliverer::new(
        platform.clone(),
        identities.clone(),
        http,
        settings.direct_embed_domains.clone(),
    ));

    let mappings = MappingStore::new(pool.clone());
    let relay = Arc::new(Relay::new(
        platform,
        translator,
        glossary,
        quota,
        LinkStore::new(pool.clone()),
        mappings.clone(),
        identities,
        deliverer,
        relay_config(&settings),
    ));

    tokio::spawn(retention_sweep(
        mappings,
        settings.map_retention_secs,
        settings.sweep_interval,
    ));

    let (tx, mut rx) = mpsc::channel(256);
    let gateway_url = settings.gateway_url.clone();
    let token = settings.token.clone();
    tokio::spawn(async move {
        gateway::run(&gateway_url, &token, tx).await;
    });

    while let Some(event) = rx.recv().await {
        let relay = relay.clone();
        tokio::spawn(async move {
            relay.handle_event(event).await;
        });
    }
    warn!("gateway channel closed, shutting down");
    Ok(())
}
