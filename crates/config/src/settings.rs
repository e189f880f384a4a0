use std::{collections::HashSet, time::Duration};

use tracing::warn;

/// Startup configuration errors. Only genuinely required values (the bot
/// token and the quota store coordinates) abort startup.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// All runtime tunables, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bot token for the chat platform.
    pub token: String,
    /// SQLite database path.
    pub db_path: String,
    /// Base URL of the quota store's REST API.
    pub quota_url: String,
    /// Service key for the quota store.
    pub quota_key: String,
    /// Platform REST API base URL.
    pub api_base: String,
    /// Platform gateway websocket URL.
    pub gateway_url: String,

    /// Cap on in-flight translation requests (semaphore width).
    pub concurrency: usize,
    /// Per-attempt translation timeout.
    pub translate_timeout: Duration,
    /// Upper bound of the random pre-translate jitter sleep, in ms.
    pub jitter_ms: u64,

    pub retry_attempts: u32,
    pub retry_base: f64,
    pub retry_factor: f64,
    pub retry_max_delay: f64,
    pub retry_jitter_ms: u64,

    pub cb_fail_threshold: u32,
    pub cb_cooldown: Duration,

    /// Translation provider rate cap, requests per second.
    pub provider_rate: f64,
    /// Token-bucket burst capacity.
    pub provider_burst: f64,

    pub user_cooldown: Duration,
    pub channel_cooldown: Duration,
    /// Event mode switches to the alternate cooldowns and enables dedupe.
    pub event_mode: bool,
    pub user_cooldown_event: Duration,
    pub channel_cooldown_event: Duration,
    pub dedupe_window: Duration,

    /// How long after delivery a source edit still propagates.
    pub edit_window_secs: i64,
    /// How long mappings are retained before the sweep purges them.
    /// Deliberately much longer than the edit window.
    pub map_retention_secs: i64,
    /// Interval between retention sweep passes.
    pub sweep_interval: Duration,

    /// Competing-translation-bot guard.
    pub block_competitor: bool,
    pub competitor_ids: HashSet<u64>,
    pub competitor_name_prefix: String,

    /// Hosts whose bare links may be resolved to direct media assets.
    pub direct_embed_domains: HashSet<String>,
    /// Display name used for delivery identities we create.
    pub delivery_name: String,

    /// Language pair the glossary protects between. Links in other pairs
    /// still relay; glossary protection just won't apply to them.
    pub glossary_lang_a: String,
    pub glossary_lang_b: String,
}

impl Settings {
    /// Read settings from the environment. `.env` files should already have
    /// been loaded by the caller (the binary does this via dotenvy).
    pub fn from_env() -> Result<Self, SettingsError> {
        let token = require("BABELINK_TOKEN")?;
        let quota_url = require("BABELINK_QUOTA_URL")?;
        let quota_key = require("BABELINK_QUOTA_KEY")?;

        Ok(Self {
            token,
            db_path: get_str("BABELINK_DB", "babelink.sqlite"),
            quota_url,
            quota_key,
            api_base: get_str("BABELINK_API_BASE", "https://discord.com/api/v10"),
            gateway_url: get_str(
                "BABELINK_GATEWAY_URL",
                "wss://gateway.discord.gg/?v=10&encoding=json",
            ),
            concurrency: get_parsed("BABELINK_CONCURRENCY", 6),
            translate_timeout: secs_f64(get_parsed("BABELINK_TRANSLATE_TIMEOUT", 8.0)),
            jitter_ms: get_parsed("BABELINK_JITTER_MS", 150),
            retry_attempts: get_parsed("BABELINK_RETRY_ATTEMPTS", 3),
            retry_base: get_parsed("BABELINK_RETRY_BASE", 0.3),
            retry_factor: get_parsed("BABELINK_RETRY_FACTOR", 2.0),
            retry_max_delay: get_parsed("BABELINK_RETRY_MAX", 2.0),
            retry_jitter_ms: get_parsed("BABELINK_RETRY_JITTER_MS", 150),
            cb_fail_threshold: get_parsed("BABELINK_CB_THRESHOLD", 6),
            cb_cooldown: secs_f64(get_parsed("BABELINK_CB_COOLDOWN", 30.0)),
            provider_rate: get_parsed("BABELINK_PROVIDER_RATE", 12.0),
            provider_burst: get_parsed("BABELINK_PROVIDER_BURST", 24.0),
            user_cooldown: secs_f64(get_parsed("BABELINK_USER_COOLDOWN", 2.0)),
            channel_cooldown: secs_f64(get_parsed("BABELINK_CHANNEL_COOLDOWN", 0.15)),
            event_mode: get_bool("BABELINK_EVENT_MODE", false),
            user_cooldown_event: secs_f64(get_parsed("BABELINK_USER_COOLDOWN_EVENT", 1.5)),
            channel_cooldown_event: secs_f64(get_parsed("BABELINK_CHANNEL_COOLDOWN_EVENT", 2.0)),
            dedupe_window: secs_f64(get_parsed("BABELINK_DEDUPE_WINDOW", 3.0)),
            edit_window_secs: get_parsed("BABELINK_EDIT_WINDOW_SEC", 3600),
            map_retention_secs: get_parsed("BABELINK_MAP_RETENTION_SEC", 30 * 24 * 3600),
            sweep_interval: Duration::from_secs(get_parsed("BABELINK_SWEEP_INTERVAL_SEC", 600)),
            block_competitor: get_bool("BABELINK_BLOCK_COMPETITOR", true),
            competitor_ids: id_set(&get_str("BABELINK_COMPETITOR_IDS", "")),
            competitor_name_prefix: get_str("BABELINK_COMPETITOR_NAME", "rita").to_lowercase(),
            direct_embed_domains: domain_set(&get_str(
                "BABELINK_DIRECT_EMBED_DOMAINS",
                "imgur.com",
            )),
            delivery_name: get_str("BABELINK_DELIVERY_NAME", "Babelink Relay"),
            glossary_lang_a: get_str("BABELINK_GLOSSARY_LANG_A", "pt").to_lowercase(),
            glossary_lang_b: get_str("BABELINK_GLOSSARY_LANG_B", "en").to_lowercase(),
        })
    }

    /// Effective per-user cooldown for the current mode.
    #[must_use]
    pub fn effective_user_cooldown(&self) -> Duration {
        if self.event_mode {
            self.user_cooldown_event
        } else {
            self.user_cooldown
        }
    }

    /// Effective per-channel cooldown for the current mode.
    #[must_use]
    pub fn effective_channel_cooldown(&self) -> Duration {
        if self.event_mode {
            self.channel_cooldown_event
        } else {
            self.channel_cooldown
        }
    }
}

fn require(name: &'static str) -> Result<String, SettingsError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(SettingsError::MissingVar(name))
}

fn get_str(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn get_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn get_parsed<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => parse_or(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(name: &str, raw: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(var = name, value = raw, %default, "invalid value, using default");
            default
        },
    }
}

fn secs_f64(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

/// Parse a comma-separated list of numeric ids, skipping junk entries.
fn id_set(raw: &str) -> HashSet<u64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect()
}

fn domain_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_junk() {
        assert_eq!(parse_or("X", "not-a-number", 6u32), 6);
        assert_eq!(parse_or("X", "12", 6u32), 12);
        assert_eq!(parse_or("X", " 2.5 ", 1.0f64), 2.5);
    }

    #[test]
    fn id_set_skips_junk_entries() {
        let ids = id_set("123, abc, 456,,");
        assert!(ids.contains(&123) && ids.contains(&456));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn domain_set_lowercases() {
        let doms = domain_set("Imgur.com, cdn.example.ORG");
        assert!(doms.contains("imgur.com"));
        assert!(doms.contains("cdn.example.org"));
    }
}
