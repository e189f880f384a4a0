use std::{sync::Arc, time::Duration};

use {
    rand::Rng,
    tokio::sync::Semaphore,
    tracing::{debug, warn},
};

use babelink_resilience::{BackoffConfig, CircuitBreaker, ExponentialBackoff, TokenBucket};

use crate::Translator;

/// Tunables for the resilient wrapper, normally filled from settings.
#[derive(Debug, Clone, Copy)]
pub struct ControlsConfig {
    /// Max concurrent in-flight provider calls.
    pub concurrency: usize,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Uniform pre-call jitter, to de-synchronize event bursts.
    pub jitter_ms: u64,
    pub backoff: BackoffConfig,
    pub provider_rate: f64,
    pub provider_burst: f64,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            timeout: Duration::from_secs(8),
            jitter_ms: 150,
            backoff: BackoffConfig::default(),
            provider_rate: 12.0,
            provider_burst: 24.0,
            breaker_threshold: 6,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

/// Provider wrapper combining the breaker, pre-call jitter, the shared rate
/// limit, a concurrency cap, per-attempt timeouts, and retry with backoff.
///
/// The outcome is deliberately soft: `None` means "translation unavailable
/// right now" and the caller drops the message rather than erroring.
pub struct ResilientTranslator {
    inner: Arc<dyn Translator>,
    semaphore: Arc<Semaphore>,
    bucket: TokenBucket,
    breaker: CircuitBreaker,
    backoff: BackoffConfig,
    timeout: Duration,
    jitter_ms: u64,
}

impl ResilientTranslator {
    #[must_use]
    pub fn new(inner: Arc<dyn Translator>, cfg: ControlsConfig) -> Self {
        Self {
            inner,
            semaphore: Arc::new(Semaphore::new(cfg.concurrency.max(1))),
            bucket: TokenBucket::new(cfg.provider_rate, cfg.provider_burst),
            breaker: CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_cooldown),
            backoff: cfg.backoff,
            timeout: cfg.timeout,
            jitter_ms: cfg.jitter_ms,
        }
    }

    pub async fn translate(&self, text: &str, src_lang: &str, tgt_lang: &str) -> Option<String> {
        if self.breaker.is_open() {
            debug!(src_lang, tgt_lang, "breaker open, skipping translation");
            return None;
        }

        if self.jitter_ms > 0 {
            let jitter = rand::rng().random_range(0..=self.jitter_ms);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
        self.bucket.acquire().await;

        // Closed-semaphore means shutdown; treat as unavailable.
        let _permit = self.semaphore.acquire().await.ok()?;

        let mut backoff = ExponentialBackoff::new(self.backoff);
        let attempts = self.backoff.attempts.max(1);
        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, self.inner.translate(text, src_lang, tgt_lang))
                .await
            {
                Ok(Ok(out)) => {
                    self.breaker.on_success();
                    return Some(out);
                },
                Ok(Err(e)) if e.is_retryable() => {
                    self.breaker.on_failure();
                    debug!(attempt, error = %e, "transient translation failure");
                },
                Ok(Err(e)) => {
                    warn!(src_lang, tgt_lang, error = %e, "translation rejected");
                    return None;
                },
                Err(_) => {
                    self.breaker.on_failure();
                    debug!(attempt, timeout_secs = self.timeout.as_secs_f64(), "translation attempt timed out");
                },
            }
            if attempt < attempts {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
        warn!(src_lang, tgt_lang, attempts, "translation attempts exhausted");
        None
    }
}
