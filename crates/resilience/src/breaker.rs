use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::warn;

struct BreakerState {
    fail_count: u32,
    open_until: Option<Instant>,
}

/// Circuit breaker around the translation provider.
///
/// Closed by default. Consecutive failures up to `fail_threshold` open the
/// breaker for `cooldown`; any success resets the count. While open, callers
/// must short-circuit without attempting the call.
pub struct CircuitBreaker {
    fail_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(fail_threshold: u32, cooldown: Duration) -> Self {
        Self {
            fail_threshold: fail_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState {
                fail_count: 0,
                open_until: None,
            }),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.open_until.is_some_and(|t| Instant::now() < t)
    }

    pub fn on_success(&self) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.fail_count = 0;
    }

    pub fn on_failure(&self) {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.fail_count += 1;
        if st.fail_count >= self.fail_threshold {
            st.open_until = Some(Instant::now() + self.cooldown);
            st.fail_count = 0;
            warn!(cooldown_secs = self.cooldown.as_secs_f64(), "circuit breaker opened");
        }
    }

    /// Current consecutive-failure count (test/introspection hook).
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        let st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        st.fail_count
    }
}
