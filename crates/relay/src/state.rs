use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::Mutex,
    time::{Duration, Instant},
};

/// Last-pass stamps keyed by id. A zero window disables the gate entirely.
pub(crate) struct CooldownMap {
    window: Duration,
    last: Mutex<HashMap<u64, Instant>>,
}

impl CooldownMap {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `key` may act now. Passing stamps the key.
    pub fn try_pass(&self, key: u64) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match last.get(&key) {
            Some(t) if now.duration_since(*t) < self.window => false,
            _ => {
                last.insert(key, now);
                true
            },
        }
    }
}

/// Short-window duplicate suppression for event mode, keyed by
/// (channel, author, content hash).
pub(crate) struct DedupeCache {
    window: Duration,
    seen: Mutex<HashMap<(u64, u64, u64), Instant>>,
}

impl DedupeCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_duplicate(&self, channel: u64, author: u64, content: &str) -> bool {
        if self.window.is_zero() {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        let key = (channel, author, hasher.finish());

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if seen.len() > 256 {
            seen.retain(|_, t| now.duration_since(*t) < self.window);
        }
        match seen.get(&key) {
            Some(t) if now.duration_since(*t) < self.window => true,
            _ => {
                seen.insert(key, now);
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_window_never_blocks() {
        let gate = CooldownMap::new(Duration::ZERO);
        assert!(gate.try_pass(1));
        assert!(gate.try_pass(1));
    }

    #[test]
    fn cooldown_blocks_within_window() {
        let gate = CooldownMap::new(Duration::from_secs(60));
        assert!(gate.try_pass(1));
        assert!(!gate.try_pass(1));
        // Different keys are independent.
        assert!(gate.try_pass(2));
    }

    #[test]
    fn dedupe_matches_same_triple_only() {
        let cache = DedupeCache::new(Duration::from_secs(3));
        assert!(!cache.is_duplicate(100, 9, "olá"));
        assert!(cache.is_duplicate(100, 9, "olá"));
        assert!(!cache.is_duplicate(100, 9, "olá!"));
        assert!(!cache.is_duplicate(101, 9, "olá"));
    }
}
