use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use tracing::{debug, warn};

use babelink_common::types::ServerId;

use crate::store::{QuotaSnapshot, QuotaStore};

/// Usage floor below which a server's 90% warning re-arms (the cycle reset
/// dropped usage back down).
const WARN_REARM_FLOOR: i64 = 1000;

/// Outcome of a quota precheck.
#[derive(Debug, Clone, Copy)]
pub struct Precheck {
    pub ok: bool,
    pub used: i64,
    pub cap: i64,
}

/// A pending "90% of quota consumed" warning for a server.
#[derive(Debug, Clone, Copy)]
pub struct QuotaWarning {
    pub used: i64,
    pub cap: i64,
}

/// Two-phase quota client: `precheck` before translation, `commit` after a
/// successful delivery. Charging only after delivery would allow unbounded
/// overdraft under concurrency; charging before would overcount failures.
pub struct QuotaLedger {
    store: Arc<dyn QuotaStore>,
    warned: Mutex<HashSet<ServerId>>,
}

impl QuotaLedger {
    #[must_use]
    pub fn new(store: Arc<dyn QuotaStore>) -> Self {
        Self {
            store,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Ensure the server has a row, then fetch its snapshot. Row creation is
    /// best-effort; the snapshot read is what matters.
    pub async fn ensure_and_snapshot(&self, server_id: ServerId, name: &str) -> Option<QuotaSnapshot> {
        if let Err(e) = self.store.ensure_row(server_id, name).await {
            debug!(server_id, error = %e, "quota ensure_row failed");
        }
        match self.store.get_quota(server_id).await {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!(server_id, error = %e, "quota snapshot read failed");
                None
            },
        }
    }

    /// Would translating `needed_chars` characters be allowed right now?
    ///
    /// Fails closed: a store error, a disabled store, or an over-cap total
    /// all deny. Zero or negative need (attachment/link-only messages)
    /// always passes without touching the store.
    pub async fn precheck(&self, server_id: ServerId, needed_chars: i64) -> Precheck {
        if needed_chars <= 0 {
            return Precheck {
                ok: true,
                used: 0,
                cap: 0,
            };
        }
        match self.store.get_quota(server_id).await {
            Ok(snap) => {
                let ok = snap.translate_enabled && snap.used_chars + needed_chars <= snap.char_limit;
                Precheck {
                    ok,
                    used: snap.used_chars,
                    cap: snap.char_limit,
                }
            },
            Err(e) => {
                warn!(server_id, error = %e, "quota precheck failed closed");
                Precheck {
                    ok: false,
                    used: 0,
                    cap: 0,
                }
            },
        }
    }

    /// Record `delta` spent characters. Call only after translate + deliver
    /// succeeded. `delta <= 0` is a no-op success. `false` means the spend
    /// could not be recorded and the caller must abort the rest of the
    /// pipeline.
    pub async fn commit(&self, server_id: ServerId, delta: i64) -> bool {
        if delta <= 0 {
            return true;
        }
        match self.store.consume_chars(server_id, delta).await {
            Ok((allowed, remaining)) => {
                debug!(server_id, delta, allowed, remaining, "quota commit");
                allowed
            },
            Err(e) => {
                warn!(server_id, delta, error = %e, "quota commit failed");
                false
            },
        }
    }

    /// Opportunistic check for the 90%-consumed warning. At most one warning
    /// per server until usage falls back below the re-arm floor. Never
    /// blocks the pipeline: errors just skip the check.
    pub async fn check_90pct(&self, server_id: ServerId) -> Option<QuotaWarning> {
        let snap = match self.store.get_quota(server_id).await {
            Ok(snap) => snap,
            Err(e) => {
                debug!(server_id, error = %e, "90% check skipped");
                return None;
            },
        };
        let mut warned = self.warned.lock().unwrap_or_else(|e| e.into_inner());
        if snap.used_chars < WARN_REARM_FLOOR {
            warned.remove(&server_id);
            return None;
        }
        if snap.char_limit > 0
            && snap.used_chars * 10 >= snap.char_limit * 9
            && warned.insert(server_id)
        {
            return Some(QuotaWarning {
                used: snap.used_chars,
                cap: snap.char_limit,
            });
        }
        None
    }
}
