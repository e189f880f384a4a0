//! Two-phase character-quota protocol against an external balance store.
//!
//! `precheck` answers "would this be allowed" before any translation cost is
//! incurred; `commit` records the spend only after translate + deliver both
//! succeeded. Reads fail closed: an unreachable store denies the message.

mod error;
mod ledger;
mod store;

pub use {
    error::{Error, Result},
    ledger::{Precheck, QuotaLedger, QuotaWarning},
    store::{HttpQuotaStore, QuotaSnapshot, QuotaStore},
};
