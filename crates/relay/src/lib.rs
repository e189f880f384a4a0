//! The relay orchestrator: inbound guard chain, the translate-and-deliver
//! pipeline, reply threading, edit propagation, and the mapping retention
//! sweep.

mod engine;
mod state;
mod sweep;

pub use {
    engine::{Relay, RelayConfig},
    sweep::retention_sweep,
};
