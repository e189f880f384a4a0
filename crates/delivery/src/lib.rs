//! Delivery identities (spoofed per-channel webhooks) and the send paths
//! that put composed translations on the wire.

mod identities;
mod send;
#[cfg(test)]
mod testutil;

pub use {
    identities::{DeliveryIdentities, DeliveryIdentity},
    send::{Deliverer, SpeakerProfile},
};
