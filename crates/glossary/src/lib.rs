//! Bidirectional glossary term protection.
//!
//! Known terms are swapped for placeholder tokens before the text goes to
//! the translation provider, then swapped back afterwards with the casing of
//! the matched source mirrored onto the destination term. Placeholders
//! contain no translatable characters, so the provider leaves them alone.

mod engine;

pub use engine::{Glossary, ProtectedTag};
