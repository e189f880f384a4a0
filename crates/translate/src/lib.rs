//! Translation: provider trait, the Google web endpoint client, and the
//! resilient invocation wrapper that all relay translation goes through.

mod controls;
pub mod error;
mod google;

pub use {
    controls::{ControlsConfig, ResilientTranslator},
    error::{Error, Result},
    google::GoogleWebTranslator,
};

use async_trait::async_trait;

/// A translation provider. Implementations map provider-specific failures
/// onto [`Error`] so the retry layer can tell transient from fatal.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, src_lang: &str, tgt_lang: &str) -> Result<String>;
}
