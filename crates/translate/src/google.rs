use {async_trait::async_trait, serde_json::Value};

use crate::{
    Translator,
    error::{Error, Result},
};

/// Hard input cap for the public endpoint; longer inputs get truncated
/// before the request rather than rejected.
const MAX_PROVIDER_CHARS: usize = 4800;

/// Client for the unauthenticated Google web translation endpoint
/// (`/translate_a/single?client=gtx`).
pub struct GoogleWebTranslator {
    base: String,
    client: reqwest::Client,
}

impl GoogleWebTranslator {
    pub const DEFAULT_BASE: &'static str = "https://translate.googleapis.com";

    #[must_use]
    pub fn new(base: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl Translator for GoogleWebTranslator {
    async fn translate(&self, text: &str, src_lang: &str, tgt_lang: &str) -> Result<String> {
        let input: String = text.chars().take(MAX_PROVIDER_CHARS).collect();
        let url = format!("{}/translate_a/single", self.base);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", src_lang),
                ("tl", tgt_lang),
                ("dt", "t"),
                ("q", input.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200 => {},
            429 => return Err(Error::RateLimited),
            500..=599 => return Err(Error::Upstream { status }),
            _ => return Err(Error::Rejected { status }),
        }

        // Response shape: [[["segment", "source", ...], ...], ...]
        let body: Value = resp.json().await.map_err(|_| Error::Malformed)?;
        let segments = body
            .get(0)
            .and_then(Value::as_array)
            .ok_or(Error::Malformed)?;
        let mut out = String::new();
        for seg in segments {
            if let Some(piece) = seg.get(0).and_then(Value::as_str) {
                out.push_str(piece);
            }
        }
        if out.is_empty() {
            return Err(Error::Malformed);
        }
        Ok(out)
    }
}
