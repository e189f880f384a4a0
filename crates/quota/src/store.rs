use {
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::{Value, json},
};

use babelink_common::types::ServerId;

use crate::error::{Error, Result};

/// Read-mostly view of a server's quota state. Owned by the external store;
/// the core never caches `used_chars` across the precheck/commit boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaSnapshot {
    #[serde(default)]
    pub translate_enabled: bool,
    #[serde(default)]
    pub char_limit: i64,
    #[serde(default)]
    pub used_chars: i64,
    #[serde(default)]
    pub remaining: i64,
    #[serde(default)]
    pub cycle_start: Option<String>,
    #[serde(default)]
    pub next_reset: Option<String>,
}

/// External balance store interface. Administration of limits and billing
/// cycles happens elsewhere; the bot only reads and consumes.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Make sure a row exists for the server (idempotent upsert).
    async fn ensure_row(&self, server_id: ServerId, name: &str) -> Result<()>;

    /// Current snapshot for the server.
    async fn get_quota(&self, server_id: ServerId) -> Result<QuotaSnapshot>;

    /// Atomically consume `amount` characters. Returns `(allowed, remaining)`.
    async fn consume_chars(&self, server_id: ServerId, amount: i64) -> Result<(bool, i64)>;
}

/// Supabase-style REST implementation: RPC endpoints under
/// `/rest/v1/rpc/<name>`, table upserts under `/rest/v1/<table>`.
pub struct HttpQuotaStore {
    base: String,
    key: String,
    client: reqwest::Client,
}

impl HttpQuotaStore {
    #[must_use]
    pub fn new(base: impl Into<String>, key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            key: key.into(),
            client,
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.key)
            .header("Authorization", format!("Bearer {}", self.key))
            .header("Content-Type", "application/json")
    }

    /// Call an RPC endpoint, normalizing the response into a row list.
    async fn rpc(&self, call: &'static str, payload: Value) -> Result<Vec<Value>> {
        let url = format!("{}/rest/v1/rpc/{call}", self.base);
        let resp = self.auth(self.client.post(&url)).json(&payload).send().await?;
        let status = resp.status();
        if status.as_u16() == 204 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                call,
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        match resp.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            one => Ok(vec![one]),
        }
    }
}

#[async_trait]
impl QuotaStore for HttpQuotaStore {
    async fn ensure_row(&self, server_id: ServerId, name: &str) -> Result<()> {
        let url = format!("{}/rest/v1/quotas?on_conflict=server_id", self.base);
        let resp = self
            .auth(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "server_id": server_id.to_string(), "server_name": name }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                call: "ensure_row",
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        Ok(())
    }

    async fn get_quota(&self, server_id: ServerId) -> Result<QuotaSnapshot> {
        let rows = self
            .rpc("rpc_quota_get", json!({ "p_server_id": server_id.to_string() }))
            .await?;
        match rows.into_iter().next() {
            // No row yet: a defaulted snapshot (disabled, zero limits).
            None => Ok(QuotaSnapshot::default()),
            Some(row) => {
                serde_json::from_value(row).map_err(|_| Error::Malformed { call: "rpc_quota_get" })
            },
        }
    }

    async fn consume_chars(&self, server_id: ServerId, amount: i64) -> Result<(bool, i64)> {
        let rows = self
            .rpc(
                "rpc_quota_consume_chars",
                json!({ "p_server_id": server_id.to_string(), "p_amount": amount }),
            )
            .await?;
        let Some(row) = rows.into_iter().next() else {
            // No row returned: treat as not allowed.
            return Ok((false, 0));
        };
        let allowed = row.get("allowed").and_then(Value::as_bool).unwrap_or(false);
        let remaining = row.get("remaining").and_then(Value::as_i64).unwrap_or(0);
        Ok((allowed, remaining))
    }
}
