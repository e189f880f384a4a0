use std::collections::HashSet;

use {
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::warn,
};

use babelink_common::types::{ChannelId, DeliveryId, MessageId, ServerId, UserId};

use crate::{
    ChatPlatform,
    error::{Error, Result},
    types::{InboundMessage, MessageRef, WebhookInfo, WireMessage, snowflake},
};

/// REST client for a Discord-style HTTP API. The base URL is configurable so
/// tests can point it at a local mock server.
pub struct RestPlatform {
    base: String,
    token: String,
    client: reqwest::Client,
}

impl RestPlatform {
    #[must_use]
    pub fn new(base: impl Into<String>, token: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bot {}", self.token))
    }

    async fn check(resp: reqwest::Response, context: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound { context });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                context,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        Ok(resp)
    }

    fn message_payload(content: &str, reply_to: Option<&MessageRef>) -> Value {
        let mut payload = json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        if let Some(r) = reply_to
            && let Some(message_id) = r.message_id
        {
            payload["message_reference"] = json!({
                "message_id": message_id.to_string(),
                "fail_if_not_exists": false,
            });
        }
        payload
    }
}

#[derive(Deserialize)]
struct WireWebhook {
    #[serde(with = "snowflake")]
    id: u64,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    user: Option<WireWebhookUser>,
}

#[derive(Deserialize)]
struct WireWebhookUser {
    #[serde(with = "snowflake")]
    id: u64,
}

impl From<WireWebhook> for WebhookInfo {
    fn from(w: WireWebhook) -> Self {
        Self {
            id: w.id,
            token: w.token,
            name: w.name,
            creator_id: w.user.map(|u| u.id),
        }
    }
}

#[derive(Deserialize)]
struct WireMember {
    user: WireMemberUser,
    #[serde(default)]
    nick: Option<String>,
}

#[derive(Deserialize)]
struct WireMemberUser {
    #[serde(with = "snowflake")]
    id: u64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct WireCreatedMessage {
    #[serde(with = "snowflake")]
    id: u64,
}

#[derive(Deserialize)]
struct WireUser {
    #[serde(with = "snowflake")]
    id: u64,
}

#[async_trait]
impl ChatPlatform for RestPlatform {
    async fn current_user(&self) -> Result<UserId> {
        let url = format!("{}/users/@me", self.base);
        let resp = self.auth(self.client.get(&url)).send().await?;
        let user: WireUser = Self::check(resp, "current_user")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "current_user",
            })?;
        Ok(user.id)
    }

    async fn fetch_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<InboundMessage> {
        let url = format!("{}/channels/{channel_id}/messages/{message_id}", self.base);
        let resp = self.auth(self.client.get(&url)).send().await?;
        let wire: WireMessage = Self::check(resp, "fetch_message")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "fetch_message",
            })?;
        Ok(wire.into())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        reply_to: Option<&MessageRef>,
    ) -> Result<MessageId> {
        let url = format!("{}/channels/{channel_id}/messages", self.base);
        let resp = self
            .auth(self.client.post(&url))
            .json(&Self::message_payload(content, reply_to))
            .send()
            .await?;
        let created: WireCreatedMessage = Self::check(resp, "send_message")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "send_message",
            })?;
        Ok(created.id)
    }

    async fn edit_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        let url = format!("{}/channels/{channel_id}/messages/{message_id}", self.base);
        let resp = self
            .auth(self.client.patch(&url))
            .json(&json!({ "content": content, "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        Self::check(resp, "edit_message").await?;
        Ok(())
    }

    async fn list_webhooks(&self, channel_id: ChannelId) -> Result<Vec<WebhookInfo>> {
        let url = format!("{}/channels/{channel_id}/webhooks", self.base);
        let resp = self.auth(self.client.get(&url)).send().await?;
        let hooks: Vec<WireWebhook> = Self::check(resp, "list_webhooks")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "list_webhooks",
            })?;
        Ok(hooks.into_iter().map(Into::into).collect())
    }

    async fn create_webhook(&self, channel_id: ChannelId, name: &str) -> Result<WebhookInfo> {
        let url = format!("{}/channels/{channel_id}/webhooks", self.base);
        let resp = self
            .auth(self.client.post(&url))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let hook: WireWebhook = Self::check(resp, "create_webhook")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "create_webhook",
            })?;
        Ok(hook.into())
    }

    async fn execute_webhook(
        &self,
        delivery_id: DeliveryId,
        token: &str,
        content: &str,
        username: &str,
        avatar_url: Option<&str>,
        reply_to: Option<&MessageRef>,
    ) -> Result<MessageId> {
        let url = format!("{}/webhooks/{delivery_id}/{token}?wait=true", self.base);
        let mut payload = Self::message_payload(content, reply_to);
        payload["username"] = json!(username);
        if let Some(avatar) = avatar_url {
            payload["avatar_url"] = json!(avatar);
        }
        let resp = self.client.post(&url).json(&payload).send().await?;
        let created: WireCreatedMessage = Self::check(resp, "execute_webhook")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "execute_webhook",
            })?;
        Ok(created.id)
    }

    async fn edit_webhook_message(
        &self,
        delivery_id: DeliveryId,
        token: &str,
        message_id: MessageId,
        content: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/webhooks/{delivery_id}/{token}/messages/{message_id}",
            self.base
        );
        let resp = self
            .client
            .patch(&url)
            .json(&json!({ "content": content, "allowed_mentions": { "parse": [] } }))
            .send()
            .await?;
        Self::check(resp, "edit_webhook_message").await?;
        Ok(())
    }

    async fn server_has_member_matching(
        &self,
        server_id: ServerId,
        ids: &HashSet<UserId>,
        name_prefix: &str,
    ) -> Result<Option<UserId>> {
        let url = format!("{}/guilds/{server_id}/members?limit=1000", self.base);
        let resp = self.auth(self.client.get(&url)).send().await?;
        let members: Vec<WireMember> = Self::check(resp, "list_members")
            .await?
            .json()
            .await
            .map_err(|_| Error::Malformed {
                context: "list_members",
            })?;
        let prefix = name_prefix.to_lowercase();
        for m in members.iter().filter(|m| m.user.bot) {
            if ids.contains(&m.user.id) {
                return Ok(Some(m.user.id));
            }
            if prefix.is_empty() {
                continue;
            }
            let names = [
                Some(m.user.username.as_str()),
                m.user.global_name.as_deref(),
                m.nick.as_deref(),
            ];
            if names
                .into_iter()
                .flatten()
                .any(|n| n.to_lowercase().starts_with(&prefix))
            {
                return Ok(Some(m.user.id));
            }
        }
        Ok(None)
    }

    async fn leave_server(&self, server_id: ServerId) -> Result<()> {
        let url = format!("{}/users/@me/guilds/{server_id}", self.base);
        let resp = self.auth(self.client.delete(&url)).send().await?;
        Self::check(resp, "leave_server").await?;
        Ok(())
    }

    async fn send_notice(&self, channel_id: ChannelId, content: &str) {
        if let Err(e) = self.send_message(channel_id, content, None).await {
            warn!(channel_id, error = %e, "notice send failed");
        }
    }
}
