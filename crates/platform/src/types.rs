use serde::Deserialize;

use babelink_common::types::{Attachment, ChannelId, DeliveryId, MessageId, ServerId, UserId};

/// Snowflake ids arrive as decimal strings on the wire.
pub(crate) mod snowflake {
    use serde::{Deserialize, Deserializer, de::Error};

    pub fn deserialize<'de, D>(d: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse().map_err(|_| Error::custom("invalid snowflake"))
    }
}

pub(crate) mod opt_snowflake {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(d)?;
        Ok(s.and_then(|s| s.parse().ok()))
    }
}

/// Coarse channel classification. The relay only ever acts in plain text
/// channels; threads, voice text, and DMs are all `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAuthor {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

impl MessageAuthor {
    /// Name to present on relayed messages.
    #[must_use]
    pub fn shown_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// A pointer to another message, as carried on replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageRef {
    pub server_id: Option<ServerId>,
    pub channel_id: Option<ChannelId>,
    pub message_id: Option<MessageId>,
}

impl MessageRef {
    #[must_use]
    pub fn to_message(server_id: ServerId, channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            server_id: Some(server_id),
            channel_id: Some(channel_id),
            message_id: Some(message_id),
        }
    }
}

/// A message as the relay sees it, regardless of whether it arrived over the
/// gateway or from a REST fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageId,
    pub server_id: Option<ServerId>,
    pub channel_id: ChannelId,
    pub author: MessageAuthor,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub webhook_id: Option<DeliveryId>,
    pub reference: Option<MessageRef>,
    pub channel_kind: ChannelKind,
}

/// A webhook as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookInfo {
    pub id: DeliveryId,
    pub token: Option<String>,
    pub name: Option<String>,
    pub creator_id: Option<UserId>,
}

/// Events the gateway hands to the relay.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Ready { user_id: UserId },
    MessageCreate(InboundMessage),
    MessageUpdate(InboundMessage),
    ServerJoin { server_id: ServerId, name: String },
    ServerLeave { server_id: ServerId },
}

// ── wire payloads ──

#[derive(Deserialize)]
pub(crate) struct WireAuthor {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Deserialize)]
pub(crate) struct WireAttachment {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct WireRef {
    #[serde(default, with = "opt_snowflake")]
    pub guild_id: Option<u64>,
    #[serde(default, with = "opt_snowflake")]
    pub channel_id: Option<u64>,
    #[serde(default, with = "opt_snowflake")]
    pub message_id: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct WireMessage {
    #[serde(with = "snowflake")]
    pub id: u64,
    #[serde(default, with = "opt_snowflake")]
    pub guild_id: Option<u64>,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    pub author: Option<WireAuthor>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default, with = "opt_snowflake")]
    pub webhook_id: Option<u64>,
    #[serde(default)]
    pub message_reference: Option<WireRef>,
    /// Message type: 0 = default, 19 = reply. Everything else (system
    /// messages, thread starters) is treated as a non-text-channel event.
    #[serde(default, rename = "type")]
    pub kind: u8,
}

impl From<WireMessage> for InboundMessage {
    fn from(w: WireMessage) -> Self {
        let author = match w.author {
            Some(a) => MessageAuthor {
                avatar_url: a
                    .avatar
                    .as_deref()
                    .map(|hash| format!("https://cdn.discordapp.com/avatars/{}/{hash}.png", a.id)),
                id: a.id,
                username: a.username,
                display_name: a.global_name,
                bot: a.bot,
            },
            None => MessageAuthor {
                id: 0,
                username: String::new(),
                display_name: None,
                avatar_url: None,
                bot: true,
            },
        };
        let channel_kind = if w.guild_id.is_some() && matches!(w.kind, 0 | 19) {
            ChannelKind::Text
        } else {
            ChannelKind::Other
        };
        Self {
            id: w.id,
            server_id: w.guild_id,
            channel_id: w.channel_id,
            author,
            content: w.content,
            attachments: w
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    spoiler: a.filename.starts_with("SPOILER_"),
                    url: a.url,
                    filename: a.filename,
                    content_type: a.content_type,
                })
                .collect(),
            webhook_id: w.webhook_id,
            reference: w.message_reference.map(|r| MessageRef {
                server_id: r.guild_id,
                channel_id: r.channel_id,
                message_id: r.message_id,
            }),
            channel_kind,
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_decodes() {
        let raw = serde_json::json!({
            "id": "111",
            "guild_id": "1",
            "channel_id": "100",
            "type": 0,
            "content": "hello",
            "author": {
                "id": "9",
                "username": "ana",
                "global_name": "Ana",
                "avatar": "abc",
                "bot": false
            },
            "attachments": [
                {"url": "https://cdn.example/SPOILER_x.png", "filename": "SPOILER_x.png",
                 "content_type": "image/png"}
            ],
            "message_reference": {"channel_id": "100", "message_id": "42"}
        });
        let msg: InboundMessage = serde_json::from_value::<WireMessage>(raw).unwrap().into();
        assert_eq!(msg.id, 111);
        assert_eq!(msg.server_id, Some(1));
        assert_eq!(msg.author.shown_name(), "Ana");
        assert!(msg.author.avatar_url.as_deref().unwrap().contains("/9/abc"));
        assert!(msg.attachments[0].spoiler);
        assert_eq!(msg.reference.unwrap().message_id, Some(42));
        assert_eq!(msg.channel_kind, ChannelKind::Text);
    }

    #[test]
    fn dm_and_system_messages_are_not_text_channel() {
        let dm = serde_json::json!({
            "id": "1", "channel_id": "2", "type": 0, "content": "",
            "author": {"id": "9", "username": "ana"}
        });
        let msg: InboundMessage = serde_json::from_value::<WireMessage>(dm).unwrap().into();
        assert_eq!(msg.channel_kind, ChannelKind::Other);

        let system = serde_json::json!({
            "id": "1", "guild_id": "1", "channel_id": "2", "type": 7, "content": "",
            "author": {"id": "9", "username": "ana"}
        });
        let msg: InboundMessage = serde_json::from_value::<WireMessage>(system).unwrap().into();
        assert_eq!(msg.channel_kind, ChannelKind::Other);
    }

    #[test]
    fn reply_kind_is_text() {
        let raw = serde_json::json!({
            "id": "1", "guild_id": "1", "channel_id": "2", "type": 19, "content": "re",
            "author": {"id": "9", "username": "ana"}
        });
        let msg: InboundMessage = serde_json::from_value::<WireMessage>(raw).unwrap().into();
        assert_eq!(msg.channel_kind, ChannelKind::Text);
    }
}
