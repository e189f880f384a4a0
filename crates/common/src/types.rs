use serde::{Deserialize, Serialize};

/// Snowflake-style platform ids. Kept as plain u64s — every store keys on
/// them and the platform wire format sends them as decimal strings.
pub type ServerId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type UserId = u64;

/// Id of a delivery identity (webhook). `0` marks a fallback send that was
/// made directly as the bot rather than through an identity.
pub type DeliveryId = u64;

/// Attachment metadata as surfaced by the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub spoiler: bool,
}

/// A directed channel link: messages arriving in the looked-up channel are
/// relayed to `target_channel`, translated `src_lang` → `tgt_lang`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLink {
    pub target_channel: ChannelId,
    pub src_lang: String,
    pub tgt_lang: String,
}

/// Durable record tying a source message to its delivered translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationMapping {
    pub server_id: ServerId,
    pub src_msg_id: MessageId,
    pub src_channel_id: ChannelId,
    pub tgt_msg_id: MessageId,
    pub tgt_channel_id: ChannelId,
    pub delivery_id: DeliveryId,
    pub created_at: i64,
    pub last_edit_at: Option<i64>,
}

/// Persisted credential for a delivery identity, enough to reconstruct a
/// send/edit handle after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryCredential {
    pub delivery_id: DeliveryId,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
    pub secret_token: String,
    pub created_at: i64,
}

/// A glossary row as stored; compiled into match patterns by the glossary
/// crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub id: i64,
    pub term_src: String,
    pub term_dst: String,
    pub enabled: bool,
    pub priority: i64,
}
