pub mod discord;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// A chat message observed in a guild
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub author_id: String,
    /// Set when the message came from this service (or, with `ignore_bots`, any bot)
    pub author_is_self: bool,
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
    pub body: String,
}

/// Channel data needed to decide whether a citation may be previewed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMetadata {
    pub id: String,
    pub name: String,
    /// Age-restricted (NSFW) channel
    pub is_restricted: bool,
}

/// The message a permalink points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitedMessage {
    pub author_name: String,
    pub author_avatar_url: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Attachment URLs in the order the platform reports them
    pub attachment_urls: Vec<String>,
}

/// Rendered preview of one cited message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEmbed {
    pub author_name: String,
    pub author_avatar_url: String,
    pub body: String,
    pub timestamp_rfc3339: String,
    pub source_channel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub color: u32,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid id: {0:?}")]
    InvalidId(String),
    #[error("channel {0} is not a guild channel")]
    UnsupportedChannel(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("platform error: {0}")]
    Platform(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("invalid id: {0:?}")]
    InvalidId(String),
    #[error("failed to send reply: {0}")]
    Platform(String),
}

/// Read access to the chat platform
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn get_channel(&self, channel_id: &str) -> Result<ChannelMetadata, FetchError>;

    async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<CitedMessage, FetchError>;
}

/// Write access to the chat platform
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_reply(
        &self,
        channel_id: &str,
        in_reply_to: &str,
        notify_author_id: &str,
        embeds: &[PreviewEmbed],
    ) -> Result<(), SendError>;
}
