use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::{
    CreateAllowedMentions, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, CreateMessage,
};
use serenity::client::{Client, Context, EventHandler};
use serenity::gateway::ShardManager;
use serenity::http::Http;
use serenity::model::channel::{ChannelType, Message};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, MessageId};
use serenity::model::Timestamp;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::expand::Expander;
use crate::platform::{
    ChannelMetadata, CitedMessage, FetchError, IncomingEvent, OutboundSender, PreviewEmbed,
    RemoteFetcher, SendError,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("bot is not running")]
    NotRunning,
    #[error("failed to open session to discord: {0}")]
    Connect(#[from] serenity::Error),
    #[error("session to discord closed before it became ready")]
    Closed,
    #[error("gateway task failed: {0}")]
    Task(String),
}

/// Snowflakes are non-zero u64s; anything else never reaches the API.
fn parse_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Serenity HTTP client behind the fetch/send capabilities
#[derive(Clone)]
pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn channel_nsfw(&self, channel: ChannelId) -> Result<bool, FetchError> {
        channel
            .to_channel(&*self.http)
            .await
            .map_err(|e| FetchError::Platform(e.to_string()))?
            .guild()
            .map(|c| c.nsfw)
            .ok_or_else(|| FetchError::UnsupportedChannel(channel.to_string()))
    }
}

fn is_thread(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
    )
}

fn is_restricted(own_nsfw: bool, parent_nsfw: Option<bool>) -> bool {
    own_nsfw || parent_nsfw.unwrap_or(false)
}

#[async_trait]
impl RemoteFetcher for DiscordClient {
    async fn get_channel(&self, channel_id: &str) -> Result<ChannelMetadata, FetchError> {
        let id = parse_id(channel_id).ok_or_else(|| FetchError::InvalidId(channel_id.to_string()))?;
        let channel = ChannelId::new(id)
            .to_channel(&*self.http)
            .await
            .map_err(|e| FetchError::Platform(e.to_string()))?;
        let guild_channel = channel
            .guild()
            .ok_or_else(|| FetchError::UnsupportedChannel(channel_id.to_string()))?;

        // Threads have no NSFW flag of their own; the parent's applies
        let parent_nsfw = match guild_channel.parent_id {
            Some(parent) if is_thread(guild_channel.kind) => Some(self.channel_nsfw(parent).await?),
            _ => None,
        };

        Ok(ChannelMetadata {
            id: channel_id.to_string(),
            name: guild_channel.name,
            is_restricted: is_restricted(guild_channel.nsfw, parent_nsfw),
        })
    }

    async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<CitedMessage, FetchError> {
        let channel = parse_id(channel_id).ok_or_else(|| FetchError::InvalidId(channel_id.to_string()))?;
        let message = parse_id(message_id).ok_or_else(|| FetchError::InvalidId(message_id.to_string()))?;
        let msg = ChannelId::new(channel)
            .message(&*self.http, MessageId::new(message))
            .await
            .map_err(|e| FetchError::Platform(e.to_string()))?;

        let timestamp = DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .ok_or_else(|| FetchError::Platform(format!("bad timestamp on message {}", message_id)))?;

        Ok(CitedMessage {
            author_name: msg.author.name.clone(),
            author_avatar_url: msg.author.face(),
            body: msg.content,
            timestamp,
            attachment_urls: msg.attachments.into_iter().map(|a| a.url).collect(),
        })
    }
}

fn build_embed(preview: &PreviewEmbed) -> CreateEmbed {
    let mut builder = CreateEmbed::new()
        .author(CreateEmbedAuthor::new(&preview.author_name).icon_url(&preview.author_avatar_url))
        .color(preview.color)
        .description(&preview.body)
        .footer(CreateEmbedFooter::new(&preview.source_channel_name));
    if let Some(ref url) = preview.image_url {
        builder = builder.image(url);
    }
    match Timestamp::parse(&preview.timestamp_rfc3339) {
        Ok(timestamp) => builder = builder.timestamp(timestamp),
        Err(e) => warn!("dropping embed timestamp {}: {}", preview.timestamp_rfc3339, e),
    }
    builder
}

#[async_trait]
impl OutboundSender for DiscordClient {
    async fn send_reply(
        &self,
        channel_id: &str,
        in_reply_to: &str,
        notify_author_id: &str,
        embeds: &[PreviewEmbed],
    ) -> Result<(), SendError> {
        let channel = ChannelId::new(
            parse_id(channel_id).ok_or_else(|| SendError::InvalidId(channel_id.to_string()))?,
        );
        let reply_to = MessageId::new(
            parse_id(in_reply_to).ok_or_else(|| SendError::InvalidId(in_reply_to.to_string()))?,
        );

        // Replying with replied_user set pings the author of the cited-from message
        let builder = CreateMessage::new()
            .embeds(embeds.iter().map(build_embed).collect())
            .reference_message((channel, reply_to))
            .allowed_mentions(CreateAllowedMentions::new().replied_user(true));

        debug!(
            "sending {} embed(s) to channel {} notifying user {}",
            embeds.len(),
            channel_id,
            notify_author_id
        );
        channel
            .send_message(&*self.http, builder)
            .await
            .map_err(|e| SendError::Platform(e.to_string()))?;
        Ok(())
    }
}

/// Whether a message must be left alone because we (or, optionally, any bot) wrote it
fn authored_by_self(author_id: u64, author_is_bot: bool, self_id: u64, ignore_bots: bool) -> bool {
    author_id == self_id || (ignore_bots && author_is_bot)
}

struct Handler {
    expander: Expander,
    ignore_bots: bool,
    ready_tx: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
        if let Some(tx) = self.ready_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // DMs have no guild and nothing to expand against
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let self_id = ctx.cache.current_user().id.get();
        let evt = IncomingEvent {
            author_id: msg.author.id.to_string(),
            author_is_self: authored_by_self(
                msg.author.id.get(),
                msg.author.bot,
                self_id,
                self.ignore_bots,
            ),
            guild_id: guild_id.to_string(),
            channel_id: msg.channel_id.to_string(),
            message_id: msg.id.to_string(),
            body: msg.content,
        };

        let client = DiscordClient::new(ctx.http.clone());
        if let Err(e) = self
            .expander
            .handle_incoming_event(&evt, &client, &client)
            .await
        {
            error!("failed to reply to message {}: {}", evt.message_id, e);
        }
    }
}

/// Gateway session that expands message links while running
pub struct Bot {
    config: Config,
    shard_manager: Option<Arc<ShardManager>>,
    task: Option<JoinHandle<Result<(), serenity::Error>>>,
}

impl Bot {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shard_manager: None,
            task: None,
        }
    }

    /// Connect and wait until the gateway reports ready.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.task.is_some() {
            return Err(SessionError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let handler = Handler {
            expander: Expander::from_config(&self.config.expand),
            ignore_bots: self.config.discord.ignore_bots,
            ready_tx: Mutex::new(Some(ready_tx)),
        };
        let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

        let mut client = Client::builder(self.config.discord.token.reveal(), intents)
            .event_handler(handler)
            .await?;
        let shard_manager = client.shard_manager.clone();
        let mut task = tokio::spawn(async move { client.start().await });

        tokio::select! {
            ready = ready_rx => {
                if ready.is_err() {
                    task.abort();
                    return Err(SessionError::Closed);
                }
            }
            joined = &mut task => {
                return Err(match joined {
                    Ok(Ok(())) => SessionError::Closed,
                    Ok(Err(e)) => SessionError::Connect(e),
                    Err(e) => SessionError::Task(e.to_string()),
                });
            }
        }

        self.shard_manager = Some(shard_manager);
        self.task = Some(task);
        info!("bot is running");
        Ok(())
    }

    /// Close every shard and wait for the gateway task to finish.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        let (Some(shard_manager), Some(task)) = (self.shard_manager.take(), self.task.take())
        else {
            return Err(SessionError::NotRunning);
        };

        shard_manager.shutdown_all().await;
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SessionError::Connect(e)),
            Err(e) => return Err(SessionError::Task(e.to_string())),
        }
        info!("bot is stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("381870553235193857"), Some(381870553235193857));
        assert_eq!(parse_id("0"), None);
        assert_eq!(parse_id(""), None);
        assert_eq!(parse_id("12a"), None);
        assert_eq!(parse_id("99999999999999999999999"), None);
    }

    #[test]
    fn test_authored_by_self() {
        assert!(authored_by_self(7, true, 7, false));
        assert!(authored_by_self(8, true, 7, true));
        assert!(!authored_by_self(8, true, 7, false));
        assert!(!authored_by_self(8, false, 7, true));
    }

    #[test]
    fn test_thread_kinds() {
        assert!(is_thread(ChannelType::PublicThread));
        assert!(is_thread(ChannelType::PrivateThread));
        assert!(is_thread(ChannelType::NewsThread));
        assert!(!is_thread(ChannelType::Text));
        assert!(!is_thread(ChannelType::News));
    }

    #[test]
    fn test_thread_inherits_parent_nsfw() {
        assert!(is_restricted(false, Some(true)));
        assert!(is_restricted(true, None));
        assert!(is_restricted(true, Some(false)));
        assert!(!is_restricted(false, Some(false)));
        assert!(!is_restricted(false, None));
    }

    fn preview(image_url: Option<&str>, timestamp: &str) -> PreviewEmbed {
        PreviewEmbed {
            author_name: "alice".to_string(),
            author_avatar_url: "https://cdn.discordapp.com/embed/avatars/0.png".to_string(),
            body: "hi".to_string(),
            timestamp_rfc3339: timestamp.to_string(),
            source_channel_name: "general".to_string(),
            image_url: image_url.map(String::from),
            color: 0x7fffff,
        }
    }

    #[test]
    fn test_build_embed_renders_preview() {
        let timestamp = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .to_rfc3339();
        let embed = serde_json::to_value(build_embed(&preview(
            Some("https://cdn.discordapp.com/attachments/1/2/a.png"),
            &timestamp,
        )))
        .unwrap();

        assert_eq!(embed["author"]["name"], "alice");
        assert_eq!(
            embed["author"]["icon_url"],
            "https://cdn.discordapp.com/embed/avatars/0.png"
        );
        assert_eq!(embed["description"], "hi");
        assert_eq!(embed["color"], 8388607);
        assert_eq!(embed["footer"]["text"], "general");
        assert_eq!(
            embed["image"]["url"],
            "https://cdn.discordapp.com/attachments/1/2/a.png"
        );
        assert_eq!(embed["timestamp"], "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_build_embed_without_image() {
        let embed =
            serde_json::to_value(build_embed(&preview(None, "2024-01-02T03:04:05Z"))).unwrap();
        assert!(embed.get("image").is_none());
        assert_eq!(embed["timestamp"], "2024-01-02T03:04:05Z");
    }

    #[test]
    fn test_build_embed_drops_unparseable_timestamp() {
        let embed = serde_json::to_value(build_embed(&preview(None, "yesterday"))).unwrap();
        assert!(embed.get("timestamp").is_none());
        assert_eq!(embed["description"], "hi");
    }

    #[tokio::test]
    async fn test_stop_before_start_is_error() {
        let mut bot = Bot::new(Config::default());
        assert!(matches!(bot.stop().await, Err(SessionError::NotRunning)));
        assert!(matches!(bot.stop().await, Err(SessionError::NotRunning)));
    }
}
