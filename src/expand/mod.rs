pub mod embed;
pub mod links;
pub mod policy;

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::ExpandConfig;
use crate::platform::{
    FetchError, IncomingEvent, OutboundSender, PreviewEmbed, RemoteFetcher, SendError,
};

/// Discord rejects a message carrying more embeds than this.
pub const MAX_EMBEDS_PER_REPLY: usize = 10;

/// What happened to one incoming event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionOutcome {
    /// Authored by this service; nothing was looked at
    IgnoredSelf,
    NoLinks,
    /// Links were found but none survived parsing, policy and fetching
    NothingExpanded,
    Replied { embeds: usize },
}

/// Turns message links in chat messages into preview replies.
///
/// Holds no per-event state, so one instance can serve concurrent events.
#[derive(Debug, Clone)]
pub struct Expander {
    fetch_timeout: Duration,
    embed_color: u32,
}

impl Expander {
    pub fn new(fetch_timeout: Duration, embed_color: u32) -> Self {
        Self {
            fetch_timeout,
            embed_color,
        }
    }

    pub fn from_config(config: &ExpandConfig) -> Self {
        Self::new(config.fetch_timeout(), config.embed_color)
    }

    /// Process one chat message and send at most one reply.
    ///
    /// Links are handled independently: a link that fails to parse, is
    /// rejected by policy, or cannot be fetched is skipped and logged. Embeds
    /// keep the order of their links in the message. A failed send is the
    /// only error returned.
    pub async fn handle_incoming_event(
        &self,
        evt: &IncomingEvent,
        fetcher: &dyn RemoteFetcher,
        sender: &dyn OutboundSender,
    ) -> Result<ExpansionOutcome, SendError> {
        if evt.author_is_self {
            debug!("skip message {} because it was created by the bot itself", evt.message_id);
            return Ok(ExpansionOutcome::IgnoredSelf);
        }

        let links = links::extract_links(&evt.body);
        if links.is_empty() {
            debug!("skip message {} because it has no message links", evt.message_id);
            return Ok(ExpansionOutcome::NoLinks);
        }

        // join_all yields results in input order, so embeds line up with links
        let mut embeds: Vec<PreviewEmbed> = join_all(
            links
                .iter()
                .map(|link| self.expand_link(&evt.guild_id, link, fetcher)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        if embeds.is_empty() {
            info!(
                "none of {} link(s) in message {} could be expanded",
                links.len(),
                evt.message_id
            );
            return Ok(ExpansionOutcome::NothingExpanded);
        }

        if embeds.len() > MAX_EMBEDS_PER_REPLY {
            warn!(
                "dropping {} preview(s) for message {} over the per-reply limit of {}",
                embeds.len() - MAX_EMBEDS_PER_REPLY,
                evt.message_id,
                MAX_EMBEDS_PER_REPLY
            );
            embeds.truncate(MAX_EMBEDS_PER_REPLY);
        }

        sender
            .send_reply(&evt.channel_id, &evt.message_id, &evt.author_id, &embeds)
            .await?;

        info!(
            "expanded {} link(s) for message {} in channel {}",
            embeds.len(),
            evt.message_id,
            evt.channel_id
        );
        Ok(ExpansionOutcome::Replied {
            embeds: embeds.len(),
        })
    }

    async fn expand_link(
        &self,
        source_guild_id: &str,
        link: &str,
        fetcher: &dyn RemoteFetcher,
    ) -> Option<PreviewEmbed> {
        let reference = match links::parse_reference(link) {
            Ok(r) => r,
            Err(e) => {
                warn!("failed to extract message info: {}", e);
                return None;
            }
        };

        if let Err(rejection) = policy::check_guild(source_guild_id, &reference) {
            info!("skip {} because {}", link, rejection);
            return None;
        }

        let channel = match self.bounded(fetcher.get_channel(&reference.channel_id)).await {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to get channel {}: {}", reference.channel_id, e);
                return None;
            }
        };

        if !policy::is_expansion_allowed(source_guild_id, &reference, &channel) {
            return None;
        }

        let cited = match self
            .bounded(fetcher.get_message(&reference.channel_id, &reference.message_id))
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to get message {}: {}", reference.message_id, e);
                return None;
            }
        };

        let preview = embed::build_preview(&cited, &channel, self.embed_color);
        debug!(
            "built preview: {}",
            serde_json::to_string(&preview).unwrap_or_default()
        );
        Some(preview)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))?
    }
}
