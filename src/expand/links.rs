use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Message permalinks on the stable, ptb and canary clients, old and new domain.
static MESSAGE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://(?:ptb\.|canary\.)?discord(?:app)?\.com/channels/\d+/\d+/\d+")
        .expect("message link pattern is valid")
});

/// Points at one message inside one channel of one guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReference {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
}

impl fmt::Display for MessageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, self.channel_id, self.message_id
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed reference: {link:?}")]
pub struct ParseError {
    pub link: String,
}

/// Every permalink in `text`, in order of appearance. Duplicates are kept.
pub fn extract_links(text: &str) -> Vec<&str> {
    MESSAGE_LINK.find_iter(text).map(|m| m.as_str()).collect()
}

/// Split a permalink into its guild, channel and message ids (the last three
/// path segments).
pub fn parse_reference(link: &str) -> Result<MessageReference, ParseError> {
    let segments: Vec<&str> = link.split('/').collect();
    match segments.as_slice() {
        [_, .., guild, channel, message] => Ok(MessageReference {
            guild_id: guild.to_string(),
            channel_id: channel.to_string(),
            message_id: message.to_string(),
        }),
        _ => Err(ParseError {
            link: link.to_string(),
        }),
    }
}
