use tracing::info;

use crate::expand::links::MessageReference;
use crate::platform::ChannelMetadata;

/// Why a reference was not expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OtherGuild,
    RestrictedChannel,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::OtherGuild => write!(f, "the guild is not the same as the message"),
            Rejection::RestrictedChannel => write!(f, "the channel is nsfw"),
        }
    }
}

/// Citations never cross guild boundaries. Needs no channel data, so it can
/// run before the channel is fetched.
pub fn check_guild(source_guild_id: &str, reference: &MessageReference) -> Result<(), Rejection> {
    if reference.guild_id != source_guild_id {
        return Err(Rejection::OtherGuild);
    }
    Ok(())
}

/// Full policy: same guild first, then the channel's restriction flag.
pub fn evaluate(
    source_guild_id: &str,
    reference: &MessageReference,
    channel: &ChannelMetadata,
) -> Result<(), Rejection> {
    check_guild(source_guild_id, reference)?;
    if channel.is_restricted {
        return Err(Rejection::RestrictedChannel);
    }
    Ok(())
}

/// Boolean form of [`evaluate`]; logs the rejection reason.
pub fn is_expansion_allowed(
    source_guild_id: &str,
    reference: &MessageReference,
    channel: &ChannelMetadata,
) -> bool {
    match evaluate(source_guild_id, reference, channel) {
        Ok(()) => true,
        Err(rejection) => {
            info!("skip {} because {}", reference, rejection);
            false
        }
    }
}
