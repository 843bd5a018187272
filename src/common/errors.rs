use std::time::Duration;

use crate::common::types::{GuildId, StationId};

/// Errors surfaced to the control surface caller (slash command reply or
/// HTTP error). Background bookkeeping failures are logged where they
/// happen and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The requesting user is not co-located with the bot's voice channel.
    /// Carries the user-facing explanation. Non-retryable; session state is
    /// untouched.
    #[error("{0}")]
    AccessDenied(String),

    #[error("no radio session for guild {0}")]
    SessionNotFound(GuildId),

    /// The voice connection did not reach ready within the bound. Prior
    /// playback state is unchanged; safe to retry.
    #[error("voice connection for guild {guild_id} not ready after {waited:?}")]
    ConnectionNotReady { guild_id: GuildId, waited: Duration },

    /// The initial voice-channel join did not complete within the bound.
    #[error("joining voice channel in guild {guild_id} timed out after {waited:?}")]
    JoinTimeout { guild_id: GuildId, waited: Duration },

    /// The voice transport refused the join outright.
    #[error("could not join voice channel in guild {guild_id}: {reason}")]
    VoiceJoin { guild_id: GuildId, reason: String },

    /// The station's audio source could not be opened or errored while
    /// starting playback.
    #[error("station stream failed for guild {guild_id}: {reason}")]
    UpstreamStream { guild_id: GuildId, reason: String },

    #[error("discord gateway is not connected")]
    GatewayDisconnected,

    /// A station id that does not resolve in the external store.
    #[error("station {0} does not exist")]
    UnknownStation(StationId),

    /// The radio hub or control channel could not be created or resolved.
    #[error("channel setup failed for guild {guild_id}: {reason}")]
    ChannelSetup { guild_id: GuildId, reason: String },
}
