use serde::Serialize;

use crate::common::types::{GuildId, StationId};
use crate::storage::Station;

/// Events emitted by the core for the host broadcast layer. The contract is
/// the shape; delivery runs over the channel handed out by
/// [`crate::core::RadioCore::subscribe`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RadioEvent {
    /// A guild's session changed station or volume.
    #[serde(rename_all = "camelCase")]
    SessionUpdate {
        guild_id: GuildId,
        current_station: Option<Station>,
        is_playing: bool,
        volume: u16,
    },

    /// Gateway connect/disconnect and global playback transitions.
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        is_online: bool,
        is_playing: bool,
        current_station_id: Option<StationId>,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
