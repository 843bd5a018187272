use serde::{Deserialize, Serialize};

use crate::common::types::StationId;
use crate::storage::Station;

/// Per-guild radio behavior: bound channel names, playback bounds, and the
/// fallback station used when a guild has no last-played record.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RadioConfig {
    pub hub_channel_name: String,
    pub control_channel_name: String,
    /// Volume percent applied to new sessions with no stored value.
    pub default_volume: u16,
    /// Bound on waiting for a voice connection to reach ready.
    pub ready_timeout_ms: u64,
    /// Settling delay between force-stopping the player and starting the
    /// next resource.
    pub settle_delay_ms: u64,
    /// Minimum spacing between now-playing notification renders per guild.
    pub notify_window_ms: u64,
    /// Grace period between gateway ready and auto-resume.
    pub resume_grace_ms: u64,
    pub default_station: DefaultStation,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            hub_channel_name: "📻｜Radio Hub".to_string(),
            control_channel_name: "📻｜radio-control".to_string(),
            default_volume: 75,
            ready_timeout_ms: 30_000,
            settle_delay_ms: 100,
            notify_window_ms: 3_000,
            resume_grace_ms: 3_000,
            default_station: DefaultStation::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DefaultStation {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub genre: String,
    pub quality: String,
}

impl Default for DefaultStation {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Chill Lofi Radio".to_string(),
            url: "https://streams.ilovemusic.de/iloveradio17.mp3".to_string(),
            genre: "Lofi Hip Hop".to_string(),
            quality: "192kbps".to_string(),
        }
    }
}

impl DefaultStation {
    pub fn to_station(&self) -> Station {
        Station {
            id: StationId(self.id),
            name: self.name.clone(),
            url: self.url.clone(),
            genre: self.genre.clone(),
            quality: self.quality.clone(),
            is_favorite: true,
        }
    }
}
