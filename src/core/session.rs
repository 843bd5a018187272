use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::audio::{AudioPlayer, AudioResource};
use crate::common::types::{ChannelId, GuildId, MessageId, now_ms};
use crate::gateway::VoiceConnection;
use crate::storage::Station;

/// One guild's voice session: the connection and player it exclusively
/// owns, plus playback state. Lives behind `Shared<VoiceSession>` in the
/// registry; exactly one live connection and player per guild.
pub struct VoiceSession {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub control_channel_id: ChannelId,
    pub connection: Box<dyn VoiceConnection>,
    pub player: Box<dyn AudioPlayer>,
    /// The resource currently loaded into the player. Kept so volume can be
    /// applied in place.
    pub current_resource: Option<Arc<dyn AudioResource>>,
    pub current_station: Option<Station>,
    /// True only while the player is actually producing audio.
    pub is_playing: bool,
    /// Percent, 0..=200. 100 is unity gain.
    pub volume: u16,
    /// Wall-clock ms of the last play/pause/station change. Drives idle
    /// eviction.
    pub last_activity: u64,
    /// At most one live now-playing message per session; replacing deletes
    /// the prior one first.
    pub last_notification: Option<MessageId>,
    /// Task mirroring player state transitions into this session.
    pub watch_task: Option<JoinHandle<()>>,
}

impl VoiceSession {
    pub fn new(
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        control_channel_id: ChannelId,
        connection: Box<dyn VoiceConnection>,
        player: Box<dyn AudioPlayer>,
        volume: u16,
    ) -> Self {
        Self {
            guild_id,
            voice_channel_id,
            control_channel_id,
            connection,
            player,
            current_resource: None,
            current_station: None,
            is_playing: false,
            volume,
            last_activity: now_ms(),
            last_notification: None,
            watch_task: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = now_ms();
    }

    /// Linear gain for the configured volume percent.
    pub fn gain(&self) -> f32 {
        self.volume as f32 / 100.0
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            guild_id: self.guild_id.clone(),
            voice_channel_id: self.voice_channel_id.clone(),
            control_channel_id: self.control_channel_id.clone(),
            current_station: self.current_station.clone(),
            is_playing: self.is_playing,
            volume: self.volume,
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
    }
}

/// Read-only copy of a session's externally visible state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub control_channel_id: ChannelId,
    pub current_station: Option<Station>,
    pub is_playing: bool,
    pub volume: u16,
}
