//! Consumed Discord-side interfaces. The host process implements these
//! against its Discord client; the core only drives them.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::common::types::{AnyResult, ChannelId, GuildId, MessageId, UserId};
use crate::storage::Station;

/// Voice connection lifecycle as reported by the voice transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Signalling,
    Connecting,
    Ready,
    Disconnected,
    Destroyed,
}

/// One guild's live voice connection. Exclusively owned by its session.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Wait until the connection reports ready, bounded by `timeout`.
    /// Returns false on timeout; the underlying transport keeps working
    /// and may still become ready later.
    async fn wait_ready(&self, timeout: Duration) -> bool;

    async fn destroy(&self);
}

/// Joins voice channels, producing connections.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join_channel(
        &self,
        channel_id: &ChannelId,
        guild_id: &GuildId,
    ) -> AnyResult<Box<dyn VoiceConnection>>;
}

/// A member currently occupying a voice channel.
#[derive(Debug, Clone)]
pub struct VoiceMember {
    pub user_id: UserId,
    pub is_bot: bool,
}

/// Read-only view of the Discord gateway: liveness plus guild, member, and
/// voice-channel lookups. Lookups return None when the entity cannot be
/// resolved (guard paths fail closed on that).
#[async_trait]
pub trait DiscordGateway: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn connect(&self) -> AnyResult<()>;
    async fn disconnect(&self) -> AnyResult<()>;

    async fn guild_ids(&self) -> Vec<GuildId>;
    async fn guild_name(&self, guild_id: &GuildId) -> Option<String>;
    async fn member_count(&self, guild_id: &GuildId) -> Option<u32>;

    /// The voice channel the member currently sits in, if any.
    async fn member_voice_channel(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
    ) -> Option<ChannelId>;

    /// The voice channel the bot currently sits in for this guild, if any.
    async fn bot_voice_channel(&self, guild_id: &GuildId) -> Option<ChannelId>;

    async fn channel_name(&self, guild_id: &GuildId, channel_id: &ChannelId) -> Option<String>;

    async fn voice_channel_members(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
    ) -> Vec<VoiceMember>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Voice,
    Text,
}

/// The now-playing card rendered into the control channel. `embed()` is the
/// display shape the host forwards to Discord.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlayingCard {
    pub station: Station,
    pub listeners: usize,
}

impl NowPlayingCard {
    pub fn embed(&self) -> serde_json::Value {
        serde_json::json!({
            "color": 0x5865F2,
            "title": "🎵 Now Playing",
            "description": format!("**{}**", self.station.name),
            "fields": [
                { "name": "🎼 Genre", "value": self.station.genre, "inline": true },
                { "name": "📡 Quality", "value": self.station.quality, "inline": true },
                { "name": "👥 Listeners", "value": self.listeners.to_string(), "inline": true },
            ],
        })
    }
}

/// Text/voice channel plumbing for the control surface.
#[async_trait]
pub trait ChannelIo: Send + Sync {
    /// Resolve a channel by name, creating it when absent.
    async fn ensure_channel(
        &self,
        guild_id: &GuildId,
        name: &str,
        kind: ChannelKind,
    ) -> AnyResult<ChannelId>;

    async fn send_now_playing(
        &self,
        channel_id: &ChannelId,
        card: &NowPlayingCard,
    ) -> AnyResult<MessageId>;

    async fn delete_message(&self, channel_id: &ChannelId, message_id: &MessageId)
    -> AnyResult<()>;
}
