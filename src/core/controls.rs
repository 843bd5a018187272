//! The control surface invoked by the host's slash-command and HTTP
//! layers. User-initiated mutations pass the access guard; the
//! `*_system` variants act with system authority for the resume and
//! health paths.

use serde::Serialize;
use tracing::{info, warn};

use crate::common::errors::CoreError;
use crate::common::types::{GuildId, StationId, UserId};
use crate::core::session::SessionSnapshot;
use crate::core::{RadioCore, playback};
use crate::gateway::ChannelKind;
use crate::protocol::RadioEvent;
use crate::storage::Station;

/// Per-guild status for the dashboard and the status command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildStatus {
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub listeners: usize,
    /// Advisory target quality in kbps, when the supervisor has computed
    /// one.
    pub stream_quality: Option<u32>,
}

/// Global bot status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub is_online: bool,
    pub session_count: usize,
    pub playing_count: usize,
    pub total_listeners: usize,
    pub reconnect_attempts: u32,
}

impl RadioCore {
    /// Ensure the radio hub and control channels exist and register a
    /// session bound to them. Idempotent: an existing session is returned
    /// untouched.
    pub async fn setup(&self, guild_id: &GuildId) -> Result<SessionSnapshot, CoreError> {
        if !self.discord.is_ready() {
            return Err(CoreError::GatewayDisconnected);
        }

        let voice_channel = self
            .channel_io
            .ensure_channel(
                guild_id,
                &self.config.radio.hub_channel_name,
                ChannelKind::Voice,
            )
            .await
            .map_err(|e| CoreError::ChannelSetup {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            })?;
        let control_channel = self
            .channel_io
            .ensure_channel(
                guild_id,
                &self.config.radio.control_channel_name,
                ChannelKind::Text,
            )
            .await
            .map_err(|e| CoreError::ChannelSetup {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            })?;

        if let Some(shared) = self.registry.get(guild_id) {
            return Ok(shared.lock().await.snapshot());
        }

        let shared = self
            .create_session(guild_id, voice_channel, control_channel)
            .await?;
        let snapshot = { shared.lock().await.snapshot() };

        let guild_name = self
            .discord
            .guild_name(guild_id)
            .await
            .unwrap_or_else(|| guild_id.to_string());
        info!(
            "[{}] radio session ready for {} (voice={}, control={})",
            guild_id, guild_name, snapshot.voice_channel_id, snapshot.control_channel_id
        );
        self.emit(RadioEvent::SessionUpdate {
            guild_id: guild_id.clone(),
            current_station: None,
            is_playing: false,
            volume: snapshot.volume,
        });

        Ok(snapshot)
    }

    /// Switch a guild to a station on behalf of a user. The co-location
    /// check runs first; the session is untouched when it denies.
    pub async fn play_station(
        &self,
        guild_id: &GuildId,
        station_id: StationId,
        user_id: &UserId,
    ) -> Result<Station, CoreError> {
        let decision = self.guard.can_control(guild_id, user_id).await;
        if !decision.allowed() {
            return Err(CoreError::AccessDenied(decision.denial_message()));
        }

        let station = match self.stations.get_station(station_id).await {
            Ok(Some(station)) => station,
            Ok(None) => return Err(CoreError::UnknownStation(station_id)),
            Err(e) => {
                warn!("[{}] station lookup failed: {}", guild_id, e);
                return Err(CoreError::UnknownStation(station_id));
            }
        };

        playback::play_station_for_guild(self, guild_id, station.clone()).await?;
        Ok(station)
    }

    /// Station change with system authority (resume, health repair).
    pub async fn play_station_system(
        &self,
        guild_id: &GuildId,
        station: Station,
    ) -> Result<(), CoreError> {
        playback::play_station_for_guild(self, guild_id, station).await
    }

    /// Set a guild's volume on behalf of a user.
    pub async fn set_volume(
        &self,
        guild_id: &GuildId,
        percent: i64,
        user_id: &UserId,
    ) -> Result<u16, CoreError> {
        let decision = self.guard.can_control(guild_id, user_id).await;
        if !decision.allowed() {
            return Err(CoreError::AccessDenied(decision.denial_message()));
        }
        self.set_volume_system(guild_id, percent).await
    }

    /// Clamp to [0, 200], record on the session, and apply in place to the
    /// live resource. Applying the same volume twice is a no-op for the
    /// audible gain. Persistence is best-effort.
    pub async fn set_volume_system(
        &self,
        guild_id: &GuildId,
        percent: i64,
    ) -> Result<u16, CoreError> {
        let volume = percent.clamp(0, 200) as u16;

        let Some(shared) = self.registry.get(guild_id) else {
            return Err(CoreError::SessionNotFound(guild_id.clone()));
        };

        let (old_volume, current_station, is_playing) = {
            let mut session = shared.lock().await;
            let old = session.volume;
            session.volume = volume;
            if session.is_playing {
                if let Some(resource) = &session.current_resource {
                    if !resource.set_volume(session.gain()) {
                        warn!(
                            "[{}] inline volume unavailable, stream stays at source level",
                            guild_id
                        );
                    }
                }
            }
            (old, session.current_station.clone(), session.is_playing)
        };

        info!("[{}] volume {}% -> {}%", guild_id, old_volume, volume);

        if let Err(e) = self.guilds.save_volume(guild_id, volume).await {
            warn!("[{}] could not persist volume: {}", guild_id, e);
        }

        self.emit(RadioEvent::SessionUpdate {
            guild_id: guild_id.clone(),
            current_station,
            is_playing,
            volume,
        });

        Ok(volume)
    }

    /// Read-only per-guild status; no access check (advisory operations
    /// are open).
    pub async fn get_status(&self, guild_id: &GuildId) -> Option<GuildStatus> {
        let shared = self.registry.get(guild_id)?;
        let session = { shared.lock().await.snapshot() };
        let listeners = self.listener_count(guild_id).await;
        let stream_quality = self
            .health
            .stream_quality
            .get(guild_id)
            .map(|q| *q.value());

        Some(GuildStatus {
            session,
            listeners,
            stream_quality,
        })
    }

    pub async fn status(&self) -> BotStatus {
        let mut playing = 0;
        for guild_id in self.registry.guild_ids() {
            if let Some(shared) = self.registry.get(&guild_id) {
                if shared.lock().await.is_playing {
                    playing += 1;
                }
            }
        }

        BotStatus {
            is_online: self.discord.is_ready(),
            session_count: self.registry.len(),
            playing_count: playing,
            total_listeners: self.total_listeners().await,
            reconnect_attempts: self.health.attempts(),
        }
    }
}
