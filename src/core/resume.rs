use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::common::errors::CoreError;
use crate::common::types::{ChannelId, GuildId};
use crate::core::RadioCore;
use crate::protocol::RadioEvent;
use crate::storage::Station;

impl RadioCore {
    /// Host entry point for the gateway ready event: configure every
    /// guild, wait out the grace period, then resume playback for guilds
    /// whose radio channel is occupied.
    pub async fn handle_ready(&self) {
        info!("gateway ready, configuring guilds");
        self.health.reset_attempts();
        self.health.beat();
        self.emit(RadioEvent::StatusUpdate {
            is_online: true,
            is_playing: false,
            current_station_id: None,
        });

        self.auto_setup_all_guilds().await;

        tokio::time::sleep(Duration::from_millis(self.config.radio.resume_grace_ms)).await;
        self.auto_resume().await;
    }

    async fn auto_setup_all_guilds(&self) {
        for guild_id in self.discord.guild_ids().await {
            if self.registry.contains(&guild_id) {
                debug!("[{}] already set up, restoring interface", guild_id);
                if let Err(e) = self.restore_interface(&guild_id).await {
                    error!("[{}] interface restore failed: {}", guild_id, e);
                }
                continue;
            }
            if let Err(e) = self.setup(&guild_id).await {
                error!("[{}] auto-setup failed: {}", guild_id, e);
            }
        }
    }

    /// Resume the last played station (default station fallback) for every
    /// guild whose bound voice channel has non-bot members. Acts with
    /// system authority; per-guild failures do not stop the loop.
    async fn auto_resume(&self) {
        for guild_id in self.discord.guild_ids().await {
            let Some(shared) = self.registry.get(&guild_id) else {
                continue;
            };
            let voice_channel = { shared.lock().await.voice_channel_id.clone() };

            let occupied = self
                .discord
                .voice_channel_members(&guild_id, &voice_channel)
                .await
                .iter()
                .any(|m| !m.is_bot);
            if !occupied {
                debug!("[{}] radio channel empty, skipping resume", guild_id);
                continue;
            }

            let station = match self.last_played_station(&guild_id).await {
                Some(station) => station,
                None => self.config.radio.default_station.to_station(),
            };

            info!("[{}] auto-resuming {}", guild_id, station.name);
            if let Err(e) = self.play_station_system(&guild_id, station).await {
                error!("[{}] auto-resume failed: {}", guild_id, e);
            }
        }
    }

    /// Last-played lookup with the dangling-reference guard: an id that no
    /// longer resolves in the store means "no last station".
    pub(crate) async fn last_played_station(&self, guild_id: &GuildId) -> Option<Station> {
        let record = match self.guilds.get_guild(guild_id).await {
            Ok(record) => record?,
            Err(e) => {
                warn!("[{}] could not load guild record: {}", guild_id, e);
                return None;
            }
        };
        let station_id = record.last_station_id?;

        match self.stations.get_station(station_id).await {
            Ok(Some(station)) => Some(station),
            Ok(None) => {
                debug!(
                    "[{}] last played station {} no longer exists",
                    guild_id, station_id
                );
                None
            }
            Err(e) => {
                warn!("[{}] last played station lookup failed: {}", guild_id, e);
                None
            }
        }
    }

    /// Rebuild a session's connection and player across a partial restart
    /// and resume what it was playing. On failure the session's playback
    /// flags are reset instead of left inconsistent.
    pub async fn restore_interface(&self, guild_id: &GuildId) -> Result<(), CoreError> {
        let Some(shared) = self.registry.get(guild_id) else {
            return Ok(());
        };

        let (station, was_playing, voice_channel) = {
            let session = shared.lock().await;
            (
                session.current_station.clone(),
                session.is_playing,
                session.voice_channel_id.clone(),
            )
        };

        let Some(station) = station else {
            return Ok(());
        };
        if !was_playing {
            return Ok(());
        }

        info!("[{}] rebuilding session to resume {}", guild_id, station.name);
        let result = self
            .rebuild_and_resume(guild_id, &voice_channel, station)
            .await;

        if let Err(e) = &result {
            error!(
                "[{}] resume failed, resetting playback state: {}",
                guild_id, e
            );
            if let Some(shared) = self.registry.get(guild_id) {
                let mut session = shared.lock().await;
                session.is_playing = false;
                session.current_station = None;
            }
        }

        result
    }

    async fn rebuild_and_resume(
        &self,
        guild_id: &GuildId,
        voice_channel: &ChannelId,
        station: Station,
    ) -> Result<(), CoreError> {
        let connection = self
            .voice
            .join_channel(voice_channel, guild_id)
            .await
            .map_err(|e| CoreError::VoiceJoin {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            })?;

        let player = self.pipeline.create_player();
        let player_events = player.events();

        let Some(shared) = self.registry.get(guild_id) else {
            connection.destroy().await;
            return Ok(());
        };

        {
            let mut session = shared.lock().await;
            if let Some(task) = session.watch_task.take() {
                task.abort();
            }
            let old_connection = std::mem::replace(&mut session.connection, connection);
            old_connection.destroy().await;
            let old_player = std::mem::replace(&mut session.player, player);
            old_player.stop(true).await;
            session.current_resource = None;
        }

        let watch = self.spawn_player_watch(guild_id.clone(), shared.clone(), player_events);
        shared.lock().await.watch_task = Some(watch);

        self.play_station_system(guild_id, station).await
    }
}
