use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::errors::CoreError;
use crate::common::types::GuildId;
use crate::core::RadioCore;
use crate::gateway::NowPlayingCard;
use crate::protocol::RadioEvent;
use crate::storage::Station;

/// Transition a guild's session from whatever it is playing to `station`.
///
/// Stop always precedes play, so the player never holds two live resources;
/// back-to-back calls for the same guild serialize on the session lock and
/// the last one to start wins. Errors up to playback start propagate with
/// `is_playing` left false; persistence and notification failures stay
/// here.
pub(crate) async fn play_station_for_guild(
    core: &RadioCore,
    guild_id: &GuildId,
    station: Station,
) -> Result<(), CoreError> {
    let Some(shared) = core.registry.get(guild_id) else {
        return Err(CoreError::SessionNotFound(guild_id.clone()));
    };

    let ready_timeout = Duration::from_millis(core.config.radio.ready_timeout_ms);
    let mut session = shared.lock().await;

    debug!("[{}] waiting for voice connection ready", guild_id);
    if !session.connection.wait_ready(ready_timeout).await {
        return Err(CoreError::ConnectionNotReady {
            guild_id: guild_id.clone(),
            waited: ready_timeout,
        });
    }

    // A teardown (or teardown plus re-setup) may have raced the ready
    // wait; treat that as a normal abort, not an error.
    let still_live = core
        .registry
        .get(guild_id)
        .map(|current| Arc::ptr_eq(&current, &shared))
        .unwrap_or(false);
    if !still_live {
        debug!("[{}] session replaced while waiting for ready", guild_id);
        return Ok(());
    }

    if session.is_playing {
        debug!("[{}] stopping current playback", guild_id);
        session.player.stop(true).await;
        session.is_playing = false;
        tokio::time::sleep(Duration::from_millis(core.config.radio.settle_delay_ms)).await;
    }

    let resource = match core.pipeline.create_resource(&station.url).await {
        Ok(resource) => resource,
        Err(e) => {
            return Err(CoreError::UpstreamStream {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            });
        }
    };

    let still_live = core
        .registry
        .get(guild_id)
        .map(|current| Arc::ptr_eq(&current, &shared))
        .unwrap_or(false);
    if !still_live {
        debug!("[{}] session replaced while opening stream", guild_id);
        return Ok(());
    }

    if resource.set_volume(session.gain()) {
        debug!(
            "[{}] applied {}% volume to {}",
            guild_id, session.volume, station.name
        );
    } else {
        warn!(
            "[{}] inline volume unavailable, playing {} at source level",
            guild_id, station.name
        );
    }

    session.player.play(resource.clone()).await;
    session.current_resource = Some(resource);
    session.current_station = Some(station.clone());
    session.is_playing = true;
    session.touch();
    let volume = session.volume;
    drop(session);

    info!("[{}] now playing: {}", guild_id, station.name);

    // Best-effort: remember the station for resume. A station id missing
    // from the store is skipped rather than saved dangling.
    match core.stations.get_station(station.id).await {
        Ok(Some(_)) => {
            if let Err(e) = core.guilds.save_last_played(guild_id, station.id).await {
                warn!("[{}] could not persist last played station: {}", guild_id, e);
            }
        }
        Ok(None) => debug!(
            "[{}] station {} not in store, skipping last-played save",
            guild_id, station.id
        ),
        Err(e) => warn!(
            "[{}] station lookup for last-played save failed: {}",
            guild_id, e
        ),
    }

    let listeners = core.listener_count(guild_id).await;
    core.notifier
        .clone()
        .submit(
            guild_id.clone(),
            NowPlayingCard {
                station: station.clone(),
                listeners,
            },
        )
        .await;

    core.emit(RadioEvent::SessionUpdate {
        guild_id: guild_id.clone(),
        current_station: Some(station),
        is_playing: true,
        volume,
    });

    Ok(())
}
