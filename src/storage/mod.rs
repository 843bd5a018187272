use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::types::{AnyResult, GuildId, StationId};

/// A named internet audio stream. Owned by the external store; the core
/// only ever holds read-only copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub url: String,
    pub genre: String,
    pub quality: String,
    pub is_favorite: bool,
}

/// Persisted per-guild record, read at setup and updated best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildRecord {
    pub id: Option<GuildId>,
    pub name: Option<String>,
    pub volume: Option<u16>,
    pub last_station_id: Option<StationId>,
    pub last_playing: bool,
}

/// Read access to the station catalog.
#[async_trait]
pub trait StationStore: Send + Sync {
    async fn get_station(&self, id: StationId) -> AnyResult<Option<Station>>;
    async fn get_all_stations(&self) -> AnyResult<Vec<Station>>;
}

/// Per-guild persistence. The store is externally synchronized; the core
/// tolerates lost updates from other writers.
#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn get_guild(&self, guild_id: &GuildId) -> AnyResult<Option<GuildRecord>>;
    async fn save_last_played(&self, guild_id: &GuildId, station_id: StationId) -> AnyResult<()>;
    async fn save_volume(&self, guild_id: &GuildId, volume: u16) -> AnyResult<()>;
}
