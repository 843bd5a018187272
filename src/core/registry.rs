use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::types::{GuildId, Shared, now_ms};
use crate::core::session::VoiceSession;

/// Owns every per-guild session. The single place keyed guild state lives;
/// slot reads and writes are atomic per map operation.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Shared<VoiceSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, guild_id: &GuildId) -> Option<Shared<VoiceSession>> {
        self.sessions.get(guild_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, guild_id: &GuildId) -> bool {
        self.sessions.contains_key(guild_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Register a freshly built session. Callers check `get` first; setup
    /// is idempotent by that existence check, not by this method.
    pub fn insert(&self, session: VoiceSession) -> Shared<VoiceSession> {
        let guild_id = session.guild_id.clone();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(guild_id, shared.clone());
        shared
    }

    /// Tear down and forget a guild's session. Destroys the connection and
    /// stops the player. No-op when the guild has no session.
    pub async fn remove(&self, guild_id: &GuildId) {
        let Some((_, shared)) = self.sessions.remove(guild_id) else {
            return;
        };

        let mut session = shared.lock().await;
        if let Some(task) = session.watch_task.take() {
            task.abort();
        }
        session.connection.destroy().await;
        session.player.stop(true).await;
        session.is_playing = false;
        session.current_resource = None;
        info!("[{}] session removed", guild_id);
    }

    /// Evict sessions that are not playing and have been idle longer than
    /// the threshold. Playing sessions are never evicted. Returns the
    /// number of sessions removed.
    pub async fn sweep_idle(&self, threshold_ms: u64) -> usize {
        let now = now_ms();
        let candidates = self.guild_ids();
        let mut removed = 0;

        for guild_id in candidates {
            let Some(shared) = self.get(&guild_id) else {
                continue;
            };
            let stale = {
                let session = shared.lock().await;
                !session.is_playing && now.saturating_sub(session.last_activity) > threshold_ms
            };
            if stale {
                debug!("[{}] idle past threshold, evicting", guild_id);
                self.remove(&guild_id).await;
                removed += 1;
            }
        }

        removed
    }

    /// Tear down every session (stop/restart paths).
    pub async fn drain(&self) {
        for guild_id in self.guild_ids() {
            self.remove(&guild_id).await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
