use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::common::types::GuildId;
use crate::core::registry::SessionRegistry;
use crate::gateway::{ChannelIo, NowPlayingCard};

/// Debounced now-playing renderer. A guild's notification is rewritten at
/// most once per window; requests landing inside the window coalesce into
/// one deferred render of the most recent station. At most one deferred
/// render is pending per guild.
pub struct NowPlayingNotifier {
    channel_io: Arc<dyn ChannelIo>,
    registry: Arc<SessionRegistry>,
    window: Duration,
    last_render: DashMap<GuildId, Instant>,
    pending: DashMap<GuildId, JoinHandle<()>>,
}

impl NowPlayingNotifier {
    pub fn new(
        channel_io: Arc<dyn ChannelIo>,
        registry: Arc<SessionRegistry>,
        window: Duration,
    ) -> Self {
        Self {
            channel_io,
            registry,
            window,
            last_render: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    /// Request a notification update for this guild. Renders immediately
    /// when outside the window, otherwise replaces any pending render with
    /// one carrying this card.
    pub async fn submit(self: Arc<Self>, guild_id: GuildId, card: NowPlayingCard) {
        let now = Instant::now();
        let since_last = self
            .last_render
            .get(&guild_id)
            .map(|t| now.duration_since(*t.value()));

        // A pending render is superseded either way.
        if let Some((_, task)) = self.pending.remove(&guild_id) {
            task.abort();
        }

        match since_last {
            Some(elapsed) if elapsed < self.window => {
                let delay = self.window - elapsed;
                debug!(
                    "[{}] notification inside window, deferring {:?}",
                    guild_id, delay
                );
                let notifier = self.clone();
                let key = guild_id.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    notifier.pending.remove(&key);
                    notifier.render(&key, card).await;
                });
                self.pending.insert(guild_id, task);
            }
            _ => self.render(&guild_id, card).await,
        }
    }

    /// Delete the prior message (tolerating its absence), send the new one,
    /// and remember it on the session. Errors never leave this method.
    async fn render(&self, guild_id: &GuildId, card: NowPlayingCard) {
        let Some(shared) = self.registry.get(guild_id) else {
            return;
        };

        let (control_channel, previous) = {
            let mut session = shared.lock().await;
            (
                session.control_channel_id.clone(),
                session.last_notification.take(),
            )
        };

        if let Some(message_id) = previous {
            if let Err(e) = self
                .channel_io
                .delete_message(&control_channel, &message_id)
                .await
            {
                debug!(
                    "[{}] could not delete previous now-playing message: {}",
                    guild_id, e
                );
            }
        }

        match self.channel_io.send_now_playing(&control_channel, &card).await {
            Ok(message_id) => {
                // The session may have been torn down while sending.
                if let Some(shared) = self.registry.get(guild_id) {
                    shared.lock().await.last_notification = Some(message_id);
                }
            }
            Err(e) => warn!("[{}] failed to send now-playing message: {}", guild_id, e),
        }

        self.last_render.insert(guild_id.clone(), Instant::now());
    }

    /// Drop debounce state for guilds that no longer have a session. Run by
    /// the cleanup sweep.
    pub fn drop_orphans(&self) {
        let orphans: Vec<GuildId> = self
            .pending
            .iter()
            .map(|e| e.key().clone())
            .filter(|g| !self.registry.contains(g))
            .collect();
        for guild_id in orphans {
            if let Some((_, task)) = self.pending.remove(&guild_id) {
                task.abort();
                debug!("[{}] dropped orphaned notification timer", guild_id);
            }
        }

        self.last_render.retain(|g, _| self.registry.contains(g));
    }

    /// Abort every pending render (stop/restart paths).
    pub fn cancel_all(&self) {
        let keys: Vec<GuildId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for guild_id in keys {
            if let Some((_, task)) = self.pending.remove(&guild_id) {
                task.abort();
            }
        }
    }
}
