//! The per-guild voice-streaming session core: registry, access guard,
//! station player, notification debounce, health supervisor, and resume
//! coordination, all owned by [`RadioCore`].

pub mod access;
pub mod controls;
pub mod health;
pub mod notify;
pub mod playback;
pub mod registry;
pub mod resume;
pub mod session;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioPipeline, PlaybackState};
use crate::common::errors::CoreError;
use crate::common::types::{ChannelId, GuildId, Shared, now_ms};
use crate::configs::Config;
use crate::gateway::{ChannelIo, ConnectionState, DiscordGateway, VoiceGateway};
use crate::protocol::RadioEvent;
use crate::storage::{GuildStore, StationStore};

use self::access::AccessGuard;
use self::health::HealthState;
use self::notify::NowPlayingNotifier;
use self::registry::SessionRegistry;
use self::session::VoiceSession;

/// The collaborator set the host process wires in. Implementations live on
/// the host side; the core only drives the traits.
pub struct Collaborators {
    pub discord: Arc<dyn DiscordGateway>,
    pub voice: Arc<dyn VoiceGateway>,
    pub pipeline: Arc<dyn AudioPipeline>,
    pub channel_io: Arc<dyn ChannelIo>,
    pub stations: Arc<dyn StationStore>,
    pub guilds: Arc<dyn GuildStore>,
}

/// Owner of all per-guild radio state. One instance per process; no
/// ambient globals, every keyed map lives on this struct or its registry.
pub struct RadioCore {
    pub(crate) config: Config,
    pub(crate) discord: Arc<dyn DiscordGateway>,
    pub(crate) voice: Arc<dyn VoiceGateway>,
    pub(crate) pipeline: Arc<dyn AudioPipeline>,
    pub(crate) channel_io: Arc<dyn ChannelIo>,
    pub(crate) stations: Arc<dyn StationStore>,
    pub(crate) guilds: Arc<dyn GuildStore>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) notifier: Arc<NowPlayingNotifier>,
    pub(crate) guard: AccessGuard,
    pub(crate) health: HealthState,
    events_tx: flume::Sender<RadioEvent>,
    events_rx: flume::Receiver<RadioEvent>,
    cancel: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl RadioCore {
    pub fn new(config: Config, collaborators: Collaborators) -> Arc<Self> {
        let Collaborators {
            discord,
            voice,
            pipeline,
            channel_io,
            stations,
            guilds,
        } = collaborators;

        let registry = Arc::new(SessionRegistry::new());
        let notifier = Arc::new(NowPlayingNotifier::new(
            channel_io.clone(),
            registry.clone(),
            Duration::from_millis(config.radio.notify_window_ms),
        ));
        let guard = AccessGuard::new(discord.clone());
        let (events_tx, events_rx) = flume::unbounded();

        Arc::new(Self {
            config,
            discord,
            voice,
            pipeline,
            channel_io,
            stations,
            guilds,
            registry,
            notifier,
            guard,
            health: HealthState::new(),
            events_tx,
            events_rx,
            cancel: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
        })
    }

    /// Event stream for the host broadcast layer. flume is MPMC but not
    /// broadcast: hand the receiver to a single consumer.
    pub fn subscribe(&self) -> flume::Receiver<RadioEvent> {
        self.events_rx.clone()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub(crate) fn emit(&self, event: RadioEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Spawn the supervisor timers: heartbeat, health check, and cleanup.
    pub fn start(self: Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        let core = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                core.config.health.heartbeat_interval_ms,
            ));
            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if core.discord.is_ready() {
                            core.health.beat();
                            debug!("heartbeat ok ({} sessions)", core.registry.len());
                        }
                    }
                }
            }
        }));

        let core = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                core.config.health.health_check_interval_ms,
            ));
            // The first tick fires immediately; skip it so a freshly
            // started core is not health-checked before connecting.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => break,
                    _ = interval.tick() => core.run_health_check().await,
                }
            }
        }));

        let core = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(
                core.config.health.cleanup_interval_ms,
            ));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => break,
                    _ = interval.tick() => core.run_cleanup().await,
                }
            }
        }));
    }

    /// Stop the supervisor timers and tear down every session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }
        self.stop_all().await;
    }

    // -----------------------------------------------------------------
    // Health supervision
    // -----------------------------------------------------------------

    /// One health-check cycle: restart on a stale heartbeat, reconnect on a
    /// dead gateway, otherwise repair per-guild voice connections and
    /// refresh the advisory quality tiers.
    pub async fn run_health_check(&self) {
        let now = now_ms();
        if health::should_restart(
            now,
            self.health.last_heartbeat(),
            self.config.health.heartbeat_stale_ms,
        ) {
            warn!("bot unresponsive, starting full restart");
            self.restart_all().await;
            return;
        }

        if !self.discord.is_ready() {
            warn!("gateway not connected, attempting reconnect");
            self.reconnect().await;
            return;
        }

        for guild_id in self.registry.guild_ids() {
            let Some(shared) = self.registry.get(&guild_id) else {
                continue;
            };
            let disconnected =
                { shared.lock().await.connection.state() == ConnectionState::Disconnected };
            if disconnected {
                info!("[{}] voice connection lost, rejoining", guild_id);
                if let Err(e) = self.rejoin_voice(&guild_id).await {
                    error!("[{}] voice rejoin failed: {}", guild_id, e);
                }
            }
        }

        for guild_id in self.registry.guild_ids() {
            let Some(shared) = self.registry.get(&guild_id) else {
                continue;
            };
            let playing = { shared.lock().await.is_playing };
            if !playing {
                continue;
            }
            if let Some(count) = self.discord.member_count(&guild_id).await {
                self.health
                    .stream_quality
                    .insert(guild_id, health::quality_tier(count));
            }
        }

        debug!("health check ok");
    }

    /// Cleanup cycle: evict idle sessions and drop keyed state whose guild
    /// no longer has a session.
    pub async fn run_cleanup(&self) {
        let evicted = self
            .registry
            .sweep_idle(self.config.health.idle_threshold_ms)
            .await;
        self.notifier.drop_orphans();
        self.health
            .stream_quality
            .retain(|g, _| self.registry.contains(g));
        if evicted > 0 {
            info!("cleanup evicted {} idle sessions", evicted);
        }
    }

    /// One rung of the reconnect ladder. Past the attempt cap this
    /// escalates to a full restart and resets the counter; the counter also
    /// resets on a successful reconnect.
    pub async fn reconnect(&self) {
        let attempts = self.health.record_attempt();
        let max = self.config.health.max_reconnect_attempts;

        if health::should_give_up(attempts, max) {
            warn!("max reconnect attempts reached, restarting bot");
            self.health.reset_attempts();
            self.restart_all().await;
            return;
        }

        info!("reconnect attempt {}/{}", attempts, max);
        if let Err(e) = self.discord.disconnect().await {
            debug!("disconnect before reconnect failed: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(self.config.health.reconnect_backoff_ms)).await;

        match self.discord.connect().await {
            Ok(()) => {
                self.health.reset_attempts();
                info!("reconnect succeeded");
            }
            Err(e) => error!("reconnect failed: {}", e),
        }
    }

    /// Full restart: tear everything down, then bring the gateway back.
    /// The host's ready handler drives setup and resume afterwards.
    pub async fn restart_all(&self) {
        info!("restarting radio core");
        self.stop_all().await;
        tokio::time::sleep(Duration::from_millis(self.config.health.reconnect_backoff_ms)).await;
        match self.discord.connect().await {
            Ok(()) => {
                self.health.reset_attempts();
                self.health.beat();
            }
            Err(e) => error!("gateway reconnect during restart failed: {}", e),
        }
    }

    /// Tear down every session, cancel pending notifications, and report
    /// offline.
    pub async fn stop_all(&self) {
        info!("stopping all radio sessions");
        self.notifier.cancel_all();
        self.registry.drain().await;
        if let Err(e) = self.discord.disconnect().await {
            debug!("gateway disconnect during stop failed: {}", e);
        }
        self.emit(RadioEvent::StatusUpdate {
            is_online: false,
            is_playing: false,
            current_station_id: None,
        });
    }

    /// Host entry point for gateway disconnect events.
    pub async fn handle_disconnect(&self) {
        warn!("gateway disconnected");
        self.emit(RadioEvent::StatusUpdate {
            is_online: false,
            is_playing: false,
            current_station_id: None,
        });
        self.reconnect().await;
    }

    /// Host entry point for gateway client errors. Network-class errors
    /// feed the reconnect ladder; everything else is only logged.
    pub async fn handle_client_error(&self, message: &str) {
        error!("discord client error: {}", message);
        self.emit(RadioEvent::StatusUpdate {
            is_online: false,
            is_playing: false,
            current_station_id: None,
        });
        if health::is_network_error(message) {
            self.reconnect().await;
        }
    }

    // -----------------------------------------------------------------
    // Session construction
    // -----------------------------------------------------------------

    /// Join the voice channel, build the player, and register the session.
    /// The join is bounded by the configured ready timeout.
    pub(crate) async fn create_session(
        &self,
        guild_id: &GuildId,
        voice_channel_id: ChannelId,
        control_channel_id: ChannelId,
    ) -> Result<Shared<VoiceSession>, CoreError> {
        let connection = self
            .voice
            .join_channel(&voice_channel_id, guild_id)
            .await
            .map_err(|e| CoreError::VoiceJoin {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            })?;

        let ready_timeout = Duration::from_millis(self.config.radio.ready_timeout_ms);
        if !connection.wait_ready(ready_timeout).await {
            connection.destroy().await;
            return Err(CoreError::JoinTimeout {
                guild_id: guild_id.clone(),
                waited: ready_timeout,
            });
        }

        let player = self.pipeline.create_player();
        let player_events = player.events();

        let volume = match self.guilds.get_guild(guild_id).await {
            Ok(Some(record)) => record
                .volume
                .unwrap_or(self.config.radio.default_volume)
                .min(200),
            Ok(None) => self.config.radio.default_volume,
            Err(e) => {
                warn!("[{}] could not load stored volume: {}", guild_id, e);
                self.config.radio.default_volume
            }
        };

        let session = VoiceSession::new(
            guild_id.clone(),
            voice_channel_id,
            control_channel_id,
            connection,
            player,
            volume,
        );
        let shared = self.registry.insert(session);

        let watch = self.spawn_player_watch(guild_id.clone(), shared.clone(), player_events);
        shared.lock().await.watch_task = Some(watch);

        Ok(shared)
    }

    /// Mirror player state transitions into the session and relay global
    /// playback transitions. Ends when the player closes its event channel;
    /// aborted on teardown.
    pub(crate) fn spawn_player_watch(
        &self,
        guild_id: GuildId,
        shared: Shared<VoiceSession>,
        events: flume::Receiver<PlaybackState>,
    ) -> JoinHandle<()> {
        let events_tx = self.events_tx.clone();
        let discord = self.discord.clone();

        tokio::spawn(async move {
            while let Ok(state) = events.recv_async().await {
                match state {
                    PlaybackState::Playing => {
                        let station_id = {
                            let mut session = shared.lock().await;
                            session.is_playing = true;
                            session.touch();
                            session.current_station.as_ref().map(|s| s.id)
                        };
                        let _ = events_tx.send(RadioEvent::StatusUpdate {
                            is_online: discord.is_ready(),
                            is_playing: true,
                            current_station_id: station_id,
                        });
                    }
                    PlaybackState::Paused => {
                        let station_id = {
                            let mut session = shared.lock().await;
                            session.is_playing = false;
                            session.touch();
                            session.current_station.as_ref().map(|s| s.id)
                        };
                        let _ = events_tx.send(RadioEvent::StatusUpdate {
                            is_online: discord.is_ready(),
                            is_playing: false,
                            current_station_id: station_id,
                        });
                    }
                    PlaybackState::Idle | PlaybackState::AutoPaused => {
                        let mut session = shared.lock().await;
                        session.is_playing = false;
                    }
                    PlaybackState::Buffering => {}
                }
            }
            debug!("[{}] player event stream ended", guild_id);
        })
    }

    /// Rejoin a guild's stored voice channel after its connection dropped,
    /// resuming the active station if there was one.
    pub(crate) async fn rejoin_voice(&self, guild_id: &GuildId) -> Result<(), CoreError> {
        let Some(shared) = self.registry.get(guild_id) else {
            return Ok(());
        };
        let voice_channel = { shared.lock().await.voice_channel_id.clone() };

        let connection = self
            .voice
            .join_channel(&voice_channel, guild_id)
            .await
            .map_err(|e| CoreError::VoiceJoin {
                guild_id: guild_id.clone(),
                reason: e.to_string(),
            })?;

        {
            let mut session = shared.lock().await;
            let old = std::mem::replace(&mut session.connection, connection);
            old.destroy().await;
        }

        let station = { shared.lock().await.current_station.clone() };
        if let Some(station) = station {
            self.play_station_system(guild_id, station).await?;
        }

        info!("[{}] voice connection restored", guild_id);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Listener counting
    // -----------------------------------------------------------------

    /// Non-bot members of the session's bound voice channel.
    pub async fn listener_count(&self, guild_id: &GuildId) -> usize {
        let Some(shared) = self.registry.get(guild_id) else {
            return 0;
        };
        let channel = { shared.lock().await.voice_channel_id.clone() };
        self.discord
            .voice_channel_members(guild_id, &channel)
            .await
            .iter()
            .filter(|m| !m.is_bot)
            .count()
    }

    /// Non-bot occupants across every playing session.
    pub async fn total_listeners(&self) -> usize {
        let mut total = 0;
        for guild_id in self.registry.guild_ids() {
            let Some(shared) = self.registry.get(&guild_id) else {
                continue;
            };
            let playing = { shared.lock().await.is_playing };
            if playing {
                total += self.listener_count(&guild_id).await;
            }
        }
        total
    }
}
