//! Mock collaborators and a harness for driving the core end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use radiolink::audio::{AudioPipeline, AudioPlayer, AudioResource, PlaybackState};
use radiolink::common::types::{AnyResult, ChannelId, GuildId, MessageId, StationId, UserId};
use radiolink::configs::Config;
use radiolink::core::{Collaborators, RadioCore};
use radiolink::gateway::{
    ChannelIo, ChannelKind, ConnectionState, DiscordGateway, NowPlayingCard, VoiceConnection,
    VoiceGateway, VoiceMember,
};
use radiolink::protocol::RadioEvent;
use radiolink::storage::{GuildRecord, GuildStore, Station, StationStore};

/// Ordered action log shared by all mocks; lets tests assert sequencing
/// like "stop precedes play".
pub type ActionLog = Arc<Mutex<Vec<String>>>;

pub fn log(log: &ActionLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

pub fn station(id: i64, name: &str, url: &str) -> Station {
    Station {
        id: StationId(id),
        name: name.to_string(),
        url: url.to_string(),
        genre: "Test Genre".to_string(),
        quality: "128kbps".to_string(),
        is_favorite: false,
    }
}

// ---------------------------------------------------------------------------
// Discord gateway mock
// ---------------------------------------------------------------------------

pub struct MockDiscord {
    ready: AtomicBool,
    /// connect() fails while this is nonzero, decrementing per call.
    pub fail_connects: AtomicU32,
    pub connect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    guilds: Mutex<Vec<GuildId>>,
    member_channels: Mutex<HashMap<(String, String), ChannelId>>,
    bot_channels: Mutex<HashMap<String, ChannelId>>,
    occupants: Mutex<HashMap<String, Vec<VoiceMember>>>,
    member_counts: Mutex<HashMap<String, u32>>,
}

impl MockDiscord {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            fail_connects: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            guilds: Mutex::new(Vec::new()),
            member_channels: Mutex::new(HashMap::new()),
            bot_channels: Mutex::new(HashMap::new()),
            occupants: Mutex::new(HashMap::new()),
            member_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn add_guild(&self, guild: &str) {
        self.guilds.lock().unwrap().push(GuildId::from(guild));
    }

    pub fn put_member(&self, guild: &str, user: &str, channel: &str) {
        self.member_channels
            .lock()
            .unwrap()
            .insert((guild.to_string(), user.to_string()), ChannelId::from(channel));
    }

    pub fn set_bot_channel(&self, guild: &str, channel: &str) {
        self.bot_channels
            .lock()
            .unwrap()
            .insert(guild.to_string(), ChannelId::from(channel));
    }

    pub fn put_occupant(&self, channel: &str, user: &str, is_bot: bool) {
        self.occupants
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(VoiceMember {
                user_id: UserId::from(user),
                is_bot,
            });
    }

    pub fn set_member_count(&self, guild: &str, count: u32) {
        self.member_counts
            .lock()
            .unwrap()
            .insert(guild.to_string(), count);
    }
}

#[async_trait]
impl DiscordGateway for MockDiscord {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> AnyResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err("getaddrinfo ENOTFOUND gateway.discord.gg".into());
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> AnyResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn guild_ids(&self) -> Vec<GuildId> {
        self.guilds.lock().unwrap().clone()
    }

    async fn guild_name(&self, guild_id: &GuildId) -> Option<String> {
        Some(format!("guild {}", guild_id))
    }

    async fn member_count(&self, guild_id: &GuildId) -> Option<u32> {
        self.member_counts.lock().unwrap().get(&guild_id.0).copied()
    }

    async fn member_voice_channel(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
    ) -> Option<ChannelId> {
        self.member_channels
            .lock()
            .unwrap()
            .get(&(guild_id.0.clone(), user_id.0.clone()))
            .cloned()
    }

    async fn bot_voice_channel(&self, guild_id: &GuildId) -> Option<ChannelId> {
        self.bot_channels.lock().unwrap().get(&guild_id.0).cloned()
    }

    async fn channel_name(&self, _guild_id: &GuildId, channel_id: &ChannelId) -> Option<String> {
        Some(format!("#{}", channel_id))
    }

    async fn voice_channel_members(
        &self,
        _guild_id: &GuildId,
        channel_id: &ChannelId,
    ) -> Vec<VoiceMember> {
        self.occupants
            .lock()
            .unwrap()
            .get(&channel_id.0)
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Voice gateway mock
// ---------------------------------------------------------------------------

pub struct MockConnection {
    guild: String,
    state: Arc<Mutex<ConnectionState>>,
    ready_result: Arc<AtomicBool>,
    log: ActionLog,
}

#[async_trait]
impl VoiceConnection for MockConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn wait_ready(&self, _timeout: Duration) -> bool {
        if self.ready_result.load(Ordering::SeqCst) {
            *self.state.lock().unwrap() = ConnectionState::Ready;
            true
        } else {
            false
        }
    }

    async fn destroy(&self) {
        *self.state.lock().unwrap() = ConnectionState::Destroyed;
        log(&self.log, format!("connection:destroy {}", self.guild));
    }
}

pub struct MockVoice {
    /// Result handed to every `wait_ready` call.
    pub ready_result: Arc<AtomicBool>,
    /// When set, `join_channel` fails outright.
    pub fail_joins: AtomicBool,
    pub joins: Mutex<Vec<(ChannelId, GuildId)>>,
    /// Connection state handles by guild, so tests can simulate drops.
    states: Mutex<HashMap<String, Arc<Mutex<ConnectionState>>>>,
    log: ActionLog,
}

impl MockVoice {
    pub fn new(log: ActionLog) -> Self {
        Self {
            ready_result: Arc::new(AtomicBool::new(true)),
            fail_joins: AtomicBool::new(false),
            joins: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn set_connection_state(&self, guild: &str, state: ConnectionState) {
        if let Some(handle) = self.states.lock().unwrap().get(guild) {
            *handle.lock().unwrap() = state;
        }
    }

    pub fn join_count(&self) -> usize {
        self.joins.lock().unwrap().len()
    }
}

#[async_trait]
impl VoiceGateway for MockVoice {
    async fn join_channel(
        &self,
        channel_id: &ChannelId,
        guild_id: &GuildId,
    ) -> AnyResult<Box<dyn VoiceConnection>> {
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err("voice join refused".into());
        }
        self.joins
            .lock()
            .unwrap()
            .push((channel_id.clone(), guild_id.clone()));
        log(&self.log, format!("voice:join {} {}", guild_id, channel_id));

        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        self.states
            .lock()
            .unwrap()
            .insert(guild_id.0.clone(), state.clone());

        Ok(Box::new(MockConnection {
            guild: guild_id.0.clone(),
            state,
            ready_result: self.ready_result.clone(),
            log: self.log.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Audio pipeline mock
// ---------------------------------------------------------------------------

pub struct MockResource {
    pub url: String,
    pub inline_volume: bool,
    pub applied_gains: Mutex<Vec<f32>>,
    log: ActionLog,
}

impl AudioResource for MockResource {
    fn set_volume(&self, gain: f32) -> bool {
        if !self.inline_volume {
            return false;
        }
        self.applied_gains.lock().unwrap().push(gain);
        log(&self.log, format!("resource:volume {} {:.2}", self.url, gain));
        true
    }
}

pub struct MockPlayer {
    state: Mutex<PlaybackState>,
    tx: flume::Sender<PlaybackState>,
    rx: flume::Receiver<PlaybackState>,
    log: ActionLog,
}

#[async_trait]
impl AudioPlayer for MockPlayer {
    async fn play(&self, _resource: Arc<dyn AudioResource>) {
        *self.state.lock().unwrap() = PlaybackState::Playing;
        log(&self.log, "player:play");
        let _ = self.tx.send(PlaybackState::Playing);
    }

    async fn stop(&self, _force: bool) {
        *self.state.lock().unwrap() = PlaybackState::Idle;
        log(&self.log, "player:stop");
        let _ = self.tx.send(PlaybackState::Idle);
    }

    async fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
    }

    fn events(&self) -> flume::Receiver<PlaybackState> {
        self.rx.clone()
    }
}

pub struct MockPipeline {
    /// When set, the next `create_resource` fails and the flag clears.
    pub fail_next_resource: AtomicBool,
    /// Resources are created without inline volume when false.
    pub inline_volume: AtomicBool,
    pub created: Mutex<Vec<String>>,
    pub resources: Mutex<Vec<Arc<MockResource>>>,
    log: ActionLog,
}

impl MockPipeline {
    pub fn new(log: ActionLog) -> Self {
        Self {
            fail_next_resource: AtomicBool::new(false),
            inline_volume: AtomicBool::new(true),
            created: Mutex::new(Vec::new()),
            resources: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn last_resource(&self) -> Option<Arc<MockResource>> {
        self.resources.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AudioPipeline for MockPipeline {
    fn create_player(&self) -> Box<dyn AudioPlayer> {
        let (tx, rx) = flume::unbounded();
        Box::new(MockPlayer {
            state: Mutex::new(PlaybackState::Idle),
            tx,
            rx,
            log: self.log.clone(),
        })
    }

    async fn create_resource(&self, url: &str) -> AnyResult<Arc<dyn AudioResource>> {
        if self.fail_next_resource.swap(false, Ordering::SeqCst) {
            return Err("stream connection reset".into());
        }
        self.created.lock().unwrap().push(url.to_string());
        log(&self.log, format!("resource:create {}", url));
        let resource = Arc::new(MockResource {
            url: url.to_string(),
            inline_volume: self.inline_volume.load(Ordering::SeqCst),
            applied_gains: Mutex::new(Vec::new()),
            log: self.log.clone(),
        });
        self.resources.lock().unwrap().push(resource.clone());
        Ok(resource)
    }
}

// ---------------------------------------------------------------------------
// Channel IO mock
// ---------------------------------------------------------------------------

pub struct MockChannelIo {
    counter: AtomicUsize,
    /// Every delete fails while set; exercises the tolerate-absent path.
    pub fail_deletes: AtomicBool,
    pub sent: Mutex<Vec<(ChannelId, String, usize)>>,
    pub deleted: Mutex<Vec<MessageId>>,
    log: ActionLog,
}

impl MockChannelIo {
    pub fn new(log: ActionLog) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail_deletes: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn sent_stations(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.1.clone()).collect()
    }
}

#[async_trait]
impl ChannelIo for MockChannelIo {
    async fn ensure_channel(
        &self,
        guild_id: &GuildId,
        _name: &str,
        kind: ChannelKind,
    ) -> AnyResult<ChannelId> {
        let prefix = match kind {
            ChannelKind::Voice => "vc",
            ChannelKind::Text => "tc",
        };
        Ok(ChannelId(format!("{}-{}", prefix, guild_id)))
    }

    async fn send_now_playing(
        &self,
        channel_id: &ChannelId,
        card: &NowPlayingCard,
    ) -> AnyResult<MessageId> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push((
            channel_id.clone(),
            card.station.name.clone(),
            card.listeners,
        ));
        log(&self.log, format!("notify:send {}", card.station.name));
        Ok(MessageId(format!("m{}", n)))
    }

    async fn delete_message(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> AnyResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err("message already deleted".into());
        }
        self.deleted.lock().unwrap().push(message_id.clone());
        log(&self.log, format!("notify:delete {}", message_id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

pub struct MockStationStore {
    pub stations: Mutex<HashMap<i64, Station>>,
}

impl MockStationStore {
    pub fn new() -> Self {
        Self {
            stations: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, station: Station) {
        self.stations.lock().unwrap().insert(station.id.0, station);
    }
}

#[async_trait]
impl StationStore for MockStationStore {
    async fn get_station(&self, id: StationId) -> AnyResult<Option<Station>> {
        Ok(self.stations.lock().unwrap().get(&id.0).cloned())
    }

    async fn get_all_stations(&self) -> AnyResult<Vec<Station>> {
        Ok(self.stations.lock().unwrap().values().cloned().collect())
    }
}

pub struct MockGuildStore {
    pub records: Mutex<HashMap<String, GuildRecord>>,
    /// Every save fails while set; exercises best-effort persistence.
    pub fail_saves: AtomicBool,
}

impl MockGuildStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn put(&self, guild: &str, record: GuildRecord) {
        self.records.lock().unwrap().insert(guild.to_string(), record);
    }

    pub fn last_played(&self, guild: &str) -> Option<StationId> {
        self.records
            .lock()
            .unwrap()
            .get(guild)
            .and_then(|r| r.last_station_id)
    }
}

#[async_trait]
impl GuildStore for MockGuildStore {
    async fn get_guild(&self, guild_id: &GuildId) -> AnyResult<Option<GuildRecord>> {
        Ok(self.records.lock().unwrap().get(&guild_id.0).cloned())
    }

    async fn save_last_played(&self, guild_id: &GuildId, station_id: StationId) -> AnyResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("database unavailable".into());
        }
        let mut records = self.records.lock().unwrap();
        let record = records.entry(guild_id.0.clone()).or_default();
        record.last_station_id = Some(station_id);
        record.last_playing = true;
        Ok(())
    }

    async fn save_volume(&self, guild_id: &GuildId, volume: u16) -> AnyResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("database unavailable".into());
        }
        let mut records = self.records.lock().unwrap();
        let record = records.entry(guild_id.0.clone()).or_default();
        record.volume = Some(volume);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub core: Arc<RadioCore>,
    pub discord: Arc<MockDiscord>,
    pub voice: Arc<MockVoice>,
    pub pipeline: Arc<MockPipeline>,
    pub channel_io: Arc<MockChannelIo>,
    pub stations: Arc<MockStationStore>,
    pub guilds: Arc<MockGuildStore>,
    pub events: flume::Receiver<RadioEvent>,
    pub log: ActionLog,
}

impl Harness {
    pub fn new() -> Self {
        let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
        let discord = Arc::new(MockDiscord::new());
        let voice = Arc::new(MockVoice::new(log.clone()));
        let pipeline = Arc::new(MockPipeline::new(log.clone()));
        let channel_io = Arc::new(MockChannelIo::new(log.clone()));
        let stations = Arc::new(MockStationStore::new());
        let guilds = Arc::new(MockGuildStore::new());

        let core = RadioCore::new(
            Config::default(),
            Collaborators {
                discord: discord.clone(),
                voice: voice.clone(),
                pipeline: pipeline.clone(),
                channel_io: channel_io.clone(),
                stations: stations.clone(),
                guilds: guilds.clone(),
            },
        );
        let events = core.subscribe();

        Self {
            core,
            discord,
            voice,
            pipeline,
            channel_io,
            stations,
            guilds,
            events,
            log,
        }
    }

    /// Register the guild with the gateway, run setup, and record the
    /// resulting bot voice channel.
    pub async fn setup_guild(&self, guild: &str) {
        self.discord.add_guild(guild);
        self.core
            .setup(&GuildId::from(guild))
            .await
            .expect("setup should succeed");
        self.discord.set_bot_channel(guild, &format!("vc-{}", guild));
    }

    pub fn drain_events(&self) -> Vec<RadioEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Let spawned tasks (player watch, deferred notifications) run.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}
