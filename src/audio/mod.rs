//! Consumed audio pipeline interface. Decoding and mixing happen on the
//! far side; the core only holds handles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::types::AnyResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Paused,
    AutoPaused,
}

/// A playable stream built from a station URL. Shared so volume can be
/// adjusted on the live resource while the player owns playback.
pub trait AudioResource: Send + Sync {
    /// Apply a linear gain (1.0 = unity). Returns false when the resource
    /// has no inline volume control; playback then stays at source level.
    fn set_volume(&self, gain: f32) -> bool;
}

/// One guild's audio player. Exclusively owned by its session.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, resource: Arc<dyn AudioResource>);

    /// Stop playback. `force` discards the current resource immediately.
    async fn stop(&self, force: bool);

    async fn state(&self) -> PlaybackState;

    /// Playback-state transitions, one receiver per player. The sender side
    /// closes when the player is dropped.
    fn events(&self) -> flume::Receiver<PlaybackState>;
}

/// Factory for players and resources.
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    fn create_player(&self) -> Box<dyn AudioPlayer>;

    async fn create_resource(&self, url: &str) -> AnyResult<Arc<dyn AudioResource>>;
}
