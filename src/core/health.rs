use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::common::types::{GuildId, now_ms};

/// Advisory stream quality tiers in kbps, keyed off guild size.
pub const QUALITY_BASE: u32 = 128;
pub const QUALITY_MID: u32 = 192;
pub const QUALITY_HIGH: u32 = 256;

/// Liveness and reconnect bookkeeping owned by the supervisor. The interval
/// tasks that read it live on `RadioCore`; keeping decisions as pure
/// functions below keeps them testable without timers.
pub struct HealthState {
    last_heartbeat: AtomicU64,
    reconnect_attempts: AtomicU32,
    /// Advisory target quality per guild; metadata only, never changes the
    /// live stream.
    pub stream_quality: DashMap<GuildId, u32>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            last_heartbeat: AtomicU64::new(now_ms()),
            reconnect_attempts: AtomicU32::new(0),
            stream_quality: DashMap::new(),
        }
    }

    pub fn beat(&self) {
        self.last_heartbeat.store(now_ms(), Ordering::Relaxed);
    }

    pub fn last_heartbeat(&self) -> u64 {
        self.last_heartbeat.load(Ordering::Relaxed)
    }

    /// Returns the attempt count after incrementing.
    pub fn record_attempt(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn reset_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// A heartbeat older than `stale_after_ms` means the process lost its pulse
/// and only a full restart recovers it.
pub fn should_restart(now_ms: u64, last_heartbeat_ms: u64, stale_after_ms: u64) -> bool {
    now_ms.saturating_sub(last_heartbeat_ms) > stale_after_ms
}

/// Past the attempt cap, reconnecting escalates to a full restart.
pub fn should_give_up(attempts: u32, max_attempts: u32) -> bool {
    attempts > max_attempts
}

/// Tiered advisory quality from guild member count.
pub fn quality_tier(member_count: u32) -> u32 {
    if member_count > 100 {
        QUALITY_HIGH
    } else if member_count > 50 {
        QUALITY_MID
    } else {
        QUALITY_BASE
    }
}

/// Network-class client errors funnel into the reconnect ladder rather than
/// surfacing to any per-guild caller.
pub fn is_network_error(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("econnreset")
        || msg.contains("enotfound")
        || msg.contains("connection reset")
        || msg.contains("dns")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
