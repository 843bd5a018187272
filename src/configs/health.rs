use serde::{Deserialize, Serialize};

/// Supervisor timers and the gateway reconnect ladder.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub heartbeat_interval_ms: u64,
    pub health_check_interval_ms: u64,
    /// A heartbeat older than this triggers a full restart.
    pub heartbeat_stale_ms: u64,
    pub cleanup_interval_ms: u64,
    /// Sessions not playing and idle longer than this are evicted by the
    /// cleanup sweep.
    pub idle_threshold_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            health_check_interval_ms: 120_000,
            heartbeat_stale_ms: 120_000,
            cleanup_interval_ms: 600_000,
            idle_threshold_ms: 300_000,
            max_reconnect_attempts: 5,
            reconnect_backoff_ms: 5_000,
        }
    }
}
