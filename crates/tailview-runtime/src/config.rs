use std::time::Duration;

/// Tuning knobs for one session tailer and its file tailers.
///
/// Defaults are the production values; tests shrink individual fields to
/// keep wall-clock time down.
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// How long pending events and agents accumulate before one coalesced
    /// `events` frame goes out
    pub coalesce_window: Duration,

    /// Keepalive cadence
    pub heartbeat_interval: Duration,

    /// How often the idle detector runs
    pub idle_check_interval: Duration,

    /// Quiet period after which the session is declared idle
    pub idle_threshold: Duration,

    /// How long an unsubscribed session lingers before tearing down
    pub grace_period: Duration,

    /// Replayable frames retained per session
    pub ring_capacity: usize,

    /// Per-subscriber buffered-bytes level at which frames are dropped
    pub drop_threshold_bytes: usize,

    /// Existence polling cadence while a tailed file has not appeared yet
    pub existence_poll: Duration,

    /// Safety-net read cadence while a native watcher is active
    pub watcher_safety_poll: Duration,

    /// Settle time between a filesystem notification and the read it
    /// triggers
    pub notify_debounce: Duration,

    /// Read cadence when the native watcher is unavailable
    pub polling_fallback_interval: Duration,

    /// Retry cadence while the sub-agent directory does not exist yet
    pub dir_retry_interval: Duration,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(15),
            idle_check_interval: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(30),
            grace_period: Duration::from_secs(5),
            ring_capacity: 1000,
            drop_threshold_bytes: 1024 * 1024,
            existence_poll: Duration::from_millis(500),
            watcher_safety_poll: Duration::from_secs(2),
            notify_debounce: Duration::from_millis(50),
            polling_fallback_interval: Duration::from_secs(1),
            dir_retry_interval: Duration::from_secs(1),
        }
    }
}

/// Registry-level bounds
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Concurrent session tailers allowed before new subscriptions are
    /// rejected
    pub max_tailers: usize,

    /// Extra delay past the grace period before the registry sweeps an
    /// unsubscribed tailer out of its map
    pub sweep_margin: Duration,

    pub tailer: TailerConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_tailers: 10,
            sweep_margin: Duration::from_secs(1),
            tailer: TailerConfig::default(),
        }
    }
}
