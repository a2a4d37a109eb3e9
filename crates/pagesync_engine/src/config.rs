//! Configuration for the sync engine and its remote client.

use pagesync_protocol::ConflictStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// Glob patterns the watcher ignores unless overridden.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "*.swp",
    "*.tmp",
    "*~",
    ".git/**",
    "node_modules/**",
    ".mutagen/**",
    ".mutagen-*",
    "**/target/**",
    "**/.venv/**",
    "**/.next/**",
    "**/dist/**",
    "**/.turbo/**",
];

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root directory holding the project folders.
    pub projects_dir: PathBuf,
    /// Whether to run the file watcher.
    pub watch: bool,
    /// Extension of tracked files, without the dot.
    pub watch_extension: String,
    /// Quiet period before a file event is emitted.
    pub debounce: Duration,
    /// Glob patterns, relative to `projects_dir`, the watcher skips.
    pub ignore_patterns: Vec<String>,
    /// How often the queue is drained.
    pub drain_interval: Duration,
    /// How often tracked pages are polled.
    pub poll_interval: Duration,
    /// Maximum number of distinct queued operations.
    pub max_queue_size: usize,
    /// How overlapping edits are resolved.
    pub conflict_strategy: ConflictStrategy,
    /// How long soft-deleted entities are kept before collection.
    pub deleted_retention: Duration,
    /// Resolution of remote edit times. A page whose unchanged version was
    /// stamped within this long of the last sync is compared by content
    /// before a push, since a second edit in the same tick keeps the token.
    pub version_granularity: Duration,
    /// Remote client settings.
    pub client: ClientConfig,
}

impl SyncConfig {
    /// Creates a configuration rooted at `projects_dir`.
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            watch: true,
            watch_extension: "md".to_string(),
            debounce: Duration::from_millis(500),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            drain_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(60),
            max_queue_size: 1000,
            conflict_strategy: ConflictStrategy::default(),
            deleted_retention: Duration::from_secs(30 * 24 * 60 * 60),
            version_granularity: Duration::from_secs(60),
            client: ClientConfig::default(),
        }
    }

    /// Enables or disables the file watcher.
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Adds an ignore pattern.
    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Sets the drain interval.
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the queue bound.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the soft-delete retention.
    pub fn with_deleted_retention(mut self, retention: Duration) -> Self {
        self.deleted_retention = retention;
        self
    }

    /// Sets the resolution of remote edit times.
    pub fn with_version_granularity(mut self, granularity: Duration) -> Self {
        self.version_granularity = granularity;
        self
    }

    /// Sets the client configuration.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("projects")
    }
}

/// Configuration for the resilient remote client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum concurrent in-flight requests.
    pub concurrency: usize,
    /// Maximum request starts per `rate_window`.
    pub requests_per_window: usize,
    /// Window for `requests_per_window`.
    pub rate_window: Duration,
    /// First 429 backoff delay.
    pub initial_delay: Duration,
    /// Cap for all backoff delays.
    pub max_delay: Duration,
    /// Consecutive 429s before the long pause.
    pub rate_limit_pause_after: u32,
    /// Length of the long pause.
    pub rate_limit_cooldown: Duration,
    /// Consecutive failures that open the circuit.
    pub circuit_breaker_threshold: u32,
    /// Time an open circuit waits before admitting a trial.
    pub circuit_breaker_check_interval: Duration,
    /// Extra attempts for transient failures within one call.
    pub transient_retries: u32,
}

impl ClientConfig {
    /// Sets the concurrency limit.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the request-start rate.
    pub fn with_rate(mut self, requests: usize, window: Duration) -> Self {
        self.requests_per_window = requests.max(1);
        self.rate_window = window;
        self
    }

    /// Sets the initial backoff delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the long-pause policy for repeated 429s.
    pub fn with_rate_limit_pause(mut self, after: u32, cooldown: Duration) -> Self {
        self.rate_limit_pause_after = after.max(1);
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Sets the breaker threshold.
    pub fn with_circuit_breaker_threshold(mut self, threshold: u32) -> Self {
        self.circuit_breaker_threshold = threshold.max(1);
        self
    }

    /// Sets the breaker check interval.
    pub fn with_circuit_breaker_check_interval(mut self, interval: Duration) -> Self {
        self.circuit_breaker_check_interval = interval;
        self
    }

    /// Sets the number of transient retries.
    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    /// Delay before transient retry `attempt` (0-indexed): no delay first,
    /// then doubling from `initial_delay`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            requests_per_window: 3,
            rate_window: Duration::from_secs(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            rate_limit_pause_after: 5,
            rate_limit_cooldown: Duration::from_secs(60),
            circuit_breaker_threshold: 10,
            circuit_breaker_check_interval: Duration::from_secs(60),
            transient_retries: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::new("/srv/projects");
        assert_eq!(config.projects_dir, PathBuf::from("/srv/projects"));
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.conflict_strategy, ConflictStrategy::ThreeWayMerge);
        assert_eq!(config.version_granularity, Duration::from_secs(60));
        assert!(config.ignore_patterns.iter().any(|p| p == ".git/**"));
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("/p")
            .with_watch(false)
            .with_max_queue_size(5)
            .with_conflict_strategy(ConflictStrategy::LocalWins)
            .with_ignore_pattern("drafts/**");

        assert!(!config.watch);
        assert_eq!(config.max_queue_size, 5);
        assert_eq!(config.conflict_strategy, ConflictStrategy::LocalWins);
        assert_eq!(config.ignore_patterns.last().map(String::as_str), Some("drafts/**"));
    }

    #[test]
    fn delay_for_attempt_doubles_and_caps() {
        let config = ClientConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(32));
        assert_eq!(config.delay_for_attempt(40), Duration::from_secs(32));
    }

    #[test]
    fn client_config_clamps_zero() {
        let config = ClientConfig::default()
            .with_concurrency(0)
            .with_circuit_breaker_threshold(0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.circuit_breaker_threshold, 1);
    }
}
