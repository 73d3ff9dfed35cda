//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Polling engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock budget for the whole polling session
    pub poll_duration: Duration,
    /// Delay between cycles
    pub poll_interval: Duration,
    /// Task concurrency cap. Kept small on purpose: each task may chain
    /// several step executions and each execution spawns a heavy child
    /// process. Uncompleted records simply reappear next cycle.
    pub worker_pool_size: usize,
    /// How long a cycle waits for its tasks before letting stragglers
    /// continue in the background
    pub cycle_soft_timeout: Duration,
    /// Validity of status cache entries
    pub status_cache_ttl: Duration,
    /// Directory holding the step executables
    pub scripts_dir: PathBuf,
    /// Default per-step timeout
    pub step_timeout: Duration,
    /// Timeout for the frame-processing step, which fans out over every
    /// child frame and runs far longer than the others
    pub frame_processing_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let poll_interval = Duration::from_secs(30);
        Self {
            poll_duration: Duration::from_secs(3600),
            poll_interval,
            worker_pool_size: 5,
            cycle_soft_timeout: Duration::from_secs(30),
            status_cache_ttl: poll_interval,
            scripts_dir: PathBuf::from("steps"),
            step_timeout: Duration::from_secs(300),
            frame_processing_timeout: Duration::from_secs(1800),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let poll_interval = Duration::from_secs(
            std::env::var("MLOG_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        );

        Self {
            poll_duration: Duration::from_secs(
                std::env::var("MLOG_POLL_DURATION_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            poll_interval,
            worker_pool_size: std::env::var("MLOG_WORKER_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            cycle_soft_timeout: Duration::from_secs(
                std::env::var("MLOG_CYCLE_SOFT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            // Defaults to the poll interval: a cached status is trusted for
            // at most one cycle.
            status_cache_ttl: std::env::var("MLOG_STATUS_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(poll_interval),
            scripts_dir: std::env::var("MLOG_STEPS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("steps")),
            step_timeout: Duration::from_secs(
                std::env::var("MLOG_STEP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            frame_processing_timeout: Duration::from_secs(
                std::env::var("MLOG_FRAME_PROCESSING_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_duration, Duration::from_secs(3600));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.worker_pool_size, 5);
        assert_eq!(config.cycle_soft_timeout, Duration::from_secs(30));
        assert_eq!(config.status_cache_ttl, config.poll_interval);
        assert_eq!(config.step_timeout, Duration::from_secs(300));
        assert_eq!(config.frame_processing_timeout, Duration::from_secs(1800));
    }
}
