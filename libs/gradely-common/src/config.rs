//! Runtime configuration, read once from the environment and injected as
//! explicit structs. Retry counts and time limits are per-dispatcher
//! construction parameters, never ambient globals.

use std::time::Duration;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Retry and time-limit policy for the dispatch task.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Attempts against the grading backend before giving up as `missing`.
    pub max_attempts: u32,
    /// Crossing this logs a warning; the attempt keeps running.
    pub soft_time_limit: Duration,
    /// Crossing this aborts the attempt; counts as one failed attempt.
    pub hard_time_limit: Duration,
    /// Base delay between attempts, doubled per attempt.
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            soft_time_limit: Duration::from_secs(60),
            hard_time_limit: Duration::from_secs(120),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_u32("GRADELY_MAX_ATTEMPTS", defaults.max_attempts),
            soft_time_limit: Duration::from_secs(env_u64(
                "GRADELY_SOFT_TIME_LIMIT_SECS",
                defaults.soft_time_limit.as_secs(),
            )),
            hard_time_limit: Duration::from_secs(env_u64(
                "GRADELY_HARD_TIME_LIMIT_SECS",
                defaults.hard_time_limit.as_secs(),
            )),
            retry_backoff: Duration::from_secs(env_u64(
                "GRADELY_RETRY_BACKOFF_SECS",
                defaults.retry_backoff.as_secs(),
            )),
        }
    }
}

/// Where and how to reach the external grading backend.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl GraderConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GRADER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8600".to_string()),
            api_key: std::env::var("GRADER_API_KEY").ok(),
        }
    }
}

/// Poll loop policy for asynchronously graded solutions.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before re-polling a still-running solution.
    pub interval: Duration,
    /// Polls per solution before concluding the grader lost the job.
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 20,
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: Duration::from_secs(env_u64(
                "GRADELY_POLL_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )),
            max_polls: env_u32("GRADELY_MAX_POLLS", defaults.max_polls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults_match_policy() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.soft_time_limit, Duration::from_secs(60));
        assert_eq!(config.hard_time_limit, Duration::from_secs(120));
    }
}
