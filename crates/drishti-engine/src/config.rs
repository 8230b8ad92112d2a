use std::time::Duration;

/// Orchestrator tuning knobs, threaded explicitly into [`Orchestrator::spawn`].
///
/// [`Orchestrator::spawn`]: crate::orchestrator::Orchestrator::spawn
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Jobs allowed in flight simultaneously.
    pub max_concurrent_jobs: usize,
    /// Wall-clock budget per job, enforced at stage boundaries.
    pub job_timeout: Duration,
    /// Retries per stage on transient dependency failures.
    pub retry_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    pub enable_caching: bool,
    pub cache_ttl: Duration,
    /// Pending jobs held beyond the concurrency limit.
    pub queue_capacity: usize,
    /// Terminal jobs retained for status lookups.
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            job_timeout: Duration::from_secs(30 * 60),
            retry_attempts: 2,
            retry_base_delay: Duration::from_secs(2),
            enable_caching: true,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            queue_capacity: 256,
            history_limit: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.job_timeout, Duration::from_secs(1800));
        assert_eq!(config.retry_attempts, 2);
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(config.queue_capacity, 256);
        assert!(config.enable_caching);
    }
}
