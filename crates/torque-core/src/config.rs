use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::task::BackoffPolicy;

/// Runtime configuration, loaded once at process start from the environment
/// (12-factor style, `dotenvy` picking up a `.env` file in development) and
/// validated before anything else is wired up.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub authenticate: bool,
    /// Shared bearer token the convenience auth middleware checks
    /// `Authorization` against when `authenticate` is set. `None` means the
    /// check is skipped; a front-door ingress layer is assumed to own it
    /// instead.
    pub shared_credential: Option<String>,
    pub enable_hsts: bool,
    pub backoff_policy: BackoffPolicy,
    pub backoff_base_delay: Duration,
    pub backoff_max_delay: Duration,
    pub backoff_max_attempts: Option<u32>,
    pub task_timeout: Duration,
    pub claim_duration: Duration,
    pub poll_interval: Duration,
    pub gc_interval: Duration,
    pub gc_retention: Duration,
    pub workers_count: usize,
}

impl Config {
    /// Load from the environment, falling back to sane development defaults
    /// for anything not set. `DATABASE_URL` has no default: it's the one
    /// thing we refuse to guess.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?,
            bind_addr: env::var("TORQUE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid TORQUE_BIND_ADDR: {e}"))?,
            authenticate: env_bool("TORQUE_AUTHENTICATE", true),
            shared_credential: env::var("TORQUE_SHARED_CREDENTIAL").ok(),
            enable_hsts: env_bool("TORQUE_ENABLE_HSTS", true),
            backoff_policy: env::var("TORQUE_BACKOFF_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(BackoffPolicy::Exponential),
            backoff_base_delay: env_duration_ms("TORQUE_BACKOFF_BASE_DELAY_MS", 1_000),
            backoff_max_delay: env_duration_ms("TORQUE_BACKOFF_MAX_DELAY_MS", 60_000),
            backoff_max_attempts: env::var("TORQUE_BACKOFF_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok()),
            task_timeout: env_duration_ms("TORQUE_TASK_TIMEOUT_MS", 10_000),
            claim_duration: env_duration_ms("TORQUE_CLAIM_DURATION_MS", 30_000),
            poll_interval: env_duration_ms("TORQUE_POLL_INTERVAL_MS", 1_000),
            gc_interval: env_duration_ms("TORQUE_GC_INTERVAL_MS", 60_000),
            gc_retention: Duration::from_secs(env_u64("TORQUE_GC_RETENTION_SECS", 86_400)),
            workers_count: env::var("TORQUE_WORKERS_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field constraints that can't be expressed per-key. The claim
    /// duration has to outlast the outbound timeout by a real margin or a
    /// worker can legitimately still be mid-request when another claimant
    /// becomes eligible to reclaim the same task.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers_count == 0 {
            anyhow::bail!("TORQUE_WORKERS_COUNT must be at least 1");
        }
        if self.claim_duration <= self.task_timeout {
            anyhow::bail!(
                "TORQUE_CLAIM_DURATION_MS ({:?}) must exceed TORQUE_TASK_TIMEOUT_MS ({:?})",
                self.claim_duration,
                self.task_timeout
            );
        }
        let margin = self.claim_duration - self.task_timeout;
        if margin < Duration::from_millis(500) {
            anyhow::bail!(
                "claim duration must exceed task timeout by at least 500ms of margin, got {:?}",
                margin
            );
        }
        if self.backoff_base_delay > self.backoff_max_delay {
            anyhow::bail!("TORQUE_BACKOFF_BASE_DELAY_MS must not exceed TORQUE_BACKOFF_MAX_DELAY_MS");
        }
        Ok(())
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            database_url: "postgres://localhost/torque".to_string(),
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            authenticate: true,
            shared_credential: None,
            enable_hsts: true,
            backoff_policy: BackoffPolicy::Exponential,
            backoff_base_delay: Duration::from_secs(1),
            backoff_max_delay: Duration::from_secs(60),
            backoff_max_attempts: Some(5),
            task_timeout: Duration::from_secs(10),
            claim_duration: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            gc_interval: Duration::from_secs(60),
            gc_retention: Duration::from_secs(86_400),
            workers_count: 10,
        }
    }

    #[test]
    fn default_shaped_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn claim_duration_shorter_than_timeout_is_rejected() {
        let mut config = base_config();
        config.claim_duration = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn claim_duration_without_margin_is_rejected() {
        let mut config = base_config();
        config.claim_duration = config.task_timeout + Duration::from_millis(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = base_config();
        config.workers_count = 0;
        assert!(config.validate().is_err());
    }
}
