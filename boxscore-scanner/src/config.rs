use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Process-wide network settings, overridable through `BOXSCORE_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub max_concurrency: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("boxscore/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_DELAY_MS,
            rate_limit_delay_ms: DEFAULT_RATE_LIMIT_DELAY_MS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup, keeping defaults for
    /// anything missing or unparseable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(agent) = lookup("BOXSCORE_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            config.user_agent = agent;
        }
        override_parsed(&lookup, "BOXSCORE_TIMEOUT_MS", &mut config.timeout_ms);
        override_parsed(&lookup, "BOXSCORE_MAX_RETRIES", &mut config.max_retries);
        override_parsed(&lookup, "BOXSCORE_RETRY_DELAY_MS", &mut config.retry_base_delay_ms);
        override_parsed(
            &lookup,
            "BOXSCORE_RATE_LIMIT_DELAY_MS",
            &mut config.rate_limit_delay_ms,
        );
        override_parsed(&lookup, "BOXSCORE_MAX_CONCURRENCY", &mut config.max_concurrency);

        // A zero-sized pool would never make progress
        config.max_concurrency = config.max_concurrency.max(1);
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable configuration value"),
        }
    }
}
