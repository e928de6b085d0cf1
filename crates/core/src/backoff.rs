//! Backoff curve for the status poll loops.
//!
//! Polling bounds retry *frequency*, not total duration: a job that
//! never reaches a terminal state keeps polling (at the capped delay)
//! until the scope changes or the user cancels.

use std::time::Duration;

/// Tunable parameters for the poll backoff curve.
///
/// The delay grows linearly by [`step`](PollConfig::step) after every
/// non-terminal poll and is clamped to [`max_delay`](PollConfig::max_delay).
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the second poll (the first runs immediately).
    pub initial_delay: Duration,
    /// Upper bound on the delay between polls.
    pub max_delay: Duration,
    /// Amount added to the delay after each non-terminal poll.
    pub step: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(15_000),
            step: Duration::from_millis(2_000),
        }
    }
}

impl PollConfig {
    /// Build a config from `ATELIER_POLL_INITIAL_MS`, `ATELIER_POLL_MAX_MS`
    /// and `ATELIER_POLL_STEP_MS`, falling back to the defaults for any
    /// variable that is unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            initial_delay: env_duration_ms("ATELIER_POLL_INITIAL_MS", defaults.initial_delay),
            max_delay: env_duration_ms("ATELIER_POLL_MAX_MS", defaults.max_delay),
            step: env_duration_ms("ATELIER_POLL_STEP_MS", defaults.step),
        }
    }
}

fn env_duration_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Calculate the next poll delay from the current delay and config.
///
/// The result is clamped to [`PollConfig::max_delay`].
pub fn next_delay(current: Duration, config: &PollConfig) -> Duration {
    current.saturating_add(config.step).min(config.max_delay)
}
