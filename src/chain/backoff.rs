//! Bounded exponential backoff for polling chain state

use std::time::{Duration, Instant};
use tracing::debug;

/// Longest single sleep between polls
pub const MAX_DELAY: Duration = Duration::from_secs(60);

/// Parameters for a polling loop
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first re-poll
    pub base_delay: Duration,
    /// Multiplier applied to the delay after every sleep
    pub factor: f64,
    /// Number of sleeps allowed before giving up
    pub max_escalations: u32,
    /// Optional cap on total time spent waiting
    pub max_elapsed: Option<Duration>,
}

/// A single polling session. Each `wait` sleeps once and escalates the delay.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    delay: Duration,
    escalations: u32,
    started: Instant,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            delay: config.base_delay,
            config,
            escalations: 0,
            started: Instant::now(),
        }
    }

    /// Sleep for the current delay and escalate it.
    ///
    /// Returns `false` without sleeping once the escalation budget or the
    /// elapsed-time deadline is spent.
    pub async fn wait(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }

        tokio::time::sleep(self.delay).await;
        self.delay = escalate(self.delay, self.config.factor);
        self.escalations += 1;

        debug!(
            delay_ms = self.delay.as_millis() as u64,
            escalations = self.escalations,
            "Delay backoff"
        );
        true
    }

    /// Start over from the base delay, keeping the overall deadline
    pub fn reset(&mut self) {
        self.delay = self.config.base_delay;
        self.escalations = 0;
    }

    pub fn escalations(&self) -> u32 {
        self.escalations
    }

    fn exhausted(&self) -> bool {
        if self.escalations >= self.config.max_escalations {
            return true;
        }
        match self.config.max_elapsed {
            Some(limit) => self.started.elapsed() >= limit,
            None => false,
        }
    }
}

/// Multiply `delay` by `factor`, capped at `MAX_DELAY`
fn escalate(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}
