// Client-side pacing for member-mutating calls.
// The platform rate-limits bursts of graph writes; a random pause before each
// step spreads them out. This is admission control on our side, not a server contract.
use rand::Rng;
use std::time::Duration;

pub const DEFAULT_THINK_TIME_MIN: Duration = Duration::from_millis(500);
pub const DEFAULT_THINK_TIME_MAX: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: DEFAULT_THINK_TIME_MIN,
            max: DEFAULT_THINK_TIME_MAX,
        }
    }
}

impl Pacing {
    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Uniform sample in `[min, max]`; a reversed range collapses to `min`.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    pub async fn think(&self) {
        let pause = self.sample();
        if !pause.is_zero() {
            tracing::trace!(pause_ms = pause.as_millis() as u64, "think time");
            tokio::time::sleep(pause).await;
        }
    }
}
