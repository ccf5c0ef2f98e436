use std::time::Duration;

/// Wait schedule between status checks.
///
/// `wait(n) = floor + step * ⌊ln(1 + n / ln 1.2)⌋`, clamped to `ceiling`.
/// Early polls sit at the floor; the logarithm keeps long-running queries
/// from drifting into multi-minute gaps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    floor: Duration,
    step: Duration,
    ceiling: Duration,
}

impl BackoffPolicy {
    pub fn new(floor: Duration, step: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        Self {
            floor,
            step,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn wait(&self, attempt: u32) -> Duration {
        let growth = (1.0 + f64::from(attempt) / 1.2f64.ln()).ln().floor();
        // growth is below 25 for any u32, so the cast cannot truncate.
        let steps = growth as u32;
        let extra = self.step.saturating_mul(steps);
        self.floor.saturating_add(extra).min(self.ceiling)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(3),
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }
}
