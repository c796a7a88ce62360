use std::time::Duration;

use crate::error::Error;

/// Configuration for a [`PendingSet`](crate::PendingSet).
#[derive(Debug, Clone)]
pub struct SetConfig {
    /// Diagnostic label, used in log output.
    pub name: String,
    /// Overall deadline enforced by `work`. Items still unfinished when it
    /// expires are drained with a timeout error.
    pub maxtime: Duration,
    /// Upper bound on one readiness wait. Bounds the granularity of
    /// deadline checks: no item lingers more than `itertime` plus its own
    /// per-attempt timeout beyond a deadline.
    pub itertime: Duration,
}

impl Default for SetConfig {
    fn default() -> Self {
        SetConfig {
            name: "pending".into(),
            maxtime: Duration::from_secs(10),
            itertime: Duration::from_millis(50),
        }
    }
}

impl SetConfig {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), Error> {
        if self.itertime < Duration::from_millis(1) {
            return Err(Error::Config(
                "itertime must be at least 1ms (poll granularity)".into(),
            ));
        }
        if self.itertime.as_millis() > i32::MAX as u128 {
            return Err(Error::Config("itertime exceeds the poll timeout range".into()));
        }
        Ok(())
    }
}

/// Retry/timeout policy for one pending item.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per-attempt deadline while an exchange is in flight.
    pub timeout: Duration,
    /// Backoff between attempts. An item sleeps at least this long after a
    /// failed attempt before the next one may start.
    pub retry_delay: Duration,
    /// Maximum number of attempts, inclusive.
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(100),
            retries: 3,
        }
    }
}
