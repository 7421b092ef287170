//! Polling cadence and deadline for job resolution.

use std::time::Duration;

use crate::error::ApiError;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default floor for the delay between status queries.
pub const DEFAULT_MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Default ceiling for backoff delays.
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default overall time allowed for a job to finish.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(900);

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// How the delay grows between successive polls.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backoff {
    /// Every wait uses the base interval.
    #[default]
    Fixed,
    /// The wait after poll `n` is `interval * multiplier^n`.
    Exponential {
        /// Growth factor applied per poll.
        multiplier: u32,
    },
}

/// Controls how often and for how long a job is polled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Base delay between polls.
    pub interval: Duration,
    /// No two polls are issued closer together than this.
    pub min_interval: Duration,
    /// Upper bound for backoff delays.
    pub max_interval: Duration,
    /// Overall time budget for resolving a job.
    pub timeout: Duration,
    /// Growth strategy for the delay.
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            min_interval: DEFAULT_MIN_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            timeout: DEFAULT_JOB_TIMEOUT,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollPolicy {
    /// Creates a fixed-interval policy. The minimum interval equals
    /// `interval`.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            min_interval: interval,
            max_interval: DEFAULT_MAX_POLL_INTERVAL.max(interval),
            timeout,
            backoff: Backoff::Fixed,
        }
    }

    /// Sets the minimum delay between polls.
    #[must_use]
    pub const fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Sets the ceiling for backoff delays.
    #[must_use]
    pub const fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the wait that follows poll number `completed` (zero-based).
    ///
    /// The result is never below `min_interval` and never above
    /// `max_interval` (unless the minimum itself is higher).
    #[must_use]
    pub fn delay_after(&self, completed: u32) -> Duration {
        let raw = match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { multiplier } => {
                let factor = multiplier
                    .max(1)
                    .saturating_pow(completed.min(MAX_BACKOFF_EXPONENT));
                self.interval.saturating_mul(factor)
            }
        };
        let ceiling = self.max_interval.max(self.min_interval);
        raw.clamp(self.min_interval, ceiling)
    }

    /// Checks that the policy can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidArgument`] when the timeout or interval is
    /// zero, or when the minimum interval exceeds the maximum.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.timeout.is_zero() {
            return Err(ApiError::invalid("job timeout must be greater than zero"));
        }
        if self.interval.is_zero() && self.min_interval.is_zero() {
            return Err(ApiError::invalid("poll interval must be greater than zero"));
        }
        if self.min_interval > self.max_interval {
            return Err(ApiError::invalid(format!(
                "minimum poll interval {:?} exceeds maximum {:?}",
                self.min_interval, self.max_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn fixed_backoff_respects_minimum() {
        let policy = PollPolicy::new(Duration::from_millis(100), SECOND)
            .with_min_interval(Duration::from_millis(250));
        assert_eq!(policy.delay_after(0), Duration::from_millis(250));
        assert_eq!(policy.delay_after(5), Duration::from_millis(250));
    }

    #[test]
    fn exponential_backoff_grows_until_capped() {
        let policy = PollPolicy::new(SECOND, Duration::from_secs(60))
            .with_backoff(Backoff::Exponential { multiplier: 2 })
            .with_max_interval(Duration::from_secs(5));
        assert_eq!(policy.delay_after(0), SECOND);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(5));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn validate_rejects_degenerate_policies() {
        let zero_timeout = PollPolicy::new(SECOND, Duration::ZERO);
        let inverted = PollPolicy::new(SECOND, SECOND * 10)
            .with_min_interval(SECOND * 3)
            .with_max_interval(SECOND);
        assert!(zero_timeout.validate().is_err());
        assert!(inverted.validate().is_err());
        assert!(PollPolicy::default().validate().is_ok());
    }
}
