//! Scheduler timing configuration.

use std::time::Duration;

use crate::error::{SchedulerError, SchedulerResult};

/// Default time an agency has to respond to an offer.
pub const DEFAULT_OFFER_WINDOW: Duration = Duration::from_secs(600);

/// Default granularity at which offer deadlines are checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for both timing parameters.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Offer timing parameters. Both values are non-zero and at most
/// [`MAX_DURATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    offer_window: Duration,
    poll_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(offer_window: Duration, poll_interval: Duration) -> SchedulerResult<Self> {
        check("offer_window", offer_window)?;
        check("poll_interval", poll_interval)?;
        Ok(Self {
            offer_window,
            poll_interval,
        })
    }

    /// How long the head-of-queue agency holds an offer before it moves on.
    pub fn offer_window(&self) -> Duration {
        self.offer_window
    }

    /// Upper bound on how long an offer task sleeps between deadline checks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

fn check(name: &str, value: Duration) -> SchedulerResult<()> {
    if value.is_zero() {
        return Err(SchedulerError::InvalidConfig(format!(
            "{name} must be greater than zero"
        )));
    }
    if value > MAX_DURATION {
        return Err(SchedulerError::InvalidConfig(format!(
            "{name} must not exceed {}s",
            MAX_DURATION.as_secs()
        )));
    }
    Ok(())
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offer_window: DEFAULT_OFFER_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
