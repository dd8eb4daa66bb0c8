//! Readiness requeue backoff
//!
//! While a site is not ready the controller keeps requeueing it. The delay
//! is derived from how long the site has been waiting (`status.pendingSince`)
//! rather than from an attempt counter, so the schedule survives controller
//! restarts without writing a counter to status on every pass.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::Error;

/// Default first delay of the exponential policy
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Default cap of the exponential policy
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// How long to wait before re-checking a site that is not ready yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Always wait the same amount
    Fixed {
        /// Delay between checks
        delay: Duration,
    },
    /// Wait as long as the site has already been waiting, bounded below by
    /// `initial` and above by `max`
    ///
    /// Requeueing at `pending_since + initial`, then `+ 2*initial`, then
    /// `+ 4*initial` and so on doubles the delay on every pass.
    Exponential {
        /// First delay
        initial: Duration,
        /// Upper bound on any delay
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            initial: DEFAULT_INITIAL_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Delay for a site that has been not-ready for `waited`
    pub fn delay(&self, waited: Duration) -> Duration {
        match *self {
            Self::Fixed { delay } => delay,
            Self::Exponential { initial, max } => waited.max(initial).min(max.max(initial)),
        }
    }

    /// Build a policy from its kind name and bounds
    ///
    /// For `fixed`, `initial` is the constant delay and `max` is ignored.
    pub fn from_parts(kind: BackoffKind, initial: Duration, max: Duration) -> Self {
        match kind {
            BackoffKind::Fixed => Self::Fixed { delay: initial },
            BackoffKind::Exponential => Self::Exponential { initial, max },
        }
    }
}

/// Selector for the backoff policy on the command line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackoffKind {
    /// Constant delay
    Fixed,
    /// Doubling delay, capped
    #[default]
    Exponential,
}

impl fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

impl FromStr for BackoffKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(Error::validation(format!(
                "invalid backoff policy '{}' (expected 'fixed' or 'exponential')",
                other
            ))),
        }
    }
}
