//! Bounded retry policy with exponential backoff and jitter.
//!
//! Used by the cleanup loop to space out delete attempts while another actor may
//! still be creating bindings on the same instance. Every policy has a finite
//! attempt budget.
//!
//! # Example
//!
//! ```
//! use binding_lifecycle::retry::RetryPolicy;
//!
//! let mut backoff = RetryPolicy::with_max_attempts(3).backoff();
//! assert!(backoff.next_delay().is_some());
//! assert!(backoff.next_delay().is_some());
//! assert!(backoff.next_delay().is_none());
//! assert_eq!(backoff.attempts(), 3);
//! ```

use std::time::Duration;

use rand::Rng;

use crate::{Error, Result};

/// Configuration for an operation that may hit transient conflicts.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (always at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }

    /// Create a policy that retries without waiting (tests, dry runs)
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Reject policies whose delays cannot be computed
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation("retry policy needs at least one attempt"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::validation(format!(
                "backoff multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Start tracking attempts against this policy
    pub fn backoff(&self) -> Backoff {
        Backoff {
            delay: self.initial_delay,
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Attempt counter for one run of a retried operation.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    delay: Duration,
}

impl Backoff {
    /// Number of failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record a failed attempt and return how long to wait before the next one.
    ///
    /// Returns `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(self.delay.as_secs_f64() * jitter);

        // Exponential backoff, capped at max_delay; an unusable multiplier holds the cap
        let grown = (self.delay.as_secs_f64() * self.policy.backoff_multiplier)
            .min(self.policy.max_delay.as_secs_f64());
        self.delay = Duration::try_from_secs_f64(grown).unwrap_or(self.policy.max_delay);

        Some(jittered)
    }
}
