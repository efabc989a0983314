//! Transient receive error tracking.
//!
//! The receive loop tolerates a bounded run of consecutive transient errors,
//! pausing between attempts. Any successful read resets the run.

use std::io;
use std::time::Duration;
use tracing::{debug, warn};

use crate::transport::TransportKind;

/// Default number of consecutive transient errors that ends the loop
pub const DEFAULT_MAX_CONSECUTIVE: u32 = 3;

/// Default pause before retrying a read
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// How the receive loop reacts to transient errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The n-th consecutive transient error in a row is fatal
    pub max_consecutive: u32,
    /// Pause before the next read attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive: DEFAULT_MAX_CONSECUTIVE,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// What to do after a transient error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given duration, then read again
    Retry(Duration),
    /// Stop retrying and treat the error as fatal
    GiveUp {
        /// Length of the error run that triggered this
        consecutive: u32,
    },
}

/// Counts consecutive transient errors against a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct TransientErrorTracker {
    policy: RetryPolicy,
    consecutive: u32,
}

impl TransientErrorTracker {
    /// Create a tracker with an empty error run
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    /// Record a transient error
    pub fn record_failure(&mut self) -> RetryDecision {
        self.consecutive = self.consecutive.saturating_add(1);

        if self.consecutive < self.policy.max_consecutive {
            debug!(
                "Transient receive error {}/{}, retrying in {:?}",
                self.consecutive, self.policy.max_consecutive, self.policy.backoff
            );
            RetryDecision::Retry(self.policy.backoff)
        } else {
            warn!(
                "Giving up after {} consecutive transient receive errors",
                self.consecutive
            );
            RetryDecision::GiveUp {
                consecutive: self.consecutive,
            }
        }
    }

    /// Record a successful read. Returns true if an error run was cleared.
    pub fn record_success(&mut self) -> bool {
        let was_failing = self.consecutive > 0;
        if was_failing {
            debug!("Receive recovered after {} transient error(s)", self.consecutive);
        }
        self.consecutive = 0;
        was_failing
    }

    /// Current run length
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Policy in force
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Category of a receive error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Datagram poll interval elapsed with nothing to read
    Idle,
    /// Signal interruption; retry immediately without counting
    Interrupted,
    /// Would-block or timed-out on a stream; counts toward the retry limit
    Transient,
    /// Anything else; ends the loop
    Fatal,
}

/// Classify a receive error for a socket of the given kind
pub fn classify(err: &io::Error, kind: TransportKind) -> ErrorClass {
    match err.kind() {
        io::ErrorKind::Interrupted => ErrorClass::Interrupted,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => match kind {
            TransportKind::Udp => ErrorClass::Idle,
            TransportKind::Tcp => ErrorClass::Transient,
        },
        _ => ErrorClass::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_consecutive_error_is_fatal() {
        let mut tracker = TransientErrorTracker::new(RetryPolicy::default());

        assert_eq!(tracker.record_failure(), RetryDecision::Retry(DEFAULT_BACKOFF));
        assert_eq!(tracker.record_failure(), RetryDecision::Retry(DEFAULT_BACKOFF));
        assert_eq!(
            tracker.record_failure(),
            RetryDecision::GiveUp { consecutive: 3 }
        );
    }

    #[test]
    fn test_success_resets_run() {
        let mut tracker = TransientErrorTracker::new(RetryPolicy::default());

        tracker.record_failure();
        tracker.record_failure();
        assert!(tracker.record_success());
        assert_eq!(tracker.consecutive(), 0);
        assert!(!tracker.record_success());

        assert!(matches!(tracker.record_failure(), RetryDecision::Retry(_)));
        assert!(matches!(tracker.record_failure(), RetryDecision::Retry(_)));
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy {
            max_consecutive: 1,
            backoff: Duration::from_millis(5),
        };
        let mut tracker = TransientErrorTracker::new(policy);

        assert_eq!(tracker.policy().backoff, Duration::from_millis(5));
        assert_eq!(
            tracker.record_failure(),
            RetryDecision::GiveUp { consecutive: 1 }
        );
    }

    #[test]
    fn test_classify() {
        let would_block = io::Error::from(io::ErrorKind::WouldBlock);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        let interrupted = io::Error::from(io::ErrorKind::Interrupted);
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);

        assert_eq!(classify(&would_block, TransportKind::Tcp), ErrorClass::Transient);
        assert_eq!(classify(&timed_out, TransportKind::Tcp), ErrorClass::Transient);
        assert_eq!(classify(&would_block, TransportKind::Udp), ErrorClass::Idle);
        assert_eq!(classify(&interrupted, TransportKind::Tcp), ErrorClass::Interrupted);
        assert_eq!(classify(&reset, TransportKind::Tcp), ErrorClass::Fatal);
        assert_eq!(classify(&reset, TransportKind::Udp), ErrorClass::Fatal);
    }
}
