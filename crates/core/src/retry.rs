use std::time::Duration;

use crate::ErrorClass;

/// Hard ceiling on attempts per statement, whatever the configuration says.
pub const MAX_ATTEMPTS_CEILING: u32 = 10;

/// What the adapter does after a failed statement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reopen the connection, then run the statement again.
    Reconnect,
    /// Sleep, then run the statement again on the same connection.
    Backoff(Duration),
    /// Collapse the transaction level to one, roll back, then return the error.
    RollbackAndFail,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    lock_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS_CEILING,
            lock_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=10`.
    #[must_use]
    pub fn new(max_attempts: u32, lock_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CEILING),
            lock_backoff,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(1, Duration::ZERO)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    #[must_use]
    pub fn decide(&self, class: ErrorClass, attempt: u32, in_transaction: bool) -> RetryDecision {
        let exhausted = attempt >= self.max_attempts;
        match class {
            ErrorClass::Deadlock | ErrorClass::Constraint if in_transaction => {
                RetryDecision::RollbackAndFail
            }
            // A dropped connection takes the open transaction with it.
            ErrorClass::ConnectionLost if in_transaction => RetryDecision::Fail,
            ErrorClass::ConnectionLost if !exhausted => RetryDecision::Reconnect,
            ErrorClass::LockContention if !exhausted => {
                RetryDecision::Backoff(self.lock_backoff * attempt)
            }
            _ => RetryDecision::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RetryDecision, RetryPolicy};
    use crate::ErrorClass;

    #[test]
    fn attempts_are_clamped() {
        assert_eq!(RetryPolicy::new(50, Duration::ZERO).max_attempts(), 10);
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn lost_connection_reconnects_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert_eq!(
            policy.decide(ErrorClass::ConnectionLost, 1, false),
            RetryDecision::Reconnect
        );
        assert_eq!(
            policy.decide(ErrorClass::ConnectionLost, 3, false),
            RetryDecision::Fail
        );
        assert_eq!(
            policy.decide(ErrorClass::ConnectionLost, 1, true),
            RetryDecision::Fail
        );
    }

    #[test]
    fn lock_contention_backs_off_linearly() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10));
        assert_eq!(
            policy.decide(ErrorClass::LockContention, 2, true),
            RetryDecision::Backoff(Duration::from_millis(20))
        );
    }

    #[test]
    fn deadlock_in_transaction_forces_rollback() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(ErrorClass::Deadlock, 1, true),
            RetryDecision::RollbackAndFail
        );
        assert_eq!(
            policy.decide(ErrorClass::Deadlock, 1, false),
            RetryDecision::Fail
        );
        assert_eq!(policy.decide(ErrorClass::Other, 1, true), RetryDecision::Fail);
    }
}
