//! Recovery strategies for the errors the relay can hit.
//!
//! Only configuration problems stop the process. Everything that happens inside
//! a scheduled run is scoped to a source, a single post, or a side channel and
//! is handled in place so the scheduler keeps going.

use crate::{CoreError, ErrorExt, PersistenceError};
use std::time::Duration;

/// Recovery strategy for handling errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation with exponential backoff before giving up
    RetryWithBackoff {
        max_attempts: usize,
        initial_delay: Duration,
        max_delay: Duration,
    },
    /// Treat the affected source or post as empty/failed and carry on
    Skip,
    /// Keep the in-memory state and try again after the next run
    RetryNextCycle,
    /// Log and forget; observability side channels land here
    Swallow,
    /// Stop the process
    Fail,
}

impl RecoveryStrategy {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecoveryStrategy::Fail)
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            CoreError::Config(_) => RecoveryStrategy::Fail,

            // A corrupt seen-set would re-send everything ever delivered
            CoreError::Persistence(PersistenceError::Corrupt { .. }) => RecoveryStrategy::Fail,
            CoreError::Persistence(_) => RecoveryStrategy::RetryNextCycle,

            CoreError::Notifier(_) | CoreError::Display(_) => RecoveryStrategy::Swallow,

            CoreError::RedditApi(_)
            | CoreError::Telegram(_)
            | CoreError::Network(_)
            | CoreError::Timeout { .. }
                if error.is_retryable() =>
            {
                let initial_delay = error.retry_after().unwrap_or(Duration::from_secs(2));
                RecoveryStrategy::RetryWithBackoff {
                    max_attempts: 3,
                    initial_delay,
                    // Never wait less than the server asked for.
                    max_delay: initial_delay.max(Duration::from_secs(60)),
                }
            }

            CoreError::RedditApi(_) | CoreError::Telegram(_) | CoreError::Network(_) => {
                RecoveryStrategy::Skip
            }

            CoreError::Io(_) | CoreError::Serialization(_) => RecoveryStrategy::RetryNextCycle,

            CoreError::Timeout { .. } | CoreError::Internal { .. } => RecoveryStrategy::Skip,
        }
    }
}
