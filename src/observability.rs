use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::workflow::FinalStatus;

/// Counters for one automation run.
///
/// Shared through an `Arc` by the coordinator and every retry executor it
/// builds; never stored in a global.
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub attempts: AtomicU64,
    pub retries: AtomicU64,
    pub exhausted: AtomicU64,
    pub accounts_processed: AtomicU64,
    pub accounts_failed: AtomicU64,
    pub accounts_unknown: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_account(&self, status: FinalStatus) {
        self.accounts_processed.fetch_add(1, Ordering::Relaxed);
        match status {
            FinalStatus::Failed => {
                self.accounts_failed.fetch_add(1, Ordering::Relaxed);
            }
            FinalStatus::Unknown => {
                self.accounts_unknown.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            accounts_processed: self.accounts_processed.load(Ordering::Relaxed),
            accounts_failed: self.accounts_failed.load(Ordering::Relaxed),
            accounts_unknown: self.accounts_unknown.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Run metrics: attempts={}, retries={}, exhausted={}, accounts={}, failed={}, unknown={}",
            stats.attempts,
            stats.retries,
            stats.exhausted,
            stats.accounts_processed,
            stats.accounts_failed,
            stats.accounts_unknown
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStats {
    pub attempts: u64,
    pub retries: u64,
    pub exhausted: u64,
    pub accounts_processed: u64,
    pub accounts_failed: u64,
    pub accounts_unknown: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> u64 {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        info!(
            operation = %self.operation,
            duration_ms,
            "Operation completed"
        );
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_outcomes_are_counted_by_category() {
        let metrics = WorkflowMetrics::new();
        metrics.record_account(FinalStatus::Success);
        metrics.record_account(FinalStatus::Failed);
        metrics.record_account(FinalStatus::Unknown);
        metrics.record_account(FinalStatus::NoOpportunity);

        let stats = metrics.get_stats();
        assert_eq!(stats.accounts_processed, 4);
        assert_eq!(stats.accounts_failed, 1);
        assert_eq!(stats.accounts_unknown, 1);
    }
}
