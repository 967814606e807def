//! Progress reporting types for background population.

use std::time::Duration;

/// Progress of a background population after a batch finished.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    /// Batches finished so far.
    pub batches_done: usize,
    /// Total number of batches.
    pub batch_count: usize,
    /// Top-level entries processed so far (leaves included).
    pub processed: usize,
    /// Total number of top-level entries.
    pub total: usize,
    /// Time elapsed since the population started.
    pub elapsed: Duration,
}

impl SyncProgress {
    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.processed as f64 / self.total as f64) * 100.0
        } else {
            100.0
        }
    }

    /// Check if every entry has been processed.
    pub fn is_finished(&self) -> bool {
        self.processed >= self.total
    }
}

/// Result of a finished (or cancelled) background population.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncComplete {
    /// Subtrees merged into the store.
    pub merged: usize,
    /// Top-level branches whose listing failed; nothing was merged for them.
    pub failed: usize,
    /// Entries skipped because they were leaves or already loaded.
    pub skipped: usize,
    /// Nested branches left unloaded inside merged subtrees.
    pub unloaded: usize,
    /// Listing requests issued.
    pub requests: usize,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Total duration of the run.
    pub elapsed: Duration,
}

impl SyncComplete {
    /// Check if the run completed without any failures.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed == 0 && self.unloaded == 0
    }

    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let mut summary = format!("Loaded {} subtrees", self.merged);
        if self.failed > 0 || self.unloaded > 0 {
            summary.push_str(&format!(
                ", {} failed, {} branches left unloaded",
                self.failed, self.unloaded
            ));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let progress = SyncProgress {
            batches_done: 1,
            batch_count: 3,
            processed: 30,
            total: 75,
            elapsed: Duration::ZERO,
        };
        assert_eq!(progress.percentage(), 40.0);
        assert!(!progress.is_finished());
    }

    #[test]
    fn test_empty_is_complete() {
        let progress = SyncProgress {
            batches_done: 0,
            batch_count: 0,
            processed: 0,
            total: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(progress.percentage(), 100.0);
    }

    #[test]
    fn test_summary() {
        let complete = SyncComplete {
            merged: 4,
            failed: 1,
            ..Default::default()
        };
        assert!(!complete.is_success());
        assert_eq!(
            complete.summary(),
            "Loaded 4 subtrees, 1 failed, 0 branches left unloaded"
        );
    }
}
