//! Build progress counters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts finished units against the number expected when the build started.
///
/// The total is an estimate: emitters may add generated files while the
/// build runs, so the percentage is clamped.
#[derive(Debug, Clone)]
pub struct BuildProgress {
    finished: Arc<AtomicUsize>,
    executed: Arc<AtomicUsize>,
    total: usize,
}

impl BuildProgress {
    pub fn new(total: usize) -> Self {
        BuildProgress {
            finished: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(AtomicUsize::new(0)),
            total,
        }
    }

    /// Record a finished unit and return how many have finished so far.
    pub fn finish_unit(&self, executed: bool) -> usize {
        if executed {
            self.executed.fetch_add(1, Ordering::SeqCst);
        }
        self.finished.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Units that actually ran their tool.
    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Percentage for `finished` units, in `0.0..=100.0`.
    pub fn percentage(&self, finished: usize) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (finished as f64 * 100.0 / self.total as f64).min(100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.finished() >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_progress_new() {
        let progress = BuildProgress::new(4);
        assert_eq!(progress.finished(), 0);
        assert_eq!(progress.total(), 4);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_build_progress_counts() {
        let progress = BuildProgress::new(4);
        assert_eq!(progress.finish_unit(true), 1);
        assert_eq!(progress.finish_unit(false), 2);
        assert_eq!(progress.executed(), 1);
        assert!((progress.percentage(1) - 25.0).abs() < 0.001);
    }

    #[test]
    fn test_build_progress_clamped() {
        let progress = BuildProgress::new(2);
        for _ in 0..3 {
            progress.finish_unit(true);
        }
        assert!(progress.is_complete());
        assert_eq!(progress.percentage(progress.finished()), 100.0);
    }

    #[test]
    fn test_build_progress_empty() {
        let progress = BuildProgress::new(0);
        assert!(progress.is_complete());
        assert_eq!(progress.percentage(0), 100.0);
    }

    #[test]
    fn test_build_progress_shared_between_clones() {
        let progress = BuildProgress::new(3);
        let other = progress.clone();
        other.finish_unit(true);
        assert_eq!(progress.finished(), 1);
    }
}
