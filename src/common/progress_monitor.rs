use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

use super::build_error::BuildError;

/// Callback receiving the completed fraction of the current build in `[0,1]`. Returning
/// `false` cancels the build.
pub type ProgressFunction = Box<dyn Fn(f64) -> bool + Send + Sync>;

/// Scene level progress reporting shared by every task of a build.
pub struct ProgressMonitor {
    function: RwLock<Option<ProgressFunction>>,
    counter: CachePadded<AtomicUsize>,
    total: AtomicUsize,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self {
            function: RwLock::new(None),
            counter: CachePadded::new(AtomicUsize::new(0)),
            total: AtomicUsize::new(0),
        }
    }
}

impl ProgressMonitor {
    /// Installs or removes the progress callback.
    pub fn set_function(&self, function: Option<ProgressFunction>) {
        *self.function.write() = function;
    }

    /// Resets the counter for a build over `total` primitives.
    pub fn start(&self, total: usize) {
        self.counter.store(0, Ordering::Relaxed);
        self.total.store(total.max(1), Ordering::Relaxed);
    }

    /// Accounts `completed` more units of work and polls the callback.
    pub fn progress(&self, completed: usize) -> Result<(), BuildError> {
        let function = self.function.read();
        let Some(function) = function.as_ref() else {
            return Ok(());
        };
        let done = self.counter.fetch_add(completed, Ordering::Relaxed) + completed;
        let fraction = (done as f64 / self.total.load(Ordering::Relaxed).max(1) as f64).min(1.0);
        if function(fraction) {
            Ok(())
        } else {
            Err(BuildError::Cancelled)
        }
    }

    /// Units of work reported since the last `start`.
    pub fn completed(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("has_function", &self.function.read().is_some())
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .field("total", &self.total.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancels_once_threshold_is_passed() {
        let monitor = ProgressMonitor::default();
        monitor.set_function(Some(Box::new(|fraction| fraction < 0.5)));
        monitor.start(100);
        assert_eq!(monitor.progress(10), Ok(()));
        assert_eq!(monitor.progress(30), Ok(()));
        assert_eq!(monitor.progress(20), Err(BuildError::Cancelled));
    }

    #[test]
    fn test_without_function_never_cancels() {
        let monitor = ProgressMonitor::default();
        monitor.start(1);
        assert!(monitor.progress(1_000).is_ok());
    }
}
