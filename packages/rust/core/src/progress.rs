//! Progress reporting for long-running passes.

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item of a per-user loop (`current` is 1-based).
    fn item(&self, label: &str, current: usize, total: usize);
    /// Called once with a one-line summary when the run completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _label: &str, _current: usize, _total: usize) {}
    fn done(&self, _summary: &str) {}
}
