use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cooperative cancellation handle shared between a batch run and its caller.
///
/// Checked between candidates, during pacing delays and between bounce polls:
/// a cancelled batch abandons the current wait early and skips the remaining
/// candidates without leaving sessions dangling.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleeps for `duration` in short slices, waking early on cancellation.
    /// Returns `false` when the sleep was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(100);
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(SLICE);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_flag_is_not_cancelled() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.sleep(Duration::from_millis(1)));
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        flag.cancel();
        assert!(other.is_cancelled());
        assert!(!other.sleep(Duration::from_millis(50)));
    }
}
