//! Adaptive request timeouts.
//!
//! A freshly spawned server spends its first minutes loading the solution
//! and answers slowly. Every spawn opens a grace window; requests issued
//! inside it wait at least until the window closes.

use std::time::{Duration, Instant};

/// Grace window opened when a server process starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutWindow {
    deadline: Option<Instant>,
}

impl TimeoutWindow {
    /// Returns a window that never extends timeouts.
    #[must_use]
    pub const fn closed() -> Self {
        Self { deadline: None }
    }

    /// Opens a window ending `grace` after `now`.
    #[must_use]
    pub fn open(now: Instant, grace: Duration) -> Self {
        Self {
            deadline: now.checked_add(grace),
        }
    }

    /// Deadline of the window, when still open.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the window still extends timeouts.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.deadline.is_some()
    }

    /// Computes the timeout for a request issued at `now`.
    ///
    /// Before the deadline the result is the larger of `requested` and the
    /// remaining grace. Once the deadline has passed the window clears itself
    /// and `requested` is returned unchanged.
    pub fn effective_timeout(&mut self, requested: Duration, now: Instant) -> Duration {
        let Some(deadline) = self.deadline else {
            return requested;
        };
        if now >= deadline {
            self.deadline = None;
            return requested;
        }
        requested.max(deadline.duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const GRACE: Duration = Duration::from_secs(120);

    #[rstest]
    #[case::early(Duration::from_secs(10), Duration::from_secs(110))]
    #[case::late(Duration::from_secs(115), Duration::from_secs(5))]
    fn extends_short_requests_inside_window(#[case] elapsed: Duration, #[case] expected: Duration) {
        let start = Instant::now();
        let mut window = TimeoutWindow::open(start, GRACE);

        let timeout = window.effective_timeout(Duration::from_secs(5), start + elapsed);

        assert_eq!(timeout, expected.max(Duration::from_secs(5)));
        assert!(window.is_open());
    }

    #[rstest]
    fn keeps_longer_requested_timeout() {
        let start = Instant::now();
        let mut window = TimeoutWindow::open(start, GRACE);

        let timeout = window.effective_timeout(Duration::from_secs(300), start);

        assert_eq!(timeout, Duration::from_secs(300));
    }

    #[rstest]
    fn clears_after_deadline() {
        let start = Instant::now();
        let mut window = TimeoutWindow::open(start, GRACE);

        let timeout = window.effective_timeout(Duration::from_secs(5), start + GRACE);

        assert_eq!(timeout, Duration::from_secs(5));
        assert!(!window.is_open());
        assert_eq!(
            window.effective_timeout(Duration::from_secs(5), start),
            Duration::from_secs(5)
        );
    }

    #[rstest]
    fn closed_window_passes_through() {
        let mut window = TimeoutWindow::closed();

        assert_eq!(
            window.effective_timeout(Duration::from_millis(250), Instant::now()),
            Duration::from_millis(250)
        );
    }
}
