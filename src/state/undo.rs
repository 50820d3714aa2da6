use std::time::{Duration, Instant};

/// A short-lived, pausable countdown guarding the single-level undo.
///
/// One window exists per game at most; starting a new one discards the
/// previous revert opportunity. The countdown is paused while a celebration
/// overlay covers the acting viewer's screen so it cannot expire off-screen.
#[derive(Debug, Clone)]
pub struct UndoWindow {
    /// Budget left when the window was last paused or (re)started.
    remaining: Duration,
    /// Set while the countdown is running; `None` while paused.
    running_since: Option<Instant>,
}

impl UndoWindow {
    /// Open a running window with the given budget.
    pub fn open(budget: Duration) -> Self {
        Self::open_at(budget, Instant::now())
    }

    /// Open a running window as of `now`.
    pub fn open_at(budget: Duration, now: Instant) -> Self {
        Self {
            remaining: budget,
            running_since: Some(now),
        }
    }

    /// Freeze the countdown, banking whatever budget is left.
    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    /// Freeze the countdown as of `now`.
    pub fn pause_at(&mut self, now: Instant) {
        if let Some(started) = self.running_since.take() {
            let elapsed = now.saturating_duration_since(started);
            self.remaining = self.remaining.saturating_sub(elapsed);
        }
    }

    /// Restart a paused countdown; a running window is left untouched.
    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    /// Restart a paused countdown as of `now`.
    pub fn resume_at(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Whether the revert action is still available.
    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Whether the revert action is still available as of `now`.
    pub fn is_open_at(&self, now: Instant) -> bool {
        !self.remaining_at(now).is_zero()
    }

    /// Budget left on the countdown as of `now`.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(started) => self
                .remaining
                .saturating_sub(now.saturating_duration_since(started)),
            None => self.remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(5);

    #[test]
    fn window_stays_open_within_its_budget() {
        let start = Instant::now();
        let window = UndoWindow::open_at(BUDGET, start);
        assert!(window.is_open_at(start));
        assert!(window.is_open_at(start + Duration::from_secs(4)));
        assert!(!window.is_open_at(start + Duration::from_secs(5)));
        assert!(!window.is_open_at(start + Duration::from_secs(60)));
    }

    #[test]
    fn paused_window_does_not_expire() {
        let start = Instant::now();
        let mut window = UndoWindow::open_at(BUDGET, start);
        window.pause_at(start + Duration::from_secs(2));
        // An hour under the celebration overlay burns no budget.
        let much_later = start + Duration::from_secs(3600);
        assert!(window.is_open_at(much_later));
        assert_eq!(window.remaining_at(much_later), Duration::from_secs(3));
    }

    #[test]
    fn resume_continues_from_the_banked_budget() {
        let start = Instant::now();
        let mut window = UndoWindow::open_at(BUDGET, start);
        window.pause_at(start + Duration::from_secs(2));
        let resumed = start + Duration::from_secs(100);
        window.resume_at(resumed);
        assert!(window.is_open_at(resumed + Duration::from_secs(2)));
        assert!(!window.is_open_at(resumed + Duration::from_secs(3)));
    }

    #[test]
    fn resume_on_a_running_window_is_a_no_op() {
        let start = Instant::now();
        let mut window = UndoWindow::open_at(BUDGET, start);
        window.resume_at(start + Duration::from_secs(4));
        assert!(!window.is_open_at(start + Duration::from_secs(5)));
    }
}
