//! Wall-clock budgets for pumping deferred work between frames
//!
//! The host loop gives the idle queue a slice of each frame. A budget tracks
//! how much of that slice remains, with a reserve held back so event handling
//! never starves even when the queue is deep.

use std::time::{Duration, Instant};

/// Full frame interval at 60 FPS
pub const FRAME_BUDGET_60FPS: Duration = Duration::from_micros(16_667);

/// Full frame interval at 120 FPS
pub const FRAME_BUDGET_120FPS: Duration = Duration::from_micros(8_333);

/// Portion of a frame held back for input and event processing
pub const EVENT_RESERVE: Duration = Duration::from_millis(5);

/// Tracks how much of the current frame's time slice remains
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sliceview_scheduler::FrameBudget;
///
/// let budget = FrameBudget::new(Duration::from_millis(8));
/// assert!(!budget.is_exhausted());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameBudget {
    started: Instant,
    budget: Duration,
    reserve: Duration,
}

impl FrameBudget {
    /// Create a budget starting now, with no reserve
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            reserve: Duration::ZERO,
        }
    }

    /// Budget for a 60 FPS host loop, keeping [`EVENT_RESERVE`] free
    pub fn for_60fps() -> Self {
        Self::new(FRAME_BUDGET_60FPS).with_reserve(EVENT_RESERVE)
    }

    /// Budget for a 120 FPS host loop, keeping [`EVENT_RESERVE`] free
    pub fn for_120fps() -> Self {
        Self::new(FRAME_BUDGET_120FPS).with_reserve(EVENT_RESERVE)
    }

    /// Hold back part of the budget for work other than the queue
    pub fn with_reserve(mut self, reserve: Duration) -> Self {
        self.reserve = reserve;
        self
    }

    /// Restart the clock at the top of a new frame
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Time spent since the budget was created or restarted
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget actually usable by queued work (total minus reserve)
    pub fn available(&self) -> Duration {
        self.budget.saturating_sub(self.reserve)
    }

    /// Usable time left in this frame
    pub fn remaining(&self) -> Duration {
        self.available().saturating_sub(self.elapsed())
    }

    /// Whether the usable budget has been spent
    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.available()
    }
}
