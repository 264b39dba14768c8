//! Redraw coalescing on the display-refresh cadence
//!
//! Any number of [`FrameScheduler::request_frame`] calls between two refresh
//! callbacks produce a single draw. The pending flag is cleared before the draw
//! runs, so a request made from inside the draw (controls reporting a change,
//! an animation still playing) schedules the next interval rather than being
//! swallowed by the current one.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct SchedulerState {
    pending: Cell<bool>,
    requested: Cell<u64>,
    scheduled: Cell<u64>,
    drawn: Cell<u64>,
}

/// Single-threaded handle; clones share one pending flag
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    state: Rc<SchedulerState>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a draw on the next refresh. Returns true if this call scheduled
    /// it, false if it was absorbed into an already pending frame.
    pub fn request_frame(&self) -> bool {
        let state = &self.state;
        state.requested.set(state.requested.get() + 1);
        if state.pending.replace(true) {
            return false;
        }
        state.scheduled.set(state.scheduled.get() + 1);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }

    /// Consume the pending frame. Callers draw only when this returns true.
    pub fn take_pending(&self) -> bool {
        let was = self.state.pending.replace(false);
        if was {
            self.state.drawn.set(self.state.drawn.get() + 1);
        }
        was
    }

    /// Refresh-callback body: run `draw` with the timestamp if a frame is pending
    pub fn run_pending(&self, timestamp: f64, draw: impl FnOnce(f64)) -> bool {
        if !self.take_pending() {
            return false;
        }
        draw(timestamp);
        true
    }

    /// Total `request_frame` calls
    pub fn requested(&self) -> u64 {
        self.state.requested.get()
    }

    /// Requests that actually scheduled a frame
    pub fn scheduled(&self) -> u64 {
        self.state.scheduled.get()
    }

    /// Frames consumed for drawing
    pub fn drawn(&self) -> u64 {
        self.state.drawn.get()
    }
}

/// Turns refresh timestamps (milliseconds) into per-draw deltas (seconds)
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous tick; 0 on the first tick and whenever time
    /// does not move forward
    pub fn tick(&mut self, timestamp_ms: f64) -> f32 {
        let delta = match self.last {
            Some(prev) if timestamp_ms.is_finite() && timestamp_ms > prev => {
                ((timestamp_ms - prev) / 1000.0) as f32
            }
            _ => 0.0,
        };
        if timestamp_ms.is_finite() {
            self.last = Some(self.last.map_or(timestamp_ms, |prev| prev.max(timestamp_ms)));
        }
        delta
    }

    /// Forget the previous timestamp so the next tick yields 0
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;

    #[test]
    fn test_requests_coalesce_into_one_draw() {
        let scheduler = FrameScheduler::new();
        let handle = scheduler.clone();
        assert!(scheduler.request_frame());
        for _ in 0..9 {
            assert!(!handle.request_frame());
        }

        let mut draws = Vec::new();
        assert!(scheduler.run_pending(16.0, |ts| draws.push(ts)));
        assert!(!scheduler.run_pending(32.0, |ts| draws.push(ts)));
        assert_eq!(draws, vec![16.0]);
        assert_eq!(scheduler.requested(), 10);
        assert_eq!(scheduler.scheduled(), 1);
        assert_eq!(scheduler.drawn(), 1);
    }

    #[test]
    fn test_reentrant_request_lands_in_next_interval() {
        let scheduler = FrameScheduler::new();
        let inner = scheduler.clone();
        let draws = RefCell::new(Vec::new());
        scheduler.request_frame();

        scheduler.run_pending(16.0, |ts| {
            draws.borrow_mut().push(ts);
            // controls report a change while drawing
            assert!(inner.request_frame());
            assert!(!inner.request_frame());
        });
        assert!(scheduler.is_pending());
        scheduler.run_pending(32.0, |ts| draws.borrow_mut().push(ts));
        scheduler.run_pending(48.0, |ts| draws.borrow_mut().push(ts));

        assert_eq!(*draws.borrow(), vec![16.0, 32.0]);
    }

    #[test]
    fn test_clock_deltas() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick(1000.0), 0.0);
        assert_abs_diff_eq!(clock.tick(1016.0), 0.016, epsilon = 1e-6);
        assert_eq!(clock.tick(900.0), 0.0);
        assert_abs_diff_eq!(clock.tick(1032.0), 0.016, epsilon = 1e-6);
        clock.reset();
        assert_eq!(clock.tick(5000.0), 0.0);
    }
}
