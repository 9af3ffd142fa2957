//! Lack-of-progress detection over a sliding window of step sizes.

use crate::Float;

/// Sliding-window detector for stalled integration.
///
/// Holds the last `window_size` step sizes in a circular buffer. The window
/// is pre-filled with the threshold value so a freshly created (or re-armed)
/// guard cannot trigger until `window_size` real steps have been recorded.
#[derive(Debug, Clone)]
pub struct NoProgressGuard {
    window_size: usize,
    threshold_sec: Float,
    dt_window: Vec<Float>,
    idx: usize,
}

impl NoProgressGuard {
    pub fn new(window_size: usize, threshold_sec: Float) -> Self {
        let mut guard = Self {
            window_size,
            threshold_sec,
            dt_window: Vec::new(),
            idx: 0,
        };
        if !guard.disabled() {
            guard.dt_window = vec![threshold_sec; window_size];
        }
        guard
    }

    /// The guard no-ops entirely when either knob is zero.
    pub fn disabled(&self) -> bool {
        self.window_size == 0 || self.threshold_sec == 0.0
    }

    /// Re-arm: refill the window with threshold values.
    pub fn initialize(&mut self) {
        if self.disabled() {
            return;
        }
        self.idx = 0;
        self.dt_window.clear();
        self.dt_window.resize(self.window_size, self.threshold_sec);
    }

    /// Insert a new step size, overwriting the oldest entry.
    pub fn add_dt(&mut self, dt: Float) {
        if self.disabled() {
            return;
        }
        self.dt_window[self.idx] = dt;
        self.idx = (self.idx + 1) % self.window_size;
    }

    /// True iff the window sum stays strictly below the threshold.
    /// Short-circuits as soon as the partial sum reaches the threshold.
    pub fn violated(&self) -> bool {
        if self.disabled() {
            return false;
        }
        let mut sum = 0.0;
        for &dt in &self.dt_window {
            sum += dt;
            if sum >= self.threshold_sec {
                return false;
            }
        }
        true
    }
}
