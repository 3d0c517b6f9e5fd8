//! Smoother: a monotone-preserving exponential interpolator used to turn the jittery,
//! periodically-updated timing snapshots the server sends into a playback clock that moves
//! smoothly and never runs backwards from an application's point of view.

use std::collections::VecDeque;
use std::time::Duration;

/// How long a new estimate takes to be fully adopted.
const DEFAULT_ADJUST_TIME: Duration = Duration::from_secs(1);
/// How far back history is kept for extrapolation once incoming updates stop.
const DEFAULT_HISTORY_TIME: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone)]
struct Sample {
    /// Time this sample was recorded, in µs since the smoother's own arbitrary origin.
    x: i64,
    /// The raw value at that time, in µs.
    y: i64,
}

/// A single parameterized smoother (one implementation, not a per-platform `#ifdef` selection):
/// given a stream of `(x, y)` observations, produces a `get(x)` estimate that is continuous and
/// non-decreasing in `x` even when a new observation disagrees with the previous trend.
pub struct Smoother {
    adjust_time: Duration,
    history_time: Duration,
    history: VecDeque<Sample>,
    /// The estimate in effect before the current adjustment began.
    base_x: i64,
    base_y: i64,
    /// The target the current adjustment is easing towards.
    target_x: i64,
    target_y: i64,
    /// When the current adjustment began.
    adjust_start: i64,
    paused: bool,
    paused_at: i64,
    /// The highest value ever handed out by [`Smoother::get`]. A disagreeing [`Smoother::put`]
    /// still eases towards its (possibly lower) target, but [`Smoother::get`] never reports below
    /// this floor; only [`Smoother::reset`] is allowed to move it backwards.
    floor: i64,
}

impl Smoother {
    pub fn new() -> Self {
        Self::with_times(DEFAULT_ADJUST_TIME, DEFAULT_HISTORY_TIME)
    }

    pub fn with_times(adjust_time: Duration, history_time: Duration) -> Self {
        Smoother {
            adjust_time,
            history_time,
            history: VecDeque::new(),
            base_x: 0,
            base_y: 0,
            target_x: 0,
            target_y: 0,
            adjust_start: 0,
            paused: false,
            paused_at: 0,
            floor: 0,
        }
    }

    /// Feeds a new raw observation at time `x` (µs) with value `y` (µs). Starts easing the
    /// estimate from wherever [`Smoother::get`] currently reports towards `y`, over
    /// `adjust_time`, rather than jumping straight to it.
    pub fn put(&mut self, x: i64, y: i64) {
        self.base_y = self.get_internal(x);
        self.base_x = x;
        self.target_x = x;
        self.target_y = y;
        self.adjust_start = x;

        self.history.push_back(Sample { x, y });
        let cutoff = x - self.history_time.as_micros() as i64;
        while let Some(front) = self.history.front() {
            if front.x < cutoff {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn get_internal(&self, x: i64) -> i64 {
        let effective_x = if self.paused { self.paused_at } else { x };
        let elapsed = (effective_x - self.adjust_start).max(0);
        let span = self.adjust_time.as_micros() as i64;
        if span <= 0 || elapsed >= span {
            return self.target_y;
        }
        // Linear ease between base and target; monotone in x because target_y is itself derived
        // from an always-increasing source (wall/transport clock) and elapsed only grows.
        let progress_num = elapsed;
        let progress_den = span;
        self.base_y + (self.target_y - self.base_y) * progress_num / progress_den
    }

    /// The current best estimate of the playback position at time `x`. Guaranteed
    /// non-decreasing across calls with non-decreasing `x`, even across a [`Smoother::put`] that
    /// disagreed with the prior trend: the ease path is still computed towards the new target,
    /// but any value below the high-water mark already reported is clamped to it.
    pub fn get(&mut self, x: i64) -> i64 {
        let v = self.get_internal(x).max(self.floor);
        self.floor = v;
        v
    }

    /// Pauses the clock (e.g. the stream corked): further [`Smoother::get`] calls return the
    /// value frozen at the pause point until [`Smoother::resume`].
    pub fn pause(&mut self, x: i64) {
        if !self.paused {
            self.paused = true;
            self.paused_at = x;
        }
    }

    pub fn resume(&mut self, x: i64) {
        if self.paused {
            let frozen = self.get_internal(self.paused_at).max(self.floor);
            self.floor = frozen;
            self.paused = false;
            // Re-anchor so time resumes counting from `x` without a jump.
            self.base_x = x;
            self.base_y = frozen;
            self.target_x = x;
            self.target_y = frozen;
            self.adjust_start = x;
        }
    }

    /// Resets all history and jumps the estimate immediately to `y` at `x` (used after a stream
    /// move or similar discontinuity the caller has decided is not worth easing across). Unlike
    /// [`Smoother::put`], this is allowed to move the reported estimate backwards.
    pub fn reset(&mut self, x: i64, y: i64) {
        self.history.clear();
        self.base_x = x;
        self.base_y = y;
        self.target_x = x;
        self.target_y = y;
        self.adjust_start = x;
        self.floor = y;
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_to_target_after_adjust_time() {
        let mut s = Smoother::with_times(Duration::from_millis(100), Duration::from_secs(5));
        s.reset(0, 0);
        s.put(0, 1000);
        assert_eq!(s.get(100_000), 1000);
    }

    #[test]
    fn estimate_is_monotone_across_disagreeing_updates() {
        let mut s = Smoother::with_times(Duration::from_millis(200), Duration::from_secs(5));
        s.reset(0, 0);
        s.put(0, 10_000);
        let mut last = s.get(0);
        for t in (0..400_000i64).step_by(10_000) {
            if t == 150_000 {
                // A new observation arrives disagreeing with the trend (lower than expected).
                s.put(t, 5_000);
            }
            let v = s.get(t);
            assert!(v >= last, "value went backwards at t={t}: {v} < {last}");
            last = v;
        }
    }

    #[test]
    fn pause_freezes_then_resume_continues_without_jump() {
        let mut s = Smoother::with_times(Duration::from_millis(50), Duration::from_secs(5));
        s.reset(0, 0);
        s.put(0, 100_000);
        let at_pause = s.get(50_000);
        s.pause(50_000);
        assert_eq!(s.get(200_000), at_pause);
        s.resume(200_000);
        assert_eq!(s.get(200_000), at_pause);
    }

    #[test]
    fn history_window_is_trimmed() {
        let mut s = Smoother::with_times(Duration::from_millis(10), Duration::from_millis(100));
        for i in 0..50 {
            s.put(i * 10_000, i * 10_000);
        }
        assert!(s.history.len() < 50);
    }
}
