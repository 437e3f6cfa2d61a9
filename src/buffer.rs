use chrono::Timelike;

use crate::config::HourWindow;

/// True iff `x` lies on the forward arc from `a` to `b` on a 24-hour cycle,
/// inclusive at both ends (spec §4.4, §8).
pub fn point_in_interval_24(x: u8, a: u8, b: u8) -> bool {
    let x = x as i32 % 24;
    let a = a as i32 % 24;
    let b = b as i32 % 24;
    (x - a).rem_euclid(24) <= (b - a).rem_euclid(24)
}

/// Pure function mapping `(limit_size, wall-clock hour, ramp windows)` to
/// `(low_watermark, high_watermark)` (spec §4.4).
///
/// Grounded on the teacher's `PrewarmingManager::calculate_prewarm_target`
/// (`performance/prewarming.rs`) — same shape, a pure function from pool
/// size plus a demand signal to a target count — generalized here from a
/// recent-demand counter to the spec's time-of-day ramp windows. The ramp
/// windows are disjoint by construction; if they overlap, ramp-down takes
/// precedence (spec §4.4).
pub struct BufferCalculator {
    pub ramp_down_hours: Option<HourWindow>,
    pub ramp_up_hours: Option<HourWindow>,
}

impl BufferCalculator {
    pub fn new(ramp_down_hours: Option<HourWindow>, ramp_up_hours: Option<HourWindow>) -> Self {
        Self {
            ramp_down_hours,
            ramp_up_hours,
        }
    }

    /// `limit_size == 0` ("no configured upper bound", spec §8 boundary)
    /// only changes what the *grow loop* does with its own
    /// `current_size < limit_size` check — it never gates growth there (see
    /// `src/controller/grow.rs`). Here it simply yields a `0` base buffer,
    /// since 5% of an unbounded size has no numeric meaning: a pool with no
    /// limit stands up its first VM via warm-on-demand (`assign_vm`'s
    /// synchronous launch path) rather than via this watermark.
    pub fn watermarks(&self, limit_size: u64, now: chrono::DateTime<chrono::Utc>) -> (u64, u64) {
        let hour = now.hour() as u8;
        let base = limit_size as f64 * 0.05;

        let adjusted = if self.in_ramp_down(hour) {
            base / 2.0
        } else if self.in_ramp_up(hour) {
            base * 1.5
        } else {
            base
        };

        let low = adjusted.ceil() as u64;
        let high = (adjusted * 1.5).ceil() as u64;
        (low, high.max(low))
    }

    fn in_ramp_down(&self, hour: u8) -> bool {
        self.ramp_down_hours
            .map(|w| point_in_interval_24(hour, w.start, w.end))
            .unwrap_or(false)
    }

    fn in_ramp_up(&self, hour: u8) -> bool {
        self.ramp_up_hours
            .map(|w| point_in_interval_24(hour, w.start, w.end))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_arc_is_inclusive_both_ends() {
        assert!(point_in_interval_24(22, 22, 6));
        assert!(point_in_interval_24(6, 22, 6));
        assert!(point_in_interval_24(0, 22, 6));
        assert!(!point_in_interval_24(12, 22, 6));
    }

    #[test]
    fn forward_arc_handles_non_wrapping_window() {
        assert!(point_in_interval_24(10, 8, 12));
        assert!(!point_in_interval_24(13, 8, 12));
        assert!(!point_in_interval_24(7, 8, 12));
    }

    #[test]
    fn watermarks_without_ramp_windows_use_base_five_percent() {
        let calculator = BufferCalculator::new(None, None);
        let now = chrono::Utc::now();
        let (low, high) = calculator.watermarks(200, now);
        assert_eq!(low, 10);
        assert_eq!(high, 15);
    }

    #[test]
    fn ramp_down_window_halves_low_watermark() {
        let calculator = BufferCalculator::new(Some(HourWindow { start: 0, end: 23 }), None);
        let now = chrono::Utc::now();
        let (low, _high) = calculator.watermarks(200, now);
        assert_eq!(low, 5);
    }

    #[test]
    fn high_watermark_never_below_low() {
        let calculator = BufferCalculator::new(None, None);
        let now = chrono::Utc::now();
        let (low, high) = calculator.watermarks(1, now);
        assert!(high >= low);
    }
}
