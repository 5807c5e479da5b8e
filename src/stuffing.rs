//! Stuffing and bitrate regulation.
//!
//! Four independent, composable rules pace the stream:
//!
//! - `instuff_start` null packets before the first real input packet
//! - `instuff_stop` null packets after the last real packet on shutdown
//! - a ratio of `instuff_nullpkt` nulls per `instuff_inpkt` real packets
//!   ([`InputStuffer`], drift-free accumulator pacing)
//! - convergence toward a fixed target bitrate ([`BitrateRegulator`])
//!
//! The start/stop bursts are plain counters applied directly by the input
//! stage; the two stateful rules live here.

use std::time::{Duration, Instant};

/// Drift-free a-nulls-per-b-reals stuffing.
///
/// Keeps a running accumulator instead of a round-robin counter, so over
/// any window containing `b * k` real packets exactly `a * k` nulls are
/// due, with no long-term drift from rounding.
#[derive(Debug)]
pub struct InputStuffer {
    nullpkt: usize,
    inpkt: usize,
    acc: usize,
}

impl InputStuffer {
    /// Create a stuffer injecting `nullpkt` nulls per `inpkt` real
    /// packets. Returns `None` when either count is zero (rule disabled).
    pub fn new(nullpkt: usize, inpkt: usize) -> Option<Self> {
        if nullpkt == 0 || inpkt == 0 {
            return None;
        }
        Some(Self {
            nullpkt,
            inpkt,
            acc: 0,
        })
    }

    /// Account for one real input packet; returns how many null packets
    /// are due immediately after it.
    pub fn due_after_packet(&mut self) -> usize {
        self.acc += self.nullpkt;
        let due = self.acc / self.inpkt;
        self.acc %= self.inpkt;
        due
    }
}

/// What the regulator wants the input stage to do after a cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Pace {
    /// Null packets to inject to catch up with the target rate.
    pub stuffing: u64,
    /// How long to hold off before the next cycle, when running ahead of
    /// the target. Never longer than the remaining adjustment window, so
    /// the output is flushed at least once per interval.
    pub delay: Option<Duration>,
}

/// Converges actual throughput toward a fixed packets-per-second target.
///
/// Throughput is measured over a sliding window of `window` milliseconds.
/// When the pipeline runs ahead of the target the regulator asks for a
/// bounded delay; when it falls behind it asks for stuffing to be
/// injected.
#[derive(Debug)]
pub struct BitrateRegulator {
    /// Target rate in packets per second. Always non-zero.
    target: u64,
    window: Duration,
    window_start: Instant,
    sent_in_window: u64,
}

impl BitrateRegulator {
    /// Create a regulator for `target` packets per second, adjusting over
    /// windows of `window_ms` milliseconds. Returns `None` when the
    /// target is zero (unconstrained, follow the input's natural rate).
    pub fn new(target: u64, window_ms: u64) -> Option<Self> {
        if target == 0 {
            return None;
        }
        Some(Self {
            target,
            window: Duration::from_millis(window_ms.max(1)),
            window_start: Instant::now(),
            sent_in_window: 0,
        })
    }

    /// Record packets sent downstream (real and stuffing alike).
    pub fn record(&mut self, packets: u64) {
        self.sent_in_window += packets;
    }

    /// Compare progress against the target and decide on a correction.
    pub fn pace(&mut self) -> Pace {
        self.pace_at(Instant::now())
    }

    fn pace_at(&mut self, now: Instant) -> Pace {
        let mut elapsed = now.duration_since(self.window_start);
        if elapsed >= self.window {
            // Slide the window forward by whole intervals, retiring the
            // packets that were due in them. A surplus carries over, so
            // there is no unregulated burst at the boundary; a deficit is
            // forgiven rather than repaid as a stuffing flood.
            let windows = (elapsed.as_micros() / self.window.as_micros()) as u32;
            let advance = self.window * windows;
            self.window_start += advance;
            let retired = (self.target as u128 * advance.as_micros()) / 1_000_000;
            self.sent_in_window = self.sent_in_window.saturating_sub(retired as u64);
            elapsed = now.duration_since(self.window_start);
        }

        let expected = (self.target as u128 * elapsed.as_micros()) / 1_000_000;
        let sent = self.sent_in_window as u128;

        if sent > expected {
            // Ahead of the target: hold off until the schedule catches
            // up, but never past the end of the window.
            let excess = (sent - expected) as u64;
            let catch_up = Duration::from_micros(excess.saturating_mul(1_000_000) / self.target);
            let remaining = self.window - elapsed;
            Pace {
                stuffing: 0,
                delay: Some(catch_up.min(remaining)),
            }
        } else {
            Pace {
                stuffing: (expected - sent) as u64,
                delay: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuffer_disabled_when_either_count_zero() {
        assert!(InputStuffer::new(0, 5).is_none());
        assert!(InputStuffer::new(5, 0).is_none());
        assert!(InputStuffer::new(0, 0).is_none());
        assert!(InputStuffer::new(1, 1).is_some());
    }

    #[test]
    fn test_stuffer_exact_ratio_over_whole_windows() {
        // a=2 nulls per b=3 reals: over 3k reals exactly 2k nulls.
        let mut stuffer = InputStuffer::new(2, 3).unwrap();
        let mut nulls = 0;
        for _ in 0..30 {
            nulls += stuffer.due_after_packet();
        }
        assert_eq!(nulls, 20);
    }

    #[test]
    fn test_stuffer_no_drift_on_partial_windows() {
        // a=1 per b=3: nulls due after the 3rd, 6th, 9th, ... packet.
        let mut stuffer = InputStuffer::new(1, 3).unwrap();
        let pattern: Vec<usize> = (0..9).map(|_| stuffer.due_after_packet()).collect();
        assert_eq!(pattern, vec![0, 0, 1, 0, 0, 1, 0, 0, 1]);
    }

    #[test]
    fn test_stuffer_dense_ratio() {
        // More nulls than reals: a=5 per b=2.
        let mut stuffer = InputStuffer::new(5, 2).unwrap();
        let total: usize = (0..4).map(|_| stuffer.due_after_packet()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_regulator_disabled_at_zero_target() {
        assert!(BitrateRegulator::new(0, 1000).is_none());
        assert!(BitrateRegulator::new(1, 1000).is_some());
    }

    #[test]
    fn test_regulator_requests_stuffing_when_behind() {
        let mut reg = BitrateRegulator::new(1000, 10_000).unwrap();
        let start = reg.window_start;

        // Half a second in, 1000 pps expected 500 packets; only 100 sent.
        reg.record(100);
        let pace = reg.pace_at(start + Duration::from_millis(500));
        assert_eq!(pace.stuffing, 400);
        assert!(pace.delay.is_none());
    }

    #[test]
    fn test_regulator_requests_delay_when_ahead() {
        let mut reg = BitrateRegulator::new(1000, 10_000).unwrap();
        let start = reg.window_start;

        // 100 ms in, expected 100; 600 sent: 500 packets ahead, half a
        // second of delay at 1000 pps.
        reg.record(600);
        let pace = reg.pace_at(start + Duration::from_millis(100));
        assert_eq!(pace.stuffing, 0);
        let delay = pace.delay.unwrap();
        assert!(delay >= Duration::from_millis(490) && delay <= Duration::from_millis(510));
    }

    #[test]
    fn test_regulator_delay_capped_at_window_end() {
        let mut reg = BitrateRegulator::new(10, 1_000).unwrap();
        let start = reg.window_start;

        // Massively ahead: raw catch-up time would be 100 s, but the
        // delay must not exceed what is left of the 1 s window.
        reg.record(1000);
        let pace = reg.pace_at(start + Duration::from_millis(200));
        assert!(pace.delay.unwrap() <= Duration::from_millis(800));
    }

    #[test]
    fn test_regulator_surplus_carries_across_window() {
        let mut reg = BitrateRegulator::new(1000, 100).unwrap();
        let start = reg.window_start;

        // Far ahead when the window rolls over: one window's quota (100
        // packets) is retired, the rest still counts, so the regulator
        // keeps holding instead of bursting.
        reg.record(1_000);
        let pace = reg.pace_at(start + Duration::from_millis(150));
        assert_eq!(pace.stuffing, 0);
        assert!(pace.delay.is_some());
        assert_eq!(reg.sent_in_window, 900);
    }

    #[test]
    fn test_regulator_deficit_is_forgiven_at_window_boundary() {
        let mut reg = BitrateRegulator::new(1000, 100).unwrap();
        let start = reg.window_start;

        // Nothing sent for 1.5 windows: only the current window's 50 ms
        // of schedule is owed, not the retired windows' backlog.
        let pace = reg.pace_at(start + Duration::from_millis(150));
        assert_eq!(pace.stuffing, 50);
        assert!(pace.delay.is_none());
    }
}
