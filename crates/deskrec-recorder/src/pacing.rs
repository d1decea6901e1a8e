//! Fixed-interval pacing for the encode loop.
//!
//! Each tick sleeps `interval - elapsed` where
//! `interval = 1_000_000 / (target_fps + headroom_fps)` µs. The headroom keeps
//! the achieved rate from undershooting when sleeps overrun. Slack is recorded
//! for diagnostics only; a late tick never skips or duplicates work.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Default extra frames per second added to the pacing rate.
pub const DEFAULT_PACING_HEADROOM_FPS: u32 = 5;

/// Slack accounting over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PacingStats {
    pub ticks:            u64,
    /// Ticks whose work took longer than the interval.
    pub overruns:         u64,
    /// Sum of `interval - elapsed` over all ticks, negative when behind.
    pub total_slack_us:   i64,
    pub min_slack_us:     i64,
    pub max_work_us:      u64,
}

impl PacingStats {
    pub fn mean_slack_us(&self) -> i64 {
        if self.ticks == 0 {
            0
        } else {
            self.total_slack_us / self.ticks as i64
        }
    }
}

// ── Pacer ─────────────────────────────────────────────────────────────────────

pub struct Pacer {
    interval: Duration,
    stats:    PacingStats,
    fps:      FpsCounter,
}

impl Pacer {
    pub fn new(target_fps: u32, headroom_fps: u32) -> Self {
        let interval_us = deskrec_core::config::pacing_interval_us(target_fps, headroom_fps);
        Self {
            interval: Duration::from_micros(interval_us),
            stats:    PacingStats { min_slack_us: i64::MAX, ..Default::default() },
            fps:      FpsCounter::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Finish a tick that began at `started`: record its slack and sleep out
    /// the rest of the interval. Returns the time slept.
    pub fn pace(&mut self, started: Instant) -> Duration {
        let elapsed = started.elapsed();
        let slack_us = self.interval.as_micros() as i64 - elapsed.as_micros() as i64;

        self.stats.ticks += 1;
        self.stats.total_slack_us += slack_us;
        self.stats.min_slack_us = self.stats.min_slack_us.min(slack_us);
        self.stats.max_work_us = self.stats.max_work_us.max(elapsed.as_micros() as u64);
        self.fps.tick();

        match self.interval.checked_sub(elapsed) {
            Some(rest) if !rest.is_zero() => {
                std::thread::sleep(rest);
                rest
            }
            _ => {
                self.stats.overruns += 1;
                Duration::ZERO
            }
        }
    }

    pub fn stats(&self) -> PacingStats {
        let mut stats = self.stats;
        if stats.ticks == 0 {
            stats.min_slack_us = 0;
        }
        stats
    }

    /// Ticks completed in the last second.
    pub fn fps(&self) -> f32 {
        self.fps.fps()
    }
}

// ── FpsCounter ────────────────────────────────────────────────────────────────

struct FpsCounter {
    timestamps: VecDeque<Instant>,
}

impl FpsCounter {
    fn new() -> Self { Self { timestamps: VecDeque::with_capacity(128) } }

    fn tick(&mut self) {
        let now = Instant::now();
        self.timestamps.push_back(now);
        while self.timestamps.front().is_some_and(|t| now - *t > Duration::from_secs(1)) {
            self.timestamps.pop_front();
        }
    }

    fn fps(&self) -> f32 { self.timestamps.len() as f32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_uses_headroom() {
        assert_eq!(Pacer::new(30, 5).interval(), Duration::from_micros(28_571));
        assert_eq!(Pacer::new(60, 0).interval(), Duration::from_micros(16_666));
    }

    #[test]
    fn hundred_ticks_take_hundred_intervals() {
        let mut pacer = Pacer::new(30, DEFAULT_PACING_HEADROOM_FPS);
        let expected = pacer.interval() * 100;

        let begin = Instant::now();
        for _ in 0..100 {
            let started = Instant::now();
            pacer.pace(started);
        }
        let took = begin.elapsed();

        assert!(took >= expected, "{took:?} < {expected:?}");
        assert!(took < expected + Duration::from_millis(400), "{took:?} overshot {expected:?}");
        assert_eq!(pacer.stats().ticks, 100);
    }

    #[test]
    fn slow_ticks_count_as_overruns_without_sleeping() {
        let mut pacer = Pacer::new(1000, 0);
        let started = Instant::now() - Duration::from_millis(5);
        assert_eq!(pacer.pace(started), Duration::ZERO);

        let stats = pacer.stats();
        assert_eq!(stats.overruns, 1);
        assert!(stats.min_slack_us <= -4_000);
        assert!(stats.mean_slack_us() < 0);
    }

    #[test]
    fn empty_stats_are_zeroed() {
        let stats = Pacer::new(30, 5).stats();
        assert_eq!(stats, PacingStats::default());
    }
}
