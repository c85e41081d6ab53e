// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rolling BeginFrame pacing metrics and grading.

/// Per-interval sample fed into [`PacingTracker::observe`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PacingSample {
    /// A BeginFrame reached the client during the interval.
    pub delivered: bool,
    /// The surface was withholding BeginFrames for swap budget at the end of
    /// the interval.
    pub throttled: bool,
    /// Swaps awaiting completion at the end of the interval.
    pub pending_swaps: u32,
    /// Time between the two most recent delivered frame times, in ms.
    pub frame_delta_ms: f64,
}

/// Letter grade for pacing quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingGrade {
    /// Steady cadence and almost no dropped intervals.
    A,
    /// Occasional drops.
    B,
    /// Degraded but usable.
    C,
    /// Frames are being starved.
    D,
}

impl PacingGrade {
    /// Returns a short label for HUD rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

/// Aggregated report returned by [`PacingTracker::observe`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PacingReport {
    /// Current grade.
    pub grade: PacingGrade,
    /// Intervals without a BeginFrame, per 1000 observed.
    pub drop_rate_per_1000: f64,
    /// Throttled intervals, per 1000 observed.
    pub throttle_rate_per_1000: f64,
    /// Deviation of this sample's frame delta from the expected interval.
    pub jitter_ms: f64,
    /// Total intervals observed.
    pub total_intervals: u64,
    /// Intervals in which a BeginFrame was delivered.
    pub delivered_frames: u64,
    /// Intervals that ended throttled.
    pub throttled_intervals: u64,
}

/// Rolling pacing tracker with fixed-size frame-delta history.
#[derive(Debug)]
pub struct PacingTracker<const N: usize> {
    expected_delta_ms: f64,
    deltas_ms: [f64; N],
    cursor: usize,
    total_intervals: u64,
    delivered_frames: u64,
    throttled_intervals: u64,
}

impl<const N: usize> Default for PacingTracker<N> {
    fn default() -> Self {
        Self::new(16.67)
    }
}

impl<const N: usize> PacingTracker<N> {
    /// Creates a tracker expecting one frame every `expected_delta_ms`, with
    /// that value prefilled in the ring buffer.
    #[must_use]
    pub const fn new(expected_delta_ms: f64) -> Self {
        Self {
            expected_delta_ms,
            deltas_ms: [expected_delta_ms; N],
            cursor: 0,
            total_intervals: 0,
            delivered_frames: 0,
            throttled_intervals: 0,
        }
    }

    /// Observes one interval and returns an updated report.
    #[must_use]
    pub fn observe(&mut self, sample: PacingSample) -> PacingReport {
        self.total_intervals = self.total_intervals.saturating_add(1);
        if sample.delivered {
            self.delivered_frames = self.delivered_frames.saturating_add(1);
            self.deltas_ms[self.cursor % N] = sample.frame_delta_ms;
            self.cursor = (self.cursor + 1) % N;
        }
        if sample.throttled {
            self.throttled_intervals = self.throttled_intervals.saturating_add(1);
        }

        let total = self.total_intervals as f64;
        let dropped = self.total_intervals - self.delivered_frames;
        let drop_rate = dropped as f64 * 1000.0 / total;
        let throttle_rate = self.throttled_intervals as f64 * 1000.0 / total;
        let jitter = if sample.delivered {
            (sample.frame_delta_ms - self.expected_delta_ms).abs()
        } else {
            0.0
        };

        PacingReport {
            grade: grade_for(jitter, drop_rate),
            drop_rate_per_1000: drop_rate,
            throttle_rate_per_1000: throttle_rate,
            jitter_ms: jitter,
            total_intervals: self.total_intervals,
            delivered_frames: self.delivered_frames,
            throttled_intervals: self.throttled_intervals,
        }
    }

    /// Returns ring-buffer frame deltas oldest→newest.
    #[must_use]
    pub fn frame_deltas(&self) -> [f64; N] {
        let mut out = [0.0; N];
        let mut i = 0;
        while i < N {
            let idx = (self.cursor + i) % N;
            out[i] = self.deltas_ms[idx];
            i += 1;
        }
        out
    }

    /// Returns an ASCII sparkline over `frame_deltas()`.
    #[must_use]
    pub fn sparkline_ascii(&self, min_ms: f64, max_ms: f64) -> String {
        const LEVELS: &[u8] = b" .:-=+*#%@";
        let mut out = String::with_capacity(N);
        for v in self.frame_deltas() {
            let v = v.clamp(min_ms, max_ms);
            let t = (v - min_ms) / (max_ms - min_ms);
            #[expect(
                clippy::cast_possible_truncation,
                reason = "index is clamped to ASCII level count"
            )]
            let level = (t * (LEVELS.len() as f64 - 1.0) + 0.5) as usize;
            out.push(LEVELS[level] as char);
        }
        out
    }
}

fn grade_for(jitter_ms: f64, drop_rate_per_1000: f64) -> PacingGrade {
    if jitter_ms < 2.0 && drop_rate_per_1000 < 10.0 {
        PacingGrade::A
    } else if jitter_ms < 8.0 && drop_rate_per_1000 < 100.0 {
        PacingGrade::B
    } else if jitter_ms < 17.0 && drop_rate_per_1000 < 350.0 {
        PacingGrade::C
    } else {
        PacingGrade::D
    }
}
