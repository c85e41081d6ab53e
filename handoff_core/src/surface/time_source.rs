// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A vsync grid emulated from a phase and an interval.

use crate::time::{Duration, HostTime};

/// Ticks on the grid `phase + k * interval` while active.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EmulatedTimeSource {
    phase: HostTime,
    interval: Duration,
    active: bool,
    /// A tick task is sitting in the surface's queue.
    pub(crate) tick_pending: bool,
    last_tick: Option<HostTime>,
}

impl EmulatedTimeSource {
    pub(crate) const fn new(phase: HostTime, interval: Duration) -> Self {
        Self {
            phase,
            interval,
            active: false,
            tick_pending: false,
            last_tick: None,
        }
    }

    pub(crate) const fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_timebase_and_interval(&mut self, phase: HostTime, interval: Duration) {
        self.phase = phase;
        self.interval = interval;
    }

    /// Starts ticking. Returns the most recent grid point at or before `now`
    /// if it is newer than the last tick, since the client missed it.
    pub(crate) fn activate(&mut self, now: HostTime) -> Option<HostTime> {
        if self.active {
            return None;
        }
        self.active = true;
        let missed = now.prev_on_grid(self.phase, self.interval)?;
        match self.last_tick {
            Some(last) if missed <= last => None,
            _ => Some(missed),
        }
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// First grid point strictly after the one `now` falls in.
    pub(crate) fn next_tick_after(&self, now: HostTime) -> HostTime {
        match now.prev_on_grid(self.phase, self.interval) {
            Some(prev) => prev.saturating_add(self.interval),
            None => now.next_on_grid(self.phase, self.interval),
        }
    }

    /// Runs a tick task at `now`. Returns the frame time to deliver and when
    /// the following tick is due, or `None` if the source went inactive.
    pub(crate) fn on_tick(&mut self, now: HostTime) -> Option<(HostTime, HostTime)> {
        if !self.active {
            self.tick_pending = false;
            return None;
        }
        let frame_time = now.prev_on_grid(self.phase, self.interval).unwrap_or(now);
        self.last_tick = Some(frame_time);
        Some((frame_time, self.next_tick_after(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_reports_missed_tick_once() {
        let mut src = EmulatedTimeSource::new(HostTime(0), Duration(100));
        assert_eq!(src.activate(HostTime(250)), Some(HostTime(200)));
        assert_eq!(src.activate(HostTime(260)), None, "already active");

        assert_eq!(src.on_tick(HostTime(300)), Some((HostTime(300), HostTime(400))));
        src.deactivate();
        assert_eq!(
            src.activate(HostTime(350)),
            None,
            "tick at 300 was not missed"
        );
    }

    #[test]
    fn late_tick_lands_on_latest_grid_point() {
        let mut src = EmulatedTimeSource::new(HostTime(10), Duration(100));
        src.activate(HostTime(10));
        assert_eq!(src.on_tick(HostTime(335)), Some((HostTime(310), HostTime(410))));
    }

    #[test]
    fn inactive_tick_stops_the_chain() {
        let mut src = EmulatedTimeSource::new(HostTime(0), Duration(100));
        src.tick_pending = true;
        assert_eq!(src.on_tick(HostTime(100)), None);
        assert!(!src.tick_pending, "no follow-up tick");
        assert!(!src.is_active());
    }

    #[test]
    fn next_tick_is_strictly_later() {
        let src = EmulatedTimeSource::new(HostTime(0), Duration(100));
        assert_eq!(src.next_tick_after(HostTime(100)), HostTime(200));
        assert_eq!(src.next_tick_after(HostTime(101)), HostTime(200));
        assert_eq!(src.interval(), Duration(100));
    }
}
