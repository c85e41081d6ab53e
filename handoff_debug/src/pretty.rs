// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use handoff_core::time::{HostTime, Timebase};
use handoff_core::trace::{
    BeginFrameEvent, BeginFrameSkippedEvent, DamageReportEvent, FrameRejectEvent,
    FrameSubmitEvent, ResourcesLostEvent, ResourcesReturnedEvent, SkipReason, SurfaceLostEvent,
    SwapCompleteEvent, SwapEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn skip_name(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::NotNeeded => "not-needed",
        SkipReason::ClientNotReady => "client-not-ready",
        SkipReason::SwapThrottled => "swap-throttled",
        SkipReason::Duplicate => "duplicate",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] #{} resources={} passes={}",
            e.frame_index, e.resource_count, e.render_pass_count,
        );
    }

    fn on_frame_reject(&mut self, e: &FrameRejectEvent) {
        let _ = writeln!(
            self.writer,
            "[frame:REJECTED] #{} reason={:?}",
            e.frame_index, e.reason,
        );
    }

    fn on_resources_returned(&mut self, e: &ResourcesReturnedEvent) {
        let lost = if e.lost { " LOST" } else { "" };
        let _ = writeln!(
            self.writer,
            "[return] entries={} refs={}{lost}",
            e.entries, e.refs,
        );
    }

    fn on_resources_lost(&mut self, e: &ResourcesLostEvent) {
        let _ = writeln!(self.writer, "[lost] resources={}", e.resources);
    }

    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let retro = if e.retroactive { " (retroactive)" } else { "" };
        let _ = writeln!(
            self.writer,
            "[begin-frame] t={:.1}µs deadline={:.1}µs interval={:.1}µs{retro}",
            self.host_us(e.frame_time),
            self.host_us(e.deadline),
            self.ticks_to_us(e.interval.ticks()),
        );
    }

    fn on_begin_frame_skipped(&mut self, e: &BeginFrameSkippedEvent) {
        let _ = writeln!(
            self.writer,
            "[begin-frame:skip] t={:.1}µs {}",
            self.host_us(e.frame_time),
            skip_name(e.reason),
        );
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        let over = if e.over_budget { " OVER-BUDGET" } else { "" };
        let _ = writeln!(
            self.writer,
            "[swap] #{} at {:.1}µs pending={}{over}",
            e.swap_id,
            self.host_us(e.now),
            e.pending,
        );
    }

    fn on_swap_complete(&mut self, e: &SwapCompleteEvent) {
        match e.swap_id {
            Some(id) => {
                let _ = writeln!(
                    self.writer,
                    "[swap:ack] #{id} at {:.1}µs pending={}",
                    self.host_us(e.now),
                    e.pending,
                );
            }
            None => {
                let _ = writeln!(
                    self.writer,
                    "[swap:ack] unmatched at {:.1}µs",
                    self.host_us(e.now),
                );
            }
        }
    }

    fn on_surface_lost(&mut self, e: &SurfaceLostEvent) {
        let _ = writeln!(
            self.writer,
            "[surface:LOST] swaps_dropped={}",
            e.swaps_dropped,
        );
    }

    fn on_damage_report(&mut self, e: &DamageReportEvent) {
        let r = e.rect;
        let _ = writeln!(
            self.writer,
            "[damage] observer={} frame={} rect=({},{} {}x{})",
            e.observer, e.frame_index, r.x, r.y, r.width, r.height,
        );
    }
}
