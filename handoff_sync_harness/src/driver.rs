// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Drives an [`OutputSurface`] on a virtual clock.

use handoff_core::surface::{
    BeginFrameArgs, ConfigError, OutputSurface, OutputSurfaceClient, OutputSurfaceConfig, SwapId,
};
use handoff_core::time::{Duration, HostTime, Timebase};

use crate::pacing::PacingSample;

/// An [`OutputSurfaceClient`] that records everything it is told.
#[derive(Clone, Debug, Default)]
pub struct RecordingClient {
    /// BeginFrames received, in order.
    pub begin_frames: Vec<BeginFrameArgs>,
    /// Swap completions received, in order.
    pub completed_swaps: Vec<SwapId>,
    /// Number of surface losses reported.
    pub losses: u32,
}

impl OutputSurfaceClient for RecordingClient {
    fn begin_frame(&mut self, args: &BeginFrameArgs) {
        self.begin_frames.push(*args);
    }

    fn on_swap_buffers_complete(&mut self, swap: SwapId) {
        self.completed_swaps.push(swap);
    }

    fn did_lose_output_surface(&mut self) {
        self.losses += 1;
    }
}

/// An [`OutputSurface`], its client, and the current virtual time.
///
/// Time only moves through [`advance_to`](Self::advance_to) and
/// [`advance_by`](Self::advance_by), which run every surface task that falls
/// due on the way, at the instant it is due.
#[derive(Debug)]
pub struct SurfaceDriver {
    surface: OutputSurface,
    client: RecordingClient,
    now: HostTime,
    timebase: Timebase,
    sampled: usize,
    last_delivered: Option<HostTime>,
}

impl SurfaceDriver {
    /// Creates a driver at time zero with nanosecond ticks.
    ///
    /// # Errors
    ///
    /// Returns the surface's [`ConfigError`] if `config` is invalid.
    pub fn new(config: OutputSurfaceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            surface: OutputSurface::new(config)?,
            client: RecordingClient::default(),
            now: HostTime(0),
            timebase: Timebase::NANOS,
            sampled: 0,
            last_delivered: None,
        })
    }

    /// Sets the tick-to-nanosecond conversion used for pacing samples.
    #[must_use]
    pub fn with_timebase(mut self, timebase: Timebase) -> Self {
        self.timebase = timebase;
        self
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.now
    }

    /// The driven surface.
    #[must_use]
    pub fn surface(&self) -> &OutputSurface {
        &self.surface
    }

    /// The driven surface, for configuration such as installing a trace sink.
    pub fn surface_mut(&mut self) -> &mut OutputSurface {
        &mut self.surface
    }

    /// What the client has been told so far.
    #[must_use]
    pub fn client(&self) -> &RecordingClient {
        &self.client
    }

    /// Moves the clock forward to `target`, running due tasks at their due
    /// times. Moving backwards is ignored.
    pub fn advance_to(&mut self, target: HostTime) {
        while let Some(due) = self.surface.next_task_due() {
            if due > target {
                break;
            }
            self.now = self.now.max(due);
            if self.surface.run_pending_tasks(self.now, &mut self.client) == 0 {
                break;
            }
        }
        self.now = self.now.max(target);
        self.surface.run_pending_tasks(self.now, &mut self.client);
    }

    /// Moves the clock forward by `d`.
    pub fn advance_by(&mut self, d: Duration) {
        self.advance_to(self.now.saturating_add(d));
    }

    /// Sets or clears BeginFrame demand now.
    pub fn set_needs_begin_frame(&mut self, enable: bool) {
        self.surface.set_needs_begin_frame(enable, self.now);
    }

    /// Feeds an externally sourced BeginFrame now.
    pub fn begin_frame(&mut self, args: BeginFrameArgs) -> bool {
        self.surface.begin_frame(args, &mut self.client)
    }

    /// Issues a swap now.
    pub fn swap(&mut self) -> SwapId {
        self.surface.did_swap_buffers(self.now)
    }

    /// Acknowledges the oldest pending swap now.
    pub fn ack(&mut self) -> Option<SwapId> {
        self.surface
            .on_swap_buffers_complete(self.now, &mut self.client)
    }

    /// Reports a context loss to the surface.
    pub fn lose(&mut self) {
        self.surface.did_lose_output_surface(&mut self.client);
    }

    /// Summarizes what happened since the previous call.
    pub fn sample(&mut self) -> PacingSample {
        let fresh = &self.client.begin_frames[self.sampled..];
        self.sampled = self.client.begin_frames.len();
        let latest = fresh.last().map(|args| args.frame_time);
        let reference = latest.unwrap_or(self.now);
        let frame_delta_ms = self.last_delivered.map_or(0.0, |prev| {
            let ticks = reference.saturating_duration_since(prev).ticks();
            self.timebase.ticks_to_nanos(ticks) as f64 / 1_000_000.0
        });
        if latest.is_some() {
            self.last_delivered = latest;
        }
        PacingSample {
            delivered: latest.is_some(),
            throttled: self.surface.is_throttled(),
            pending_swaps: u32::try_from(self.surface.pending_swaps()).unwrap_or(u32::MAX),
            frame_delta_ms,
        }
    }
}
