// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! BeginFrame pacing against outstanding buffer swaps.
//!
//! The [`OutputSurface`] decides when its client may start a frame. A
//! BeginFrame reaches the client only when all of these hold:
//!
//! - the client asked for one with
//!   [`set_needs_begin_frame(true)`](OutputSurface::set_needs_begin_frame),
//! - the client is ready, meaning it renewed its demand since the last
//!   BeginFrame,
//! - fewer than [`max_pending_swaps`](OutputSurfaceConfig::max_pending_swaps)
//!   swaps are awaiting completion (when throttling is on).
//!
//! A BeginFrame that arrives while any of these fail is remembered as
//! *skipped*. When demand is renewed or a swap completes, the surface posts a
//! check that replays the skipped BeginFrame if the [`RetroactivePolicy`]
//! still considers it fresh. This saves a round trip when demand arrives just
//! after a tick.
//!
//! BeginFrames come from an emulated vsync grid
//! ([`BeginFrameSource::Emulated`]) or from the host
//! ([`BeginFrameSource::External`]) through [`OutputSurface::begin_frame`].
//! Two BeginFrames whose frame times lie within
//! [`duplicate_epsilon`](OutputSurfaceConfig::duplicate_epsilon) of each
//! other collapse into one.
//!
//! All work is cooperative. The surface posts tasks to its own queue and the
//! host drains them with [`OutputSurface::run_pending_tasks`]; nothing blocks.
//!
//! ```text
//!           set_needs_begin_frame(true)
//!   Idle ────────────────────────────────► Armed
//!    ▲                                      │  BeginFrame delivered
//!    │ set_needs_begin_frame(false)         ▼
//!    └──────────────────────────────── FramePending
//!                set_needs_begin_frame(true) ──► Armed
//! ```

mod args;
mod policy;
mod task;
mod time_source;

pub use args::BeginFrameArgs;
pub use policy::RetroactivePolicy;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::fmt;

use crate::time::{Duration, HostTime};
use crate::trace::{
    BeginFrameEvent, BeginFrameSkippedEvent, SkipReason, SurfaceLostEvent, SwapCompleteEvent,
    SwapEvent, TraceSink, Tracer,
};
use task::{SurfaceTask, TaskQueue};
use time_source::EmulatedTimeSource;

/// Refresh interval of a 60 Hz display at 1 ns tick resolution.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration(16_666_667);

/// Where BeginFrames come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginFrameSource {
    /// The surface ticks on its own grid `phase + k * interval`.
    Emulated {
        /// A known vsync instant.
        phase: HostTime,
        /// Spacing of vsyncs. Must be non-zero.
        interval: Duration,
    },
    /// The host forwards vsync through [`OutputSurface::begin_frame`].
    External,
}

/// Why an [`OutputSurfaceConfig`] was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A budget of zero pending swaps would never allow a frame.
    #[error("max_pending_swaps must be at least 1")]
    ZeroPendingSwaps,
    /// Vsync must advance.
    #[error("refresh interval must be non-zero")]
    ZeroRefreshInterval,
    /// Successive ticks would be collapsed as duplicates.
    #[error("duplicate_epsilon {epsilon:?} must be smaller than the refresh interval {interval:?}")]
    EpsilonTooLarge {
        /// The configured epsilon.
        epsilon: Duration,
        /// The configured refresh interval.
        interval: Duration,
    },
}

/// Configuration for the [`OutputSurface`].
#[derive(Clone, Copy, Debug)]
pub struct OutputSurfaceConfig {
    /// Swaps that may await completion before BeginFrames are withheld.
    pub max_pending_swaps: u32,
    /// Where BeginFrames come from.
    pub begin_frame_source: BeginFrameSource,
    /// Withhold BeginFrames while at the swap budget. When off, exceeding the
    /// budget is only traced.
    pub throttle_frame_production: bool,
    /// Whether and for how long a skipped BeginFrame may be replayed.
    pub retroactive_policy: RetroactivePolicy,
    /// BeginFrames whose frame times differ by at most this much are
    /// duplicates.
    pub duplicate_epsilon: Duration,
}

impl Default for OutputSurfaceConfig {
    fn default() -> Self {
        Self::emulated(DEFAULT_REFRESH_INTERVAL)
    }
}

impl OutputSurfaceConfig {
    /// Self-ticking surface with a 2-swap budget and half-interval replay.
    #[must_use]
    pub const fn emulated(interval: Duration) -> Self {
        Self {
            max_pending_swaps: 2,
            begin_frame_source: BeginFrameSource::Emulated {
                phase: HostTime(0),
                interval,
            },
            throttle_frame_production: true,
            retroactive_policy: RetroactivePolicy::HalfInterval,
            // 1 µs at 1 ns tick resolution.
            duplicate_epsilon: Duration(1_000),
        }
    }

    /// Surface driven by host vsync, with a 2-swap budget and half-interval
    /// replay.
    #[must_use]
    pub const fn external() -> Self {
        Self {
            begin_frame_source: BeginFrameSource::External,
            ..Self::emulated(DEFAULT_REFRESH_INTERVAL)
        }
    }

    /// Checks the configuration for values the surface cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_swaps == 0 {
            return Err(ConfigError::ZeroPendingSwaps);
        }
        if let BeginFrameSource::Emulated { interval, .. } = self.begin_frame_source {
            if interval.is_zero() {
                return Err(ConfigError::ZeroRefreshInterval);
            }
            if self.duplicate_epsilon.ticks() >= interval.ticks() {
                return Err(ConfigError::EpsilonTooLarge {
                    epsilon: self.duplicate_epsilon,
                    interval,
                });
            }
        }
        Ok(())
    }
}

/// Pacing state derived from demand and client readiness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// No demand for BeginFrames.
    Idle,
    /// Demand is set and the client will take the next BeginFrame.
    Armed,
    /// A BeginFrame was delivered and demand has not been renewed.
    FramePending,
}

/// Sequence number of a buffer swap.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SwapId(u64);

impl SwapId {
    /// Returns the raw sequence number.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapId({})", self.0)
    }
}

/// Receives BeginFrames and swap notifications from an [`OutputSurface`].
pub trait OutputSurfaceClient {
    /// Starts a frame.
    fn begin_frame(&mut self, args: &BeginFrameArgs);

    /// The display finished with a swap.
    fn on_swap_buffers_complete(&mut self, swap: SwapId) {
        _ = swap;
    }

    /// The surface's context is gone; pending swaps will never complete.
    fn did_lose_output_surface(&mut self) {}
}

#[derive(Clone, Copy, Debug)]
struct PendingSwap {
    id: SwapId,
    issued_at: HostTime,
}

/// Paces BeginFrames for one output surface.
pub struct OutputSurface {
    config: OutputSurfaceConfig,
    needs_begin_frame: bool,
    client_ready_for_begin_frame: bool,
    pending_swaps: VecDeque<PendingSwap>,
    next_swap_id: u64,
    last_begin_frame_args: Option<BeginFrameArgs>,
    skipped_begin_frame_args: Option<BeginFrameArgs>,
    check_for_retroactive_pending: bool,
    time_source: Option<EmulatedTimeSource>,
    tasks: TaskQueue,
    tracer: Tracer,
}

impl fmt::Debug for OutputSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSurface")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending_swaps", &self.pending_swaps)
            .field("last_begin_frame_args", &self.last_begin_frame_args)
            .field("skipped_begin_frame_args", &self.skipped_begin_frame_args)
            .field("time_source", &self.time_source)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl OutputSurface {
    /// Creates a surface with no demand and no pending swaps.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails
    /// [`validate`](OutputSurfaceConfig::validate).
    pub fn new(config: OutputSurfaceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let time_source = match config.begin_frame_source {
            BeginFrameSource::Emulated { phase, interval } => {
                Some(EmulatedTimeSource::new(phase, interval))
            }
            BeginFrameSource::External => None,
        };
        Ok(Self {
            config,
            needs_begin_frame: false,
            client_ready_for_begin_frame: true,
            pending_swaps: VecDeque::new(),
            next_swap_id: 0,
            last_begin_frame_args: None,
            skipped_begin_frame_args: None,
            check_for_retroactive_pending: false,
            time_source,
            tasks: TaskQueue::default(),
            tracer: Tracer::none(),
        })
    }

    /// Routes trace events to `sink`.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink + Send>) {
        self.tracer.set_sink(sink);
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink + Send>> {
        self.tracer.take_sink()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &OutputSurfaceConfig {
        &self.config
    }

    /// Current pacing state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        match (self.needs_begin_frame, self.client_ready_for_begin_frame) {
            (false, _) => SchedulerState::Idle,
            (true, true) => SchedulerState::Armed,
            (true, false) => SchedulerState::FramePending,
        }
    }

    /// Whether the client has asked for BeginFrames.
    #[must_use]
    pub fn needs_begin_frame(&self) -> bool {
        self.needs_begin_frame
    }

    /// Number of swaps awaiting completion.
    #[must_use]
    pub fn pending_swaps(&self) -> usize {
        self.pending_swaps.len()
    }

    /// Host time the oldest pending swap was issued.
    #[must_use]
    pub fn oldest_pending_swap(&self) -> Option<HostTime> {
        self.pending_swaps.front().map(|s| s.issued_at)
    }

    /// Whether BeginFrames are currently withheld by the swap budget.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.config.throttle_frame_production && self.at_swap_budget()
    }

    /// The last BeginFrame delivered to the client.
    #[must_use]
    pub fn last_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.last_begin_frame_args
    }

    /// The most recent BeginFrame that was withheld, if it was not delivered
    /// since.
    #[must_use]
    pub fn skipped_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.skipped_begin_frame_args
    }

    /// Whether the emulated time source is ticking. Always `false` for an
    /// external source.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.time_source.is_some_and(|s| s.is_active())
    }

    /// When the earliest queued task is due.
    #[must_use]
    pub fn next_task_due(&self) -> Option<HostTime> {
        self.tasks.next_due()
    }

    /// Sets or clears demand for BeginFrames.
    ///
    /// Either way the client counts as ready for the next BeginFrame. With
    /// an emulated source, enabling starts the tick chain and a tick missed
    /// while inactive becomes the skipped BeginFrame; disabling stops it.
    pub fn set_needs_begin_frame(&mut self, enable: bool, now: HostTime) {
        self.needs_begin_frame = enable;
        self.client_ready_for_begin_frame = true;
        if let Some(source) = &mut self.time_source {
            if enable {
                if let Some(missed) = source.activate(now) {
                    let missed = BeginFrameArgs::for_interval(missed, source.interval());
                    if self
                        .skipped_begin_frame_args
                        .is_none_or(|s| s.frame_time < missed.frame_time)
                    {
                        self.skipped_begin_frame_args = Some(missed);
                    }
                }
                if !source.tick_pending {
                    source.tick_pending = true;
                    self.tasks
                        .post(source.next_tick_after(now), SurfaceTask::Tick);
                }
            } else {
                source.deactivate();
            }
        }
        if enable {
            self.post_check_for_retroactive(now);
        }
    }

    /// Offers a BeginFrame to the client.
    ///
    /// This is how an external vsync source drives the surface. The args are
    /// dropped if they duplicate the last delivered BeginFrame, and recorded
    /// as skipped if there is no demand, the client is not ready, or swaps
    /// are at budget. Returns `true` if the client received them.
    pub fn begin_frame(
        &mut self,
        args: BeginFrameArgs,
        client: &mut dyn OutputSurfaceClient,
    ) -> bool {
        self.offer(args, client, false)
    }

    /// Records a buffer swap issued at `now`.
    ///
    /// Swapping beyond the budget is a client bug; it is traced and the swap
    /// is still counted, so later BeginFrames stay withheld until enough
    /// swaps complete.
    pub fn did_swap_buffers(&mut self, now: HostTime) -> SwapId {
        let id = SwapId(self.next_swap_id);
        self.next_swap_id += 1;
        self.pending_swaps.push_back(PendingSwap { id, issued_at: now });
        let over_budget = self.pending_swaps.len() > self.max_pending_swaps();
        self.tracer.swap(&SwapEvent {
            swap_id: id.0,
            now,
            pending: len_u32(self.pending_swaps.len()),
            over_budget,
        });
        id
    }

    /// Retires the oldest pending swap and tells the client.
    ///
    /// Completions match swaps in issue order. Returns `None` if no swap was
    /// pending.
    pub fn on_swap_buffers_complete(
        &mut self,
        now: HostTime,
        client: &mut dyn OutputSurfaceClient,
    ) -> Option<SwapId> {
        let completed = self.pending_swaps.pop_front().map(|s| s.id);
        self.tracer.swap_complete(&SwapCompleteEvent {
            swap_id: completed.map(SwapId::raw),
            now,
            pending: len_u32(self.pending_swaps.len()),
        });
        let id = completed?;
        client.on_swap_buffers_complete(id);
        self.post_check_for_retroactive(now);
        Some(id)
    }

    /// Runs every task due at `now` that was queued before this call.
    ///
    /// Tasks posted while running wait for the next call. Returns how many
    /// tasks ran.
    pub fn run_pending_tasks(
        &mut self,
        now: HostTime,
        client: &mut dyn OutputSurfaceClient,
    ) -> usize {
        let watermark = self.tasks.watermark();
        let mut ran = 0;
        while let Some(task) = self.tasks.pop_due(now, watermark) {
            ran += 1;
            match task {
                SurfaceTask::Tick => self.on_tick(now, client),
                SurfaceTask::CheckRetroactive => self.check_for_retroactive(now, client),
            }
        }
        ran
    }

    /// Moves the emulated vsync grid.
    ///
    /// External surfaces accept and ignore the new parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRefreshInterval`] for a zero interval, or
    /// [`ConfigError::EpsilonTooLarge`] if the interval no longer exceeds the
    /// duplicate epsilon. The grid is unchanged on error.
    pub fn on_vsync_parameters_changed(
        &mut self,
        timebase: HostTime,
        interval: Duration,
    ) -> Result<(), ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        let Some(source) = &mut self.time_source else {
            return Ok(());
        };
        if self.config.duplicate_epsilon >= interval {
            return Err(ConfigError::EpsilonTooLarge {
                epsilon: self.config.duplicate_epsilon,
                interval,
            });
        }
        source.set_timebase_and_interval(timebase, interval);
        self.config.begin_frame_source = BeginFrameSource::Emulated {
            phase: timebase,
            interval,
        };
        Ok(())
    }

    /// Drops all pacing state after the surface's context is lost.
    ///
    /// Pending swaps are forgotten, demand is cleared, queued tasks are
    /// cancelled, and the client is told.
    pub fn did_lose_output_surface(&mut self, client: &mut dyn OutputSurfaceClient) {
        let swaps_dropped = len_u32(self.pending_swaps.len());
        self.pending_swaps.clear();
        self.skipped_begin_frame_args = None;
        self.needs_begin_frame = false;
        self.client_ready_for_begin_frame = true;
        self.check_for_retroactive_pending = false;
        self.tasks.clear();
        if let Some(source) = &mut self.time_source {
            source.deactivate();
            source.tick_pending = false;
        }
        self.tracer.surface_lost(&SurfaceLostEvent {
            now: None,
            swaps_dropped,
        });
        client.did_lose_output_surface();
    }

    fn max_pending_swaps(&self) -> usize {
        usize::try_from(self.config.max_pending_swaps).unwrap_or(usize::MAX)
    }

    fn at_swap_budget(&self) -> bool {
        self.pending_swaps.len() >= self.max_pending_swaps()
    }

    fn offer(
        &mut self,
        args: BeginFrameArgs,
        client: &mut dyn OutputSurfaceClient,
        retroactive: bool,
    ) -> bool {
        if let Some(last) = self.last_begin_frame_args {
            if args.frame_time.abs_diff(last.frame_time) <= self.config.duplicate_epsilon {
                self.skip(args, SkipReason::Duplicate);
                return false;
            }
        }
        let reason = if !self.needs_begin_frame {
            Some(SkipReason::NotNeeded)
        } else if !self.client_ready_for_begin_frame {
            Some(SkipReason::ClientNotReady)
        } else if self.is_throttled() {
            Some(SkipReason::SwapThrottled)
        } else {
            None
        };
        if let Some(reason) = reason {
            self.skipped_begin_frame_args = Some(args);
            self.skip(args, reason);
            return false;
        }

        self.client_ready_for_begin_frame = false;
        self.last_begin_frame_args = Some(args);
        self.skipped_begin_frame_args = None;
        self.tracer.begin_frame(&BeginFrameEvent {
            frame_time: args.frame_time,
            deadline: args.deadline,
            interval: args.interval,
            retroactive,
        });
        client.begin_frame(&args);
        true
    }

    fn skip(&mut self, args: BeginFrameArgs, reason: SkipReason) {
        self.tracer.begin_frame_skipped(&BeginFrameSkippedEvent {
            frame_time: args.frame_time,
            reason,
        });
    }

    fn on_tick(&mut self, now: HostTime, client: &mut dyn OutputSurfaceClient) {
        let Some(source) = &mut self.time_source else {
            return;
        };
        let Some((frame_time, next)) = source.on_tick(now) else {
            return;
        };
        let args = BeginFrameArgs::for_interval(frame_time, source.interval());
        self.tasks.post(next, SurfaceTask::Tick);
        self.offer(args, client, false);
    }

    fn post_check_for_retroactive(&mut self, now: HostTime) {
        if self.check_for_retroactive_pending
            || self.skipped_begin_frame_args.is_none()
            || !self.config.retroactive_policy.is_enabled()
        {
            return;
        }
        self.check_for_retroactive_pending = true;
        self.tasks.post(now, SurfaceTask::CheckRetroactive);
    }

    fn check_for_retroactive(&mut self, now: HostTime, client: &mut dyn OutputSurfaceClient) {
        self.check_for_retroactive_pending = false;
        let Some(skipped) = self.skipped_begin_frame_args else {
            return;
        };
        if self.config.retroactive_policy.is_satisfied(&skipped, now) {
            self.offer(skipped, client, true);
        }
    }
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
