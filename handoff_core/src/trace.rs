// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for frame handoff and pacing.
//!
//! This module provides a [`TraceSink`] trait with one method per event. The
//! resource collection, the frame provider and the output surface call it at
//! each state change. All method bodies default to no-ops, so implementing
//! only the events you care about is fine.
//!
//! [`Tracer`] owns an optional boxed sink. When the `trace` feature is
//! **off**, every `Tracer` method compiles to nothing and installed sinks are
//! dropped immediately. When **on**, each method performs a single `Option`
//! branch before dispatching.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) gates [`DamageReportEvent`] and the
//!   corresponding `TraceSink` method.

use alloc::boxed::Box;

use crate::frame::InvalidFrameKind;
use crate::time::{Duration, HostTime};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why a BeginFrame was not delivered to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The client has not asked for BeginFrames.
    NotNeeded,
    /// The client has not finished with the previous BeginFrame.
    ClientNotReady,
    /// Too many swaps are awaiting completion.
    SwapThrottled,
    /// The frame time matches the last delivered BeginFrame.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a frame is accepted by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSubmitEvent {
    /// Provider-local frame counter.
    pub frame_index: u64,
    /// Number of entries in the frame's resource list.
    pub resource_count: u32,
    /// Number of render passes in the frame.
    pub render_pass_count: u32,
}

/// Emitted when a frame fails validation and is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRejectEvent {
    /// Provider-local frame counter the frame would have taken.
    pub frame_index: u64,
    /// What was wrong with it.
    pub reason: InvalidFrameKind,
}

/// Emitted when unused resources are drained for the child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourcesReturnedEvent {
    /// Number of distinct ids returned.
    pub entries: u32,
    /// Sum of the returned counts.
    pub refs: u32,
    /// Whether any returned entry is marked lost.
    pub lost: bool,
}

/// Emitted when every tracked resource is declared lost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourcesLostEvent {
    /// Number of resources that were being tracked.
    pub resources: u32,
}

/// Emitted when a BeginFrame reaches the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginFrameEvent {
    /// Frame time of the delivered args.
    pub frame_time: HostTime,
    /// Deadline of the delivered args.
    pub deadline: HostTime,
    /// Frame interval of the delivered args.
    pub interval: Duration,
    /// Whether a previously skipped BeginFrame was replayed.
    pub retroactive: bool,
}

/// Emitted when a BeginFrame is withheld from the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginFrameSkippedEvent {
    /// Frame time of the withheld args.
    pub frame_time: HostTime,
    /// Why it was withheld.
    pub reason: SkipReason,
}

/// Emitted when the client issues a buffer swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapEvent {
    /// Sequence number of the swap.
    pub swap_id: u64,
    /// Host time of the swap.
    pub now: HostTime,
    /// Pending swaps after this one was queued.
    pub pending: u32,
    /// Whether the swap exceeded the pending-swap budget.
    pub over_budget: bool,
}

/// Emitted when the display acknowledges a buffer swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapCompleteEvent {
    /// The swap that completed, or `None` for an unmatched acknowledgment.
    pub swap_id: Option<u64>,
    /// Host time of the acknowledgment.
    pub now: HostTime,
    /// Pending swaps after this one was retired.
    pub pending: u32,
}

/// Emitted when the output surface loses its context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceLostEvent {
    /// Host time of the loss, if known.
    pub now: Option<HostTime>,
    /// Pending swaps that will never complete.
    pub swaps_dropped: u32,
}

/// An axis-aligned damage rectangle in integer display units.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

#[cfg(feature = "trace-rich")]
impl DamageRect {
    /// Rounds a floating-point rect outward to integer units.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "damage is clipped to the frame, which fits comfortably in i32"
    )]
    pub fn from_rect(rect: kurbo::Rect) -> Self {
        let r = rect.expand();
        Self {
            x: r.x0 as i32,
            y: r.y0 as i32,
            width: r.width().max(0.0) as u32,
            height: r.height().max(0.0) as u32,
        }
    }
}

/// Damage handed to one observer along with a frame.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageReportEvent {
    /// Raw observer id.
    pub observer: u64,
    /// Frame the damage belongs to.
    pub frame_index: u64,
    /// The damage, in the observer's display space.
    pub rect: DamageRect,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from handoff and pacing.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a frame is accepted.
    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        _ = e;
    }

    /// Called when a frame is rejected.
    fn on_frame_reject(&mut self, e: &FrameRejectEvent) {
        _ = e;
    }

    /// Called when unused resources are drained.
    fn on_resources_returned(&mut self, e: &ResourcesReturnedEvent) {
        _ = e;
    }

    /// Called when every tracked resource is lost.
    fn on_resources_lost(&mut self, e: &ResourcesLostEvent) {
        _ = e;
    }

    /// Called when a BeginFrame is delivered.
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        _ = e;
    }

    /// Called when a BeginFrame is withheld.
    fn on_begin_frame_skipped(&mut self, e: &BeginFrameSkippedEvent) {
        _ = e;
    }

    /// Called when a swap is issued.
    fn on_swap(&mut self, e: &SwapEvent) {
        _ = e;
    }

    /// Called when a swap completes.
    fn on_swap_complete(&mut self, e: &SwapCompleteEvent) {
        _ = e;
    }

    /// Called when the output surface is lost.
    fn on_surface_lost(&mut self, e: &SurfaceLostEvent) {
        _ = e;
    }

    /// Called with the damage handed to an observer (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    fn on_damage_report(&mut self, e: &DamageReportEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Forwards events to a sink shared with another owner.
///
/// This lets a caller keep a handle to a sink it has installed in a
/// [`Tracer`] and inspect it later.
#[cfg(feature = "std")]
impl<S: TraceSink + ?Sized> TraceSink for std::sync::Arc<std::sync::Mutex<S>> {
    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        lock(self).on_frame_submit(e);
    }

    fn on_frame_reject(&mut self, e: &FrameRejectEvent) {
        lock(self).on_frame_reject(e);
    }

    fn on_resources_returned(&mut self, e: &ResourcesReturnedEvent) {
        lock(self).on_resources_returned(e);
    }

    fn on_resources_lost(&mut self, e: &ResourcesLostEvent) {
        lock(self).on_resources_lost(e);
    }

    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        lock(self).on_begin_frame(e);
    }

    fn on_begin_frame_skipped(&mut self, e: &BeginFrameSkippedEvent) {
        lock(self).on_begin_frame_skipped(e);
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        lock(self).on_swap(e);
    }

    fn on_swap_complete(&mut self, e: &SwapCompleteEvent) {
        lock(self).on_swap_complete(e);
    }

    fn on_surface_lost(&mut self, e: &SurfaceLostEvent) {
        lock(self).on_surface_lost(e);
    }

    #[cfg(feature = "trace-rich")]
    fn on_damage_report(&mut self, e: &DamageReportEvent) {
        lock(self).on_damage_report(e);
    }
}

#[cfg(feature = "std")]
fn lock<S: ?Sized>(m: &std::sync::Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Owner of an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
#[derive(Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<Box<dyn TraceSink + Send>>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

/// Generates a `Tracer` method that forwards one event to the sink.
macro_rules! dispatch {
    ($(#[$doc:meta])* $name:ident => $method:ident($ty:ty)) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(&mut self, e: &$ty) {
            #[cfg(feature = "trace")]
            if let Some(s) = &mut self.sink {
                s.$method(e);
            }
            #[cfg(not(feature = "trace"))]
            {
                _ = e;
            }
        }
    };
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: Box<dyn TraceSink + Send>) -> Self {
        let mut tracer = Self::none();
        tracer.set_sink(sink);
        tracer
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Installs `sink`, replacing any previous one.
    #[inline]
    pub fn set_sink(&mut self, sink: Box<dyn TraceSink + Send>) {
        #[cfg(feature = "trace")]
        {
            self.sink = Some(sink);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
        }
    }

    /// Removes and returns the installed sink.
    #[inline]
    pub fn take_sink(&mut self) -> Option<Box<dyn TraceSink + Send>> {
        #[cfg(feature = "trace")]
        {
            self.sink.take()
        }
        #[cfg(not(feature = "trace"))]
        {
            None
        }
    }

    /// Returns `true` if events will reach a sink.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    dispatch!(
        /// Emits a [`FrameSubmitEvent`].
        frame_submit => on_frame_submit(FrameSubmitEvent)
    );
    dispatch!(
        /// Emits a [`FrameRejectEvent`].
        frame_reject => on_frame_reject(FrameRejectEvent)
    );
    dispatch!(
        /// Emits a [`ResourcesReturnedEvent`].
        resources_returned => on_resources_returned(ResourcesReturnedEvent)
    );
    dispatch!(
        /// Emits a [`ResourcesLostEvent`].
        resources_lost => on_resources_lost(ResourcesLostEvent)
    );
    dispatch!(
        /// Emits a [`BeginFrameEvent`].
        begin_frame => on_begin_frame(BeginFrameEvent)
    );
    dispatch!(
        /// Emits a [`BeginFrameSkippedEvent`].
        begin_frame_skipped => on_begin_frame_skipped(BeginFrameSkippedEvent)
    );
    dispatch!(
        /// Emits a [`SwapEvent`].
        swap => on_swap(SwapEvent)
    );
    dispatch!(
        /// Emits a [`SwapCompleteEvent`].
        swap_complete => on_swap_complete(SwapCompleteEvent)
    );
    dispatch!(
        /// Emits a [`SurfaceLostEvent`].
        surface_lost => on_surface_lost(SurfaceLostEvent)
    );

    /// Emits a [`DamageReportEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn damage_report(&mut self, e: &DamageReportEvent) {
        if let Some(s) = &mut self.sink {
            s.on_damage_report(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
