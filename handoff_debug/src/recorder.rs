// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each led by a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`].
//!
//! To keep reading a recorder after installing it, install it as an
//! `Arc<Mutex<RecorderSink>>` and keep a clone of the `Arc`.

use handoff_core::frame::InvalidFrameKind;
use handoff_core::time::{Duration, HostTime};
use handoff_core::trace::{
    BeginFrameEvent, BeginFrameSkippedEvent, DamageRect, DamageReportEvent, FrameRejectEvent,
    FrameSubmitEvent, ResourcesLostEvent, ResourcesReturnedEvent, SkipReason, SurfaceLostEvent,
    SwapCompleteEvent, SwapEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_SUBMIT: u8 = 1;
const TAG_FRAME_REJECT: u8 = 2;
const TAG_RESOURCES_RETURNED: u8 = 3;
const TAG_RESOURCES_LOST: u8 = 4;
const TAG_BEGIN_FRAME: u8 = 5;
const TAG_BEGIN_FRAME_SKIPPED: u8 = 6;
const TAG_SWAP: u8 = 7;
const TAG_SWAP_COMPLETE: u8 = 8;
const TAG_SURFACE_LOST: u8 = 9;
const TAG_DAMAGE_REPORT: u8 = 10;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Takes the bytes recorded so far, leaving the recorder empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.buf)
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_u64(&mut self, v: Option<u64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u64(val);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_skip_reason(&mut self, r: SkipReason) {
        self.write_u8(match r {
            SkipReason::NotNeeded => 0,
            SkipReason::ClientNotReady => 1,
            SkipReason::SwapThrottled => 2,
            SkipReason::Duplicate => 3,
        });
    }

    fn write_invalid_kind(&mut self, k: InvalidFrameKind) {
        self.write_u8(match k {
            InvalidFrameKind::NoRenderPasses => 0,
            InvalidFrameKind::DuplicateRenderPass => 1,
            InvalidFrameKind::RenderPassOutOfOrder => 2,
            InvalidFrameKind::MissingSharedQuadState => 3,
            InvalidFrameKind::UnknownResource => 4,
            InvalidFrameKind::DuplicateResource => 5,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        self.write_u8(TAG_FRAME_SUBMIT);
        self.write_u64(e.frame_index);
        self.write_u32(e.resource_count);
        self.write_u32(e.render_pass_count);
    }

    fn on_frame_reject(&mut self, e: &FrameRejectEvent) {
        self.write_u8(TAG_FRAME_REJECT);
        self.write_u64(e.frame_index);
        self.write_invalid_kind(e.reason);
    }

    fn on_resources_returned(&mut self, e: &ResourcesReturnedEvent) {
        self.write_u8(TAG_RESOURCES_RETURNED);
        self.write_u32(e.entries);
        self.write_u32(e.refs);
        self.write_bool(e.lost);
    }

    fn on_resources_lost(&mut self, e: &ResourcesLostEvent) {
        self.write_u8(TAG_RESOURCES_LOST);
        self.write_u32(e.resources);
    }

    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.write_u8(TAG_BEGIN_FRAME);
        self.write_u64(e.frame_time.ticks());
        self.write_u64(e.deadline.ticks());
        self.write_u64(e.interval.ticks());
        self.write_bool(e.retroactive);
    }

    fn on_begin_frame_skipped(&mut self, e: &BeginFrameSkippedEvent) {
        self.write_u8(TAG_BEGIN_FRAME_SKIPPED);
        self.write_u64(e.frame_time.ticks());
        self.write_skip_reason(e.reason);
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        self.write_u8(TAG_SWAP);
        self.write_u64(e.swap_id);
        self.write_u64(e.now.ticks());
        self.write_u32(e.pending);
        self.write_bool(e.over_budget);
    }

    fn on_swap_complete(&mut self, e: &SwapCompleteEvent) {
        self.write_u8(TAG_SWAP_COMPLETE);
        self.write_option_u64(e.swap_id);
        self.write_u64(e.now.ticks());
        self.write_u32(e.pending);
    }

    fn on_surface_lost(&mut self, e: &SurfaceLostEvent) {
        self.write_u8(TAG_SURFACE_LOST);
        self.write_option_u64(e.now.map(HostTime::ticks));
        self.write_u32(e.swaps_dropped);
    }

    fn on_damage_report(&mut self, e: &DamageReportEvent) {
        self.write_u8(TAG_DAMAGE_REPORT);
        self.write_u64(e.observer);
        self.write_u64(e.frame_index);
        self.write_i32(e.rect.x);
        self.write_i32(e.rect.y);
        self.write_u32(e.rect.width);
        self.write_u32(e.rect.height);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`FrameSubmitEvent`].
    FrameSubmit(FrameSubmitEvent),
    /// A [`FrameRejectEvent`].
    FrameReject(FrameRejectEvent),
    /// A [`ResourcesReturnedEvent`].
    ResourcesReturned(ResourcesReturnedEvent),
    /// A [`ResourcesLostEvent`].
    ResourcesLost(ResourcesLostEvent),
    /// A [`BeginFrameEvent`].
    BeginFrame(BeginFrameEvent),
    /// A [`BeginFrameSkippedEvent`].
    BeginFrameSkipped(BeginFrameSkippedEvent),
    /// A [`SwapEvent`].
    Swap(SwapEvent),
    /// A [`SwapCompleteEvent`].
    SwapComplete(SwapCompleteEvent),
    /// A [`SurfaceLostEvent`].
    SurfaceLost(SurfaceLostEvent),
    /// A [`DamageReportEvent`].
    DamageReport(DamageReportEvent),
}

impl RecordedEvent {
    /// Host time carried by the event, if it has one.
    ///
    /// Resource and frame events are not timestamped.
    #[must_use]
    pub fn timestamp(&self) -> Option<HostTime> {
        match self {
            Self::BeginFrame(e) => Some(e.frame_time),
            Self::BeginFrameSkipped(e) => Some(e.frame_time),
            Self::Swap(e) => Some(e.now),
            Self::SwapComplete(e) => Some(e.now),
            Self::SurfaceLost(e) => e.now,
            Self::FrameSubmit(_)
            | Self::FrameReject(_)
            | Self::ResourcesReturned(_)
            | Self::ResourcesLost(_)
            | Self::DamageReport(_) => None,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_i32(&mut self) -> Option<i32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = i32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_option_u64(&mut self) -> Option<Option<u64>> {
        let present = self.read_u8()?;
        let val = self.read_u64()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_skip_reason(&mut self) -> Option<SkipReason> {
        Some(match self.read_u8()? {
            0 => SkipReason::NotNeeded,
            1 => SkipReason::ClientNotReady,
            2 => SkipReason::SwapThrottled,
            3 => SkipReason::Duplicate,
            _ => return None,
        })
    }

    fn read_invalid_kind(&mut self) -> Option<InvalidFrameKind> {
        Some(match self.read_u8()? {
            0 => InvalidFrameKind::NoRenderPasses,
            1 => InvalidFrameKind::DuplicateRenderPass,
            2 => InvalidFrameKind::RenderPassOutOfOrder,
            3 => InvalidFrameKind::MissingSharedQuadState,
            4 => InvalidFrameKind::UnknownResource,
            5 => InvalidFrameKind::DuplicateResource,
            _ => return None,
        })
    }

    fn decode_frame_submit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSubmit(FrameSubmitEvent {
            frame_index: self.read_u64()?,
            resource_count: self.read_u32()?,
            render_pass_count: self.read_u32()?,
        }))
    }

    fn decode_frame_reject(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameReject(FrameRejectEvent {
            frame_index: self.read_u64()?,
            reason: self.read_invalid_kind()?,
        }))
    }

    fn decode_resources_returned(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::ResourcesReturned(ResourcesReturnedEvent {
            entries: self.read_u32()?,
            refs: self.read_u32()?,
            lost: self.read_bool()?,
        }))
    }

    fn decode_resources_lost(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::ResourcesLost(ResourcesLostEvent {
            resources: self.read_u32()?,
        }))
    }

    fn decode_begin_frame(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BeginFrame(BeginFrameEvent {
            frame_time: self.read_time()?,
            deadline: self.read_time()?,
            interval: Duration(self.read_u64()?),
            retroactive: self.read_bool()?,
        }))
    }

    fn decode_begin_frame_skipped(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BeginFrameSkipped(BeginFrameSkippedEvent {
            frame_time: self.read_time()?,
            reason: self.read_skip_reason()?,
        }))
    }

    fn decode_swap(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Swap(SwapEvent {
            swap_id: self.read_u64()?,
            now: self.read_time()?,
            pending: self.read_u32()?,
            over_budget: self.read_bool()?,
        }))
    }

    fn decode_swap_complete(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SwapComplete(SwapCompleteEvent {
            swap_id: self.read_option_u64()?,
            now: self.read_time()?,
            pending: self.read_u32()?,
        }))
    }

    fn decode_surface_lost(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SurfaceLost(SurfaceLostEvent {
            now: self.read_option_u64()?.map(HostTime),
            swaps_dropped: self.read_u32()?,
        }))
    }

    fn decode_damage_report(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DamageReport(DamageReportEvent {
            observer: self.read_u64()?,
            frame_index: self.read_u64()?,
            rect: DamageRect {
                x: self.read_i32()?,
                y: self.read_i32()?,
                width: self.read_u32()?,
                height: self.read_u32()?,
            },
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FRAME_SUBMIT => self.decode_frame_submit(),
            TAG_FRAME_REJECT => self.decode_frame_reject(),
            TAG_RESOURCES_RETURNED => self.decode_resources_returned(),
            TAG_RESOURCES_LOST => self.decode_resources_lost(),
            TAG_BEGIN_FRAME => self.decode_begin_frame(),
            TAG_BEGIN_FRAME_SKIPPED => self.decode_begin_frame_skipped(),
            TAG_SWAP => self.decode_swap(),
            TAG_SWAP_COMPLETE => self.decode_swap_complete(),
            TAG_SURFACE_LOST => self.decode_surface_lost(),
            TAG_DAMAGE_REPORT => self.decode_damage_report(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use handoff_core::frame::{
        DelegatedFrameData, DrawQuad, QuadMaterial, RenderPass, RenderPassId, SharedQuadState,
    };
    use handoff_core::provider::FrameProvider;
    use handoff_core::resource::{ResourceId, TransferableResource};
    use handoff_core::surface::{
        BeginFrameArgs, OutputSurface, OutputSurfaceClient, OutputSurfaceConfig,
    };
    use kurbo::Rect;

    use super::*;

    fn sample_begin_frame() -> BeginFrameEvent {
        BeginFrameEvent {
            frame_time: HostTime(1_000_000),
            deadline: HostTime(1_016_667),
            interval: Duration(16_667),
            retroactive: true,
        }
    }

    #[test]
    fn mixed_stream_decodes_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_begin_frame(&sample_begin_frame());
        rec.on_swap(&SwapEvent {
            swap_id: 4,
            now: HostTime(1_005_000),
            pending: 2,
            over_budget: false,
        });
        rec.on_swap_complete(&SwapCompleteEvent {
            swap_id: None,
            now: HostTime(1_006_000),
            pending: 0,
        });
        rec.on_frame_reject(&FrameRejectEvent {
            frame_index: 9,
            reason: InvalidFrameKind::UnknownResource,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], RecordedEvent::BeginFrame(sample_begin_frame()));
        assert!(matches!(events[1], RecordedEvent::Swap(SwapEvent { swap_id: 4, .. })));
        match &events[2] {
            RecordedEvent::SwapComplete(e) => {
                assert_eq!(e.swap_id, None, "unmatched ack survives recording");
                assert_eq!(e.now, HostTime(1_006_000));
            }
            other => panic!("expected SwapComplete, got {other:?}"),
        }
        match &events[3] {
            RecordedEvent::FrameReject(e) => {
                assert_eq!(e.reason, InvalidFrameKind::UnknownResource);
            }
            other => panic!("expected FrameReject, got {other:?}"),
        }
    }

    #[test]
    fn damage_report_keeps_negative_origin() {
        let mut rec = RecorderSink::new();
        let orig = DamageReportEvent {
            observer: 3,
            frame_index: 12,
            rect: DamageRect {
                x: -4,
                y: 2,
                width: 10,
                height: 6,
            },
        };
        rec.on_damage_report(&orig);
        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events, [RecordedEvent::DamageReport(orig)]);
        assert_eq!(events[0].timestamp(), None);
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }

    #[test]
    fn truncated_record_and_unknown_tag_stop_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_resources_lost(&ResourcesLostEvent { resources: 3 });
        rec.on_surface_lost(&SurfaceLostEvent {
            now: Some(HostTime(50)),
            swaps_dropped: 1,
        });
        let mut bytes = rec.into_bytes();
        bytes.pop();
        assert_eq!(decode(&bytes).count(), 1, "partial record dropped");

        bytes.truncate(5);
        bytes.push(0xee);
        assert_eq!(decode(&bytes).count(), 1, "unknown tag ends the stream");
    }

    fn one_texture_frame(id: u32) -> DelegatedFrameData {
        let mut pass = RenderPass::new(
            RenderPassId::new(1, 0),
            Rect::new(0.0, 0.0, 64.0, 64.0),
            Rect::new(0.0, 0.0, 64.0, 64.0),
        );
        let sqs = pass.push_shared_quad_state(SharedQuadState::default());
        pass.push_quad(DrawQuad::new(
            Rect::new(0.0, 0.0, 64.0, 64.0),
            sqs,
            QuadMaterial::Texture {
                resource: ResourceId(id),
                uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
                premultiplied_alpha: true,
            },
        ));
        DelegatedFrameData {
            render_pass_list: vec![pass],
            resource_list: vec![TransferableResource::new(ResourceId(id), [64, 64])],
            ..DelegatedFrameData::default()
        }
    }

    #[test]
    fn shared_recorder_captures_provider_events() {
        let rec = Arc::new(Mutex::new(RecorderSink::new()));
        let mut provider = FrameProvider::new();
        provider.set_trace_sink(Box::new(Arc::clone(&rec)));

        provider
            .set_frame_data(one_texture_frame(7))
            .expect("valid frame");
        assert!(provider.set_frame_data(DelegatedFrameData::default()).is_err());
        assert!(provider.lose_all_resources());
        let returned = provider.take_unused_resources_for_child_compositor();
        assert_eq!(returned.len(), 1);

        let bytes = rec.lock().unwrap().take_bytes();
        let events: Vec<_> = decode(&bytes).collect();
        assert!(
            matches!(
                events.as_slice(),
                [
                    RecordedEvent::FrameSubmit(FrameSubmitEvent {
                        resource_count: 1,
                        render_pass_count: 1,
                        ..
                    }),
                    RecordedEvent::FrameReject(FrameRejectEvent {
                        reason: InvalidFrameKind::NoRenderPasses,
                        ..
                    }),
                    RecordedEvent::ResourcesLost(ResourcesLostEvent { resources: 1 }),
                    RecordedEvent::ResourcesReturned(ResourcesReturnedEvent { lost: true, .. }),
                ]
            ),
            "unexpected events: {events:?}"
        );
    }

    struct Quiet;
    impl OutputSurfaceClient for Quiet {
        fn begin_frame(&mut self, _args: &BeginFrameArgs) {}
    }

    #[test]
    fn shared_recorder_captures_surface_events() {
        let rec = Arc::new(Mutex::new(RecorderSink::new()));
        let mut surface =
            OutputSurface::new(OutputSurfaceConfig::external()).expect("valid config");
        surface.set_trace_sink(Box::new(Arc::clone(&rec)));

        let mut client = Quiet;
        surface.set_needs_begin_frame(true, HostTime(0));
        let args = BeginFrameArgs::for_interval(HostTime(1_000), Duration(16_667));
        assert!(surface.begin_frame(args, &mut client));
        let swap = surface.did_swap_buffers(HostTime(2_000));
        surface.on_swap_buffers_complete(HostTime(3_000), &mut client);

        let bytes = rec.lock().unwrap().take_bytes();
        let events: Vec<_> = decode(&bytes).collect();
        assert!(matches!(events[0], RecordedEvent::BeginFrame(_)));
        assert!(
            events.iter().any(
                |e| matches!(e, RecordedEvent::Swap(s) if s.swap_id == swap.raw())
            ),
            "swap recorded: {events:?}"
        );
        assert!(matches!(events.last(), Some(RecordedEvent::SwapComplete(_))));
    }
}
