// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Surface events go on thread 0 and frame/resource events on thread 1.
//! Each BeginFrame becomes a complete event spanning frame time to deadline,
//! and each swap an async span closed by its acknowledgment. Frame and
//! resource events carry no timestamp of their own, so they are placed at the
//! most recent timestamp seen in the recording.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use handoff_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

const SURFACE_TID: u32 = 0;
const PROVIDER_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last_ts = 0.0;

    for recorded in decode(bytes) {
        if let Some(t) = recorded.timestamp() {
            last_ts = ticks_to_us(t.ticks(), timebase);
        }
        match recorded {
            RecordedEvent::BeginFrame(e) => {
                let dur = e.deadline.saturating_duration_since(e.frame_time);
                events.push(json!({
                    "ph": "X",
                    "name": "BeginFrame",
                    "cat": "Surface",
                    "ts": last_ts,
                    "dur": ticks_to_us(dur.ticks(), timebase),
                    "pid": 0,
                    "tid": SURFACE_TID,
                    "args": {
                        "interval_us": ticks_to_us(e.interval.ticks(), timebase),
                        "retroactive": e.retroactive,
                    }
                }));
            }
            RecordedEvent::BeginFrameSkipped(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "BeginFrameSkipped",
                    "cat": "Surface",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": SURFACE_TID,
                    "s": "t",
                    "args": {
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::Swap(e) => {
                events.push(json!({
                    "ph": "b",
                    "name": "Swap",
                    "cat": "Surface",
                    "id": e.swap_id,
                    "ts": last_ts,
                    "pid": 0,
                    "tid": SURFACE_TID,
                    "args": {
                        "pending": e.pending,
                        "over_budget": e.over_budget,
                    }
                }));
            }
            RecordedEvent::SwapComplete(e) => {
                if let Some(id) = e.swap_id {
                    events.push(json!({
                        "ph": "e",
                        "name": "Swap",
                        "cat": "Surface",
                        "id": id,
                        "ts": last_ts,
                        "pid": 0,
                        "tid": SURFACE_TID,
                        "args": {
                            "pending": e.pending,
                        }
                    }));
                } else {
                    events.push(json!({
                        "ph": "i",
                        "name": "UnmatchedSwapAck",
                        "cat": "Surface",
                        "ts": last_ts,
                        "pid": 0,
                        "tid": SURFACE_TID,
                        "s": "t",
                    }));
                }
            }
            RecordedEvent::SurfaceLost(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "SurfaceLost",
                    "cat": "Surface",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": SURFACE_TID,
                    "s": "p",
                    "args": {
                        "swaps_dropped": e.swaps_dropped,
                    }
                }));
            }
            RecordedEvent::FrameSubmit(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSubmit",
                    "cat": "Provider",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": PROVIDER_TID,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "resources": e.resource_count,
                        "render_passes": e.render_pass_count,
                    }
                }));
            }
            RecordedEvent::FrameReject(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameReject",
                    "cat": "Provider",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": PROVIDER_TID,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::ResourcesReturned(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "ResourcesReturned",
                    "cat": "Resources",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": PROVIDER_TID,
                    "s": "t",
                    "args": {
                        "entries": e.entries,
                        "refs": e.refs,
                        "lost": e.lost,
                    }
                }));
            }
            RecordedEvent::ResourcesLost(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "ResourcesLost",
                    "cat": "Resources",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": PROVIDER_TID,
                    "s": "p",
                    "args": {
                        "resources": e.resources,
                    }
                }));
            }
            RecordedEvent::DamageReport(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Damage",
                    "cat": "Rich",
                    "ts": last_ts,
                    "pid": 0,
                    "tid": PROVIDER_TID,
                    "s": "t",
                    "args": {
                        "observer": e.observer,
                        "frame_index": e.frame_index,
                        "rect": [e.rect.x, e.rect.y, e.rect.width, e.rect.height],
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}
