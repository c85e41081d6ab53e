// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource lifecycle and frame pacing for delegated compositing.
//!
//! A *child* compositor produces frames whose quads sample GPU resources it
//! owns. It loans those resources to a *parent* compositor together with each
//! frame, and the parent hands them back once nothing draws them any more.
//! `handoff_core` implements the parent's bookkeeping for that exchange and
//! the BeginFrame/swap pacing of the surface the child draws into. It is
//! `no_std` compatible (with `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   child                             parent
//!   ─────                             ──────
//!   DelegatedFrameData ──validate──►  FrameProvider::set_frame_data
//!                                         │  (ResourceCollection refs
//!                                         │   the new resource list)
//!                                         ▼
//!                          observer ◄── get_frame_data_and_ref_resources
//!                             │            (+ accumulated damage)
//!                             ▼
//!                          unref_resources_on_main_thread
//!                                         │
//!   ReturnedResource  ◄── take_unused_resources_for_child_compositor
//! ```
//!
//! Independently, the child's [`OutputSurface`](surface::OutputSurface)
//! decides when to deliver BeginFrames, throttled by how many swaps are still
//! waiting for an ack.
//!
//! **[`resource`]**: resource ids and the transferable / returned records.
//!
//! **[`frame`]**: the frame model (render passes, quads, materials) and frame
//! validation.
//!
//! **[`collection`]**: [`ResourceCollection`](collection::ResourceCollection),
//! the per-child reference table deciding when a resource is unused.
//!
//! **[`provider`]**: [`FrameProvider`](provider::FrameProvider), the current
//! frame, its observers, and their damage.
//!
//! **[`remap`]**: translation between a child's id namespace and the
//! parent's.
//!
//! **[`damage`]**: pending damage with union semantics and display scaling.
//!
//! **[`surface`]**: the output surface's BeginFrame and swap-ack scheduler.
//!
//! **[`time`]**: host timestamps, durations, and vsync grid arithmetic.
//!
//! **[`wire`]**: flat little-endian encoding of resource lists.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types, with
//! the zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies, the
//!   mutex-backed [`SharedFrameProvider`](shared::SharedFrameProvider), and
//!   `TraceSink` for `Arc<Mutex<S>>`.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-observer
//!   damage events.
//! - `serde` (disabled by default): Derives `Serialize`/`Deserialize` for the
//!   resource and time types.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod collection;
pub mod damage;
pub mod frame;
pub mod provider;
pub mod remap;
pub mod resource;
#[cfg(feature = "std")]
pub mod shared;
pub mod surface;
pub mod time;
pub mod trace;
pub mod wire;
