// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A child compositor and a parent compositor exchanging frames on two
//! threads.
//!
//! The child thread submits frames into a [`SharedFrameProvider`] and drains
//! returned resources through the [`wire`](handoff_core::wire) encoding, as
//! if they crossed a process boundary. The parent thread repeatedly takes
//! the current frame, "draws" it, and hands its refs back. When both are
//! done, the counts the child got back must add up to the refs the parent
//! was granted, plus one for each resource the parent never drew.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use handoff_core::frame::{
    DelegatedFrameData, DrawQuad, InvalidFrame, QuadMaterial, RenderPass, RenderPassId,
    SharedQuadState,
};
use handoff_core::provider::FrameProvider;
use handoff_core::resource::{ResourceId, ReturnedResource, TransferableResource, return_resources};
use handoff_core::shared::SharedFrameProvider;
use handoff_core::wire::{self, WireError};
use kurbo::Rect;

/// Shape of a [`simulate_handoff`] run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Frames the child submits.
    pub frames: u32,
    /// Texture quads per frame, each with its own resource.
    pub resources_per_frame: u32,
    /// Distinct resource ids the child cycles through. Clamped to at least
    /// `resources_per_frame`.
    pub resource_pool: u32,
    /// Frame after whose submission the child declares a context loss.
    pub lose_after: Option<u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames: 200,
            resources_per_frame: 3,
            resource_pool: 8,
            lose_after: None,
        }
    }
}

/// Totals from a [`simulate_handoff`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Frames accepted by the provider.
    pub frames_submitted: u32,
    /// Distinct frames the parent drew.
    pub frames_drawn: u32,
    /// Resource handoffs made by the child.
    pub refs_handed_over: u64,
    /// Consumer refs the parent was granted.
    pub refs_granted: u64,
    /// Resources returned without ever being drawn, at a count of 1 each.
    pub unclaimed_returns: u64,
    /// Sum of returned counts received by the child.
    pub refs_returned: u64,
    /// Part of `refs_returned` that came back lost.
    pub refs_lost: u64,
    /// Parent unrefs the provider ignored.
    pub ignored_unrefs: u64,
}

impl SimulationReport {
    /// Returns `true` if every granted ref came back, plus exactly one count
    /// per undrawn resource.
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.refs_returned == self.refs_granted + self.unclaimed_returns
    }
}

/// Why a simulation stopped early.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// The child built a frame the provider rejected.
    #[error("child submitted an invalid frame: {0}")]
    Frame(#[from] InvalidFrame),
    /// A returned list did not survive the wire.
    #[error("returned resources failed to decode: {0}")]
    Wire(#[from] WireError),
    /// One of the two threads panicked.
    #[error("the {0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Runs a child thread and a parent thread against one shared provider.
///
/// # Errors
///
/// Returns a [`SimulationError`] if a frame is rejected, a returned list
/// fails to decode, or a thread panics.
pub fn simulate_handoff(config: SimulationConfig) -> Result<SimulationReport, SimulationError> {
    let shared = SharedFrameProvider::new(FrameProvider::new());
    let child_done = AtomicBool::new(false);

    let (child, parent) = thread::scope(|s| {
        let child = s.spawn(|| {
            let result = run_child(&shared, config);
            child_done.store(true, Ordering::Release);
            result
        });
        let parent = s.spawn(|| run_parent(&shared, &child_done));
        (child.join(), parent.join())
    });
    let mut report = child.map_err(|_| SimulationError::ThreadPanicked("child"))??;
    let tally = parent.map_err(|_| SimulationError::ThreadPanicked("parent"))?;
    report.frames_drawn = tally.drawn;
    report.refs_granted = tally.granted;
    report.ignored_unrefs = tally.ignored;

    // The child goes away: its last frame is released and everything left
    // flows back.
    let (last, unclaimed) = shared.with(|p| {
        p.clear_frame();
        (
            p.take_unused_resources_for_child_compositor(),
            p.collection().unclaimed_returns(),
        )
    });
    report.unclaimed_returns = unclaimed;
    absorb(&mut report, &last)?;
    Ok(report)
}

fn run_child(
    shared: &SharedFrameProvider,
    config: SimulationConfig,
) -> Result<SimulationReport, SimulationError> {
    let mut report = SimulationReport::default();
    let per = config.resources_per_frame;
    let pool = config.resource_pool.max(per).max(1);
    for i in 0..config.frames {
        let ids = (0..per).map(|k| (i.wrapping_mul(per).wrapping_add(k)) % pool);
        shared.set_frame_data(build_frame(ids))?;
        report.frames_submitted += 1;
        report.refs_handed_over += u64::from(per);

        if config.lose_after == Some(i) {
            shared.lose_all_resources();
        }
        let returned = shared.take_unused_resources_for_child_compositor();
        absorb(&mut report, &returned)?;
        thread::yield_now();
    }
    Ok(report)
}

#[derive(Default)]
struct ParentTally {
    drawn: u32,
    granted: u64,
    ignored: u64,
}

fn run_parent(shared: &SharedFrameProvider, child_done: &AtomicBool) -> ParentTally {
    let observer = shared.add_observer();
    let mut last_index = 0;
    let mut tally = ParentTally::default();
    loop {
        let finished = child_done.load(Ordering::Acquire);
        if let Some(snapshot) = shared.get_frame_data_and_ref_resources(observer) {
            if snapshot.frame_index != last_index {
                last_index = snapshot.frame_index;
                tally.drawn += 1;
            }
            let done_with = return_resources(&snapshot.frame.resource_list);
            tally.granted += u64::try_from(done_with.len()).unwrap_or(u64::MAX);
            let skipped = shared.unref_resources_on_main_thread(observer, &done_with);
            tally.ignored += u64::try_from(skipped).unwrap_or(u64::MAX);
        }
        if finished {
            break;
        }
        thread::yield_now();
    }
    shared.remove_observer(observer);
    tally
}

/// Sends `returned` through the wire encoding and adds it to the totals.
fn absorb(report: &mut SimulationReport, returned: &[ReturnedResource]) -> Result<(), WireError> {
    let bytes = wire::encode_returned(returned)?;
    for r in wire::decode_returned(&bytes)? {
        report.refs_returned += u64::from(r.count);
        if r.lost {
            report.refs_lost += u64::from(r.count);
        }
    }
    Ok(())
}

fn build_frame(ids: impl Iterator<Item = u32>) -> DelegatedFrameData {
    let bounds = Rect::new(0.0, 0.0, 256.0, 256.0);
    let mut pass = RenderPass::new(RenderPassId::new(1, 0), bounds, bounds);
    let sqs = pass.push_shared_quad_state(SharedQuadState::default());
    let mut resources = Vec::new();
    for id in ids {
        let id = ResourceId(id);
        pass.push_quad(DrawQuad::new(
            bounds,
            sqs,
            QuadMaterial::Tile {
                resource: id,
                tex_coord_rect: bounds,
            },
        ));
        resources.push(TransferableResource::new(id, [256, 256]));
    }
    DelegatedFrameData {
        render_pass_list: vec![pass],
        resource_list: resources,
        ..DelegatedFrameData::default()
    }
}
