// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Virtual-time driving, pacing metrics, and child/parent simulation for
//! exercising `handoff_core` outside a real compositor.
//!
//! - [`driver::SurfaceDriver`] runs an
//!   [`OutputSurface`](handoff_core::surface::OutputSurface) on a virtual
//!   clock and records what its client is told.
//! - [`pacing::PacingTracker`] grades BeginFrame cadence over a rolling
//!   window and renders it as an ASCII sparkline.
//! - [`simulate::simulate_handoff`] runs a producer thread and a consumer
//!   thread against one shared frame provider and checks that every ref
//!   the consumer was granted is returned exactly once.

pub mod driver;
pub mod pacing;
pub mod simulate;

pub use driver::{RecordingClient, SurfaceDriver};
pub use pacing::{PacingGrade, PacingReport, PacingSample, PacingTracker};
pub use simulate::{SimulationConfig, SimulationError, SimulationReport, simulate_handoff};
