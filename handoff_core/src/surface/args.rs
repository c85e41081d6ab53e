// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::time::{Duration, HostTime};

/// Parameters of one BeginFrame: when the frame starts, when its work should
/// be done, and how far apart frames are.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BeginFrameArgs {
    /// Nominal start of the frame, on the vsync grid.
    pub frame_time: HostTime,
    /// Time by which the client should have submitted the frame.
    pub deadline: HostTime,
    /// Spacing between successive frame times.
    pub interval: Duration,
}

impl BeginFrameArgs {
    /// Creates args from explicit values.
    #[must_use]
    pub const fn new(frame_time: HostTime, deadline: HostTime, interval: Duration) -> Self {
        Self {
            frame_time,
            deadline,
            interval,
        }
    }

    /// Creates args whose deadline is one interval after `frame_time`.
    #[must_use]
    pub const fn for_interval(frame_time: HostTime, interval: Duration) -> Self {
        Self {
            frame_time,
            deadline: frame_time.saturating_add(interval),
            interval,
        }
    }
}
