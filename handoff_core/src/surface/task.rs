// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cooperative delayed-task queue for one output surface.

use alloc::collections::VecDeque;

use crate::time::HostTime;

/// Work the surface posts to itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SurfaceTask {
    /// The emulated time source's next tick.
    Tick,
    /// Replay the skipped BeginFrame if the retroactive policy allows it.
    CheckRetroactive,
}

#[derive(Clone, Copy, Debug)]
struct Scheduled {
    due: HostTime,
    seq: u64,
    task: SurfaceTask,
}

/// Tasks ordered by due time, FIFO among equal due times.
#[derive(Clone, Debug, Default)]
pub(crate) struct TaskQueue {
    items: VecDeque<Scheduled>,
    next_seq: u64,
}

impl TaskQueue {
    pub(crate) fn post(&mut self, due: HostTime, task: SurfaceTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let idx = self.items.partition_point(|s| s.due <= due);
        self.items.insert(idx, Scheduled { due, seq, task });
    }

    /// Sequence number the next posted task will get. Tasks posted from now
    /// on compare greater or equal.
    pub(crate) fn watermark(&self) -> u64 {
        self.next_seq
    }

    /// Removes the earliest task due at `now` that was posted before
    /// `watermark`.
    pub(crate) fn pop_due(&mut self, now: HostTime, watermark: u64) -> Option<SurfaceTask> {
        let idx = self
            .items
            .iter()
            .take_while(|s| s.due <= now)
            .position(|s| s.seq < watermark)?;
        self.items.remove(idx).map(|s| s.task)
    }

    pub(crate) fn next_due(&self) -> Option<HostTime> {
        self.items.front().map(|s| s.due)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}
