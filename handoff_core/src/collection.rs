// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reference tracking for resources a child compositor has loaned out.
//!
//! Each tracked [`ResourceId`] carries two counters:
//!
//! - `refs_granted`: consumer refs granted since the id was introduced. This
//!   is the count the child receives back.
//! - `refs_to_wait_for`: how many holders still use the resource. The current
//!   frame holds one (its membership ref) and each consumer ref not yet
//!   released holds one more.
//!
//! When `refs_to_wait_for` drops to zero the entry leaves the table and
//! becomes *unused*: it waits in a returnable list until the child drains it
//! with [`ResourceCollection::take_unused_resources_for_child_compositor`].
//!
//! A resource that no consumer ever referenced still goes back to the child,
//! with a count of 1. Such returns are tallied in
//! [`ResourceCollection::unclaimed_returns`], so that the counts the child
//! receives always sum to the refs granted plus the unclaimed returns.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::resource::{ResourceId, ReturnedResource, TransferableResource, coalesce};
use crate::trace::{ResourcesLostEvent, ResourcesReturnedEvent, TraceSink, Tracer};

/// Notified when the collection has resources ready to go back to the child.
pub trait ResourceCollectionClient {
    /// Called after bookkeeping whenever the returnable list grows.
    fn unused_resources_are_available(&mut self);

    /// Receives whatever was still waiting to be drained when the owning
    /// [`FrameProvider`](crate::provider::FrameProvider) was dropped.
    fn unused_resources_orphaned(&mut self, resources: Vec<ReturnedResource>) {
        _ = resources;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Entry {
    refs_granted: u32,
    refs_to_wait_for: u32,
    lost: bool,
    sync_point: u32,
}

/// Reference counts for every resource the child has loaned out.
#[derive(Default)]
pub struct ResourceCollection {
    resources: HashMap<ResourceId, Entry>,
    /// Ids holding the current frame's membership ref.
    frame_resources: Vec<ResourceId>,
    returned: Vec<ReturnedResource>,
    client: Option<Box<dyn ResourceCollectionClient + Send>>,
    unclaimed_returns: u64,
    tracer: Tracer,
}

impl fmt::Debug for ResourceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCollection")
            .field("resources", &self.resources.len())
            .field("frame_resources", &self.frame_resources)
            .field("returned", &self.returned)
            .field("has_client", &self.client.is_some())
            .finish_non_exhaustive()
    }
}

impl ResourceCollection {
    /// Creates an empty collection with no client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or removes) the client notified about unused resources.
    pub fn set_client(&mut self, client: Option<Box<dyn ResourceCollectionClient + Send>>) {
        self.client = client;
    }

    /// Removes and returns the client.
    pub fn take_client(&mut self) -> Option<Box<dyn ResourceCollectionClient + Send>> {
        self.client.take()
    }

    /// Routes trace events to `sink`.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink + Send>) {
        self.tracer.set_sink(sink);
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink + Send>> {
        self.tracer.take_sink()
    }

    pub(crate) fn tracer_mut(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    /// Makes `resources` the current frame's resource list, or clears it.
    ///
    /// The new list is given its membership ref before the
    /// previous list's membership refs are dropped, so a resource present in
    /// both never becomes unused in between.
    pub fn set_frame_data(&mut self, resources: Option<&[TransferableResource]>) {
        let before = self.returned.len();
        let resources = resources.unwrap_or_default();
        for r in resources {
            let entry = self.resources.entry(r.id).or_default();
            entry.refs_to_wait_for = entry.refs_to_wait_for.saturating_add(1);
            entry.sync_point = r.sync_point;
        }
        let previous = core::mem::replace(
            &mut self.frame_resources,
            resources.iter().map(|r| r.id).collect(),
        );
        for id in previous {
            self.release(id, 1, false, None);
        }
        self.notify_if_grown(before);
    }

    /// Grants one consumer ref on each tracked resource. Untracked ids are
    /// skipped.
    pub fn ref_resources(&mut self, resources: &[TransferableResource]) {
        for r in resources {
            if let Some(entry) = self.resources.get_mut(&r.id) {
                entry.refs_granted = entry.refs_granted.saturating_add(1);
                entry.refs_to_wait_for = entry.refs_to_wait_for.saturating_add(1);
            }
        }
    }

    /// Releases `count` consumer refs for each entry.
    ///
    /// Resources whose last ref is released become unused. Ids that are not
    /// tracked (already returned, or lost with the context) are ignored; the
    /// number of ignored entries is returned.
    pub fn unref_resources(&mut self, returned: &[ReturnedResource]) -> usize {
        let before = self.returned.len();
        let mut ignored = 0;
        for r in returned {
            let sync_point = (r.sync_point != 0).then_some(r.sync_point);
            if !self.release(r.id, r.count, r.lost, sync_point) {
                ignored += 1;
            }
        }
        self.notify_if_grown(before);
        ignored
    }

    /// Drains the resources that are ready to go back to the child.
    ///
    /// Entries for the same id are merged. Returns an empty list when nothing
    /// is available, so repeated calls are harmless.
    pub fn take_unused_resources_for_child_compositor(&mut self) -> Vec<ReturnedResource> {
        let out = coalesce(core::mem::take(&mut self.returned));
        if !out.is_empty() {
            self.tracer.resources_returned(&ResourcesReturnedEvent {
                entries: u32::try_from(out.len()).unwrap_or(u32::MAX),
                refs: out.iter().fold(0_u32, |acc, r| acc.saturating_add(r.count)),
                lost: out.iter().any(|r| r.lost),
            });
        }
        out
    }

    /// Declares every tracked resource lost.
    ///
    /// Outstanding refs are not waited for: each resource is returned at once
    /// with `lost` set and the count of every consumer ref granted on it, and
    /// the table is emptied. Later unrefs of those ids are ignored. Returns
    /// `false` if nothing was tracked.
    pub fn lose_all_resources(&mut self) -> bool {
        if self.resources.is_empty() {
            return false;
        }
        let before = self.returned.len();
        let mut lost: Vec<(ResourceId, Entry)> = self.resources.drain().collect();
        lost.sort_unstable_by_key(|(id, _)| *id);
        self.tracer.resources_lost(&ResourcesLostEvent {
            resources: u32::try_from(lost.len()).unwrap_or(u32::MAX),
        });
        for (id, entry) in lost {
            self.push_returned(
                id,
                Entry {
                    lost: true,
                    ..entry
                },
            );
        }
        self.frame_resources.clear();
        self.notify_if_grown(before);
        true
    }

    /// Returns `true` if `id` is in the table.
    #[must_use]
    pub fn is_tracking(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    /// Returns how many holders still use `id`, if it is tracked.
    #[must_use]
    pub fn ref_count(&self, id: ResourceId) -> Option<u32> {
        self.resources.get(&id).map(|e| e.refs_to_wait_for)
    }

    /// Returns how many consumer refs were granted on `id` since it was
    /// introduced, if it is tracked.
    #[must_use]
    pub fn refs_granted(&self, id: ResourceId) -> Option<u32> {
        self.resources.get(&id).map(|e| e.refs_granted)
    }

    /// Number of resources returned so far that no consumer had referenced.
    /// Each was returned with a count of 1.
    #[must_use]
    pub fn unclaimed_returns(&self) -> u64 {
        self.unclaimed_returns
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if a drain would return something.
    #[must_use]
    pub fn has_unused_resources(&self) -> bool {
        !self.returned.is_empty()
    }

    /// Ids in the current frame's resource list.
    #[must_use]
    pub fn frame_resources(&self) -> &[ResourceId] {
        &self.frame_resources
    }

    /// Drops `count` refs of `id`. Returns `false` if `id` is not tracked.
    fn release(
        &mut self,
        id: ResourceId,
        count: u32,
        lost: bool,
        sync_point: Option<u32>,
    ) -> bool {
        let Some(entry) = self.resources.get_mut(&id) else {
            return false;
        };
        entry.refs_to_wait_for = entry.refs_to_wait_for.saturating_sub(count);
        entry.lost |= lost;
        if let Some(sync_point) = sync_point {
            entry.sync_point = sync_point;
        }
        if entry.refs_to_wait_for == 0 {
            let entry = *entry;
            self.resources.remove(&id);
            self.push_returned(id, entry);
        }
        true
    }

    fn push_returned(&mut self, id: ResourceId, entry: Entry) {
        if entry.refs_granted == 0 {
            self.unclaimed_returns += 1;
        }
        self.returned.push(ReturnedResource {
            id,
            count: entry.refs_granted.max(1),
            lost: entry.lost,
            sync_point: entry.sync_point,
        });
    }

    fn notify_if_grown(&mut self, before: usize) {
        if self.returned.len() > before {
            if let Some(client) = &mut self.client {
                client.unused_resources_are_available();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn res(ids: &[u32]) -> Vec<TransferableResource> {
        ids.iter()
            .map(|&id| TransferableResource::new(ResourceId(id), [1, 1]))
            .collect()
    }

    fn ret(id: u32, count: u32) -> ReturnedResource {
        ReturnedResource {
            id: ResourceId(id),
            count,
            lost: false,
            sync_point: 0,
        }
    }

    fn ids(returned: &[ReturnedResource]) -> Vec<u32> {
        let mut ids: Vec<u32> = returned.iter().map(|r| r.id.0).collect();
        ids.sort_unstable();
        ids
    }

    struct CountingClient(Arc<AtomicUsize>);

    impl ResourceCollectionClient for CountingClient {
        fn unused_resources_are_available(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn replaced_frame_returns_unreferenced_resources() {
        let mut c = ResourceCollection::new();
        c.set_frame_data(Some(&res(&[1, 2])));
        assert!(!c.has_unused_resources(), "frame membership holds both");

        c.set_frame_data(Some(&res(&[2, 3])));
        let returned = c.take_unused_resources_for_child_compositor();
        assert_eq!(returned, vec![ret(1, 1)]);
        assert_eq!(c.ref_count(ResourceId(2)), Some(1), "membership only");
        assert_eq!(c.refs_granted(ResourceId(2)), Some(0));
        assert_eq!(c.unclaimed_returns(), 1, "1 was never drawn");
    }

    #[test]
    fn consumer_ref_outlives_frame_membership() {
        let mut c = ResourceCollection::new();
        let frame = res(&[1, 2]);
        c.set_frame_data(Some(&frame));
        c.ref_resources(&frame);

        c.set_frame_data(Some(&res(&[2, 3])));
        assert!(
            c.take_unused_resources_for_child_compositor().is_empty(),
            "consumer still holds 1"
        );

        assert_eq!(c.unref_resources(&[ret(1, 1), ret(2, 1)]), 0);
        let returned = c.take_unused_resources_for_child_compositor();
        assert_eq!(returned, vec![ret(1, 1)], "2 is still in the frame");
        assert!(c.is_tracking(ResourceId(2)));
        assert!(!c.is_tracking(ResourceId(1)));
    }

    #[test]
    fn returned_count_sums_consumer_refs() {
        let mut c = ResourceCollection::new();
        let frame = res(&[444]);
        c.set_frame_data(Some(&frame));
        // Two consumers, two draws each.
        for _ in 0..4 {
            c.ref_resources(&frame);
        }
        assert_eq!(c.refs_granted(ResourceId(444)), Some(4));

        assert_eq!(c.unref_resources(&[ret(444, 1), ret(444, 2)]), 0);
        c.set_frame_data(None);
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
        c.unref_resources(&[ret(444, 1)]);
        assert_eq!(c.take_unused_resources_for_child_compositor(), vec![ret(444, 4)]);
        assert_eq!(c.unclaimed_returns(), 0);
        assert_eq!(c.tracked_len(), 0);
    }

    #[test]
    fn undrawn_resource_comes_back_once() {
        let mut c = ResourceCollection::new();
        for _ in 0..3 {
            c.set_frame_data(Some(&res(&[7])));
        }
        c.set_frame_data(None);
        assert_eq!(c.take_unused_resources_for_child_compositor(), vec![ret(7, 1)]);
        assert_eq!(c.unclaimed_returns(), 1);
        assert_eq!(c.tracked_len(), 0);
    }

    #[test]
    fn loss_returns_outstanding_consumer_refs() {
        let mut c = ResourceCollection::new();
        let frame = res(&[444]);
        c.set_frame_data(Some(&frame));
        c.ref_resources(&frame);
        c.ref_resources(&frame);

        assert!(c.lose_all_resources());
        assert_eq!(
            c.take_unused_resources_for_child_compositor(),
            vec![ReturnedResource {
                lost: true,
                ..ret(444, 2)
            }]
        );
        assert!(!c.lose_all_resources(), "nothing left to lose");
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
    }

    #[test]
    fn resource_is_returned_exactly_once() {
        let mut c = ResourceCollection::new();
        let frame = res(&[5]);
        c.set_frame_data(Some(&frame));
        c.ref_resources(&frame);
        c.set_frame_data(None);
        c.unref_resources(&[ret(5, 1)]);
        assert_eq!(c.take_unused_resources_for_child_compositor().len(), 1);

        assert_eq!(c.unref_resources(&[ret(5, 1)]), 1, "second release ignored");
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
    }

    #[test]
    fn lose_all_returns_everything_outstanding() {
        let mut c = ResourceCollection::new();
        let first = res(&[444, 555]);
        c.set_frame_data(Some(&first));
        c.ref_resources(&first);
        let second = res(&[444]);
        c.set_frame_data(Some(&second));
        c.ref_resources(&second);
        assert!(c.take_unused_resources_for_child_compositor().is_empty());

        assert!(c.lose_all_resources());
        let returned = c.take_unused_resources_for_child_compositor();
        assert_eq!(ids(&returned), [444, 555]);
        assert!(returned.iter().all(|r| r.lost), "every entry is lost");
        let r444 = returned.iter().find(|r| r.id == ResourceId(444));
        assert_eq!(r444.map(|r| r.count), Some(2));

        assert!(!c.lose_all_resources(), "nothing left to lose");
        assert_eq!(
            c.unref_resources(&[ret(444, 2), ret(555, 1)]),
            2,
            "late releases are ignored"
        );
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
    }

    #[test]
    fn empty_drain_is_idempotent() {
        let mut c = ResourceCollection::new();
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
        assert!(c.take_unused_resources_for_child_compositor().is_empty());
        assert!(!c.lose_all_resources());
    }

    #[test]
    fn over_release_clamps_at_zero() {
        let mut c = ResourceCollection::new();
        c.set_frame_data(Some(&res(&[9])));
        assert_eq!(c.unref_resources(&[ret(9, 5)]), 0);
        assert_eq!(c.take_unused_resources_for_child_compositor(), vec![ret(9, 1)]);
    }

    #[test]
    fn lost_flag_is_sticky_until_return() {
        let mut c = ResourceCollection::new();
        let frame = res(&[3]);
        c.set_frame_data(Some(&frame));
        c.ref_resources(&frame);
        c.unref_resources(&[ReturnedResource {
            lost: true,
            ..ret(3, 1)
        }]);
        c.set_frame_data(None);
        let returned = c.take_unused_resources_for_child_compositor();
        assert_eq!(returned.len(), 1);
        assert!(returned[0].lost, "loss reported by a consumer is kept");
    }

    #[test]
    fn client_is_notified_when_list_grows() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut c = ResourceCollection::new();
        c.set_client(Some(Box::new(CountingClient(Arc::clone(&hits)))));

        c.set_frame_data(Some(&res(&[1])));
        assert_eq!(hits.load(Ordering::Relaxed), 0, "nothing unused yet");

        c.set_frame_data(Some(&res(&[2])));
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        c.unref_resources(&[ret(42, 1)]);
        assert_eq!(hits.load(Ordering::Relaxed), 1, "ignored ids do not notify");

        c.lose_all_resources();
        assert_eq!(hits.load(Ordering::Relaxed), 2);

        assert!(c.take_client().is_some());
        c.set_frame_data(Some(&res(&[3])));
        c.set_frame_data(None);
        assert_eq!(hits.load(Ordering::Relaxed), 2, "detached client");
    }

    #[test]
    fn sync_point_from_consumer_is_forwarded() {
        let mut c = ResourceCollection::new();
        let frame = res(&[8]);
        c.set_frame_data(Some(&frame));
        c.ref_resources(&frame);
        c.set_frame_data(None);
        c.unref_resources(&[ReturnedResource {
            sync_point: 77,
            ..ret(8, 1)
        }]);
        let returned = c.take_unused_resources_for_child_compositor();
        assert_eq!(returned[0].sync_point, 77);
    }
}
