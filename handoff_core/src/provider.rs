// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The parent-side owner of a child's current frame.
//!
//! A [`FrameProvider`] accepts validated frames from the child, hands the
//! current frame to any number of observers (each a consumer that draws it),
//! and keeps the [`ResourceCollection`] informed of who still holds what.
//!
//! ## Damage
//!
//! Each observer accumulates the damage of every frame it has not looked at
//! yet. Its first look, a frame-size change, or a change of the observer's
//! display size owe it the full frame instead. Damage is reported in the
//! observer's display space, scaled per axis by `display / frame`.
//!
//! ## References
//!
//! Every call to [`FrameProvider::get_frame_data_and_ref_resources`] takes one
//! ref on each resource of the frame for that observer. The observer gives
//! them back with [`FrameProvider::unref_resources_on_main_thread`], or all at
//! once by being removed.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use kurbo::{Rect, Size};

use crate::collection::{ResourceCollection, ResourceCollectionClient};
use crate::damage::{PendingDamage, scale_rect};
use crate::frame::{DelegatedFrameData, InvalidFrame};
use crate::resource::{ResourceId, ReturnedResource};
use crate::trace::{FrameRejectEvent, FrameSubmitEvent, TraceSink};

/// Identifies an observer of a [`FrameProvider`]. Ids are never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObserverId({})", self.0)
    }
}

/// What an observer receives when it looks at the current frame.
#[derive(Clone, Debug)]
pub struct FrameSnapshot {
    /// The current frame.
    pub frame: Arc<DelegatedFrameData>,
    /// Damage owed to the observer, in its display space.
    pub damage: Rect,
    /// Provider-local index of the frame.
    pub frame_index: u64,
}

#[derive(Debug, Default)]
struct Observer {
    /// Refs this observer holds, per resource.
    held: HashMap<ResourceId, u32>,
    pending: PendingDamage,
    display_size: Option<Size>,
}

/// Holds a child's current frame and arbitrates its resources between
/// observers.
pub struct FrameProvider {
    collection: ResourceCollection,
    frame: Option<Arc<DelegatedFrameData>>,
    frame_size: Size,
    frame_index: u64,
    observers: HashMap<ObserverId, Observer>,
    next_observer: u64,
}

impl fmt::Debug for FrameProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProvider")
            .field("collection", &self.collection)
            .field("frame_size", &self.frame_size)
            .field("frame_index", &self.frame_index)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl Default for FrameProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProvider {
    /// Creates a provider with no frame and no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collection: ResourceCollection::new(),
            frame: None,
            frame_size: Size::ZERO,
            frame_index: 0,
            observers: HashMap::new(),
            next_observer: 0,
        }
    }

    /// Installs (or removes) the client told about unused resources.
    pub fn set_client(&mut self, client: Option<Box<dyn ResourceCollectionClient + Send>>) {
        self.collection.set_client(client);
    }

    /// Routes trace events from the provider and its collection to `sink`.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink + Send>) {
        self.collection.set_trace_sink(sink);
    }

    /// Removes and returns the trace sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink + Send>> {
        self.collection.take_trace_sink()
    }

    /// The underlying resource collection.
    #[must_use]
    pub fn collection(&self) -> &ResourceCollection {
        &self.collection
    }

    /// The current frame, if any.
    #[must_use]
    pub fn frame(&self) -> Option<&Arc<DelegatedFrameData>> {
        self.frame.as_ref()
    }

    /// Size of the current frame's root pass, or zero without a frame.
    #[must_use]
    pub fn frame_size(&self) -> Size {
        self.frame_size
    }

    /// Number of frames accepted so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Damage `id` has not consumed yet, in frame space.
    #[must_use]
    pub fn pending_damage(&self, id: ObserverId) -> Option<PendingDamage> {
        self.observers.get(&id).map(|o| o.pending)
    }

    /// Registers a new observer. Its first look sees full damage.
    pub fn add_observer(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.insert(
            id,
            Observer {
                pending: PendingDamage::Full,
                ..Observer::default()
            },
        );
        id
    }

    /// Unregisters an observer, releasing every ref it still holds.
    ///
    /// Returns `false` if `id` was not registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let Some(observer) = self.observers.remove(&id) else {
            return false;
        };
        let held = held_as_returned(&observer.held);
        self.collection.unref_resources(&held);
        true
    }

    /// Sets the size `id` displays the frame at. A change forces full damage.
    ///
    /// Returns `false` if `id` is not registered.
    pub fn set_display_size(&mut self, id: ObserverId, size: Size) -> bool {
        let Some(observer) = self.observers.get_mut(&id) else {
            return false;
        };
        if observer.display_size != Some(size) {
            observer.display_size = Some(size);
            observer.pending = PendingDamage::Full;
        }
        true
    }

    /// Replaces the current frame.
    ///
    /// The frame's root damage is added to every observer's pending damage;
    /// a change of frame size owes every observer full damage instead.
    ///
    /// # Errors
    ///
    /// Returns the [`InvalidFrame`] reason if the frame fails validation. The
    /// provider and its collection are left exactly as they were.
    pub fn set_frame_data(&mut self, frame: DelegatedFrameData) -> Result<(), InvalidFrame> {
        if let Err(err) = frame.validate() {
            self.collection.tracer_mut().frame_reject(&FrameRejectEvent {
                frame_index: self.frame_index + 1,
                reason: err.kind(),
            });
            return Err(err);
        }
        self.frame_index += 1;

        let size = frame.frame_size();
        if size == self.frame_size {
            let damage = frame.damage_rect();
            for observer in self.observers.values_mut() {
                observer.pending.add_rect(damage);
            }
        } else {
            self.frame_size = size;
            self.force_full_damage();
        }

        let frame = Arc::new(frame);
        self.frame = Some(Arc::clone(&frame));
        self.collection.tracer_mut().frame_submit(&FrameSubmitEvent {
            frame_index: self.frame_index,
            resource_count: u32::try_from(frame.resource_list.len()).unwrap_or(u32::MAX),
            render_pass_count: u32::try_from(frame.render_pass_list.len()).unwrap_or(u32::MAX),
        });
        self.collection.set_frame_data(Some(&frame.resource_list));
        Ok(())
    }

    /// Drops the current frame, releasing its membership refs.
    pub fn clear_frame(&mut self) {
        self.frame = None;
        if self.frame_size != Size::ZERO {
            self.frame_size = Size::ZERO;
            self.force_full_damage();
        }
        self.collection.set_frame_data(None);
    }

    /// Hands the current frame to observer `id`.
    ///
    /// Takes one ref on every resource of the frame for the observer and
    /// resets its pending damage. Returns `None` if `id` is not registered or
    /// there is no frame.
    pub fn get_frame_data_and_ref_resources(&mut self, id: ObserverId) -> Option<FrameSnapshot> {
        let observer = self.observers.get_mut(&id)?;
        let frame = Arc::clone(self.frame.as_ref()?);

        let mut damage = observer.pending.resolve(self.frame_size);
        if let Some(display) = observer.display_size {
            damage = scale_rect(damage, self.frame_size, display);
        }
        observer.pending = PendingDamage::Clean;

        for r in &frame.resource_list {
            *observer.held.entry(r.id).or_default() += 1;
        }
        self.collection.ref_resources(&frame.resource_list);

        #[cfg(feature = "trace-rich")]
        self.collection
            .tracer_mut()
            .damage_report(&crate::trace::DamageReportEvent {
                observer: id.raw(),
                frame_index: self.frame_index,
                rect: crate::trace::DamageRect::from_rect(damage),
            });

        Some(FrameSnapshot {
            frame,
            damage,
            frame_index: self.frame_index,
        })
    }

    /// Releases refs observer `id` took through
    /// [`get_frame_data_and_ref_resources`](Self::get_frame_data_and_ref_resources).
    ///
    /// Entries for resources the observer does not hold, and counts beyond
    /// what it holds, are ignored. Returns the number of entries that were
    /// ignored entirely.
    pub fn unref_resources_on_main_thread(
        &mut self,
        id: ObserverId,
        returned: &[ReturnedResource],
    ) -> usize {
        let Some(observer) = self.observers.get_mut(&id) else {
            return returned.len();
        };
        let mut ignored = 0;
        let mut release = Vec::with_capacity(returned.len());
        for r in returned {
            let Some(held) = observer.held.get_mut(&r.id) else {
                ignored += 1;
                continue;
            };
            let count = r.count.min(*held);
            *held -= count;
            if *held == 0 {
                observer.held.remove(&r.id);
            }
            if count > 0 {
                release.push(ReturnedResource { count, ..*r });
            }
        }
        ignored + self.collection.unref_resources(&release)
    }

    /// Drains resources that are ready to go back to the child.
    pub fn take_unused_resources_for_child_compositor(&mut self) -> Vec<ReturnedResource> {
        self.collection.take_unused_resources_for_child_compositor()
    }

    /// Declares every resource lost, typically after a context loss.
    ///
    /// Observers' refs are forgotten and the current frame is dropped, since
    /// its resources can no longer be drawn. Returns `false` if nothing was
    /// tracked.
    pub fn lose_all_resources(&mut self) -> bool {
        for observer in self.observers.values_mut() {
            observer.held.clear();
        }
        self.frame = None;
        if self.frame_size != Size::ZERO {
            self.frame_size = Size::ZERO;
            self.force_full_damage();
        }
        self.collection.lose_all_resources()
    }

    /// Releases every observer and the current frame, and returns the
    /// collection holding whatever is left to return to the child.
    ///
    /// The client is told about the final release and then detached.
    #[must_use]
    pub fn shutdown(mut self) -> ResourceCollection {
        drop(self.release_all());
        core::mem::take(&mut self.collection)
    }

    /// Releases all refs, then detaches and returns the client.
    fn release_all(&mut self) -> Option<Box<dyn ResourceCollectionClient + Send>> {
        for (_, observer) in self.observers.drain() {
            let held = held_as_returned(&observer.held);
            self.collection.unref_resources(&held);
        }
        self.frame = None;
        self.collection.set_frame_data(None);
        self.collection.take_client()
    }

    fn force_full_damage(&mut self) {
        for observer in self.observers.values_mut() {
            observer.pending = PendingDamage::Full;
        }
    }
}

impl Drop for FrameProvider {
    fn drop(&mut self) {
        if let Some(mut client) = self.release_all() {
            let left = self.collection.take_unused_resources_for_child_compositor();
            if !left.is_empty() {
                client.unused_resources_orphaned(left);
            }
        }
    }
}

fn held_as_returned(held: &HashMap<ResourceId, u32>) -> Vec<ReturnedResource> {
    held.iter()
        .map(|(&id, &count)| ReturnedResource {
            id,
            count,
            lost: false,
            sync_point: 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use super::*;
    use crate::frame::test_frames::{frame, frame_with};
    use crate::resource::return_resources;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::from_origin_size((x, y), (w, h))
    }

    fn returned_ids(p: &mut FrameProvider) -> Vec<u32> {
        let mut ids: Vec<u32> = p
            .take_unused_resources_for_child_compositor()
            .iter()
            .map(|r| r.id.0)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn first_observation_sees_full_damage() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((20.0, 20.0), rect(1.0, 1.0, 2.0, 2.0), &[1]))
            .expect("valid frame");

        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(snap.damage, rect(0.0, 0.0, 20.0, 20.0));
        assert_eq!(snap.frame_index, 1);

        let again = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(again.damage, Rect::ZERO, "nothing new since last look");
    }

    #[test]
    fn skipped_frames_union_and_scale() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_display_size(obs, Size::new(10.0, 10.0));
        p.set_frame_data(frame_with((20.0, 20.0), rect(0.0, 0.0, 20.0, 20.0), &[]))
            .expect("valid frame");
        let first = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(first.damage, rect(0.0, 0.0, 10.0, 10.0), "full, scaled");

        p.set_frame_data(frame_with((20.0, 20.0), rect(2.0, 2.0, 5.0, 5.0), &[]))
            .expect("valid frame");
        p.set_frame_data(frame_with((20.0, 20.0), rect(7.0, 2.0, 5.0, 6.0), &[]))
            .expect("valid frame");
        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(snap.damage, rect(1.0, 1.0, 5.0, 3.0));
    }

    #[test]
    fn size_changes_force_full_damage() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((20.0, 20.0), rect(0.0, 0.0, 1.0, 1.0), &[]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(obs);

        p.set_frame_data(frame_with((30.0, 20.0), rect(0.0, 0.0, 1.0, 1.0), &[]))
            .expect("valid frame");
        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(snap.damage, rect(0.0, 0.0, 30.0, 20.0), "frame size changed");

        p.set_display_size(obs, Size::new(15.0, 10.0));
        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
        assert_eq!(snap.damage, rect(0.0, 0.0, 15.0, 10.0), "display size changed");
    }

    #[test]
    fn invalid_frame_changes_nothing() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((20.0, 20.0), rect(0.0, 0.0, 1.0, 1.0), &[1, 2]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(obs);

        let bad = frame((40.0, 40.0), rect(0.0, 0.0, 40.0, 40.0), &[3, 5], &[3]);
        assert_eq!(
            p.set_frame_data(bad),
            Err(InvalidFrame::UnknownResource(ResourceId(5)))
        );
        assert_eq!(p.frame_index(), 1);
        assert_eq!(p.frame_size(), Size::new(20.0, 20.0));
        assert_eq!(p.pending_damage(obs), Some(PendingDamage::Clean));
        assert!(!p.collection().is_tracking(ResourceId(3)));
        assert_eq!(p.collection().ref_count(ResourceId(1)), Some(2));
        assert!(p.take_unused_resources_for_child_compositor().is_empty());
    }

    #[test]
    fn observer_refs_gate_return() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[1, 2]))
            .expect("valid frame");
        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");

        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[2, 3]))
            .expect("valid frame");
        assert!(returned_ids(&mut p).is_empty(), "observer still holds 1");

        let ignored =
            p.unref_resources_on_main_thread(obs, &return_resources(&snap.frame.resource_list));
        assert_eq!(ignored, 0);
        assert_eq!(returned_ids(&mut p), [1]);

        assert_eq!(
            p.unref_resources_on_main_thread(obs, &return_resources(&snap.frame.resource_list)),
            2,
            "refs the observer no longer holds are ignored"
        );
        assert!(returned_ids(&mut p).is_empty());
    }

    #[test]
    fn removing_observer_releases_its_refs() {
        let mut p = FrameProvider::new();
        let a = p.add_observer();
        let b = p.add_observer();
        assert_ne!(a, b);
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[1]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(a);
        p.get_frame_data_and_ref_resources(a);
        p.get_frame_data_and_ref_resources(b);
        p.clear_frame();
        assert!(returned_ids(&mut p).is_empty());

        assert!(p.remove_observer(a));
        assert!(returned_ids(&mut p).is_empty(), "b still holds 1");
        assert!(p.remove_observer(b));
        assert_eq!(returned_ids(&mut p), [1]);
        assert!(!p.remove_observer(b), "already gone");
        assert!(p.get_frame_data_and_ref_resources(b).is_none());
    }

    fn drained_total(p: &mut FrameProvider) -> u32 {
        p.take_unused_resources_for_child_compositor()
            .iter()
            .map(|r| r.count)
            .sum()
    }

    #[test]
    fn returned_counts_sum_to_refs_granted() {
        let mut p = FrameProvider::new();
        let a = p.add_observer();
        let b = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[444]))
            .expect("valid frame");
        let mut snaps = Vec::new();
        for obs in [a, b, a, b] {
            snaps.push((obs, p.get_frame_data_and_ref_resources(obs).expect("frame")));
        }
        for (obs, snap) in &snaps {
            let list = return_resources(&snap.frame.resource_list);
            assert_eq!(p.unref_resources_on_main_thread(*obs, &list), 0);
        }
        assert_eq!(drained_total(&mut p), 0, "still the current frame");

        p.clear_frame();
        assert_eq!(drained_total(&mut p), 4, "two observers, two refs each");
        assert_eq!(p.collection().tracked_len(), 0);
    }

    #[test]
    fn conservation_across_replaced_frames() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        let frames: [&[u32]; 4] = [&[1, 2], &[2, 3], &[3], &[1, 3]];
        let mut granted = 0;
        let mut total = 0;
        for ids in frames {
            p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, ids))
                .expect("valid frame");
            let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
            granted += u32::try_from(snap.frame.resource_list.len()).expect("short list");
            p.unref_resources_on_main_thread(obs, &return_resources(&snap.frame.resource_list));
            total += drained_total(&mut p);
        }
        p.clear_frame();
        total += drained_total(&mut p);
        assert_eq!(total, granted);
        assert_eq!(p.collection().unclaimed_returns(), 0);
    }

    #[test]
    fn loss_returns_everything_and_forgets_observer_refs() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[444, 555]))
            .expect("valid frame");
        let snap = p.get_frame_data_and_ref_resources(obs).expect("frame");
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[444]))
            .expect("valid frame");

        assert!(p.lose_all_resources());
        let returned = p.take_unused_resources_for_child_compositor();
        assert_eq!(returned.len(), 2);
        assert!(returned.iter().all(|r| r.lost), "all lost");
        assert!(
            returned.iter().all(|r| r.count == 1),
            "one ref each was granted"
        );
        assert!(p.frame().is_none(), "lost frame is dropped");
        assert!(!p.lose_all_resources());

        assert_eq!(
            p.unref_resources_on_main_thread(obs, &return_resources(&snap.frame.resource_list)),
            2
        );
        assert!(p.take_unused_resources_for_child_compositor().is_empty());
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut p = FrameProvider::new();
        let obs = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[1, 2]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(obs);

        let mut collection = p.shutdown();
        let mut ids: Vec<u32> = collection
            .take_unused_resources_for_child_compositor()
            .iter()
            .map(|r| r.id.0)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(collection.tracked_len(), 0);
    }

    /// Counts notifications and the refs handed over on drop.
    #[derive(Clone, Default)]
    struct ChildSide {
        notified: Arc<AtomicUsize>,
        orphaned_refs: Arc<AtomicU32>,
    }

    impl ResourceCollectionClient for ChildSide {
        fn unused_resources_are_available(&mut self) {
            self.notified.fetch_add(1, Ordering::Relaxed);
        }

        fn unused_resources_orphaned(&mut self, resources: Vec<ReturnedResource>) {
            let refs = resources.iter().map(|r| r.count).sum();
            self.orphaned_refs.fetch_add(refs, Ordering::Relaxed);
        }
    }

    #[test]
    fn shutdown_notifies_before_detaching() {
        let child = ChildSide::default();
        let mut p = FrameProvider::new();
        p.set_client(Some(Box::new(child.clone())));
        let obs = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[1]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(obs);

        let mut collection = p.shutdown();
        assert_eq!(
            child.notified.load(Ordering::Relaxed),
            1,
            "final release notified"
        );
        assert!(collection.take_client().is_none(), "client detached");
        assert_eq!(
            collection.take_unused_resources_for_child_compositor().len(),
            1
        );
    }

    #[test]
    fn drop_hands_undrained_resources_to_the_client() {
        let child = ChildSide::default();
        let mut p = FrameProvider::new();
        p.set_client(Some(Box::new(child.clone())));
        let obs = p.add_observer();
        p.set_frame_data(frame_with((8.0, 8.0), Rect::ZERO, &[1]))
            .expect("valid frame");
        p.get_frame_data_and_ref_resources(obs);
        drop(p);

        assert_eq!(child.notified.load(Ordering::Relaxed), 1);
        assert_eq!(
            child.orphaned_refs.load(Ordering::Relaxed),
            1,
            "the observer's ref reached the child"
        );
    }
}
