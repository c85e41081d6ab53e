// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A [`FrameProvider`] shared between a producer thread and consumer threads.
//!
//! Every operation takes the one lock, so resource-table mutations from the
//! child side and the compositor side are serialized. A lock poisoned by a
//! panicking holder is recovered rather than propagated; the tables are only
//! mutated through methods that keep them consistent before returning.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::vec::Vec;

use kurbo::Size;

use crate::frame::{DelegatedFrameData, InvalidFrame};
use crate::provider::{FrameProvider, FrameSnapshot, ObserverId};
use crate::resource::ReturnedResource;

/// A cloneable handle to a [`FrameProvider`] behind a mutex.
#[derive(Clone, Debug, Default)]
pub struct SharedFrameProvider {
    inner: Arc<Mutex<FrameProvider>>,
}

impl SharedFrameProvider {
    /// Wraps `provider`.
    #[must_use]
    pub fn new(provider: FrameProvider) -> Self {
        Self {
            inner: Arc::new(Mutex::new(provider)),
        }
    }

    /// Locks the provider for a sequence of operations that must not
    /// interleave with other threads.
    pub fn lock(&self) -> MutexGuard<'_, FrameProvider> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the provider locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut FrameProvider) -> R) -> R {
        f(&mut self.lock())
    }

    /// See [`FrameProvider::add_observer`].
    pub fn add_observer(&self) -> ObserverId {
        self.lock().add_observer()
    }

    /// See [`FrameProvider::remove_observer`].
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.lock().remove_observer(id)
    }

    /// See [`FrameProvider::set_display_size`].
    pub fn set_display_size(&self, id: ObserverId, size: Size) -> bool {
        self.lock().set_display_size(id, size)
    }

    /// See [`FrameProvider::set_frame_data`].
    ///
    /// # Errors
    ///
    /// Returns the validation failure; the provider is left untouched.
    pub fn set_frame_data(&self, frame: DelegatedFrameData) -> Result<(), InvalidFrame> {
        self.lock().set_frame_data(frame)
    }

    /// See [`FrameProvider::get_frame_data_and_ref_resources`].
    pub fn get_frame_data_and_ref_resources(&self, id: ObserverId) -> Option<FrameSnapshot> {
        self.lock().get_frame_data_and_ref_resources(id)
    }

    /// See [`FrameProvider::unref_resources_on_main_thread`].
    pub fn unref_resources_on_main_thread(
        &self,
        id: ObserverId,
        returned: &[ReturnedResource],
    ) -> usize {
        self.lock().unref_resources_on_main_thread(id, returned)
    }

    /// See [`FrameProvider::take_unused_resources_for_child_compositor`].
    pub fn take_unused_resources_for_child_compositor(&self) -> Vec<ReturnedResource> {
        self.lock().take_unused_resources_for_child_compositor()
    }

    /// See [`FrameProvider::lose_all_resources`].
    pub fn lose_all_resources(&self) -> bool {
        self.lock().lose_all_resources()
    }

    /// Returns `true` if no other handle to the provider exists.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use kurbo::Rect;

    use super::*;
    use crate::frame::test_frames::frame_with;
    use crate::resource::ResourceId;

    #[test]
    fn handles_share_one_provider() {
        let shared = SharedFrameProvider::default();
        let other = shared.clone();
        assert!(!shared.is_unique());

        let id = other.add_observer();
        shared
            .set_frame_data(frame_with((10.0, 10.0), Rect::new(0.0, 0.0, 10.0, 10.0), &[1, 2]))
            .expect("valid frame");
        let snap = other
            .get_frame_data_and_ref_resources(id)
            .expect("frame present");
        assert_eq!(snap.frame.resource_list.len(), 2);
        assert_eq!(shared.with(|p| p.collection().ref_count(ResourceId(1))), Some(2));
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let shared = SharedFrameProvider::default();
        let clone = shared.clone();
        let result = thread::spawn(move || {
            let _guard = clone.lock();
            panic!("consumer crashed while holding the lock");
        })
        .join();
        assert!(result.is_err());

        let id = shared.add_observer();
        assert!(shared.remove_observer(id), "provider still usable");
        assert!(shared.is_unique());
    }
}
