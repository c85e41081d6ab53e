// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translation between a child's resource namespace and the parent's.
//!
//! Resource ids are only unique within the compositor that minted them. When a
//! parent draws a child's frame it gives each child resource a fresh parent id
//! and rewrites the frame's quads before they meet the parent's own resources.

use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::frame::{DelegatedFrameData, InvalidFrame};
use crate::resource::{ResourceId, ReturnedResource, TransferableResource};

/// The parent's view of one child's resource namespace.
#[derive(Clone, Debug)]
pub struct ChildResourceMap {
    child_to_parent: HashMap<ResourceId, ResourceId>,
    parent_to_child: HashMap<ResourceId, ResourceId>,
    next_parent_id: u32,
}

impl Default for ChildResourceMap {
    fn default() -> Self {
        Self::with_first_id(1)
    }
}

impl ChildResourceMap {
    /// Creates an empty map that mints parent ids starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map that mints parent ids starting at `first`.
    ///
    /// Parents that host several children give each map a disjoint range.
    #[must_use]
    pub fn with_first_id(first: u32) -> Self {
        Self {
            child_to_parent: HashMap::new(),
            parent_to_child: HashMap::new(),
            next_parent_id: first,
        }
    }

    /// Number of child resources currently mapped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.child_to_parent.len()
    }

    /// Returns `true` if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.child_to_parent.is_empty()
    }

    /// Accepts resources from the child, minting parent ids for unseen ones.
    ///
    /// Returns the resources rewritten into the parent namespace, in input
    /// order.
    pub fn receive_from_child(
        &mut self,
        resources: &[TransferableResource],
    ) -> Vec<TransferableResource> {
        resources
            .iter()
            .map(|r| TransferableResource {
                id: self.map_or_insert(r.id),
                ..*r
            })
            .collect()
    }

    /// Looks up the parent id for a child id.
    #[must_use]
    pub fn remap(&self, child: ResourceId) -> Option<ResourceId> {
        self.child_to_parent.get(&child).copied()
    }

    /// Rewrites every resource id in `frame` into the parent namespace.
    ///
    /// Every id is checked before anything is rewritten, so an error never
    /// leaves a partially translated frame behind.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFrame::UnknownResource`] naming the first child id
    /// with no mapping.
    pub fn remap_frame(
        &self,
        frame: &DelegatedFrameData,
    ) -> Result<DelegatedFrameData, InvalidFrame> {
        if let Some(r) = frame
            .resource_list
            .iter()
            .find(|r| !self.child_to_parent.contains_key(&r.id))
        {
            return Err(InvalidFrame::UnknownResource(r.id));
        }
        for quad in frame.quads() {
            let mut missing = None;
            quad.for_each_resource(|id| {
                if missing.is_none() && !self.child_to_parent.contains_key(&id) {
                    missing = Some(id);
                }
            });
            if let Some(id) = missing {
                return Err(InvalidFrame::UnknownResource(id));
            }
        }

        let mut out = frame.clone();
        let translate = |id: &mut ResourceId| {
            if let Some(&parent) = self.child_to_parent.get(id) {
                *id = parent;
            }
        };
        for r in &mut out.resource_list {
            translate(&mut r.id);
        }
        for pass in &mut out.render_pass_list {
            for quad in &mut pass.quad_list {
                quad.for_each_resource_mut(translate);
            }
        }
        Ok(out)
    }

    /// Translates returned parent ids back to child ids and forgets them.
    ///
    /// Entries with no mapping are dropped.
    pub fn return_to_child(&mut self, returned: &[ReturnedResource]) -> Vec<ReturnedResource> {
        returned
            .iter()
            .filter_map(|r| {
                let child = self.parent_to_child.remove(&r.id)?;
                self.child_to_parent.remove(&child);
                Some(ReturnedResource { id: child, ..*r })
            })
            .collect()
    }

    fn map_or_insert(&mut self, child: ResourceId) -> ResourceId {
        if let Some(&parent) = self.child_to_parent.get(&child) {
            return parent;
        }
        // After the counter wraps, ids still in use are skipped. The loop ends
        // because a map holding all 2^32 parent ids cannot be built.
        let mut raw = self.next_parent_id;
        while self.parent_to_child.contains_key(&ResourceId(raw)) {
            raw = raw.wrapping_add(1);
        }
        let parent = ResourceId(raw);
        self.next_parent_id = raw.wrapping_add(1);
        self.child_to_parent.insert(child, parent);
        self.parent_to_child.insert(parent, child);
        parent
    }
}
