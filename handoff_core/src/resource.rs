// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resource identities exchanged between a child and a parent compositor.
//!
//! A [`TransferableResource`] is the child's declaration that a GPU object
//! exists in a frame and is loaned to the parent. A [`ReturnedResource`] is the
//! parent's answer: `count` references to that object are relinquished, and
//! `lost` says whether the object is still usable.
//!
//! Both types are flat `Copy` records so that resource lists can cross a
//! process boundary as plain arrays (see [`wire`](crate::wire)).

use alloc::vec::Vec;
use core::fmt;

/// An opaque resource handle, unique only within one compositor's namespace.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceId(pub u32);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// The texture binding point a resource must be sampled through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureTarget {
    /// An ordinary 2D texture.
    #[default]
    Texture2d,
    /// A rectangle texture addressed in texels.
    Rectangle,
    /// An externally-backed image (video frames, camera buffers).
    External,
}

/// Pixel format of a transferable resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// Single 8-bit luminance channel (video planes).
    Luminance8,
}

/// A resource the child compositor hands to the parent with a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferableResource {
    /// Identity in the producer's namespace.
    pub id: ResourceId,
    /// Binding point for sampling.
    pub target: TextureTarget,
    /// Pixel format.
    pub format: ResourceFormat,
    /// Size in texels, `[width, height]`.
    pub size: [u32; 2],
    /// Sync token the consumer must wait on before reading.
    pub sync_point: u32,
}

impl TransferableResource {
    /// Creates a 2D RGBA resource of the given size.
    #[must_use]
    pub const fn new(id: ResourceId, size: [u32; 2]) -> Self {
        Self {
            id,
            target: TextureTarget::Texture2d,
            format: ResourceFormat::Rgba8,
            size,
            sync_point: 0,
        }
    }

    /// Returns a single reference to this resource.
    #[must_use]
    pub const fn to_returned(&self) -> ReturnedResource {
        ReturnedResource {
            id: self.id,
            count: 1,
            lost: false,
            sync_point: self.sync_point,
        }
    }
}

/// `count` references to resource `id` being handed back to the producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReturnedResource {
    /// Identity in the producer's namespace.
    pub id: ResourceId,
    /// Number of references relinquished; always at least 1.
    pub count: u32,
    /// The underlying GPU object is invalid and must not be reused.
    pub lost: bool,
    /// Sync token the producer must wait on before reusing the object.
    pub sync_point: u32,
}

/// Builds one single-count [`ReturnedResource`] per entry of `resources`.
///
/// A consumer uses this to release every reference it took on a frame.
#[must_use]
pub fn return_resources(resources: &[TransferableResource]) -> Vec<ReturnedResource> {
    resources.iter().map(TransferableResource::to_returned).collect()
}

/// Merges entries that share an id, summing counts and OR-ing `lost`.
///
/// The first occurrence of each id keeps its position; later sync points win.
#[must_use]
pub fn coalesce(returned: Vec<ReturnedResource>) -> Vec<ReturnedResource> {
    let mut out: Vec<ReturnedResource> = Vec::with_capacity(returned.len());
    let mut slots: hashbrown::HashMap<ResourceId, usize> = hashbrown::HashMap::new();
    for r in returned {
        if let Some(&slot) = slots.get(&r.id) {
            let merged = &mut out[slot];
            merged.count = merged.count.saturating_add(r.count);
            merged.lost |= r.lost;
            merged.sync_point = r.sync_point;
        } else {
            slots.insert(r.id, out.len());
            out.push(r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn return_resources_yields_single_counts() {
        let list = [
            TransferableResource::new(ResourceId(1), [4, 4]),
            TransferableResource::new(ResourceId(2), [8, 8]),
        ];
        let returned = return_resources(&list);
        assert_eq!(returned.len(), 2);
        assert!(returned.iter().all(|r| r.count == 1 && !r.lost));
        assert_eq!(returned[1].id, ResourceId(2));
    }

    #[test]
    fn coalesce_sums_counts_and_keeps_lost() {
        let entry = |id, count, lost| ReturnedResource {
            id: ResourceId(id),
            count,
            lost,
            sync_point: 0,
        };
        let merged = coalesce(vec![
            entry(7, 1, false),
            entry(3, 2, false),
            entry(7, 3, true),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], entry(7, 4, true));
        assert_eq!(merged[1], entry(3, 2, false));
    }

    #[test]
    fn coalesce_of_nothing_is_nothing() {
        assert!(coalesce(Vec::new()).is_empty());
    }
}
