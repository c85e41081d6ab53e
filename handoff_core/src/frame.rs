// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Delegated frame data: render passes, draw quads, and their resources.
//!
//! A [`DelegatedFrameData`] is what a child compositor submits for one frame.
//! Its render passes form a DAG through [`QuadMaterial::RenderPass`] quads.
//! The list is ordered so that every referenced pass appears before the pass
//! that draws it, and the last pass is the root. Every resource a quad names
//! must be listed in [`DelegatedFrameData::resource_list`].
//!
//! [`DelegatedFrameData::validate`] checks those rules without mutating
//! anything. Frames that fail are rejected wholesale.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashSet;
use kurbo::{Affine, Rect, Size};

use crate::resource::{ResourceId, TransferableResource};

/// Identity of a render pass within one frame: the producing layer plus an
/// index within that layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderPassId {
    /// Layer that produced the pass.
    pub layer_id: i32,
    /// Index of the pass within that layer.
    pub index: i32,
}

impl RenderPassId {
    /// Creates a render pass id.
    #[must_use]
    pub const fn new(layer_id: i32, index: i32) -> Self {
        Self { layer_id, index }
    }
}

impl fmt::Debug for RenderPassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderPassId({}.{})", self.layer_id, self.index)
    }
}

/// Blend mode applied when a quad is composited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing.
    #[default]
    SourceOver,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
}

/// State shared by a run of quads drawn from the same layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharedQuadState {
    /// Maps quad (content) space into the render pass's target space.
    pub content_to_target: Affine,
    /// Bounds of the content the quads were cut from.
    pub content_bounds: Size,
    /// Part of the content that is visible.
    pub visible_content_rect: Rect,
    /// Clip in target space, if any.
    pub clip_rect: Option<Rect>,
    /// Opacity applied to every quad.
    pub opacity: f32,
    /// Blend mode applied to every quad.
    pub blend_mode: BlendMode,
}

impl Default for SharedQuadState {
    fn default() -> Self {
        Self {
            content_to_target: Affine::IDENTITY,
            content_bounds: Size::ZERO,
            visible_content_rect: Rect::ZERO,
            clip_rect: None,
            opacity: 1.0,
            blend_mode: BlendMode::SourceOver,
        }
    }
}

/// What a quad draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QuadMaterial {
    /// A flat color, premultiplied RGBA.
    SolidColor {
        /// Premultiplied RGBA color.
        color: [f32; 4],
    },
    /// A textured quad.
    Texture {
        /// Texture to sample.
        resource: ResourceId,
        /// Sub-rectangle of the texture in normalized coordinates.
        uv_rect: Rect,
        /// Whether the texture holds premultiplied alpha.
        premultiplied_alpha: bool,
    },
    /// One tile of a tiled layer.
    Tile {
        /// Tile texture.
        resource: ResourceId,
        /// Region of the texture holding the tile, in texels.
        tex_coord_rect: Rect,
    },
    /// A planar YUV video frame.
    YuvVideo {
        /// Luma plane.
        y: ResourceId,
        /// First chroma plane.
        u: ResourceId,
        /// Second chroma plane.
        v: ResourceId,
        /// Optional alpha plane.
        a: Option<ResourceId>,
    },
    /// The output of another render pass in the same frame.
    RenderPass {
        /// The pass being drawn. Must appear earlier in the pass list.
        pass: RenderPassId,
        /// Optional mask texture.
        mask: Option<ResourceId>,
    },
}

/// A single draw operation inside a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawQuad {
    /// Quad rect in content space.
    pub rect: Rect,
    /// Visible part of `rect`.
    pub visible_rect: Rect,
    /// Index into the owning pass's `shared_quad_state_list`.
    pub shared_quad_state: usize,
    /// What to draw.
    pub material: QuadMaterial,
}

impl DrawQuad {
    /// Creates a fully visible quad.
    #[must_use]
    pub const fn new(rect: Rect, shared_quad_state: usize, material: QuadMaterial) -> Self {
        Self {
            rect,
            visible_rect: rect,
            shared_quad_state,
            material,
        }
    }

    /// Calls `f` with every resource this quad samples.
    pub fn for_each_resource(&self, mut f: impl FnMut(ResourceId)) {
        match self.material {
            QuadMaterial::SolidColor { .. } => {}
            QuadMaterial::Texture { resource, .. } | QuadMaterial::Tile { resource, .. } => {
                f(resource);
            }
            QuadMaterial::YuvVideo { y, u, v, a } => {
                f(y);
                f(u);
                f(v);
                if let Some(a) = a {
                    f(a);
                }
            }
            QuadMaterial::RenderPass { mask, .. } => {
                if let Some(mask) = mask {
                    f(mask);
                }
            }
        }
    }

    /// Calls `f` with a mutable reference to every resource id in this quad.
    pub fn for_each_resource_mut(&mut self, mut f: impl FnMut(&mut ResourceId)) {
        match &mut self.material {
            QuadMaterial::SolidColor { .. } => {}
            QuadMaterial::Texture { resource, .. } | QuadMaterial::Tile { resource, .. } => {
                f(resource);
            }
            QuadMaterial::YuvVideo { y, u, v, a } => {
                f(y);
                f(u);
                f(v);
                if let Some(a) = a {
                    f(a);
                }
            }
            QuadMaterial::RenderPass { mask, .. } => {
                if let Some(mask) = mask {
                    f(mask);
                }
            }
        }
    }
}

/// An ordered list of quads rendered into one target.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    /// Pass identity, unique within the frame.
    pub id: RenderPassId,
    /// Size and position of the pass's target.
    pub output_rect: Rect,
    /// Part of `output_rect` that changed since the previous frame.
    pub damage_rect: Rect,
    /// Maps the pass's target into the root target.
    pub transform_to_root_target: Affine,
    /// Whether the target starts transparent instead of opaque.
    pub has_transparent_background: bool,
    /// Quads, front to back.
    pub quad_list: Vec<DrawQuad>,
    /// State shared by runs of quads.
    pub shared_quad_state_list: Vec<SharedQuadState>,
}

impl RenderPass {
    /// Creates an empty pass with the given target and damage.
    #[must_use]
    pub fn new(id: RenderPassId, output_rect: Rect, damage_rect: Rect) -> Self {
        Self {
            id,
            output_rect,
            damage_rect,
            transform_to_root_target: Affine::IDENTITY,
            has_transparent_background: false,
            quad_list: Vec::new(),
            shared_quad_state_list: Vec::new(),
        }
    }

    /// Appends a shared quad state and returns its index.
    pub fn push_shared_quad_state(&mut self, state: SharedQuadState) -> usize {
        self.shared_quad_state_list.push(state);
        self.shared_quad_state_list.len() - 1
    }

    /// Appends a quad.
    pub fn push_quad(&mut self, quad: DrawQuad) {
        self.quad_list.push(quad);
    }
}

/// Why a frame was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFrame {
    /// The frame has no render passes, so there is no root pass.
    #[error("frame has no render passes")]
    NoRenderPasses,
    /// Two passes share an id.
    #[error("render pass {0:?} appears more than once")]
    DuplicateRenderPass(RenderPassId),
    /// A render-pass quad draws a pass that does not appear earlier in the list.
    #[error("render pass {referencing:?} draws {referenced:?}, which is not an earlier pass")]
    RenderPassOutOfOrder {
        /// The pass containing the quad.
        referencing: RenderPassId,
        /// The pass it tried to draw.
        referenced: RenderPassId,
    },
    /// A quad points past the end of its pass's shared quad states.
    #[error("quad in render pass {pass:?} uses missing shared quad state {index}")]
    MissingSharedQuadState {
        /// The pass containing the quad.
        pass: RenderPassId,
        /// The out-of-range index.
        index: usize,
    },
    /// A quad samples a resource the frame does not list.
    #[error("quad references resource {0:?}, which is not in the frame's resource list")]
    UnknownResource(ResourceId),
    /// The resource list names the same id twice.
    #[error("resource {0:?} is listed more than once")]
    DuplicateResource(ResourceId),
}

impl InvalidFrame {
    /// Returns the fieldless category of this error, for tracing.
    #[must_use]
    pub const fn kind(&self) -> InvalidFrameKind {
        match self {
            Self::NoRenderPasses => InvalidFrameKind::NoRenderPasses,
            Self::DuplicateRenderPass(_) => InvalidFrameKind::DuplicateRenderPass,
            Self::RenderPassOutOfOrder { .. } => InvalidFrameKind::RenderPassOutOfOrder,
            Self::MissingSharedQuadState { .. } => InvalidFrameKind::MissingSharedQuadState,
            Self::UnknownResource(_) => InvalidFrameKind::UnknownResource,
            Self::DuplicateResource(_) => InvalidFrameKind::DuplicateResource,
        }
    }
}

/// Category of an [`InvalidFrame`], without the offending ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InvalidFrameKind {
    /// See [`InvalidFrame::NoRenderPasses`].
    NoRenderPasses,
    /// See [`InvalidFrame::DuplicateRenderPass`].
    DuplicateRenderPass,
    /// See [`InvalidFrame::RenderPassOutOfOrder`].
    RenderPassOutOfOrder,
    /// See [`InvalidFrame::MissingSharedQuadState`].
    MissingSharedQuadState,
    /// See [`InvalidFrame::UnknownResource`].
    UnknownResource,
    /// See [`InvalidFrame::DuplicateResource`].
    DuplicateResource,
}

/// Everything a child compositor submits for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DelegatedFrameData {
    /// Device pixels per display unit the child rendered at.
    pub device_scale_factor: f32,
    /// Render passes in dependency order; the last is the root.
    pub render_pass_list: Vec<RenderPass>,
    /// Every resource the quads sample, loaned to the parent.
    pub resource_list: Vec<TransferableResource>,
}

impl Default for DelegatedFrameData {
    fn default() -> Self {
        Self {
            device_scale_factor: 1.0,
            render_pass_list: Vec::new(),
            resource_list: Vec::new(),
        }
    }
}

impl DelegatedFrameData {
    /// Returns the root (last) render pass, if any.
    #[must_use]
    pub fn root_pass(&self) -> Option<&RenderPass> {
        self.render_pass_list.last()
    }

    /// Size of the root pass's output, in the producer's coordinates.
    #[must_use]
    pub fn frame_size(&self) -> Size {
        self.root_pass()
            .map_or(Size::ZERO, |pass| pass.output_rect.size())
    }

    /// Damage of the root pass, in the producer's coordinates.
    #[must_use]
    pub fn damage_rect(&self) -> Rect {
        self.root_pass().map_or(Rect::ZERO, |pass| pass.damage_rect)
    }

    /// Iterates over every quad of every pass.
    pub fn quads(&self) -> impl Iterator<Item = &DrawQuad> {
        self.render_pass_list
            .iter()
            .flat_map(|pass| pass.quad_list.iter())
    }

    /// Checks the structural invariants of the frame.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidFrame`] violation found, scanning passes in
    /// list order.
    pub fn validate(&self) -> Result<(), InvalidFrame> {
        if self.render_pass_list.is_empty() {
            return Err(InvalidFrame::NoRenderPasses);
        }

        let mut listed = HashSet::with_capacity(self.resource_list.len());
        for resource in &self.resource_list {
            if !listed.insert(resource.id) {
                return Err(InvalidFrame::DuplicateResource(resource.id));
            }
        }

        let mut seen_passes = HashSet::with_capacity(self.render_pass_list.len());
        for pass in &self.render_pass_list {
            for quad in &pass.quad_list {
                if quad.shared_quad_state >= pass.shared_quad_state_list.len() {
                    return Err(InvalidFrame::MissingSharedQuadState {
                        pass: pass.id,
                        index: quad.shared_quad_state,
                    });
                }
                if let QuadMaterial::RenderPass { pass: referenced, .. } = quad.material {
                    // Self-references and cycles both fail this: the pass is
                    // not yet in `seen_passes`.
                    if !seen_passes.contains(&referenced) {
                        return Err(InvalidFrame::RenderPassOutOfOrder {
                            referencing: pass.id,
                            referenced,
                        });
                    }
                }
                let mut unknown = None;
                quad.for_each_resource(|id| {
                    if unknown.is_none() && !listed.contains(&id) {
                        unknown = Some(id);
                    }
                });
                if let Some(id) = unknown {
                    return Err(InvalidFrame::UnknownResource(id));
                }
            }
            if !seen_passes.insert(pass.id) {
                return Err(InvalidFrame::DuplicateRenderPass(pass.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_frames {
    //! Frame builders shared by the tests of several modules.

    use alloc::vec;
    use alloc::vec::Vec;

    use kurbo::Rect;

    use super::*;

    /// A single-pass frame of `size` with `damage`, holding one texture quad
    /// per entry of `quad_resources` and listing `listed` as its resources.
    pub(crate) fn frame(
        size: (f64, f64),
        damage: Rect,
        quad_resources: &[u32],
        listed: &[u32],
    ) -> DelegatedFrameData {
        let mut pass = RenderPass::new(
            RenderPassId::new(1, 1),
            Rect::from_origin_size((0.0, 0.0), size),
            damage,
        );
        let sqs = pass.push_shared_quad_state(SharedQuadState::default());
        for &id in quad_resources {
            pass.push_quad(DrawQuad::new(
                Rect::new(0.0, 0.0, 1.0, 1.0),
                sqs,
                QuadMaterial::Texture {
                    resource: ResourceId(id),
                    uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
                    premultiplied_alpha: true,
                },
            ));
        }
        DelegatedFrameData {
            device_scale_factor: 1.0,
            render_pass_list: vec![pass],
            resource_list: listed
                .iter()
                .map(|&id| TransferableResource::new(ResourceId(id), [1, 1]))
                .collect::<Vec<_>>(),
        }
    }

    /// A valid frame that uses and lists exactly `ids`.
    pub(crate) fn frame_with(size: (f64, f64), damage: Rect, ids: &[u32]) -> DelegatedFrameData {
        frame(size, damage, ids, ids)
    }
}
