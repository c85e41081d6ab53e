// Copyright 2026 the Handoff Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage accumulation owed to a frame observer.

use kurbo::{Rect, Size};

/// Damage an observer has not consumed yet.
///
/// Successive submissions are unioned into a single bounding rectangle, so an
/// observer that skips several frames still sees everything that changed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum PendingDamage {
    /// Nothing changed since the observer last looked.
    #[default]
    Clean,
    /// The union of every damage rect submitted since the last look, in frame
    /// coordinates.
    Partial(Rect),
    /// The whole frame must be redrawn.
    Full,
}

impl PendingDamage {
    /// Returns `true` if nothing needs redrawing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Unions `rect` into the pending damage. Empty rects are ignored.
    pub fn add_rect(&mut self, rect: Rect) {
        if is_empty(rect) {
            return;
        }
        *self = match *self {
            Self::Full => Self::Full,
            Self::Clean => Self::Partial(rect),
            Self::Partial(prev) => Self::Partial(prev.union(rect)),
        };
    }

    /// Merges another pending damage into this one.
    pub fn merge(&mut self, other: Self) {
        match other {
            Self::Clean => {}
            Self::Full => *self = Self::Full,
            Self::Partial(rect) => self.add_rect(rect),
        }
    }

    /// Resolves the damage against the current frame bounds.
    ///
    /// `Full` becomes the whole frame; partial damage is clipped to it.
    #[must_use]
    pub fn resolve(&self, frame_size: Size) -> Rect {
        let bounds = frame_size.to_rect();
        match *self {
            Self::Clean => Rect::ZERO,
            Self::Full => bounds,
            Self::Partial(rect) => {
                let clipped = rect.intersect(bounds);
                if is_empty(clipped) { Rect::ZERO } else { clipped }
            }
        }
    }
}

/// Converts a rect from frame coordinates into display coordinates by scaling
/// each axis by `display / frame`.
///
/// A degenerate frame size leaves the rect unscaled on that axis.
#[must_use]
pub fn scale_rect(rect: Rect, frame: Size, display: Size) -> Rect {
    let sx = if frame.width > 0.0 {
        display.width / frame.width
    } else {
        1.0
    };
    let sy = if frame.height > 0.0 {
        display.height / frame.height
    } else {
        1.0
    };
    Rect::new(rect.x0 * sx, rect.y0 * sy, rect.x1 * sx, rect.y1 * sy)
}

/// Returns `true` for rects that cover no area.
#[must_use]
pub fn is_empty(rect: Rect) -> bool {
    !(rect.width() > 0.0 && rect.height() > 0.0)
}
