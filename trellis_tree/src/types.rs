// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the component tree: node identifiers, flags, and local frames.

use kurbo::{Point, Rect, Size, Vec2};

/// Identifier for a node in the tree (generational).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Node flags controlling participation in dispatch, input, dragging, and clipping.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Node updates, draws, and resolves under the pointer. Clearing it
        /// suspends the node's entire subtree.
        const ACTIVE        = 0b0000_0001;
        /// Node receives key/pointer/file-drop events.
        const INPUT_ENABLED = 0b0000_0010;
        /// Node may claim the stage's moving slot on a press while topmost.
        const MOVABLE       = 0b0000_0100;
        /// Node clips children: events and hits outside its bounds do not
        /// reach descendants, and drawing composites through an off-screen
        /// layer sized to the node.
        const CONSTRAIN     = 0b0000_1000;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::ACTIVE | Self::INPUT_ENABLED
    }
}

/// Anchor used for the scale/rotation part of a node's local transform.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Pivot {
    /// Scale and rotate about the top-left corner of the node's rectangle.
    Corner,
    /// Scale and rotate about the center of the node's rectangle.
    #[default]
    Center,
}

/// Local placement of a node relative to its parent space.
///
/// `rect.origin()` is the node's position in parent space; `rect.size()` is
/// the node's own bounds, which also anchor the [`Pivot::Center`] pivot and
/// the containment test used for hit resolution.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LocalFrame {
    /// Position (origin, in parent space) and size (in local space).
    pub rect: Rect,
    /// Uniform scale factor applied about the pivot.
    pub scale: f64,
    /// Rotation in degrees, clockwise in a y-down space, applied about the pivot.
    pub rotation: f64,
    /// Anchor for scale and rotation.
    pub pivot: Pivot,
}

impl Default for LocalFrame {
    fn default() -> Self {
        Self {
            rect: Rect::ZERO,
            scale: 1.0,
            rotation: 0.0,
            pivot: Pivot::default(),
        }
    }
}

impl LocalFrame {
    /// A frame at `origin` with `size`, unit scale, no rotation, center pivot.
    pub fn new(origin: Point, size: Size) -> Self {
        Self {
            rect: Rect::from_origin_size(origin, size),
            ..Self::default()
        }
    }

    /// The pivot point in the node's own (untranslated) coordinates.
    pub fn pivot_point(&self) -> Vec2 {
        match self.pivot {
            Pivot::Corner => Vec2::ZERO,
            Pivot::Center => Vec2::new(self.rect.width() / 2.0, self.rect.height() / 2.0),
        }
    }

    /// Whether every geometric component is finite. Non-finite frames are
    /// rejected by the tree's setters.
    pub fn is_finite(&self) -> bool {
        self.rect.is_finite() && self.scale.is_finite() && self.rotation.is_finite()
    }
}
