// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The renderer boundary for the draw pass.

use kurbo::{Affine, Size};

/// Receiver for the structural calls of a draw pass.
///
/// The stage brackets every drawn node with [`push_transform`] and
/// [`pop_transform`], brackets each draw hook with [`push_style`] and
/// [`pop_style`], and wraps the subtree of a clipping node in
/// [`begin_layer`] and [`end_layer`]. Calls always nest: each `push_*`
/// and `begin_*` is matched by its `pop_*` or `end_*` in reverse order,
/// so an implementation may keep plain stacks.
///
/// Transforms are local: the pushed matrix maps a node's own space into
/// its parent's, and the renderer is expected to compose it onto
/// whatever is already current.
///
/// [`push_transform`]: Canvas::push_transform
/// [`pop_transform`]: Canvas::pop_transform
/// [`push_style`]: Canvas::push_style
/// [`pop_style`]: Canvas::pop_style
/// [`begin_layer`]: Canvas::begin_layer
/// [`end_layer`]: Canvas::end_layer
pub trait Canvas {
    /// Compose `transform` onto the current transform stack.
    fn push_transform(&mut self, transform: Affine);
    /// Undo the most recent [`push_transform`](Canvas::push_transform).
    fn pop_transform(&mut self);
    /// Save the current style state.
    fn push_style(&mut self);
    /// Restore the style state saved by the matching
    /// [`push_style`](Canvas::push_style).
    fn pop_style(&mut self);
    /// Begin an offscreen layer of `size` in the current local space.
    ///
    /// Content drawn until the matching [`end_layer`](Canvas::end_layer)
    /// is clipped to that extent.
    fn begin_layer(&mut self, size: Size);
    /// Composite and discard the current layer.
    fn end_layer(&mut self);
}

/// A canvas that discards every call.
///
/// Useful when the draw pass runs only for its lifecycle side effects,
/// or as a stand-in in tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn push_transform(&mut self, _transform: Affine) {}
    fn pop_transform(&mut self) {}
    fn push_style(&mut self) {}
    fn pop_style(&mut self) {}
    fn begin_layer(&mut self, _size: Size) {}
    fn end_layer(&mut self) {}
}
