// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trellis Tree: a Kurbo-native retained component tree.
//!
//! Trellis Tree is the data model underneath a pointer-driven component UI:
//! a hierarchy of nodes, each placed in its parent's coordinate space by a
//! [`LocalFrame`] (rectangle, uniform scale, rotation, pivot).
//!
//! - Local and world affine matrices are recomputed eagerly on every frame
//!   change and hierarchy edit; queries never observe stale geometry.
//! - Child order is z-order: index 0 is backmost, the last child is
//!   frontmost. [`Tree::topmost_at`] resolves the frontmost-deepest node
//!   under a world-space point with a depth-first, last-match-wins walk.
//! - Handles are generational ([`NodeId`]): a freed slot invalidates old
//!   ids, which from then on answer `None` or no-op everywhere.
//!
//! ## Coordinate spaces
//!
//! A node's local space has its top-left corner at the origin; its bounds
//! are `[0, width) × [0, height)`. The local matrix maps local space into
//! the parent's space, applying pivot-anchored rotation and scale and then
//! the rectangle's origin as a translation. World matrices compose local
//! matrices root-down.
//!
//! ## Not a runtime
//!
//! This crate stores structure, geometry, and the per-node state bits the
//! runtime gates on (active, input-enabled, movable, constrain, started,
//! destroyed). It never invokes callbacks and has no clock. Dispatch,
//! behavior hooks, timers, dragging, and the staged destroy/reap protocol
//! live in `trellis_stage`, which drives this tree.
//!
//! ## API overview
//!
//! - [`Tree`]: container owning the nodes.
//! - [`LocalFrame`]: per-node placement (rect, scale, rotation, [`Pivot`]).
//! - [`NodeFlags`]: active / input-enabled / movable / constrain bits.
//! - [`NodeId`]: generational handle of a node.
//!
//! Key operations:
//! - [`Tree::insert`] → [`NodeId`], [`Tree::remove`], [`Tree::release`]
//! - [`Tree::attach`] (reparent, reorder, clamped index), [`Tree::detach`],
//!   [`Tree::swap_children`]
//! - [`Tree::set_frame`] / [`Tree::set_rect`] / [`Tree::set_position`] /
//!   [`Tree::set_size`] / [`Tree::set_scale`] / [`Tree::set_rotation`] /
//!   [`Tree::set_pivot`]
//! - [`Tree::to_world`] / [`Tree::to_local`] / [`Tree::world_transform`] /
//!   [`Tree::world_bounds`] / [`Tree::contains_local`]
//! - [`Tree::topmost_at`] for hit resolution
//! - [`Tree::effective_active`] for the ancestor-inclusive active state
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod transform;
mod tree;
mod types;
mod util;

pub use tree::Tree;
pub use types::{LocalFrame, NodeFlags, NodeId, Pivot};
