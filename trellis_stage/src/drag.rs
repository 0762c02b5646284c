// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The single-slot drag controller.

use kurbo::{Point, Vec2};
use trellis_tree::{NodeId, Tree};

/// Tracks which node, if any, a press is currently dragging.
///
/// There is one slot for the whole stage: a press can claim it only
/// while it is empty, and it empties on release, so at most one node
/// moves at a time no matter how many report as pressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MoveController {
    moving: Option<NodeId>,
}

impl MoveController {
    /// The node currently holding the slot.
    pub(crate) fn moving(self) -> Option<NodeId> {
        self.moving
    }

    /// Claims the slot for `topmost` if it is empty and the node is
    /// movable. Returns the new holder on success.
    pub(crate) fn claim(&mut self, tree: &Tree, topmost: Option<NodeId>) -> Option<NodeId> {
        if self.moving.is_some() {
            return None;
        }
        let node = topmost?;
        if !tree.is_movable(node) {
            return None;
        }
        self.moving = Some(node);
        self.moving
    }

    /// Empties the slot, returning the node that held it.
    pub(crate) fn release(&mut self) -> Option<NodeId> {
        self.moving.take()
    }

    /// Empties the slot if `id` holds it.
    pub(crate) fn clear_if(&mut self, id: NodeId) {
        if self.moving == Some(id) {
            self.moving = None;
        }
    }

    /// Whether `id` holds the slot and has started.
    ///
    /// A node claimed before its first update is not yet moving; it
    /// begins to follow the pointer once it has started.
    pub(crate) fn is_moving(self, tree: &Tree, id: NodeId) -> bool {
        self.moving == Some(id) && tree.is_started(id)
    }

    /// The pointer step from `prev` to `cur` expressed in the moving
    /// node's own local space, or `None` when nothing is moving.
    ///
    /// Using the holder's own space mirrors how hosts report pointer
    /// positions to it: under a scaled or rotated node the on-screen
    /// step differs from the local one by exactly that transform.
    pub(crate) fn drag_delta(
        self,
        tree: &Tree,
        cur: Point,
        prev: Point,
    ) -> Option<(NodeId, Vec2)> {
        let node = self.moving?;
        if !tree.is_started(node) {
            return None;
        }
        let cur = tree.to_local(node, cur)?;
        let prev = tree.to_local(node, prev)?;
        Some((node, cur - prev))
    }
}
