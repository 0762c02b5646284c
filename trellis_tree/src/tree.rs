// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, transforms, queries, hit resolution.

use alloc::{vec, vec::Vec};
use kurbo::{Affine, Point, Rect, Size};
use tracing::warn;

use crate::transform::{compose_local, rotation_deg_of, scale_of};
use crate::types::{LocalFrame, NodeFlags, NodeId, Pivot};
use crate::util::transform_rect_bbox;

/// Retained component tree.
///
/// Nodes carry a [`LocalFrame`] (position, size, scale, rotation, pivot) in
/// their parent's coordinate space and a set of [`NodeFlags`]. Local and
/// world matrices are recomputed eagerly: every frame setter and hierarchy
/// edit updates the affected subtree before returning, so queries never
/// observe stale geometry.
///
/// Identifiers are generational; a freed slot's old ids answer `None` (or
/// no-op) from every accessor.
///
/// ## Example
///
/// ```rust
/// use kurbo::{Point, Size};
/// use trellis_tree::{LocalFrame, Tree};
///
/// let mut tree = Tree::new();
/// let root = tree.insert(None, LocalFrame::new(Point::ZERO, Size::new(200.0, 200.0)));
/// let child = tree.insert(
///     Some(root),
///     LocalFrame::new(Point::new(50.0, 50.0), Size::new(100.0, 100.0)),
/// );
///
/// // World transforms are kept up to date eagerly.
/// assert_eq!(tree.to_world(child, Point::ZERO), Some(Point::new(50.0, 50.0)));
///
/// // The frontmost, deepest node under a world-space point wins.
/// assert_eq!(tree.topmost_at(root, Point::new(60.0, 60.0)), Some(child));
/// ```
pub struct Tree {
    /// slots
    nodes: Vec<Option<Node>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
}

impl core::fmt::Debug for Tree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("free_list", &free)
            .finish_non_exhaustive()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
struct Node {
    generation: u32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    frame: LocalFrame,
    local: Affine,
    local_inv: Affine,
    world: Affine,
    world_inv: Affine,
    flags: NodeFlags,
    started: bool,
    destroyed: bool,
}

impl Node {
    fn new(generation: u32, frame: LocalFrame) -> Self {
        let local = compose_local(&frame);
        let local_inv = local.inverse();
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            frame,
            local,
            local_inv,
            // Correct for a parentless node; refreshed on link.
            world: local,
            world_inv: local_inv,
            flags: NodeFlags::default(),
            started: false,
            destroyed: false,
        }
    }
}

impl Tree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Insert a new node as the last child of `parent` (or parentless if `None`).
    ///
    /// The node starts with default flags (active, input enabled). A frame
    /// with non-finite components is replaced by [`LocalFrame::default`].
    pub fn insert(&mut self, parent: Option<NodeId>, frame: LocalFrame) -> NodeId {
        let frame = if frame.is_finite() {
            frame
        } else {
            LocalFrame::default()
        };
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, frame));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, frame)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        let id = NodeId::new(idx, generation);
        if let Some(p) = parent
            && self.is_alive(p)
        {
            self.link_parent_at(id, p, usize::MAX);
            self.update_world(id);
        }
        id
    }

    /// Remove a node and its whole subtree, freeing every slot.
    ///
    /// All ids into the subtree become stale immediately. For the staged
    /// destroy/reap protocol, see `trellis_stage`; this is the structural
    /// primitive for callers managing a tree directly.
    pub fn remove(&mut self, id: NodeId) {
        if !self.is_alive(id) {
            return;
        }
        if let Some(parent) = self.node(id).parent {
            self.unlink_parent(id, parent);
        }
        let children = self.node(id).children.clone();
        for child in children {
            self.remove(child);
        }
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
    }

    /// Free exactly one slot, leaving the rest of the tree untouched.
    ///
    /// The caller is responsible for detaching the node and its children
    /// first; any remaining references to the freed id are stale and are
    /// skipped by traversals. Most callers want [`Tree::remove`].
    pub fn release(&mut self, id: NodeId) {
        if !self.is_alive(id) {
            return;
        }
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
    }

    /// Attach `child` under `parent` at `index`, detaching it from any
    /// current parent first.
    ///
    /// `index` is clamped: values at or beyond the child count append
    /// (frontmost), negative values prepend (backmost). If `child` is
    /// already a child of `parent` this is a pure reorder: it is removed
    /// and reinserted at the clamped index with no other side effects.
    /// Self-attachment and attaches that would create a cycle are rejected
    /// with a diagnostic.
    pub fn attach(&mut self, parent: NodeId, child: NodeId, index: isize) {
        if !self.is_alive(parent) || !self.is_alive(child) {
            return;
        }
        if parent == child {
            warn!("attach: a node cannot become its own child");
            return;
        }
        if self.is_ancestor(child, parent) {
            warn!("attach: rejected, would create a cycle");
            return;
        }
        if self.node(child).parent == Some(parent) {
            let siblings = &mut self.node_mut(parent).children;
            siblings.retain(|c| *c != child);
            let at = clamp_index(index, siblings.len());
            siblings.insert(at, child);
            return;
        }
        if let Some(p) = self.node(child).parent {
            self.unlink_parent(child, p);
        }
        let at = clamp_index(index, self.node(parent).children.len());
        self.link_parent_at(child, parent, at);
        self.update_world(child);
    }

    /// Detach `child` from its parent, leaving it parentless.
    ///
    /// No-op when the node is already parentless or stale. The subtree's
    /// world transforms are recomputed against the identity parent.
    pub fn detach(&mut self, child: NodeId) {
        if !self.is_alive(child) {
            return;
        }
        if let Some(parent) = self.node(child).parent {
            self.unlink_parent(child, parent);
            self.update_world(child);
        }
    }

    /// Exchange the z-positions of two children of `parent`.
    ///
    /// Out-of-range indices are reported and ignored; equal indices no-op.
    pub fn swap_children(&mut self, parent: NodeId, a: usize, b: usize) {
        let Some(n) = self.node_opt_mut(parent) else {
            return;
        };
        let len = n.children.len();
        if a >= len || b >= len {
            warn!(a, b, len, "swap_children: index out of range");
            return;
        }
        if a == b {
            return;
        }
        n.children.swap(a, b);
    }

    // --- frame setters ---

    /// Replace a node's whole local frame.
    ///
    /// Returns `true` when the frame actually changed. Frames with
    /// non-finite components are rejected without mutating (silently, as
    /// are all geometry setters); equal frames no-op. On change, the
    /// node's local matrices and the whole subtree's world matrices are
    /// recomputed before returning.
    pub fn set_frame(&mut self, id: NodeId, frame: LocalFrame) -> bool {
        if !frame.is_finite() {
            return false;
        }
        let Some(n) = self.node_opt_mut(id) else {
            return false;
        };
        if n.frame == frame {
            return false;
        }
        n.frame = frame;
        n.local = compose_local(&frame);
        n.local_inv = n.local.inverse();
        self.update_world(id);
        true
    }

    /// Set the node's rectangle (position and size in parent space).
    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(id, LocalFrame { rect, ..f })
    }

    /// Set the node's position (rectangle origin in parent space).
    pub fn set_position(&mut self, id: NodeId, pos: Point) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(
            id,
            LocalFrame {
                rect: f.rect.with_origin(pos),
                ..f
            },
        )
    }

    /// Position the node so its rectangle centers on `center` (parent space).
    pub fn set_center_position(&mut self, id: NodeId, center: Point) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        let origin = center - f.rect.size().to_vec2() / 2.0;
        self.set_position(id, origin)
    }

    /// Set the node's size, keeping its origin.
    ///
    /// With a [`Pivot::Center`] pivot this also moves the pivot point, so
    /// the local matrix changes even under unit scale and zero rotation.
    pub fn set_size(&mut self, id: NodeId, size: Size) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(
            id,
            LocalFrame {
                rect: f.rect.with_size(size),
                ..f
            },
        )
    }

    /// Set the node's uniform scale factor.
    pub fn set_scale(&mut self, id: NodeId, scale: f64) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(id, LocalFrame { scale, ..f })
    }

    /// Set the node's rotation in degrees.
    pub fn set_rotation(&mut self, id: NodeId, rotation: f64) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(id, LocalFrame { rotation, ..f })
    }

    /// Set the anchor used for scale and rotation.
    pub fn set_pivot(&mut self, id: NodeId, pivot: Pivot) -> bool {
        let Some(f) = self.frame(id) else {
            return false;
        };
        self.set_frame(id, LocalFrame { pivot, ..f })
    }

    // --- frame getters ---

    /// The node's local frame, or `None` for stale ids.
    pub fn frame(&self, id: NodeId) -> Option<LocalFrame> {
        self.node_opt(id).map(|n| n.frame)
    }

    /// The node's rectangle in parent space.
    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.node_opt(id).map(|n| n.frame.rect)
    }

    /// The node's position (rectangle origin) in parent space.
    pub fn position(&self, id: NodeId) -> Option<Point> {
        self.node_opt(id).map(|n| n.frame.rect.origin())
    }

    /// The center of the node's rectangle in parent space.
    pub fn center_position(&self, id: NodeId) -> Option<Point> {
        self.node_opt(id).map(|n| n.frame.rect.center())
    }

    /// The node's size.
    pub fn size(&self, id: NodeId) -> Option<Size> {
        self.node_opt(id).map(|n| n.frame.rect.size())
    }

    /// The node's uniform scale factor.
    pub fn scale(&self, id: NodeId) -> Option<f64> {
        self.node_opt(id).map(|n| n.frame.scale)
    }

    /// The node's rotation in degrees.
    pub fn rotation(&self, id: NodeId) -> Option<f64> {
        self.node_opt(id).map(|n| n.frame.rotation)
    }

    /// The node's pivot.
    pub fn pivot(&self, id: NodeId) -> Option<Pivot> {
        self.node_opt(id).map(|n| n.frame.pivot)
    }

    // --- transforms and coordinate conversion ---

    /// The node's local (parent-relative) matrix.
    pub fn local_transform(&self, id: NodeId) -> Option<Affine> {
        self.node_opt(id).map(|n| n.local)
    }

    /// The inverse of the node's local matrix.
    pub fn local_inverse(&self, id: NodeId) -> Option<Affine> {
        self.node_opt(id).map(|n| n.local_inv)
    }

    /// The node's world matrix (local space → world space).
    pub fn world_transform(&self, id: NodeId) -> Option<Affine> {
        self.node_opt(id).map(|n| n.world)
    }

    /// The inverse of the node's world matrix (world space → local space).
    pub fn world_inverse(&self, id: NodeId) -> Option<Affine> {
        self.node_opt(id).map(|n| n.world_inv)
    }

    /// Convert a point from the node's local space to world space.
    pub fn to_world(&self, id: NodeId, p: Point) -> Option<Point> {
        self.node_opt(id).map(|n| n.world * p)
    }

    /// Convert a point from world space to the node's local space.
    pub fn to_local(&self, id: NodeId, p: Point) -> Option<Point> {
        self.node_opt(id).map(|n| n.world_inv * p)
    }

    /// The node's top-left corner in world space.
    pub fn world_position(&self, id: NodeId) -> Option<Point> {
        self.to_world(id, Point::ZERO)
    }

    /// The center of the node's bounds in world space.
    pub fn world_center_position(&self, id: NodeId) -> Option<Point> {
        let n = self.node_opt(id)?;
        Some(n.world * Point::new(n.frame.rect.width() / 2.0, n.frame.rect.height() / 2.0))
    }

    /// The uniform scale factor accumulated along the ancestor chain.
    pub fn world_scale(&self, id: NodeId) -> Option<f64> {
        self.node_opt(id).map(|n| scale_of(n.world))
    }

    /// The rotation in degrees accumulated along the ancestor chain.
    pub fn world_rotation(&self, id: NodeId) -> Option<f64> {
        self.node_opt(id).map(|n| rotation_deg_of(n.world))
    }

    /// A conservative world-space AABB of the node's local bounds.
    ///
    /// Loose under rotation: it fully contains the transformed rectangle
    /// but is not guaranteed to be tight.
    pub fn world_bounds(&self, id: NodeId) -> Option<Rect> {
        let n = self.node_opt(id)?;
        Some(transform_rect_bbox(n.world, local_bounds(n)))
    }

    /// Whether a point in the node's local space lies within its bounds.
    ///
    /// The containment test is half-open, `[0, width) × [0, height)`.
    pub fn contains_local(&self, id: NodeId, p: Point) -> bool {
        self.node_opt(id)
            .map(|n| local_bounds(n).contains(p))
            .unwrap_or(false)
    }

    // --- flags and lifecycle state ---

    /// The node's flags, or `None` for stale ids.
    pub fn flags(&self, id: NodeId) -> Option<NodeFlags> {
        self.node_opt(id).map(|n| n.flags)
    }

    /// Replace the node's flags wholesale.
    pub fn set_flags(&mut self, id: NodeId, flags: NodeFlags) {
        if let Some(n) = self.node_opt_mut(id) {
            n.flags = flags;
        }
    }

    /// Whether the node's own active flag is set.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.has_flag(id, NodeFlags::ACTIVE)
    }

    /// Set the node's own active flag.
    ///
    /// This is the raw structural bit; the stage layers change hooks and
    /// effective-state notification on top of it.
    pub fn set_active(&mut self, id: NodeId, active: bool) {
        self.set_flag(id, NodeFlags::ACTIVE, active);
    }

    /// Whether this node and every ancestor have their active flags set.
    pub fn effective_active(&self, id: NodeId) -> bool {
        let Some(n) = self.node_opt(id) else {
            return false;
        };
        if !n.flags.contains(NodeFlags::ACTIVE) {
            return false;
        }
        match n.parent {
            Some(p) => self.effective_active(p),
            None => true,
        }
    }

    /// Whether the node receives key/pointer/file-drop events.
    pub fn is_input_enabled(&self, id: NodeId) -> bool {
        self.has_flag(id, NodeFlags::INPUT_ENABLED)
    }

    /// Enable or disable event forwarding for the node (and, transitively,
    /// its subtree, which dispatch does not descend into when disabled).
    pub fn set_input_enabled(&mut self, id: NodeId, enabled: bool) {
        self.set_flag(id, NodeFlags::INPUT_ENABLED, enabled);
    }

    /// Whether the node may claim the moving slot on a press.
    pub fn is_movable(&self, id: NodeId) -> bool {
        self.has_flag(id, NodeFlags::MOVABLE)
    }

    /// Set the node's movable flag.
    ///
    /// This is the raw bit; clearing it through the stage also releases
    /// the moving slot if this node holds it.
    pub fn set_movable(&mut self, id: NodeId, movable: bool) {
        self.set_flag(id, NodeFlags::MOVABLE, movable);
    }

    /// Whether the node clips events, hits, and drawing to its bounds.
    pub fn is_constrained(&self, id: NodeId) -> bool {
        self.has_flag(id, NodeFlags::CONSTRAIN)
    }

    /// Set the node's constrain flag.
    pub fn set_constrain(&mut self, id: NodeId, constrain: bool) {
        self.set_flag(id, NodeFlags::CONSTRAIN, constrain);
    }

    /// Whether the node has completed its lazy start.
    pub fn is_started(&self, id: NodeId) -> bool {
        self.node_opt(id).map(|n| n.started).unwrap_or(false)
    }

    /// Mark the node started. Returns `true` the first time only.
    pub fn mark_started(&mut self, id: NodeId) -> bool {
        match self.node_opt_mut(id) {
            Some(n) if !n.started => {
                n.started = true;
                true
            }
            _ => false,
        }
    }

    /// Whether the node has been marked destroyed.
    pub fn is_destroyed(&self, id: NodeId) -> bool {
        self.node_opt(id).map(|n| n.destroyed).unwrap_or(false)
    }

    /// Mark the node destroyed. Returns `true` the first time only; the
    /// flag is monotonic and never clears.
    pub fn mark_destroyed(&mut self, id: NodeId) -> bool {
        match self.node_opt_mut(id) {
            Some(n) if !n.destroyed => {
                n.destroyed = true;
                true
            }
            _ => false,
        }
    }

    // --- structure queries ---

    /// Returns true if `id` refers to a live node.
    ///
    /// A `NodeId` is considered live if its slot exists and its generation
    /// matches the current generation stored in that slot.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Returns the parent of a node if live, or `None` for roots or stale ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id).and_then(|n| n.parent)
    }

    /// Get the children of a node, or empty slice if node is stale.
    ///
    /// Index 0 is backmost; the last child is frontmost (drawn last, hit
    /// first from the top).
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        match self.node_opt(id) {
            Some(n) => &n.children,
            None => &[],
        }
    }

    /// The child of `parent` at `index`, if both exist.
    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.node_opt(parent)?.children.get(index).copied()
    }

    /// Whether `ancestor` appears on `id`'s parent chain (not inclusive).
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent_of(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent_of(p);
        }
        false
    }

    // --- hit resolution ---

    /// Resolve the topmost node under a world-space point, starting at
    /// `start` (inclusive).
    ///
    /// Depth-first, children back→front, last match wins: among nodes
    /// containing the point, the frontmost-deepest one is returned.
    /// Inactive and destroyed nodes are skipped along with their subtrees.
    /// A constrained node whose bounds exclude the point hides its
    /// descendants but leaves siblings unaffected.
    pub fn topmost_at(&self, start: NodeId, point: Point) -> Option<NodeId> {
        let mut best = None;
        self.topmost_walk(start, point, &mut best);
        best
    }

    fn topmost_walk(&self, id: NodeId, point: Point, best: &mut Option<NodeId>) {
        let Some(n) = self.node_opt(id) else {
            return;
        };
        if !n.flags.contains(NodeFlags::ACTIVE) || n.destroyed {
            return;
        }
        let inside = local_bounds(n).contains(n.world_inv * point);
        if inside {
            *best = Some(id);
        }
        if n.flags.contains(NodeFlags::CONSTRAIN) && !inside {
            return;
        }
        for &child in &n.children {
            self.topmost_walk(child, point, best);
        }
    }

    // --- internals ---

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.idx()].as_ref().expect("dangling NodeId")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    fn node_opt(&self, id: NodeId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn node_opt_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    fn has_flag(&self, id: NodeId, flag: NodeFlags) -> bool {
        self.node_opt(id)
            .map(|n| n.flags.contains(flag))
            .unwrap_or(false)
    }

    fn set_flag(&mut self, id: NodeId, flag: NodeFlags, on: bool) {
        if let Some(n) = self.node_opt_mut(id) {
            n.flags.set(flag, on);
        }
    }

    fn link_parent_at(&mut self, id: NodeId, parent: NodeId, at: usize) {
        let parent_node = self.node_mut(parent);
        let at = at.min(parent_node.children.len());
        parent_node.children.insert(at, id);
        self.node_mut(id).parent = Some(parent);
    }

    fn unlink_parent(&mut self, id: NodeId, parent: NodeId) {
        let p = self.node_mut(parent);
        p.children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }

    /// Recompute the node's world matrices against its current parent and
    /// propagate down the whole subtree, root to leaves, unconditionally.
    fn update_world(&mut self, id: NodeId) {
        if !self.is_alive(id) {
            return;
        }
        let parent_tf = self
            .node(id)
            .parent
            .and_then(|p| self.node_opt(p))
            .map(|p| p.world)
            .unwrap_or(Affine::IDENTITY);
        let mut stack = vec![(id, parent_tf)];
        while let Some((id, parent_tf)) = stack.pop() {
            let Some(node) = self.node_opt_mut(id) else {
                continue;
            };
            node.world = parent_tf * node.local;
            node.world_inv = node.world.inverse();
            let world = node.world;
            // The `.rev()` is not strictly necessary, but means we visit the
            // children in the order they are given in `node.children`.
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
    }
}

/// The node's own bounds in its local space: origin-anchored, half-open.
fn local_bounds(n: &Node) -> Rect {
    Rect::from_origin_size(Point::ZERO, n.frame.rect.size())
}

fn clamp_index(index: isize, len: usize) -> usize {
    if index < 0 {
        0
    } else {
        index.unsigned_abs().min(len)
    }
}
