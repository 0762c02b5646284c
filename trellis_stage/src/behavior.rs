// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-node hook interface and the context it receives.

use core::any::Any;

use kurbo::{Point, Rect, Size};
use trellis_tree::{LocalFrame, NodeId};

use crate::canvas::Canvas;
use crate::events::{DropEvent, KeyEvent, PointerEvent};
use crate::stage::Stage;

/// Node-attached logic, dispatched by the stage walks.
///
/// Every hook has a no-op default, so an implementation overrides only
/// what it reacts to. Hooks receive a [`Cx`] granting full stage access;
/// mutating the stage from inside a hook is the normal way to work.
///
/// The one restriction is reentrancy: while one of a node's hooks runs,
/// further hooks on that same node are skipped, except that frame and
/// activity notifications triggered from inside the hook are queued and
/// delivered when it returns. Other nodes are unaffected.
///
/// The `Any` supertrait allows a concrete behavior to be borrowed back
/// out of the stage with [`Stage::behavior`] and [`Stage::behavior_mut`].
///
/// # Example
///
/// ```
/// use trellis_stage::{Behavior, Cx, Stage};
/// use trellis_tree::LocalFrame;
///
/// struct Spinner {
///     speed: f64,
/// }
///
/// impl Behavior for Spinner {
///     fn on_update(&mut self, cx: &mut Cx<'_>) {
///         let id = cx.id();
///         let turned = cx.stage().tree().rotation(id).unwrap_or(0.0) + self.speed;
///         cx.stage_mut().set_rotation(id, turned);
///     }
/// }
///
/// let mut stage = Stage::new();
/// let node = stage.insert(Some(stage.root()), LocalFrame::default(), Spinner { speed: 3.0 });
/// stage.update(0.0);
/// assert_eq!(stage.tree().rotation(node), Some(3.0));
/// ```
pub trait Behavior: Any {
    /// One-time setup, fired by [`Stage::setup`] in tree order.
    fn on_setup(&mut self, _cx: &mut Cx<'_>) {}

    /// Fired once, the first time any walk reaches this node.
    fn on_start(&mut self, _cx: &mut Cx<'_>) {}

    /// Per-frame update, fired before this node's children.
    fn on_update(&mut self, _cx: &mut Cx<'_>) {}

    /// Per-frame update, fired after this node's children.
    fn post_update(&mut self, _cx: &mut Cx<'_>) {}

    /// Draws this node, under its own transform and below its children.
    fn on_draw(&mut self, _cx: &mut Cx<'_>, _canvas: &mut dyn Canvas) {}

    /// Draws over this node's children, still under its own transform.
    fn post_draw(&mut self, _cx: &mut Cx<'_>, _canvas: &mut dyn Canvas) {}

    /// Fired by [`Stage::exit`] when the host shuts down.
    fn on_exit(&mut self, _cx: &mut Cx<'_>) {}

    /// This node's own active flag flipped.
    fn on_active_changed(&mut self, _cx: &mut Cx<'_>, _active: bool) {}

    /// The conjunction of this node's and its ancestors' active flags
    /// flipped.
    fn on_effective_active_changed(&mut self, _cx: &mut Cx<'_>, _active: bool) {}

    /// A key went down.
    fn on_key_down(&mut self, _cx: &mut Cx<'_>, _event: &KeyEvent) {}

    /// A key came up.
    fn on_key_up(&mut self, _cx: &mut Cx<'_>, _event: &KeyEvent) {}

    /// The pointer moved with no button held.
    fn on_pointer_moved(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// A button was pressed, anywhere on the stage.
    fn on_pointer_pressed(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// A button was pressed while this node was topmost under the
    /// pointer. Fires before [`on_pointer_pressed`](Behavior::on_pointer_pressed).
    fn on_pressed_over(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// The pointer moved with a button held.
    fn on_pointer_dragged(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// A button was released.
    fn on_pointer_released(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// The scroll wheel moved.
    fn on_pointer_scrolled(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {}

    /// Files were dropped onto the host surface.
    fn on_files_dropped(&mut self, _cx: &mut Cx<'_>, _event: &DropEvent) {}

    /// This node's local frame changed, by any route: setters, drags,
    /// or its own hooks.
    fn on_frame_changed(&mut self, _cx: &mut Cx<'_>) {}

    /// Last call before the node's slot is reclaimed. The node is
    /// already detached; structural and timer operations on it no
    /// longer take effect.
    fn on_destroy(&mut self, _cx: &mut Cx<'_>) {}
}

/// The empty behavior: every hook keeps its no-op default.
///
/// Useful for plain container nodes whose only job is to group and
/// place their children. The stage's own root carries it.
impl Behavior for () {}

/// Hook context: the stage plus the id of the node being dispatched.
///
/// The convenience methods operate on that node; everything else is
/// reachable through [`stage`](Cx::stage) and [`stage_mut`](Cx::stage_mut).
pub struct Cx<'a> {
    stage: &'a mut Stage,
    id: NodeId,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(stage: &'a mut Stage, id: NodeId) -> Self {
        Self { stage, id }
    }

    /// The node this hook fires for.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read access to the stage.
    pub fn stage(&self) -> &Stage {
        self.stage
    }

    /// Full access to the stage.
    pub fn stage_mut(&mut self) -> &mut Stage {
        self.stage
    }

    /// Stage time of the current tick, in seconds.
    pub fn now(&self) -> f64 {
        self.stage.now()
    }

    /// This node's local frame.
    pub fn frame(&self) -> Option<LocalFrame> {
        self.stage.tree().frame(self.id)
    }

    /// Replaces this node's local frame.
    pub fn set_frame(&mut self, frame: LocalFrame) -> bool {
        self.stage.set_frame(self.id, frame)
    }

    /// This node's rectangle in parent space.
    pub fn rect(&self) -> Option<Rect> {
        self.stage.tree().rect(self.id)
    }

    /// Replaces this node's rectangle.
    pub fn set_rect(&mut self, rect: Rect) -> bool {
        self.stage.set_rect(self.id, rect)
    }

    /// This node's origin in parent space.
    pub fn position(&self) -> Option<Point> {
        self.stage.tree().position(self.id)
    }

    /// Moves this node's origin in parent space.
    pub fn set_position(&mut self, pos: Point) -> bool {
        self.stage.set_position(self.id, pos)
    }

    /// This node's size.
    pub fn size(&self) -> Option<Size> {
        self.stage.tree().size(self.id)
    }

    /// The latest pointer sample in this node's local space.
    pub fn pointer_local(&self) -> Option<Point> {
        self.stage.pointer_in(self.id)
    }

    /// The previous pointer sample in this node's local space.
    pub fn pointer_prev_local(&self) -> Option<Point> {
        self.stage.pointer_prev_in(self.id)
    }

    /// Whether the latest pointer sample lies inside this node's bounds.
    pub fn pointer_inside(&self) -> bool {
        self.stage.is_pointer_inside(self.id)
    }

    /// Whether this node is the topmost node under the pointer.
    pub fn is_topmost(&self) -> bool {
        self.stage.is_topmost(self.id)
    }

    /// Whether this node is being dragged.
    pub fn is_moving(&self) -> bool {
        self.stage.is_moving(self.id)
    }

    /// Whether the last press landed on this node while it was topmost,
    /// with no release since.
    pub fn is_pressed_over(&self) -> bool {
        self.stage.is_pressed_over(self.id)
    }

    /// Flips this node's own active flag.
    pub fn set_active(&mut self, active: bool) {
        self.stage.set_active(self.id, active);
    }

    /// Schedules a one-shot timer on this node.
    pub fn schedule(&mut self, delay: f64, f: impl FnOnce(&mut Stage) + 'static) {
        self.stage.schedule(self.id, delay, f);
    }

    /// Cancels this node's scheduled timers.
    pub fn cancel_timers(&mut self) {
        self.stage.cancel_timers(self.id);
    }

    /// Marks this node and its subtree destroyed.
    pub fn destroy(&mut self) {
        self.stage.destroy(self.id);
    }

    /// Destroys this node after `delay` seconds.
    pub fn destroy_after(&mut self, delay: f64) {
        self.stage.destroy_after(self.id, delay);
    }
}

impl core::fmt::Debug for Cx<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cx").field("id", &self.id).finish_non_exhaustive()
    }
}
