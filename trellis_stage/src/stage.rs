// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The stage: the runtime that drives a component tree.

use alloc::boxed::Box;
use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::{Point, Rect, Size};
use smallvec::SmallVec;
use tracing::warn;

use trellis_tree::{LocalFrame, NodeId, Pivot, Tree};

use crate::behavior::{Behavior, Cx};
use crate::canvas::Canvas;
use crate::drag::MoveController;
use crate::events::{DropEvent, KeyEvent, PointerEvent};
use crate::signal::{Callback, Signal, SignalKind, Subscription};
use crate::timer::TimerQueue;

/// A deferred hook firing for a node whose behavior is mid-dispatch.
///
/// Frame and activity notifications raised from inside one of the
/// node's own hooks are queued as these and delivered when the hook
/// returns.
#[derive(Clone, Copy, Debug)]
enum Notice {
    FrameChanged,
    ActiveChanged(bool),
    EffectiveActiveChanged(bool),
}

/// Stage-side state of a single node: its behavior, timers, and
/// notification lists.
struct Slot {
    /// `None` exactly while one of the node's hooks is on the stack.
    behavior: Option<Box<dyn Behavior>>,
    timers: TimerQueue,
    frame_changed: Signal,
    pressed: Signal,
    queued: SmallVec<[Notice; 2]>,
}

impl Slot {
    fn new(behavior: Box<dyn Behavior>) -> Self {
        Self {
            behavior: Some(behavior),
            timers: TimerQueue::default(),
            frame_changed: Signal::default(),
            pressed: Signal::default(),
            queued: SmallVec::new(),
        }
    }

    fn signal_mut(&mut self, kind: SignalKind) -> &mut Signal {
        match kind {
            SignalKind::FrameChanged => &mut self.frame_changed,
            SignalKind::Pressed => &mut self.pressed,
        }
    }
}

/// A [`Tree`] plus everything needed to run it: per-node behaviors,
/// ordered dispatch, pointer bookkeeping, the drag slot, timers, and
/// the staged destroy/reap protocol.
///
/// A host owns one `Stage` and forwards its frame loop into it:
/// [`setup`](Stage::setup) once, then [`update`](Stage::update) and
/// [`draw`](Stage::draw) every frame, input notifications as they
/// arrive, and [`exit`](Stage::exit) on shutdown. All state the runtime
/// shares across nodes (the topmost-under-pointer slot, the moving
/// slot, the live and doomed registries, pointer samples, the clock)
/// lives in stage fields, so independent stages never collide.
///
/// Within one tick every walk finishes before the next begins, and all
/// structural mutation requested mid-walk is staged: destroyed nodes
/// are reaped at the start of the next update, newly scheduled timers
/// join their queue at the next drain, and each node's child list is
/// snapshotted before recursing. Hooks may therefore freely edit the
/// tree, schedule work, or destroy nodes, their own included.
///
/// ## Example
///
/// ```rust
/// use kurbo::{Point, Size};
/// use trellis_stage::{PointerEvent, Stage};
/// use trellis_tree::LocalFrame;
///
/// let mut stage = Stage::new();
/// let panel = stage.insert(
///     Some(stage.root()),
///     LocalFrame::new(Point::new(50.0, 50.0), Size::new(100.0, 100.0)),
///     (),
/// );
/// stage.set_movable(panel, true);
/// stage.update(0.0);
///
/// // Press on the panel, drag by (10, 10), release.
/// stage.pointer_pressed(PointerEvent::with_button(Point::new(75.0, 75.0), 0));
/// assert!(stage.is_moving(panel));
/// stage.pointer_dragged(PointerEvent::with_button(Point::new(85.0, 85.0), 0));
/// assert_eq!(stage.tree().position(panel), Some(Point::new(60.0, 60.0)));
/// stage.pointer_released(PointerEvent::with_button(Point::new(85.0, 85.0), 0));
/// assert!(!stage.is_moving(panel));
/// ```
pub struct Stage {
    tree: Tree,
    root: NodeId,
    slots: HashMap<NodeId, Slot>,
    /// Started nodes, in start order.
    live: Vec<NodeId>,
    /// Destroyed nodes awaiting reap at the next update.
    doomed: Vec<NodeId>,
    mover: MoveController,
    topmost: Option<NodeId>,
    /// Node the last press landed on while topmost, until release.
    pressed: Option<NodeId>,
    pointer: Point,
    pointer_prev: Point,
    /// Stage time in seconds, as last reported by the host.
    now: f64,
    next_token: u64,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stage")
            .field("tree", &self.tree)
            .field("root", &self.root)
            .field("live", &self.live.len())
            .field("doomed", &self.doomed.len())
            .field("topmost", &self.topmost)
            .field("moving", &self.mover.moving())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl Stage {
    /// Create a stage with an empty root node.
    ///
    /// The root has a zero-sized default frame and no behavior; hosts
    /// typically size it to their surface with
    /// [`set_rect`](Stage::set_rect).
    pub fn new() -> Self {
        let mut tree = Tree::new();
        let root = tree.insert(None, LocalFrame::default());
        let mut slots = HashMap::new();
        slots.insert(root, Slot::new(Box::new(())));
        Self {
            tree,
            root,
            slots,
            live: Vec::new(),
            doomed: Vec::new(),
            mover: MoveController::default(),
            topmost: None,
            pressed: None,
            pointer: Point::ZERO,
            pointer_prev: Point::ZERO,
            now: 0.0,
            next_token: 0,
        }
    }

    /// The root node every walk starts from.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Read access to the underlying tree.
    ///
    /// Mutation goes through the stage so hooks and notifications fire;
    /// reads can go straight to the tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Stage time of the current tick, in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    // --- building the tree ---

    /// Insert a node with `behavior` as the last child of `parent`, or
    /// parentless when `None`.
    ///
    /// A parentless node is not reached by any walk until attached
    /// under the root. Nodes without interesting behavior can carry
    /// the unit behavior `()`.
    pub fn insert(
        &mut self,
        parent: Option<NodeId>,
        frame: LocalFrame,
        behavior: impl Behavior,
    ) -> NodeId {
        let id = self.tree.insert(parent, frame);
        self.slots.insert(id, Slot::new(Box::new(behavior)));
        id
    }

    /// Attach `child` under `parent` at `index`, reparenting or
    /// reordering as [`Tree::attach`] does.
    pub fn attach(&mut self, parent: NodeId, child: NodeId, index: isize) {
        self.tree.attach(parent, child, index);
    }

    /// Detach `child` from its parent, leaving it parentless.
    pub fn detach(&mut self, child: NodeId) {
        self.tree.detach(child);
    }

    /// Exchange the z-positions of two children of `parent`.
    pub fn swap_children(&mut self, parent: NodeId, a: usize, b: usize) {
        self.tree.swap_children(parent, a, b);
    }

    // --- geometry, with change notification ---

    /// Replace a node's local frame. See [`Tree::set_frame`].
    pub fn set_frame(&mut self, id: NodeId, frame: LocalFrame) -> bool {
        let changed = self.tree.set_frame(id, frame);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's rectangle. See [`Tree::set_rect`].
    pub fn set_rect(&mut self, id: NodeId, rect: Rect) -> bool {
        let changed = self.tree.set_rect(id, rect);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's position. See [`Tree::set_position`].
    pub fn set_position(&mut self, id: NodeId, pos: Point) -> bool {
        let changed = self.tree.set_position(id, pos);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Center a node's rectangle on `center`. See
    /// [`Tree::set_center_position`].
    pub fn set_center_position(&mut self, id: NodeId, center: Point) -> bool {
        let changed = self.tree.set_center_position(id, center);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's size. See [`Tree::set_size`].
    pub fn set_size(&mut self, id: NodeId, size: Size) -> bool {
        let changed = self.tree.set_size(id, size);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's uniform scale. See [`Tree::set_scale`].
    pub fn set_scale(&mut self, id: NodeId, scale: f64) -> bool {
        let changed = self.tree.set_scale(id, scale);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's rotation in degrees. See [`Tree::set_rotation`].
    pub fn set_rotation(&mut self, id: NodeId, rotation: f64) -> bool {
        let changed = self.tree.set_rotation(id, rotation);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    /// Set a node's scale/rotation pivot. See [`Tree::set_pivot`].
    pub fn set_pivot(&mut self, id: NodeId, pivot: Pivot) -> bool {
        let changed = self.tree.set_pivot(id, pivot);
        if changed {
            self.notify(id, Notice::FrameChanged);
        }
        changed
    }

    // --- flags ---

    /// Flip a node's own active flag, firing the change hooks.
    ///
    /// No-op when the flag already has that value. The node hears
    /// `on_active_changed`; if the conjunction of its and its
    /// ancestors' flags actually flipped, `on_effective_active_changed`
    /// propagates pre-order from the node into children whose own flag
    /// is set. A child that is itself inactive is not notified: its
    /// own effective state was already off and stays off.
    pub fn set_active(&mut self, id: NodeId, active: bool) {
        if !self.tree.is_alive(id) || self.tree.is_active(id) == active {
            return;
        }
        let before = self.tree.effective_active(id);
        self.tree.set_active(id, active);
        let after = self.tree.effective_active(id);
        self.notify(id, Notice::ActiveChanged(active));
        if before != after {
            self.effective_walk(id, after);
        }
    }

    /// Enable or disable input event delivery for a node (and, since
    /// dispatch does not descend past a disabled node, its subtree).
    pub fn set_input_enabled(&mut self, id: NodeId, enabled: bool) {
        self.tree.set_input_enabled(id, enabled);
    }

    /// Set whether a node may claim the moving slot on a press.
    ///
    /// Clearing the flag on the node currently being dragged releases
    /// the slot immediately.
    pub fn set_movable(&mut self, id: NodeId, movable: bool) {
        self.tree.set_movable(id, movable);
        if !movable {
            self.mover.clear_if(id);
        }
    }

    /// Set whether a node clips events, hits, and drawing to its bounds.
    pub fn set_constrain(&mut self, id: NodeId, constrain: bool) {
        self.tree.set_constrain(id, constrain);
    }

    // --- pointer and hit state ---

    /// The latest pointer sample, in world coordinates.
    pub fn pointer(&self) -> Point {
        self.pointer
    }

    /// The previous pointer sample, in world coordinates.
    pub fn pointer_prev(&self) -> Point {
        self.pointer_prev
    }

    /// The latest pointer sample in a node's local space.
    pub fn pointer_in(&self, id: NodeId) -> Option<Point> {
        self.tree.to_local(id, self.pointer)
    }

    /// The previous pointer sample in a node's local space.
    pub fn pointer_prev_in(&self, id: NodeId) -> Option<Point> {
        self.tree.to_local(id, self.pointer_prev)
    }

    /// Whether the latest pointer sample lies inside a node's bounds.
    pub fn is_pointer_inside(&self, id: NodeId) -> bool {
        match self.pointer_in(id) {
            Some(local) => self.tree.contains_local(id, local),
            None => false,
        }
    }

    /// The topmost node under the pointer, as of the last input event.
    pub fn topmost(&self) -> Option<NodeId> {
        self.topmost
    }

    /// Whether `id` is the topmost node under the pointer.
    pub fn is_topmost(&self, id: NodeId) -> bool {
        self.topmost == Some(id)
    }

    /// The node currently holding the moving slot, if any.
    ///
    /// Holding the slot precedes actually moving: see
    /// [`is_moving`](Stage::is_moving).
    pub fn moving(&self) -> Option<NodeId> {
        self.mover.moving()
    }

    /// Whether `id` holds the moving slot and has completed its lazy
    /// start, i.e. is actually following the pointer.
    pub fn is_moving(&self, id: NodeId) -> bool {
        self.mover.is_moving(&self.tree, id)
    }

    /// The node the last press landed on while it was topmost, with no
    /// release since. Stays set while the pointer drags off the node.
    pub fn pressed_over(&self) -> Option<NodeId> {
        self.pressed
    }

    /// Whether `id` took the last press while topmost, with no release
    /// since.
    pub fn is_pressed_over(&self, id: NodeId) -> bool {
        self.pressed == Some(id)
    }

    /// Started nodes, in start order, not yet reaped.
    pub fn live_nodes(&self) -> &[NodeId] {
        &self.live
    }

    // --- behaviors ---

    /// Borrow a node's behavior as its concrete type.
    ///
    /// `None` for stale ids, a behavior of a different type, or while
    /// one of the node's own hooks is on the stack.
    pub fn behavior<T: Behavior>(&self, id: NodeId) -> Option<&T> {
        let b = self.slots.get(&id)?.behavior.as_deref()?;
        (b as &dyn core::any::Any).downcast_ref::<T>()
    }

    /// Mutably borrow a node's behavior as its concrete type.
    pub fn behavior_mut<T: Behavior>(&mut self, id: NodeId) -> Option<&mut T> {
        let b = self.slots.get_mut(&id)?.behavior.as_deref_mut()?;
        (b as &mut dyn core::any::Any).downcast_mut::<T>()
    }

    // --- timers ---

    /// Schedule `f` to run once on this stage, `delay` seconds from the
    /// current tick, owned by node `id`.
    ///
    /// The timer joins the node's queue at its next drain (the next
    /// update tick), so a callback scheduling a follow-up never sees it
    /// run in the same drain. Destroying the node cancels it. There is
    /// no per-timer handle; [`cancel_timers`](Stage::cancel_timers)
    /// drops the node's whole queue.
    pub fn schedule(&mut self, id: NodeId, delay: f64, f: impl FnOnce(&mut Self) + 'static) {
        if !self.tree.is_alive(id) || self.tree.is_destroyed(id) {
            return;
        }
        if !delay.is_finite() {
            warn!(delay, "schedule: non-finite delay ignored");
            return;
        }
        let now = self.now;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.timers.schedule(now, delay, Box::new(f));
        }
    }

    /// Mark every timer owned by `id` canceled. They are dropped, not
    /// run, at the node's next drain.
    pub fn cancel_timers(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.timers.cancel_all();
        }
    }

    /// Pause or resume the timers of `id` and every descendant.
    ///
    /// Resuming shifts each deadline by the time spent paused, so the
    /// remaining delay is preserved.
    pub fn set_timers_paused(&mut self, id: NodeId, paused: bool) {
        if !self.tree.is_alive(id) {
            return;
        }
        let now = self.now;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.timers.set_paused(now, paused);
        }
        for child in self.child_snapshot(id) {
            self.set_timers_paused(child, paused);
        }
    }

    // --- destruction ---

    /// Mark `id` and its whole subtree destroyed.
    ///
    /// Idempotent. Marking takes effect immediately: the subtree's
    /// hooks stop firing, its timers are canceled, and the moving slot
    /// is released if a marked node held it. Physical removal is
    /// deferred to the start of the next update, so a node may destroy
    /// itself, or any other node, from inside a hook mid-walk. Until
    /// then its geometry reads keep answering with their last computed
    /// values.
    pub fn destroy(&mut self, id: NodeId) {
        if !self.tree.is_alive(id) || self.tree.is_destroyed(id) {
            return;
        }
        self.tree.mark_destroyed(id);
        self.mover.clear_if(id);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.timers.cancel_all();
        }
        // Unstarted nodes were never registered; reap has no entry to
        // process for them and their slots are reclaimed when a reaped
        // ancestor detaches them.
        if self.tree.is_started(id) {
            self.doomed.push(id);
        }
        for child in self.child_snapshot(id) {
            self.destroy(child);
        }
    }

    /// Destroy `id` after `delay` seconds, via a timer on the node
    /// itself.
    ///
    /// Preemptible only by an earlier [`destroy`](Stage::destroy) call,
    /// which cancels the timer along with the rest of the node's queue.
    pub fn destroy_after(&mut self, id: NodeId, delay: f64) {
        if !self.tree.is_alive(id) || self.tree.is_destroyed(id) {
            return;
        }
        self.schedule(id, delay, move |stage| stage.destroy(id));
    }

    // --- pub/sub ---

    /// Subscribe to `id`'s local frame changes.
    ///
    /// The callback fires after the node's own `on_frame_changed` hook,
    /// every time a setter or drag actually changes the frame.
    pub fn observe_frame_changed(
        &mut self,
        id: NodeId,
        f: impl FnMut(&mut Self, NodeId) + 'static,
    ) -> Subscription {
        self.observe(id, SignalKind::FrameChanged, Box::new(f))
    }

    /// Subscribe to presses that land on `id` while it is topmost.
    ///
    /// The callback fires after the node's own `on_pressed_over` hook.
    pub fn observe_pressed(
        &mut self,
        id: NodeId,
        f: impl FnMut(&mut Self, NodeId) + 'static,
    ) -> Subscription {
        self.observe(id, SignalKind::Pressed, Box::new(f))
    }

    /// Drop a subscription. No-op for stale handles.
    pub fn unobserve(&mut self, sub: Subscription) {
        if let Some(slot) = self.slots.get_mut(&sub.node()) {
            slot.signal_mut(sub.kind()).unsubscribe(sub);
        }
    }

    fn observe(&mut self, id: NodeId, kind: SignalKind, callback: Callback) -> Subscription {
        self.next_token += 1;
        let sub = Subscription::new(id, kind, self.next_token);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.signal_mut(kind).subscribe(sub, callback);
        }
        sub
    }

    // --- host entry points: lifecycle ---

    /// One-time setup, forwarded pre-order to every node's `on_setup`.
    ///
    /// Hosts call this once, before the first update or draw.
    pub fn setup(&mut self) {
        let root = self.root;
        self.setup_walk(root);
    }

    /// Advance the stage clock to `now` (seconds) and run the update
    /// walk.
    ///
    /// In order: the clock is stored (a non-finite `now` is ignored and
    /// the previous clock kept), doomed nodes are reaped, then every
    /// node pre-order gets its lazy start, its timer drain (regardless
    /// of its active flag), and, unless inactive or destroyed,
    /// `on_update`, its children's visits, and `post_update`.
    pub fn update(&mut self, now: f64) {
        if now.is_finite() {
            self.now = now;
        } else {
            warn!(now, "update: non-finite clock ignored");
        }
        self.reap();
        let root = self.root;
        self.update_walk(root);
    }

    /// Run the draw walk against `canvas`.
    ///
    /// Every visited node is bracketed by a transform push/pop; its
    /// `on_draw` runs below its children and `post_draw` above them,
    /// each inside a style save/restore; a constrained node's subtree
    /// draws inside an offscreen layer sized to the node.
    pub fn draw(&mut self, canvas: &mut dyn Canvas) {
        let root = self.root;
        self.draw_walk(root, canvas);
    }

    /// Host shutdown, forwarded pre-order to every node's `on_exit`,
    /// active or not.
    pub fn exit(&mut self) {
        let root = self.root;
        self.exit_walk(root);
    }

    // --- host entry points: input ---

    /// A key went down.
    pub fn key_down(&mut self, event: KeyEvent) {
        self.refresh_topmost();
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_key_down(cx, &event));
        });
    }

    /// A key came up.
    pub fn key_up(&mut self, event: KeyEvent) {
        self.refresh_topmost();
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_key_up(cx, &event));
        });
    }

    /// The pointer moved with no button held.
    pub fn pointer_moved(&mut self, event: PointerEvent) {
        self.sample_pointer(event.pos);
        self.refresh_topmost();
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_pointer_moved(cx, &event));
        });
    }

    /// A pointer button was pressed.
    ///
    /// Before dispatch: the pointer samples advance, the topmost node
    /// is re-resolved, the moving slot is claimed if it was idle and
    /// the topmost node is movable, and the pressed-over slot is set.
    /// During the walk the topmost node hears `on_pressed_over` (and
    /// its pressed signal fires) ahead of its `on_pointer_pressed`.
    pub fn pointer_pressed(&mut self, event: PointerEvent) {
        self.sample_pointer(event.pos);
        self.refresh_topmost();
        let _ = self.mover.claim(&self.tree, self.topmost);
        self.pressed = self.topmost;
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            if stage.pressed == Some(id) {
                stage.with_behavior(id, |b, cx| b.on_pressed_over(cx, &event));
                stage.fire_signal(id, SignalKind::Pressed);
            }
            stage.with_behavior(id, |b, cx| b.on_pointer_pressed(cx, &event));
        });
    }

    /// The pointer moved with a button held.
    ///
    /// If a started node holds the moving slot, its position advances
    /// by the pointer step expressed in its own local space before the
    /// walk, so drag hooks observe the new frame.
    pub fn pointer_dragged(&mut self, event: PointerEvent) {
        self.sample_pointer(event.pos);
        self.refresh_topmost();
        if let Some((node, delta)) =
            self.mover.drag_delta(&self.tree, self.pointer, self.pointer_prev)
            && let Some(pos) = self.tree.position(node)
        {
            self.set_position(node, pos + delta);
        }
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_pointer_dragged(cx, &event));
        });
    }

    /// A pointer button was released. Empties the moving and
    /// pressed-over slots before the walk.
    pub fn pointer_released(&mut self, event: PointerEvent) {
        self.sample_pointer(event.pos);
        self.refresh_topmost();
        let _ = self.mover.release();
        self.pressed = None;
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_pointer_released(cx, &event));
        });
    }

    /// The scroll wheel moved. Does not advance the pointer samples.
    pub fn pointer_scrolled(&mut self, event: PointerEvent) {
        self.refresh_topmost();
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_pointer_scrolled(cx, &event));
        });
    }

    /// Files were dropped onto the host surface. Does not advance the
    /// pointer samples.
    pub fn files_dropped(&mut self, event: DropEvent) {
        self.refresh_topmost();
        let root = self.root;
        self.input_walk(root, &mut |stage, id| {
            stage.with_behavior(id, |b, cx| b.on_files_dropped(cx, &event));
        });
    }

    // --- walks ---

    fn setup_walk(&mut self, id: NodeId) {
        if !self.tree.is_alive(id) || self.tree.is_destroyed(id) {
            return;
        }
        self.with_behavior(id, |b, cx| b.on_setup(cx));
        for child in self.child_snapshot(id) {
            self.setup_walk(child);
        }
    }

    fn update_walk(&mut self, id: NodeId) {
        if !self.tree.is_alive(id) {
            return;
        }
        self.lazy_start(id);
        let now = self.now;
        let due = match self.slots.get_mut(&id) {
            Some(slot) => slot.timers.take_due(now),
            None => SmallVec::new(),
        };
        for f in due {
            f(self);
        }
        // Timers run above may have flipped either gate.
        if !self.tree.is_active(id) || self.tree.is_destroyed(id) {
            return;
        }
        self.with_behavior(id, |b, cx| b.on_update(cx));
        for child in self.child_snapshot(id) {
            self.update_walk(child);
        }
        // The node may have destroyed itself from its own hook or a
        // descendant's; destroyed hooks never fire.
        if !self.tree.is_destroyed(id) {
            self.with_behavior(id, |b, cx| b.post_update(cx));
        }
    }

    fn draw_walk(&mut self, id: NodeId, canvas: &mut dyn Canvas) {
        if !self.tree.is_alive(id) {
            return;
        }
        self.lazy_start(id);
        if !self.tree.is_active(id) || self.tree.is_destroyed(id) {
            return;
        }
        let Some(local) = self.tree.local_transform(id) else {
            return;
        };
        canvas.push_transform(local);
        let constrained = self.tree.is_constrained(id);
        if constrained {
            canvas.begin_layer(self.tree.size(id).unwrap_or_default());
        }
        canvas.push_style();
        self.with_behavior(id, |b, cx| b.on_draw(cx, &mut *canvas));
        canvas.pop_style();
        for child in self.child_snapshot(id) {
            self.draw_walk(child, canvas);
        }
        canvas.push_style();
        if !self.tree.is_destroyed(id) {
            self.with_behavior(id, |b, cx| b.post_draw(cx, &mut *canvas));
        }
        canvas.pop_style();
        if constrained {
            canvas.end_layer();
        }
        canvas.pop_transform();
    }

    fn exit_walk(&mut self, id: NodeId) {
        if !self.tree.is_alive(id) || self.tree.is_destroyed(id) {
            return;
        }
        self.with_behavior(id, |b, cx| b.on_exit(cx));
        for child in self.child_snapshot(id) {
            self.exit_walk(child);
        }
    }

    /// The shared input recursion: gate, fire, descend.
    ///
    /// A node and its subtree are skipped when the node is inactive,
    /// destroyed, or input-disabled. A constrained node whose bounds
    /// exclude the current pointer sample fires its own handler but
    /// hides its children; siblings are unaffected.
    fn input_walk<F: FnMut(&mut Self, NodeId)>(&mut self, id: NodeId, fire: &mut F) {
        if !self.tree.is_alive(id)
            || !self.tree.is_active(id)
            || self.tree.is_destroyed(id)
            || !self.tree.is_input_enabled(id)
        {
            return;
        }
        fire(self, id);
        if self.tree.is_constrained(id) && !self.is_pointer_inside(id) {
            return;
        }
        for child in self.child_snapshot(id) {
            self.input_walk(child, fire);
        }
    }

    fn effective_walk(&mut self, id: NodeId, state: bool) {
        self.notify(id, Notice::EffectiveActiveChanged(state));
        for child in self.child_snapshot(id) {
            if self.tree.is_active(child) {
                self.effective_walk(child, state);
            }
        }
    }

    // --- lifecycle internals ---

    fn lazy_start(&mut self, id: NodeId) {
        if self.tree.is_destroyed(id) {
            return;
        }
        if self.tree.mark_started(id) {
            self.live.push(id);
            self.with_behavior(id, |b, cx| b.on_start(cx));
        }
    }

    /// Physically remove the nodes destroyed since the last tick.
    ///
    /// Destroys issued from inside an `on_destroy` hook land in a fresh
    /// doomed list and reap on the next tick.
    fn reap(&mut self) {
        if self.doomed.is_empty() {
            return;
        }
        let doomed = core::mem::take(&mut self.doomed);
        for id in doomed {
            if !self.tree.is_alive(id) || !self.tree.is_destroyed(id) {
                continue;
            }
            // Children merely lose this parent; started destroyed ones
            // sit later in this list and reap on their own entries.
            for child in self.child_snapshot(id) {
                self.tree.detach(child);
                if self.tree.is_destroyed(child) && !self.tree.is_started(child) {
                    self.release_inert(child);
                }
            }
            self.tree.detach(id);
            self.with_behavior(id, |b, cx| b.on_destroy(cx));
            self.live.retain(|n| *n != id);
            self.slots.remove(&id);
            self.tree.release(id);
        }
    }

    /// Reclaim a destroyed node that never started: pure structural
    /// cleanup, no hooks.
    fn release_inert(&mut self, id: NodeId) {
        for child in self.child_snapshot(id) {
            self.tree.detach(child);
            if self.tree.is_destroyed(child) && !self.tree.is_started(child) {
                self.release_inert(child);
            }
        }
        self.slots.remove(&id);
        self.tree.release(id);
    }

    // --- dispatch internals ---

    /// Take a node's behavior out, run `f` against it with a fresh
    /// [`Cx`], and put it back.
    ///
    /// Returns `false` without calling `f` when the node has no slot or
    /// its behavior is already out (a reentrant dispatch). Notices
    /// queued while the behavior was out are flushed after it returns.
    fn with_behavior(&mut self, id: NodeId, f: impl FnOnce(&mut dyn Behavior, &mut Cx<'_>)) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        let Some(mut behavior) = slot.behavior.take() else {
            return false;
        };
        {
            let mut cx = Cx::new(self, id);
            f(behavior.as_mut(), &mut cx);
        }
        match self.slots.get_mut(&id) {
            Some(slot) => slot.behavior = Some(behavior),
            // Slot reclaimed while the hook ran; the behavior drops here.
            None => return true,
        }
        self.flush_queued(id);
        true
    }

    fn flush_queued(&mut self, id: NodeId) {
        loop {
            let Some(slot) = self.slots.get_mut(&id) else {
                return;
            };
            if slot.queued.is_empty() {
                return;
            }
            let notice = slot.queued.remove(0);
            self.fire_notice(id, notice);
        }
    }

    /// Deliver a frame/activity notification to `id`, queueing it when
    /// one of the node's own hooks is on the stack.
    fn notify(&mut self, id: NodeId, notice: Notice) {
        if self.tree.is_destroyed(id) {
            return;
        }
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        if slot.behavior.is_none() {
            slot.queued.push(notice);
            return;
        }
        self.fire_notice(id, notice);
    }

    fn fire_notice(&mut self, id: NodeId, notice: Notice) {
        match notice {
            Notice::FrameChanged => {
                self.with_behavior(id, |b, cx| b.on_frame_changed(cx));
                self.fire_signal(id, SignalKind::FrameChanged);
            }
            Notice::ActiveChanged(active) => {
                self.with_behavior(id, |b, cx| b.on_active_changed(cx, active));
            }
            Notice::EffectiveActiveChanged(active) => {
                self.with_behavior(id, |b, cx| b.on_effective_active_changed(cx, active));
            }
        }
    }

    fn fire_signal(&mut self, id: NodeId, kind: SignalKind) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        let mut fired = slot.signal_mut(kind).begin_fire();
        for (_, callback) in fired.iter_mut() {
            callback(self, id);
        }
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.signal_mut(kind).end_fire(fired);
        }
    }

    // --- small helpers ---

    fn sample_pointer(&mut self, pos: Point) {
        self.pointer_prev = self.pointer;
        self.pointer = pos;
    }

    fn refresh_topmost(&mut self) {
        self.topmost = self.tree.topmost_at(self.root, self.pointer);
    }

    fn child_snapshot(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        self.tree.children_of(id).iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    use kurbo::{Affine, Point, Rect, Size};
    use trellis_tree::{LocalFrame, NodeId};

    use super::Stage;
    use crate::behavior::{Behavior, Cx};
    use crate::canvas::Canvas;
    use crate::events::{DropEvent, KeyEvent, PointerEvent};

    #[derive(Clone, Default)]
    struct Log(Rc<RefCell<Vec<String>>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.borrow_mut().push(entry);
        }

        fn take(&self) -> Vec<String> {
            core::mem::take(&mut *self.0.borrow_mut())
        }
    }

    /// Records every hook it hears as `"name:hook"`.
    struct Probe {
        name: &'static str,
        log: Log,
    }

    impl Probe {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: log.clone(),
            }
        }
    }

    impl Behavior for Probe {
        fn on_setup(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:setup", self.name));
        }
        fn on_start(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:start", self.name));
        }
        fn on_update(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:update", self.name));
        }
        fn post_update(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:post_update", self.name));
        }
        fn on_draw(&mut self, _cx: &mut Cx<'_>, _canvas: &mut dyn Canvas) {
            self.log.push(format!("{}:draw", self.name));
        }
        fn post_draw(&mut self, _cx: &mut Cx<'_>, _canvas: &mut dyn Canvas) {
            self.log.push(format!("{}:post_draw", self.name));
        }
        fn on_exit(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:exit", self.name));
        }
        fn on_active_changed(&mut self, _cx: &mut Cx<'_>, active: bool) {
            self.log.push(format!("{}:active={active}", self.name));
        }
        fn on_effective_active_changed(&mut self, _cx: &mut Cx<'_>, active: bool) {
            self.log.push(format!("{}:effective={active}", self.name));
        }
        fn on_key_down(&mut self, _cx: &mut Cx<'_>, event: &KeyEvent) {
            self.log.push(format!("{}:key={}", self.name, event.code));
        }
        fn on_pointer_moved(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {
            self.log.push(format!("{}:moved", self.name));
        }
        fn on_pressed_over(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {
            self.log.push(format!("{}:pressed_over", self.name));
        }
        fn on_pointer_pressed(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {
            self.log.push(format!("{}:pressed", self.name));
        }
        fn on_pointer_released(&mut self, _cx: &mut Cx<'_>, _event: &PointerEvent) {
            self.log.push(format!("{}:released", self.name));
        }
        fn on_files_dropped(&mut self, _cx: &mut Cx<'_>, event: &DropEvent) {
            self.log.push(format!("{}:dropped={}", self.name, event.paths.len()));
        }
        fn on_frame_changed(&mut self, _cx: &mut Cx<'_>) {
            self.log.push(format!("{}:frame", self.name));
        }
        fn on_destroy(&mut self, cx: &mut Cx<'_>) {
            let children = cx.stage().tree().children_of(cx.id()).len();
            self.log.push(format!("{}:destroy[{children}]", self.name));
        }
    }

    struct RecordingCanvas {
        calls: Vec<String>,
    }

    impl RecordingCanvas {
        fn new() -> Self {
            Self { calls: Vec::new() }
        }
    }

    impl Canvas for RecordingCanvas {
        fn push_transform(&mut self, _transform: Affine) {
            self.calls.push(String::from("push_tf"));
        }
        fn pop_transform(&mut self) {
            self.calls.push(String::from("pop_tf"));
        }
        fn push_style(&mut self) {
            self.calls.push(String::from("push_style"));
        }
        fn pop_style(&mut self) {
            self.calls.push(String::from("pop_style"));
        }
        fn begin_layer(&mut self, size: Size) {
            self.calls.push(format!("begin_layer {}x{}", size.width, size.height));
        }
        fn end_layer(&mut self) {
            self.calls.push(String::from("end_layer"));
        }
    }

    fn frame(x: f64, y: f64, w: f64, h: f64) -> LocalFrame {
        LocalFrame::new(Point::new(x, y), Size::new(w, h))
    }

    /// A stage with a sized root, so pointer positions inside the
    /// surface resolve against it as a fallback.
    fn sized_stage() -> Stage {
        let mut stage = Stage::new();
        let root = stage.root();
        stage.set_rect(root, Rect::new(0.0, 0.0, 500.0, 500.0));
        stage
    }

    #[test]
    fn lazy_start_precedes_update_and_runs_once() {
        let log = Log::default();
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("p", &log));
        let _child = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("c", &log));

        stage.update(0.0);
        assert_eq!(
            log.take(),
            vec![
                "p:start",
                "p:update",
                "c:start",
                "c:update",
                "c:post_update",
                "p:post_update",
            ]
        );

        stage.update(0.1);
        assert_eq!(
            log.take(),
            vec!["p:update", "c:update", "c:post_update", "p:post_update"],
            "start must not fire again"
        );
        assert_eq!(stage.live_nodes().len(), 3, "root, parent, child");
    }

    #[test]
    fn draw_also_lazy_starts() {
        let log = Log::default();
        let mut stage = Stage::new();
        stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));

        stage.draw(&mut crate::canvas::NullCanvas);
        assert_eq!(log.take(), vec!["n:start", "n:draw", "n:post_draw"]);
    }

    #[test]
    fn inactive_nodes_skip_hooks_but_drain_timers() {
        let log = Log::default();
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));
        stage.update(0.0);
        log.take();

        stage.set_active(n, false);
        assert_eq!(log.take(), vec!["n:active=false", "n:effective=false"]);

        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        stage.schedule(n, 1.0, move |_| *counter.borrow_mut() += 1);
        stage.update(2.0);
        assert_eq!(*hits.borrow(), 1, "timers drain regardless of the active flag");
        assert_eq!(log.take(), Vec::<String>::new(), "no update hooks while inactive");
    }

    #[test]
    fn effective_active_recursion_skips_inactive_children() {
        let log = Log::default();
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("p", &log));
        let on = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("on", &log));
        let off = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("off", &log));
        let _deep = stage.insert(Some(on), frame(0.0, 0.0, 2.0, 2.0), Probe::new("deep", &log));
        stage.set_active(off, false);
        log.take();

        stage.set_active(parent, false);
        assert_eq!(
            log.take(),
            vec![
                "p:active=false",
                "p:effective=false",
                "on:effective=false",
                "deep:effective=false",
            ],
            "a child whose own flag is off is not notified"
        );

        // Idempotent: same value, no hooks.
        stage.set_active(parent, false);
        assert_eq!(log.take(), Vec::<String>::new());

        // An ancestor already forces false: own hook fires, effective
        // state does not actually flip, so no propagation.
        stage.set_active(on, false);
        assert_eq!(log.take(), vec!["on:active=false"]);
    }

    #[test]
    fn draw_brackets_layers_and_styles() {
        let log = Log::default();
        let mut stage = Stage::new();
        let panel = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 80.0), Probe::new("p", &log));
        stage.set_constrain(panel, true);
        let _inner = stage.insert(Some(panel), frame(10.0, 10.0, 20.0, 20.0), Probe::new("i", &log));

        let mut canvas = RecordingCanvas::new();
        stage.draw(&mut canvas);
        assert_eq!(
            canvas.calls,
            vec![
                // root
                "push_tf",
                "push_style",
                "pop_style",
                // panel, clipped
                "push_tf",
                "begin_layer 100x80",
                "push_style",
                "pop_style",
                // inner
                "push_tf",
                "push_style",
                "pop_style",
                "push_style",
                "pop_style",
                "pop_tf",
                // panel post
                "push_style",
                "pop_style",
                "end_layer",
                "pop_tf",
                // root post
                "push_style",
                "pop_style",
                "pop_tf",
            ]
        );
        assert_eq!(
            log.take(),
            vec!["p:start", "p:draw", "i:start", "i:draw", "i:post_draw", "p:post_draw"]
        );
    }

    #[test]
    fn setup_and_exit_ignore_the_active_gate() {
        let log = Log::default();
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));
        stage.set_active(n, false);
        log.take();

        stage.setup();
        stage.exit();
        assert_eq!(log.take(), vec!["n:setup", "n:exit"]);
    }

    #[test]
    fn end_to_end_press_drag_release() {
        let log = Log::default();
        let mut stage = sized_stage();
        let root = stage.root();
        let a = stage.insert(Some(root), frame(0.0, 0.0, 100.0, 100.0), Probe::new("a", &log));
        let b = stage.insert(Some(root), frame(50.0, 50.0, 100.0, 100.0), Probe::new("b", &log));
        stage.set_movable(a, true);
        stage.set_movable(b, true);
        stage.update(0.0);
        log.take();

        // Both contain (75, 75); the later sibling is in front.
        stage.pointer_pressed(PointerEvent::with_button(Point::new(75.0, 75.0), 0));
        assert_eq!(stage.topmost(), Some(b));
        assert!(stage.is_moving(b));
        assert!(!stage.is_moving(a), "one moving node at a time");
        assert!(stage.is_pressed_over(b));
        assert!(!stage.is_pressed_over(a));
        assert_eq!(
            log.take(),
            vec!["a:pressed", "b:pressed_over", "b:pressed"],
            "only the topmost node hears pressed_over"
        );

        // A second press in the same held state cannot steal the slot.
        stage.pointer_pressed(PointerEvent::with_button(Point::new(25.0, 25.0), 0));
        assert!(stage.is_moving(b));
        assert!(!stage.is_moving(a));
        log.take();

        stage.pointer_dragged(PointerEvent::with_button(Point::new(35.0, 35.0), 0));
        assert_eq!(stage.tree().position(b), Some(Point::new(60.0, 60.0)));
        assert_eq!(stage.tree().position(a), Some(Point::ZERO));

        stage.pointer_released(PointerEvent::with_button(Point::new(35.0, 35.0), 0));
        assert!(!stage.is_moving(b));
        assert_eq!(stage.moving(), None);
        assert_eq!(stage.pressed_over(), None);
    }

    #[test]
    fn drag_ends_when_the_holder_loses_movable_or_is_destroyed() {
        let mut stage = sized_stage();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 100.0), ());
        stage.set_movable(n, true);
        stage.update(0.0);

        stage.pointer_pressed(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        assert!(stage.is_moving(n));
        stage.set_movable(n, false);
        assert!(!stage.is_moving(n));
        assert_eq!(stage.moving(), None);

        stage.set_movable(n, true);
        stage.pointer_released(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        stage.pointer_pressed(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        assert!(stage.is_moving(n));
        stage.destroy(n);
        assert_eq!(stage.moving(), None);
    }

    #[test]
    fn constrain_hides_children_from_pointer_events() {
        let log = Log::default();
        let mut stage = sized_stage();
        let panel = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 100.0), ());
        stage.set_constrain(panel, true);
        // Overhangs the panel to the right.
        let _child = stage.insert(Some(panel), frame(80.0, 10.0, 60.0, 20.0), Probe::new("c", &log));
        stage.update(0.0);
        log.take();

        // Over the overhang, outside the panel: clipped from both the
        // hit result and the dispatch.
        stage.pointer_moved(PointerEvent::at(Point::new(120.0, 15.0)));
        assert_eq!(stage.topmost(), Some(stage.root()));
        assert_eq!(log.take(), Vec::<String>::new());

        // Inside the panel the child both resolves and hears events.
        stage.pointer_moved(PointerEvent::at(Point::new(90.0, 15.0)));
        assert!(stage.topmost().is_some());
        assert_eq!(log.take(), vec!["c:moved"]);
    }

    #[test]
    fn input_disabled_silences_the_subtree() {
        let log = Log::default();
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("p", &log));
        let _child = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("c", &log));
        let sibling = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("s", &log));
        stage.update(0.0);
        log.take();

        stage.set_input_enabled(parent, false);
        stage.key_down(KeyEvent::new(13));
        assert_eq!(log.take(), vec!["s:key=13"]);

        stage.set_input_enabled(parent, true);
        stage.key_down(KeyEvent::new(13));
        assert_eq!(log.take(), vec!["p:key=13", "c:key=13", "s:key=13"]);
        let _ = sibling;
    }

    #[test]
    fn files_dropped_reaches_gated_nodes() {
        let log = Log::default();
        let mut stage = Stage::new();
        stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));
        stage.update(0.0);
        log.take();

        stage.files_dropped(DropEvent {
            paths: vec![String::from("a.png"), String::from("b.png")],
            pos: Point::new(5.0, 5.0),
        });
        assert_eq!(log.take(), vec!["n:dropped=2"]);
    }

    #[test]
    fn destroy_is_idempotent_and_reaps_next_update() {
        let log = Log::default();
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("p", &log));
        let child = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("c", &log));
        stage.update(0.0);
        log.take();

        stage.destroy(parent);
        stage.destroy(parent);
        assert!(stage.tree().is_destroyed(parent));
        assert!(stage.tree().is_destroyed(child), "destroy marks the subtree");
        // Still physically present until the next update.
        assert_eq!(stage.tree().parent_of(child), Some(parent));
        assert_eq!(log.take(), Vec::<String>::new(), "hooks stop immediately");

        stage.update(0.1);
        // Children were detached before the hook ran, and each node's
        // own destroy fired exactly once.
        assert_eq!(log.take(), vec!["p:destroy[0]", "c:destroy[0]"]);
        assert!(!stage.tree().is_alive(parent));
        assert!(!stage.tree().is_alive(child));
        assert_eq!(stage.live_nodes().len(), 1, "only the root remains");

        // Destroying a reaped node is a quiet no-op.
        stage.destroy(parent);
        stage.update(0.2);
        assert_eq!(log.take(), Vec::<String>::new());
    }

    #[test]
    fn reap_spares_children_attached_after_the_destroy() {
        let mut stage = Stage::new();
        let doomed = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), ());
        let stray = stage.insert(Some(stage.root()), frame(0.0, 0.0, 5.0, 5.0), ());
        stage.update(0.0);

        stage.destroy(doomed);
        stage.attach(doomed, stray, isize::MAX);
        stage.update(0.1);

        assert!(!stage.tree().is_alive(doomed));
        assert!(stage.tree().is_alive(stray), "children merely lose the parent");
        assert_eq!(stage.tree().parent_of(stray), None);
        assert!(!stage.tree().is_destroyed(stray));
    }

    #[test]
    fn destroying_an_unstarted_node_leaves_no_reap_entry() {
        let log = Log::default();
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("p", &log));
        stage.update(0.0);
        log.take();

        // Attached mid-life but never walked: the stage has not started it.
        let fresh = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), Probe::new("f", &log));
        stage.destroy(parent);
        stage.update(0.1);

        assert_eq!(log.take(), vec!["p:destroy[0]"], "unstarted nodes fire no destroy hook");
        assert!(!stage.tree().is_alive(fresh), "their slots are still reclaimed");
    }

    #[test]
    fn destroy_after_rides_the_node_timer() {
        let log = Log::default();
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));
        stage.update(0.0);
        log.take();

        stage.destroy_after(n, 1.0);
        stage.update(0.5);
        assert!(!stage.tree().is_destroyed(n));
        assert_eq!(log.take(), vec!["n:update", "n:post_update"]);

        // The timer fires in the same visit and the gate below it holds.
        stage.update(1.0);
        assert!(stage.tree().is_destroyed(n));
        assert_eq!(log.take(), Vec::<String>::new());

        stage.update(1.1);
        assert_eq!(log.take(), vec!["n:destroy[0]"]);
        assert!(!stage.tree().is_alive(n));
    }

    #[test]
    fn destroy_preempts_a_pending_delayed_destroy() {
        let log = Log::default();
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Probe::new("n", &log));
        stage.update(0.0);
        log.take();

        stage.destroy_after(n, 5.0);
        stage.destroy(n);
        stage.update(0.1);
        stage.update(6.0);
        assert_eq!(
            log.take(),
            vec!["n:destroy[0]"],
            "the immediate destroy cancels the delayed one"
        );
    }

    #[test]
    fn stage_timers_cancel_and_pause() {
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), ());
        stage.update(0.0);

        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        stage.schedule(n, 1.0, move |_| *counter.borrow_mut() += 1);
        stage.cancel_timers(n);
        stage.update(2.0);
        assert_eq!(*hits.borrow(), 0);

        // Pause at 2.0 with the full delay ahead, resume at 10.0: the
        // deadline shifts by the 8 seconds spent paused.
        let counter = hits.clone();
        stage.schedule(n, 1.0, move |_| *counter.borrow_mut() += 1);
        stage.set_timers_paused(n, true);
        stage.update(9.0);
        assert_eq!(*hits.borrow(), 0, "paused timers must not fire");
        stage.update(10.0);
        stage.set_timers_paused(n, false);
        stage.update(10.9);
        assert_eq!(*hits.borrow(), 0);
        stage.update(11.0);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn pausing_a_parent_pauses_descendant_timers() {
        let mut stage = Stage::new();
        let parent = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), ());
        let child = stage.insert(Some(parent), frame(0.0, 0.0, 5.0, 5.0), ());
        stage.update(0.0);

        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        stage.schedule(child, 1.0, move |_| *counter.borrow_mut() += 1);
        stage.set_timers_paused(parent, true);
        stage.update(5.0);
        assert_eq!(*hits.borrow(), 0);
        stage.set_timers_paused(parent, false);
        stage.update(6.0);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn timer_callbacks_get_full_stage_access() {
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), ());
        stage.update(0.0);

        stage.schedule(n, 0.5, move |stage| {
            stage.set_position(n, Point::new(7.0, 7.0));
            stage.schedule(n, 0.5, move |stage| {
                stage.destroy(n);
            });
        });
        stage.update(0.5);
        assert_eq!(stage.tree().position(n), Some(Point::new(7.0, 7.0)));
        stage.update(1.0);
        assert!(stage.tree().is_destroyed(n));
    }

    #[test]
    fn frame_hook_and_signal_fire_on_actual_change() {
        let log = Log::default();
        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(1.0, 1.0, 10.0, 10.0), Probe::new("n", &log));
        stage.update(0.0);
        log.take();

        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        let sub = stage.observe_frame_changed(n, move |_, _| *counter.borrow_mut() += 1);

        stage.set_position(n, Point::new(2.0, 2.0));
        assert_eq!(log.take(), vec!["n:frame"]);
        assert_eq!(*seen.borrow(), 1);

        // Equal value and non-finite input both stay silent.
        stage.set_position(n, Point::new(2.0, 2.0));
        stage.set_scale(n, f64::NAN);
        assert_eq!(log.take(), Vec::<String>::new());
        assert_eq!(*seen.borrow(), 1);

        stage.unobserve(sub);
        stage.set_position(n, Point::new(3.0, 3.0));
        assert_eq!(log.take(), vec!["n:frame"]);
        assert_eq!(*seen.borrow(), 1, "unsubscribed callbacks must not fire");
    }

    #[test]
    fn pressed_signal_fires_for_the_topmost_node() {
        let mut stage = sized_stage();
        let a = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 100.0), ());
        let b = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 100.0), ());
        stage.update(0.0);

        let hits: Rc<RefCell<Vec<NodeId>>> = Rc::default();
        let sink = hits.clone();
        stage.observe_pressed(a, move |_, id| sink.borrow_mut().push(id));
        let sink = hits.clone();
        stage.observe_pressed(b, move |_, id| sink.borrow_mut().push(id));

        stage.pointer_pressed(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        assert_eq!(&*hits.borrow(), &[b], "only the front sibling is pressed over");

        stage.pointer_released(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        stage.swap_children(stage.root(), 0, 1);
        stage.pointer_pressed(PointerEvent::with_button(Point::new(50.0, 50.0), 0));
        assert_eq!(&*hits.borrow(), &[b, a], "swapping flips the winner");
    }

    #[test]
    fn hooks_may_mutate_their_own_node() {
        struct Grower;
        impl Behavior for Grower {
            fn on_update(&mut self, cx: &mut Cx<'_>) {
                let id = cx.id();
                let pos = cx.position().unwrap_or_default();
                cx.set_position(Point::new(pos.x + 1.0, pos.y));
                // Reads observe the new frame immediately.
                assert_eq!(cx.stage().tree().position(id), Some(Point::new(pos.x + 1.0, pos.y)));
            }
        }

        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Grower);
        stage.update(0.0);
        stage.update(0.1);
        assert_eq!(stage.tree().position(n), Some(Point::new(2.0, 0.0)));
    }

    #[test]
    fn self_notifications_from_hooks_are_deferred_not_lost() {
        let log = Log::default();
        struct Nudger {
            probe: Probe,
        }
        impl Behavior for Nudger {
            fn on_update(&mut self, cx: &mut Cx<'_>) {
                self.probe.on_update(cx);
                let pos = cx.position().unwrap_or_default();
                cx.set_position(Point::new(pos.x + 1.0, pos.y));
            }
            fn on_frame_changed(&mut self, cx: &mut Cx<'_>) {
                self.probe.on_frame_changed(cx);
            }
            fn post_update(&mut self, cx: &mut Cx<'_>) {
                self.probe.post_update(cx);
            }
        }

        let mut stage = Stage::new();
        stage.insert(
            Some(stage.root()),
            frame(0.0, 0.0, 10.0, 10.0),
            Nudger {
                probe: Probe::new("n", &log),
            },
        );
        stage.update(0.0);
        // The frame hook queued during on_update lands right after it
        // returns, before the children and post_update.
        assert_eq!(
            log.take(),
            vec!["n:update", "n:frame", "n:post_update"]
        );
    }

    #[test]
    fn hooks_may_destroy_their_own_node_mid_walk() {
        let log = Log::default();
        struct SelfDestruct {
            probe: Probe,
        }
        impl Behavior for SelfDestruct {
            fn on_update(&mut self, cx: &mut Cx<'_>) {
                self.probe.on_update(cx);
                cx.destroy();
            }
            fn post_update(&mut self, cx: &mut Cx<'_>) {
                self.probe.post_update(cx);
            }
            fn on_destroy(&mut self, cx: &mut Cx<'_>) {
                self.probe.on_destroy(cx);
            }
        }

        let mut stage = Stage::new();
        let n = stage.insert(
            Some(stage.root()),
            frame(0.0, 0.0, 10.0, 10.0),
            SelfDestruct {
                probe: Probe::new("n", &log),
            },
        );
        let sibling = stage.insert(Some(stage.root()), frame(0.0, 0.0, 5.0, 5.0), Probe::new("s", &log));

        stage.update(0.0);
        assert!(stage.tree().is_destroyed(n));
        assert!(stage.tree().is_alive(sibling));
        // The destroyed node's post_update is gated off; the walk
        // itself carries on.
        let entries = log.take();
        assert!(entries.contains(&String::from("n:update")));
        assert!(!entries.contains(&String::from("n:post_update")));
        assert!(entries.contains(&String::from("s:update")));

        stage.update(0.1);
        assert!(log.take().contains(&String::from("n:destroy[0]")));
        assert!(!stage.tree().is_alive(n));
    }

    #[test]
    fn behavior_downcasts_round_trip() {
        struct Counter {
            value: u32,
        }
        impl Behavior for Counter {
            fn on_update(&mut self, _cx: &mut Cx<'_>) {
                self.value += 1;
            }
        }

        let mut stage = Stage::new();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 10.0, 10.0), Counter { value: 0 });
        stage.update(0.0);

        assert_eq!(stage.behavior::<Counter>(n).map(|c| c.value), Some(1));
        stage.behavior_mut::<Counter>(n).unwrap().value = 40;
        stage.update(0.1);
        assert_eq!(stage.behavior::<Counter>(n).map(|c| c.value), Some(41));
        assert!(stage.behavior::<Probe>(n).is_none(), "wrong type answers None");
    }

    #[test]
    fn key_events_refresh_the_topmost_slot() {
        let mut stage = sized_stage();
        let n = stage.insert(Some(stage.root()), frame(0.0, 0.0, 100.0, 100.0), ());
        stage.update(0.0);

        stage.pointer_moved(PointerEvent::at(Point::new(50.0, 50.0)));
        assert_eq!(stage.topmost(), Some(n));

        // The tree changed since the last pointer event; a key tick
        // re-resolves against the same pointer sample.
        stage.set_active(n, false);
        stage.key_down(KeyEvent::new(1));
        assert_eq!(stage.topmost(), Some(stage.root()));
    }

    #[test]
    fn scroll_keeps_the_pointer_samples() {
        let mut stage = sized_stage();
        stage.update(0.0);
        stage.pointer_moved(PointerEvent::at(Point::new(40.0, 40.0)));
        stage.pointer_scrolled(PointerEvent::scrolled(Point::new(90.0, 90.0), kurbo::Vec2::new(0.0, 3.0)));
        assert_eq!(stage.pointer(), Point::new(40.0, 40.0));
    }
}
