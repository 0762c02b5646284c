// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trellis Stage: the frame-driven runtime for the Trellis component tree.
//!
//! Where `trellis_tree` stores structure and geometry, this crate makes a
//! tree *run*: a [`Stage`] owns one tree plus per-node [`Behavior`]s and
//! walks it in response to a host's frame loop.
//!
//! - **Lifecycle walks** — [`Stage::setup`] once, then per frame
//!   [`Stage::update`] (lazy starts, timer drains, `on_update` /
//!   `post_update` around the children) and [`Stage::draw`] (transform and
//!   style bracketing against a [`Canvas`], offscreen layers for clipped
//!   nodes), and finally [`Stage::exit`].
//! - **Input routing** — key, pointer, scroll, and file-drop entry points
//!   re-resolve the topmost node under the pointer, then dispatch pre-order
//!   through nodes that are active and input-enabled; a clipping node whose
//!   bounds exclude the pointer hides its children.
//! - **Dragging** — a single moving slot: a press on a movable topmost node
//!   claims it, each drag advances the holder by the pointer step in its own
//!   local space, release empties it.
//! - **Timers** — per-node one-shot callbacks with pause/resume that
//!   preserves remaining delays, drained once per update.
//! - **Destruction** — [`Stage::destroy`] marks a subtree immediately and
//!   detaches/reaps it at the start of the next update, so destroying nodes
//!   from inside hooks mid-walk is safe.
//!
//! Everything the runtime shares across nodes is a field of the stage, not
//! a process-wide static; independent stages (one per window, or many in a
//! test) never interfere.
//!
//! ## API overview
//!
//! - [`Stage`]: the runtime a host drives.
//! - [`Behavior`] and its hook context [`Cx`]: node-attached logic.
//! - [`Canvas`] / [`NullCanvas`]: the renderer boundary of the draw walk.
//! - [`KeyEvent`], [`PointerEvent`], [`DropEvent`], [`Button`]: host event
//!   payloads.
//! - [`Subscription`]: handle for the frame-changed and pressed
//!   notification lists ([`Stage::observe_frame_changed`],
//!   [`Stage::observe_pressed`]).
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod behavior;
mod canvas;
mod drag;
mod events;
mod signal;
mod stage;
mod timer;

pub use behavior::{Behavior, Cx};
pub use canvas::{Canvas, NullCanvas};
pub use events::{Button, DropEvent, KeyEvent, PointerEvent};
pub use signal::Subscription;
pub use stage::Stage;
