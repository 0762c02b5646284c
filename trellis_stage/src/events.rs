// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host event payloads forwarded to behavior hooks.
//!
//! These are plain data. The stage interprets positions (updating its
//! pointer samples and resolving the topmost node) but never the button
//! or key codes, which pass through to hooks untouched.

use alloc::string::String;
use alloc::vec::Vec;
use kurbo::{Point, Vec2};

/// A pointer button index, as the host numbers them. 0 is primary.
pub type Button = u8;

/// A pointer interaction: move, press, drag, release, or scroll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    /// Pointer position in world (stage root) coordinates.
    pub pos: Point,
    /// Button involved, if any. Presses, drags, and releases carry one.
    pub button: Option<Button>,
    /// Scroll delta. Zero except for scroll events.
    pub scroll: Vec2,
}

impl PointerEvent {
    /// An event at `pos` with no button and no scroll.
    pub fn at(pos: Point) -> Self {
        Self {
            pos,
            button: None,
            scroll: Vec2::ZERO,
        }
    }

    /// An event at `pos` carrying `button`.
    pub fn with_button(pos: Point, button: Button) -> Self {
        Self {
            pos,
            button: Some(button),
            scroll: Vec2::ZERO,
        }
    }

    /// A scroll by `scroll` with the pointer at `pos`.
    pub fn scrolled(pos: Point, scroll: Vec2) -> Self {
        Self {
            pos,
            button: None,
            scroll,
        }
    }
}

/// A key press or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// Host-defined key code.
    pub code: u32,
}

impl KeyEvent {
    /// An event for `code`.
    pub fn new(code: u32) -> Self {
        Self { code }
    }
}

/// Files dropped onto the host surface.
#[derive(Clone, Debug, PartialEq)]
pub struct DropEvent {
    /// Dropped paths, in the order the host supplied them.
    pub paths: Vec<String>,
    /// Drop position in world coordinates.
    pub pos: Point,
}
