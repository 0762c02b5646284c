// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Affine composition for node frames.
//!
//! A node's local matrix applies, in order: translate by the negated pivot,
//! rotate, scale, translate by the frame origin, translate by the pivot.
//! With a [`Pivot::Center`] pivot the rectangle's center stays pinned in
//! parent space under any scale or rotation; with [`Pivot::Corner`] the
//! top-left corner does.
//!
//! [`Pivot::Center`]: crate::Pivot::Center
//! [`Pivot::Corner`]: crate::Pivot::Corner

use kurbo::{Affine, Vec2};

use crate::types::LocalFrame;

/// Build the local (parent-relative) matrix for a frame.
pub(crate) fn compose_local(frame: &LocalFrame) -> Affine {
    let pivot = frame.pivot_point();
    let origin = frame.rect.origin().to_vec2();
    Affine::translate(pivot + origin)
        * Affine::scale(frame.scale)
        * Affine::rotate(frame.rotation.to_radians())
        * Affine::translate(-pivot)
}

/// Uniform scale factor carried by a (similarity) world matrix.
pub(crate) fn scale_of(world: Affine) -> f64 {
    let [a, b, ..] = world.as_coeffs();
    Vec2::new(a, b).hypot()
}

/// Rotation in degrees carried by a (similarity) world matrix.
pub(crate) fn rotation_deg_of(world: Affine) -> f64 {
    let [a, b, ..] = world.as_coeffs();
    Vec2::new(a, b).atan2().to_degrees()
}
