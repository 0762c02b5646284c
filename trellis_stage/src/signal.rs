// Copyright 2025 the Trellis Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node notification lists and their subscription tokens.

use alloc::boxed::Box;
use alloc::vec::Vec;

use trellis_tree::NodeId;

use crate::stage::Stage;

/// Callback type stored by a [`Signal`].
pub(crate) type Callback = Box<dyn FnMut(&mut Stage, NodeId)>;

/// Which notification list a subscription belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SignalKind {
    FrameChanged,
    Pressed,
}

/// Handle returned by the observe methods on [`Stage`], used to
/// unsubscribe.
///
/// Tokens are never reused, so a stale handle unsubscribes nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    node: NodeId,
    kind: SignalKind,
    token: u64,
}

impl Subscription {
    pub(crate) fn new(node: NodeId, kind: SignalKind, token: u64) -> Self {
        Self { node, kind, token }
    }

    pub(crate) fn node(self) -> NodeId {
        self.node
    }

    pub(crate) fn kind(self) -> SignalKind {
        self.kind
    }
}

/// An ordered list of callbacks with take-out firing.
///
/// Firing moves the entries out of the signal so each callback can
/// receive `&mut Stage`. Subscriptions added while firing take effect
/// from the next emission; unsubscriptions are honored immediately via
/// the tombstone list. A nested emission on the same signal finds the
/// entries taken out and fires nothing.
#[derive(Default)]
pub(crate) struct Signal {
    entries: Vec<(Subscription, Callback)>,
    /// Unsubscribed while the entries were taken out.
    dead: Vec<Subscription>,
    /// Depth of take-outs currently in flight.
    firing: u32,
}

impl Signal {
    pub(crate) fn subscribe(&mut self, sub: Subscription, callback: Callback) {
        self.entries.push((sub, callback));
    }

    pub(crate) fn unsubscribe(&mut self, sub: Subscription) {
        self.entries.retain(|(s, _)| *s != sub);
        if self.firing > 0 {
            self.dead.push(sub);
        }
    }

    /// Takes the entries out for firing. Pair with [`Signal::end_fire`].
    pub(crate) fn begin_fire(&mut self) -> Vec<(Subscription, Callback)> {
        self.firing += 1;
        core::mem::take(&mut self.entries)
    }

    /// Restores fired entries, dropping any unsubscribed in the interim
    /// and keeping subscriptions added during the fire after them.
    pub(crate) fn end_fire(&mut self, mut fired: Vec<(Subscription, Callback)>) {
        self.firing = self.firing.saturating_sub(1);
        fired.retain(|(s, _)| !self.dead.contains(s));
        fired.append(&mut self.entries);
        self.entries = fired;
        if self.firing == 0 {
            self.dead.clear();
        }
    }
}

impl core::fmt::Debug for Signal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("entries", &self.entries.len())
            .field("firing", &self.firing)
            .finish_non_exhaustive()
    }
}
