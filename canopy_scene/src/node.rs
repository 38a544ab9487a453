// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node storage and dirty-flag plumbing.
//!
//! Nodes live in slots owned by [`Stage`](crate::Stage); the public handle is
//! the generational [`NodeId`]. All mutation goes through the stage so that
//! invalidation cascades and the watched/dirty bookkeeping stay in one place.

use alloc::string::String;
use alloc::vec::Vec;

use bitflags::bitflags;
use canopy_index::Aabb2D;
use kurbo::{Affine, Rect};
use smallvec::SmallVec;

use crate::transform::Transform2d;

/// Generational handle to a node slot.
///
/// Stale handles (the slot was freed and reused) fail lookups instead of
/// aliasing the new occupant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) const fn idx(self) -> usize {
        self.index as usize
    }
}

bitflags! {
    /// Stale-derived-value markers on a node.
    ///
    /// Each flag marks one computed-on-read cache as needing a recompute.
    /// `RENDER` is not a cache marker: it schedules the node for repaint and
    /// is cleared only by [`Stage::clear_dirty`](crate::Stage::clear_dirty).
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        /// World matrix (and inverse) cache is stale.
        const MATRIX = 1 << 0;
        /// Local bounds changed since the world bounds were derived.
        const LOCAL_BOUNDS = 1 << 1;
        /// World bounds cache is stale.
        const WORLD_BOUNDS = 1 << 2;
        /// The node's pixels must be repainted.
        const RENDER = 1 << 3;
        /// Global paint-order path cache is stale.
        const GLOBAL_Z = 1 << 4;
        /// Global opacity cache is stale.
        const GLOBAL_OPACITY = 1 << 5;
        /// Child list needs its lazy reorder before the next read.
        const CHILDREN_ORDER = 1 << 6;
    }
}

/// How a node's pixels combine with what is already on the surface.
///
/// Consumed by paint routines; the scene graph itself only carries it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CompositeOp {
    /// Normal alpha blending, drawn over existing content.
    #[default]
    SourceOver,
    /// Drawn behind existing content.
    DestinationOver,
    /// Additive blending.
    Lighter,
    /// Replace existing content outright.
    Copy,
}

/// One scene node's data. Slot-internal; reached through the stage.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    /// Paint-dispatch tag; an empty or unregistered tag paints nothing.
    pub(crate) kind: String,
    pub(crate) visible: bool,
    pub(crate) composite: CompositeOp,
    pub(crate) opacity: f64,
    pub(crate) transform: Transform2d,
    pub(crate) local_bounds: Rect,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Sibling paint index; reindexed densely on the next ordered read.
    pub(crate) local_index: i32,
    /// Reorder clock stamp of the last explicit index change. Among equal
    /// local indices the most recently stamped child sorts first.
    pub(crate) reorder_seq: u64,
    /// Reachable from the stage root.
    pub(crate) attached: bool,

    pub(crate) dirty: DirtyFlags,
    pub(crate) world_matrix: Affine,
    pub(crate) inv_world_matrix: Affine,
    pub(crate) world_bounds: Aabb2D,
    /// World bounds as of the start of the current dirty period; the "from"
    /// half of this node's damage.
    pub(crate) last_world_bounds: Aabb2D,
    /// Set when `last_world_bounds` has been captured this tick, so later
    /// invalidations in the same tick cannot overwrite the starting value.
    pub(crate) bounds_captured: bool,
    pub(crate) global_opacity: f64,
    pub(crate) global_z: SmallVec<[i32; 8]>,
}

impl Node {
    pub(crate) fn new() -> Self {
        Self {
            name: String::new(),
            kind: String::new(),
            visible: true,
            composite: CompositeOp::SourceOver,
            opacity: 1.0,
            transform: Transform2d::new(),
            local_bounds: Rect::ZERO,
            parent: None,
            children: Vec::new(),
            local_index: 0,
            reorder_seq: 0,
            attached: false,
            // Caches start valid as their identity values; the first real
            // mutation or attach invalidates them.
            dirty: DirtyFlags::empty(),
            world_matrix: Affine::IDENTITY,
            inv_world_matrix: Affine::IDENTITY,
            world_bounds: Aabb2D::new(0.0, 0.0, 0.0, 0.0),
            last_world_bounds: Aabb2D::new(0.0, 0.0, 0.0, 0.0),
            bounds_captured: false,
            global_opacity: 1.0,
            global_z: SmallVec::new(),
        }
    }
}
