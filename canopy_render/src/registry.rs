// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint dispatch by node kind.

use alloc::string::String;

use hashbrown::HashMap;
use kurbo::Affine;

use canopy_index::Aabb2D;
use canopy_scene::{CompositeOp, NodeId};

/// An immutable snapshot of everything a paint function may read about a
/// node. Taken after the stage has settled its derived state, so the values
/// are consistent for the whole frame.
#[derive(Clone, Debug)]
pub struct PaintNode {
    /// The node being painted.
    pub id: NodeId,
    /// Kind tag the paint function was selected by.
    pub kind: String,
    /// Local-to-device transform.
    pub world_transform: Affine,
    /// Device-space bounds.
    pub world_bounds: Aabb2D,
    /// Effective opacity, ancestors multiplied in.
    pub global_opacity: f64,
    /// Composition mode to paint with.
    pub composite: CompositeOp,
}

/// Draws one node onto the backend.
pub type PaintFn<B> = fn(&mut B, &PaintNode);

/// Maps node kind tags to paint functions.
///
/// Nodes whose kind has no registered function are skipped without error;
/// they still participate in damage tracking and paint ordering.
pub struct PaintRegistry<B> {
    fns: HashMap<String, PaintFn<B>>,
}

impl<B> Default for PaintRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> core::fmt::Debug for PaintRegistry<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaintRegistry")
            .field("kinds", &self.fns.len())
            .finish()
    }
}

impl<B> PaintRegistry<B> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { fns: HashMap::new() }
    }

    /// Register `paint` for nodes tagged `kind`, replacing any previous
    /// registration for that tag.
    pub fn register(&mut self, kind: impl Into<String>, paint: PaintFn<B>) {
        self.fns.insert(kind.into(), paint);
    }

    /// Look up the paint function for a kind tag.
    pub fn get(&self, kind: &str) -> Option<PaintFn<B>> {
        self.fns.get(kind).copied()
    }
}
