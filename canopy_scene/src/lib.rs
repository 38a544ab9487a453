// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Scene: a retained 2D scene graph with cascading invalidation.
//!
//! A [`Stage`] owns a tree of nodes in a generational slot arena and tracks
//! exactly what changed between frames so a renderer can repaint only the
//! damaged parts of the surface. Handles are [`NodeId`]s; all reads and
//! writes go through the stage.
//!
//! Derived per-node values — world matrix, world bounds, global opacity, and
//! the global paint-order path — are computed on read and invalidated on
//! write:
//!
//! - a transform change marks the whole subtree matrix-dirty (and therefore
//!   bounds- and render-dirty), short-circuiting on already-dirty children;
//! - an opacity change cascades the same way;
//! - a sibling-index change marks the parent for a lazy child reorder and
//!   invalidates paint paths below the moved node.
//!
//! Nodes attached under the root enter the *watched set* and the stage's
//! spatial index; repaint-relevant changes additionally enter the *dirty
//! set* until [`Stage::clear_dirty`] runs after a painted frame. A node
//! keeps the world bounds it had at the start of its dirty period
//! ([`Stage::last_world_bounds`]), which is the "from" half of the damage a
//! move contributes.
//!
//! ```
//! use canopy_scene::Stage;
//! use kurbo::Rect;
//!
//! let mut stage = Stage::new();
//! let sprite = stage.spawn_kind("sprite");
//! stage.set_local_bounds(sprite, Rect::new(0.0, 0.0, 32.0, 32.0));
//! stage.add_child(stage.root(), sprite);
//! stage.set_translation(sprite, 100.0, 50.0);
//! assert_eq!(stage.dirty_count(), 1);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod node;
mod stage;
mod transform;
mod util;

pub use node::{CompositeOp, DirtyFlags, NodeId};
pub use stage::Stage;
pub use transform::Transform2d;
