// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Index: a dynamic quad-tree spatial index for 2D AABBs.
//!
//! This crate is the spatial acceleration layer of the Canopy scene graph.
//! It answers one question quickly: *which items overlap this rectangle?*
//! The renderer uses it twice per frame — once to cull the scene against the
//! viewport, and once to discover which nodes a damaged region forces to
//! repaint.
//!
//! ## Components
//!
//! - [`Aabb2D`]: the axis-aligned bounds primitive shared by the whole
//!   workspace (overlap, union, containment, and corner queries).
//! - [`QuadTree`]: a recursive spatial partition with dynamic growth, a
//!   per-leaf item cap, and an O(1) reverse item→leaf map. Leaves live in an
//!   internal arena and are recycled through a free list, so steady-state
//!   splits and merges do not allocate.
//! - [`SpatialIndex`]: a thin facade over the quad tree that batches bounds
//!   changes. Callers mark an item as *moved* when its bounds become stale
//!   and supply the fresh bounds lazily at query time, which avoids
//!   re-indexing an item that moves several times within one frame.
//!
//! ## Contracts
//!
//! - Inserting an item with degenerate bounds (zero width or height) is a
//!   documented no-op, not an error.
//! - Querying with a zero-area rectangle yields nothing.
//! - Items whose bounds escape the root are handled by growing the whole
//!   tree around the union of the old root and the escaping bounds. Growth
//!   re-inserts every held item and is expected to be rare.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod index;
mod quadtree;
mod types;

pub use index::{DEFAULT_COVERAGE, SpatialIndex};
pub use quadtree::{MAX_ITEMS_PER_LEAF, MAX_LEVEL, QuadTree};
pub use types::Aabb2D;
