// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Facade over the quad tree with deferred bounds updates.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashSet;

use crate::quadtree::QuadTree;
use crate::types::Aabb2D;

/// Spatial index over a [`QuadTree`], keyed by item identity.
///
/// Bounds changes are not applied eagerly. A caller that notices an item's
/// bounds went stale calls [`SpatialIndex::mark_moved`]; the fresh bounds are
/// resolved through a closure the next time the index is queried. An item
/// that moves many times within a frame is therefore re-indexed once.
pub struct SpatialIndex<K> {
    tree: QuadTree<K>,
    moved: HashSet<K>,
}

impl<K> Debug for SpatialIndex<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("tree", &self.tree)
            .field("pending_moves", &self.moved.len())
            .finish()
    }
}

/// Default coverage, a 5000x5000 region centered on the origin. Items that
/// escape it grow the tree, so this is a starting hint, not a limit.
pub const DEFAULT_COVERAGE: Aabb2D = Aabb2D::new(-2500.0, -2500.0, 2500.0, 2500.0);

impl<K: Copy + Eq + Hash + Debug> Default for SpatialIndex<K> {
    fn default() -> Self {
        Self::new(DEFAULT_COVERAGE)
    }
}

impl<K: Copy + Eq + Hash + Debug> SpatialIndex<K> {
    /// Create an index covering `bounds`.
    pub fn new(bounds: Aabb2D) -> Self {
        Self {
            tree: QuadTree::new(bounds),
            moved: HashSet::new(),
        }
    }

    /// Register an item. Degenerate bounds are a silent no-op.
    pub fn insert(&mut self, key: K, bounds: Aabb2D) -> bool {
        self.tree.insert(key, bounds)
    }

    /// Unregister an item and drop any pending move for it.
    pub fn remove(&mut self, key: K) {
        self.tree.remove(key);
        self.moved.remove(&key);
    }

    /// Mark an item's bounds as stale. Consumed at the next query.
    pub fn mark_moved(&mut self, key: K) {
        self.moved.insert(key);
    }

    /// Number of items currently indexed.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True when no items are indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Apply all pending moves, resolving fresh bounds through `bounds_of`.
    ///
    /// `None` from the resolver means the item no longer has meaningful
    /// bounds (e.g. collapsed to zero area); it is removed from the tree and
    /// re-appears if a later update reports real bounds again.
    pub fn settle(&mut self, mut bounds_of: impl FnMut(K) -> Option<Aabb2D>) {
        for key in self.moved.drain() {
            match bounds_of(key) {
                Some(bounds) if !bounds.is_empty() => self.tree.update(key, bounds),
                _ => self.tree.remove(key),
            }
        }
    }

    /// Settle pending moves, then collect items overlapping `rect` that pass
    /// `filter`.
    pub fn query_with(
        &mut self,
        rect: &Aabb2D,
        bounds_of: impl FnMut(K) -> Option<Aabb2D>,
        filter: impl Fn(K) -> bool,
        out: &mut Vec<K>,
    ) {
        self.settle(bounds_of);
        self.tree.query_where(rect, filter, out);
    }

    /// Read-only access to the underlying tree.
    pub fn tree(&self) -> &QuadTree<K> {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn pending_move_is_consumed_at_query_time() {
        let mut index = SpatialIndex::new(Aabb2D::new(0.0, 0.0, 1000.0, 1000.0));
        index.insert(1_u32, Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        index.mark_moved(1);

        let mut out = Vec::new();
        index.query_with(
            &Aabb2D::from_xywh(495.0, 495.0, 20.0, 20.0),
            |_| Some(Aabb2D::from_xywh(500.0, 500.0, 10.0, 10.0)),
            |_| true,
            &mut out,
        );
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn resolver_none_removes_item() {
        let mut index = SpatialIndex::new(Aabb2D::new(0.0, 0.0, 1000.0, 1000.0));
        index.insert(1_u32, Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        index.mark_moved(1);
        index.settle(|_| None);

        let mut out = Vec::new();
        index.query_with(
            &Aabb2D::from_xywh(0.0, 0.0, 1000.0, 1000.0),
            |_| None,
            |_| true,
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn remove_drops_pending_move() {
        let mut index = SpatialIndex::new(Aabb2D::new(0.0, 0.0, 1000.0, 1000.0));
        index.insert(1_u32, Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0));
        index.mark_moved(1);
        index.remove(1);
        // Settling must not resurrect the removed key.
        index.settle(|_| Some(Aabb2D::from_xywh(0.0, 0.0, 10.0, 10.0)));
        assert!(index.is_empty());
    }
}
