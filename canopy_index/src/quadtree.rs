// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quad tree with dynamic insert, remove, update, and growth.

use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::types::Aabb2D;

/// A leaf holding this many items (or more) splits, if it is not already at
/// [`MAX_LEVEL`].
pub const MAX_ITEMS_PER_LEAF: usize = 5;

/// Maximum subdivision depth. The root is level 0.
pub const MAX_LEVEL: u8 = 5;

/// Index of a leaf slot in the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct LeafId(u32);

impl LeafId {
    const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One spatial partition cell.
///
/// Items whose bounds straddle a quadrant boundary stay here rather than
/// descending into a child, so interior cells carry items too.
#[derive(Clone, Debug)]
struct Leaf<K> {
    bounds: Aabb2D,
    level: u8,
    parent: Option<LeafId>,
    children: Option<[LeafId; 4]>,
    items: Vec<K>,
}

impl<K> Leaf<K> {
    fn reset(&mut self, bounds: Aabb2D, level: u8, parent: Option<LeafId>) {
        self.bounds = bounds;
        self.level = level;
        self.parent = parent;
        self.children = None;
        self.items.clear();
    }
}

/// Quad tree keyed by item identity, with per-item bounds and an O(1)
/// reverse item→leaf map.
///
/// Leaves are stored in an arena and recycled through a free list; releasing
/// a subtree returns its slots to the pool with their item storage intact,
/// so churn-heavy scenes settle into a zero-allocation steady state.
pub struct QuadTree<K> {
    leaves: Vec<Leaf<K>>,
    free: Vec<LeafId>,
    root: LeafId,
    owner: HashMap<K, LeafId>,
    bounds_of: HashMap<K, Aabb2D>,
}

impl<K> Debug for QuadTree<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuadTree")
            .field("items", &self.owner.len())
            .field("leaves_total", &self.leaves.len())
            .field("leaves_free", &self.free.len())
            .field("bounds", &self.leaves[self.root.idx()].bounds)
            .finish_non_exhaustive()
    }
}

impl<K: Copy + Eq + Hash + Debug> QuadTree<K> {
    /// Create a tree covering `bounds`.
    pub fn new(bounds: Aabb2D) -> Self {
        let mut tree = Self {
            leaves: Vec::new(),
            free: Vec::new(),
            root: LeafId(0),
            owner: HashMap::new(),
            bounds_of: HashMap::new(),
        };
        tree.root = tree.alloc(bounds, 0, None);
        tree
    }

    /// World bounds currently covered by the root.
    pub fn bounds(&self) -> Aabb2D {
        self.leaves[self.root.idx()].bounds
    }

    /// Number of items held.
    pub fn len(&self) -> usize {
        self.owner.len()
    }

    /// True when no items are held.
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    /// Insert an item.
    ///
    /// Degenerate bounds (zero width or height) are rejected as a silent
    /// no-op and `false` is returned. If `bounds` escapes the root, the
    /// whole tree grows around the union of the old root and `bounds`
    /// before inserting.
    pub fn insert(&mut self, key: K, bounds: Aabb2D) -> bool {
        if bounds.is_empty() {
            return false;
        }
        if !self.leaves[self.root.idx()].bounds.contains(&bounds) {
            let grown = self.leaves[self.root.idx()].bounds.union(&bounds);
            self.rebuild(grown);
        }
        self.bounds_of.insert(key, bounds);
        self.insert_at(self.root, key, bounds);
        true
    }

    /// Remove an item. Unknown keys are a silent no-op.
    pub fn remove(&mut self, key: K) {
        let leaf = match self.owner.remove(&key) {
            Some(leaf) => Some(leaf),
            // Fallback: the reverse map should always be authoritative, but
            // a stale entry still gets cleaned up by searching.
            None => self.find_owner(self.root, key),
        };
        if let Some(leaf) = leaf {
            self.leaves[leaf.idx()].items.retain(|k| *k != key);
        }
        self.bounds_of.remove(&key);
    }

    /// Move an item to new bounds.
    ///
    /// If the owning leaf still contains the new bounds this only records
    /// them — the item does not change leaves, so a no-change update never
    /// rebalances. Otherwise the item is re-inserted starting from the
    /// owning leaf's parent chain, walking upward until an ancestor contains
    /// the new bounds; if none does (including the root), the tree grows.
    pub fn update(&mut self, key: K, bounds: Aabb2D) {
        if bounds.is_empty() {
            return;
        }
        let Some(&leaf) = self.owner.get(&key) else {
            self.insert(key, bounds);
            return;
        };
        self.bounds_of.insert(key, bounds);
        if self.leaves[leaf.idx()].bounds.contains(&bounds) {
            return;
        }
        self.leaves[leaf.idx()].items.retain(|k| *k != key);
        self.owner.remove(&key);

        // Back-to-insert: climb until an ancestor can hold the new bounds.
        let mut at = self.leaves[leaf.idx()].parent;
        while let Some(ancestor) = at {
            if self.leaves[ancestor.idx()].bounds.contains(&bounds) {
                self.insert_at(ancestor, key, bounds);
                return;
            }
            at = self.leaves[ancestor.idx()].parent;
        }
        let grown = self.leaves[self.root.idx()].bounds.union(&bounds);
        // `bounds_of` already carries the new bounds, so the rebuild
        // re-inserts this key along with everything else.
        self.rebuild(grown);
    }

    /// Last recorded bounds for an item, if held.
    pub fn item_bounds(&self, key: K) -> Option<Aabb2D> {
        self.bounds_of.get(&key).copied()
    }

    /// Collect items whose bounds overlap `rect`.
    ///
    /// Leaves that do not overlap `rect` are pruned without visiting their
    /// items. A zero-area `rect` yields nothing.
    pub fn query(&self, rect: &Aabb2D, out: &mut Vec<K>) {
        self.query_where(rect, |_| true, out);
    }

    /// Collect items whose bounds overlap `rect` and pass `filter`.
    pub fn query_where(&self, rect: &Aabb2D, filter: impl Fn(K) -> bool, out: &mut Vec<K>) {
        if rect.is_empty() {
            return;
        }
        self.query_at(self.root, rect, &filter, out);
    }

    /// Drop every item and subdivision, keeping the root coverage.
    pub fn clear(&mut self) {
        let bounds = self.leaves[self.root.idx()].bounds;
        self.release_children(self.root);
        self.leaves[self.root.idx()].items.clear();
        self.leaves[self.root.idx()].bounds = bounds;
        self.owner.clear();
        self.bounds_of.clear();
    }

    // --- internals ---

    fn alloc(&mut self, bounds: Aabb2D, level: u8, parent: Option<LeafId>) -> LeafId {
        if let Some(id) = self.free.pop() {
            self.leaves[id.idx()].reset(bounds, level, parent);
            id
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "leaf arenas are far below u32::MAX slots"
            )]
            let id = LeafId(self.leaves.len() as u32);
            self.leaves.push(Leaf {
                bounds,
                level,
                parent,
                children: None,
                items: Vec::new(),
            });
            id
        }
    }

    /// Return a leaf's entire subtree (children only, not itself) to the pool.
    fn release_children(&mut self, leaf: LeafId) {
        if let Some(children) = self.leaves[leaf.idx()].children.take() {
            for child in children {
                self.release_children(child);
                self.leaves[child.idx()].items.clear();
                self.free.push(child);
            }
        }
    }

    /// Rebuild the tree around new root bounds, re-inserting every item.
    fn rebuild(&mut self, bounds: Aabb2D) {
        let items: Vec<(K, Aabb2D)> = self
            .bounds_of
            .iter()
            .map(|(k, b)| (*k, *b))
            .collect();
        self.release_children(self.root);
        self.leaves[self.root.idx()].items.clear();
        self.leaves[self.root.idx()].bounds = bounds;
        self.owner.clear();
        for (key, item_bounds) in items {
            self.insert_at(self.root, key, item_bounds);
        }
    }

    fn insert_at(&mut self, leaf: LeafId, key: K, bounds: Aabb2D) {
        let mut at = leaf;
        // Descend while a quadrant fully holds the bounds.
        while let Some(children) = self.leaves[at.idx()].children {
            match quadrant(&self.leaves[at.idx()].bounds, &bounds) {
                Some(q) => at = children[q],
                None => break,
            }
        }
        self.leaves[at.idx()].items.push(key);
        self.owner.insert(key, at);

        let full = self.leaves[at.idx()].items.len() >= MAX_ITEMS_PER_LEAF
            && self.leaves[at.idx()].level < MAX_LEVEL
            && self.leaves[at.idx()].children.is_none();
        if full {
            self.split(at);
        }
    }

    /// Split a leaf into four equal quadrants and push down every item that
    /// fits entirely within one. Straddling items stay at this level.
    fn split(&mut self, leaf: LeafId) {
        let bounds = self.leaves[leaf.idx()].bounds;
        let level = self.leaves[leaf.idx()].level + 1;
        let (mx, my) = (bounds.mid_x(), bounds.mid_y());
        let quads = [
            Aabb2D::new(bounds.min_x, bounds.min_y, mx, my),
            Aabb2D::new(mx, bounds.min_y, bounds.max_x, my),
            Aabb2D::new(bounds.min_x, my, mx, bounds.max_y),
            Aabb2D::new(mx, my, bounds.max_x, bounds.max_y),
        ];
        let children = quads.map(|q| self.alloc(q, level, Some(leaf)));
        self.leaves[leaf.idx()].children = Some(children);

        let items = core::mem::take(&mut self.leaves[leaf.idx()].items);
        for key in items {
            let item_bounds = self.bounds_of[&key];
            match quadrant(&bounds, &item_bounds) {
                Some(q) => {
                    self.insert_at(children[q], key, item_bounds);
                }
                None => {
                    self.leaves[leaf.idx()].items.push(key);
                    self.owner.insert(key, leaf);
                }
            }
        }
    }

    fn find_owner(&self, leaf: LeafId, key: K) -> Option<LeafId> {
        if self.leaves[leaf.idx()].items.contains(&key) {
            return Some(leaf);
        }
        let children = self.leaves[leaf.idx()].children?;
        children.into_iter().find_map(|c| self.find_owner(c, key))
    }

    fn query_at(&self, leaf: LeafId, rect: &Aabb2D, filter: &impl Fn(K) -> bool, out: &mut Vec<K>) {
        let cell = &self.leaves[leaf.idx()];
        if !cell.bounds.overlaps(rect) {
            return;
        }
        for &key in &cell.items {
            if self.bounds_of[&key].overlaps(rect) && filter(key) {
                out.push(key);
            }
        }
        if let Some(children) = cell.children {
            for child in children {
                self.query_at(child, rect, filter, out);
            }
        }
    }
}

/// Which quadrant of `cell` fully contains `bounds`, if any.
///
/// Straddling the midline on either axis means "none": the item belongs to
/// the cell itself. Order matches the child array: TL, TR, BL, BR.
fn quadrant(cell: &Aabb2D, bounds: &Aabb2D) -> Option<usize> {
    let (mx, my) = (cell.mid_x(), cell.mid_y());
    let left = bounds.max_x <= mx;
    let right = bounds.min_x >= mx;
    let top = bounds.max_y <= my;
    let bottom = bounds.min_y >= my;
    match (left, right, top, bottom) {
        (true, _, true, _) => Some(0),
        (_, true, true, _) => Some(1),
        (true, _, _, true) => Some(2),
        (_, true, _, true) => Some(3),
        _ => None,
    }
}
