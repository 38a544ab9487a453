// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The stage: node arena, cascading invalidation, and dirty bookkeeping.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::{Ordering, Reverse};
use core::fmt::Debug;
use core::mem;

use canopy_index::{Aabb2D, SpatialIndex};
use hashbrown::HashSet;
use kurbo::{Affine, Rect};
use smallvec::SmallVec;

use crate::node::{CompositeOp, DirtyFlags, Node, NodeId};
use crate::util::{rect_to_aabb, transform_rect_bbox};

/// Owner of a scene tree and its change-tracking state.
///
/// The stage holds every node in a generational slot arena and is the single
/// writer of three collections the renderer reads each frame:
///
/// - the *watched set*: every node currently attached under the root;
/// - the *dirty set*: watched nodes whose pixels changed since the last
///   [`clear_dirty`](Stage::clear_dirty);
/// - a [`SpatialIndex`] keyed by [`NodeId`], kept lazily in sync through
///   pending-move marks that are resolved when a query runs.
///
/// Derived node state (world matrix, world bounds, global opacity, global
/// paint path) is computed on read and invalidated on write. Invalidation
/// cascades downward for matrix and opacity changes, short-circuiting on
/// already-dirty children, and one step upward for paint-order changes.
pub struct Stage {
    nodes: Vec<Option<Node>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    root: NodeId,
    watched: HashSet<NodeId>,
    dirty: HashSet<NodeId>,
    index: SpatialIndex<NodeId>,
    /// Monotonic stamp for sibling reorder tiebreaks.
    reorder_clock: u64,
    scratch: Vec<NodeId>,
}

impl Debug for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stage")
            .field("nodes", &(self.nodes.len() - self.free.len()))
            .field("watched", &self.watched.len())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage {
    /// Create a stage with an attached root node and default index coverage.
    pub fn new() -> Self {
        Self::with_coverage(canopy_index::DEFAULT_COVERAGE)
    }

    /// Create a stage whose spatial index starts out covering `coverage`.
    pub fn with_coverage(coverage: Aabb2D) -> Self {
        let mut root_node = Node::new();
        root_node.attached = true;
        Self {
            nodes: alloc::vec![Some(root_node)],
            generations: alloc::vec![0],
            free: Vec::new(),
            root: NodeId::new(0, 0),
            watched: HashSet::new(),
            dirty: HashSet::new(),
            index: SpatialIndex::new(coverage),
            reorder_clock: 0,
            scratch: Vec::new(),
        }
    }

    /// The root node. Always attached, never watched or indexed.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// True if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Number of attached non-root nodes.
    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Number of nodes scheduled for repaint.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Nodes scheduled for repaint, in no particular order.
    pub fn dirty_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dirty.iter().copied()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        if *self.generations.get(id.idx())? != id.generation {
            return None;
        }
        self.nodes.get(id.idx())?.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if *self.generations.get(id.idx())? != id.generation {
            return None;
        }
        self.nodes.get_mut(id.idx())?.as_mut()
    }

    // --- lifecycle ---

    /// Allocate a detached node.
    pub fn spawn(&mut self) -> NodeId {
        let node = Node::new();
        if let Some(index) = self.free.pop() {
            let id = NodeId::new(index, self.generations[index as usize]);
            self.nodes[index as usize] = Some(node);
            id
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(Some(node));
            self.generations.push(0);
            NodeId::new(index, 0)
        }
    }

    /// Allocate a detached node with a paint-dispatch tag.
    pub fn spawn_kind(&mut self, kind: &str) -> NodeId {
        let id = self.spawn();
        self.set_kind(id, kind);
        id
    }

    /// Free a node and its whole subtree.
    ///
    /// Detaches first (scheduling the vacated region for repaint), then
    /// releases the slots. The root and unknown handles are a silent no-op.
    pub fn discard(&mut self, id: NodeId) {
        if id == self.root || !self.contains(id) {
            return;
        }
        if let Some(parent) = self.parent(id) {
            self.remove_child(parent, id);
        }
        let mut stack = alloc::vec![id];
        while let Some(at) = stack.pop() {
            let Some(node) = self.nodes[at.idx()].take() else {
                continue;
            };
            stack.extend(node.children);
            self.generations[at.idx()] = self.generations[at.idx()].wrapping_add(1);
            self.free.push(at.index);
            self.watched.remove(&at);
            self.dirty.remove(&at);
            self.index.remove(at);
        }
    }

    // --- plain attributes ---

    /// Debug/search name of a node.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Rename a node. Names are not required to be unique.
    pub fn set_name(&mut self, id: NodeId, name: &str) {
        if let Some(n) = self.node_mut(id) {
            n.name = String::from(name);
        }
    }

    /// Paint-dispatch tag, looked up in the renderer's paint registry.
    pub fn kind(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.kind.as_str())
    }

    /// Retag a node, scheduling a repaint if the tag actually changes.
    pub fn set_kind(&mut self, id: NodeId, kind: &str) {
        if let Some(n) = self.node_mut(id)
            && n.kind != kind
        {
            n.kind = String::from(kind);
            self.mark_render_dirty(id);
        }
    }

    /// Whether the node participates in queries and painting.
    pub fn visible(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.visible)
    }

    /// Show or hide a node. Hidden nodes keep their bounds indexed.
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(n) = self.node_mut(id)
            && n.visible != visible
        {
            n.visible = visible;
            self.mark_render_dirty(id);
        }
    }

    /// The node's own opacity, ancestors not applied.
    pub fn opacity(&self, id: NodeId) -> Option<f64> {
        self.node(id).map(|n| n.opacity)
    }

    /// Set local opacity, cascading the global-opacity invalidation down.
    pub fn set_opacity(&mut self, id: NodeId, opacity: f64) {
        if let Some(n) = self.node_mut(id)
            && n.opacity != opacity
        {
            n.opacity = opacity;
            self.mark_opacity_dirty(id);
        }
    }

    /// Composition mode the node paints with.
    pub fn composite(&self, id: NodeId) -> CompositeOp {
        self.node(id).map_or(CompositeOp::SourceOver, |n| n.composite)
    }

    /// Change the composition mode, scheduling a repaint on change.
    pub fn set_composite(&mut self, id: NodeId, op: CompositeOp) {
        if let Some(n) = self.node_mut(id)
            && n.composite != op
        {
            n.composite = op;
            self.mark_render_dirty(id);
        }
    }

    /// Untransformed bounds in the node's own coordinates.
    pub fn local_bounds(&self, id: NodeId) -> Option<Rect> {
        self.node(id).map(|n| n.local_bounds)
    }

    /// Replace the local bounds, invalidating world bounds and repaint.
    pub fn set_local_bounds(&mut self, id: NodeId, bounds: Rect) {
        if let Some(n) = self.node_mut(id)
            && n.local_bounds != bounds
        {
            n.local_bounds = bounds;
            n.dirty.insert(DirtyFlags::LOCAL_BOUNDS);
            self.mark_world_bounds_dirty(id);
            self.mark_render_dirty(id);
        }
    }

    // --- transform forwarders ---

    /// Read access to a node's decomposed local transform.
    pub fn transform(&self, id: NodeId) -> Option<&crate::Transform2d> {
        self.node(id).map(|n| &n.transform)
    }

    /// Set the translation components of the local transform.
    pub fn set_translation(&mut self, id: NodeId, x: f64, y: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_translation(x, y)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Offset the current translation.
    pub fn translate(&mut self, id: NodeId, dx: f64, dy: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.translate(dx, dy)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Set the scale components of the local transform.
    pub fn set_scale(&mut self, id: NodeId, x: f64, y: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_scale(x, y)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Multiply the current scale.
    pub fn scale_by(&mut self, id: NodeId, fx: f64, fy: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.scale_by(fx, fy)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Set the rotation, in radians.
    pub fn set_rotation(&mut self, id: NodeId, r: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_rotation(r)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Add to the current rotation, in radians.
    pub fn rotate(&mut self, id: NodeId, dr: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.rotate(dr)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Set the skew angles, in radians.
    pub fn set_skew(&mut self, id: NodeId, x: f64, y: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_skew(x, y)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Add to the current skew angles.
    pub fn skew_by(&mut self, id: NodeId, dx: f64, dy: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.skew_by(dx, dy)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Set the pivot point rotation and scale are anchored to.
    pub fn set_pivot(&mut self, id: NodeId, x: f64, y: f64) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_pivot(x, y)
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Mirror horizontally by negating the x scale.
    pub fn flip_x(&mut self, id: NodeId) {
        if let Some(n) = self.node_mut(id)
            && n.transform.flip_x()
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Mirror vertically by negating the y scale.
    pub fn flip_y(&mut self, id: NodeId) {
        if let Some(n) = self.node_mut(id)
            && n.transform.flip_y()
        {
            self.mark_matrix_dirty(id);
        }
    }

    /// Replace a node's local matrix wholesale.
    pub fn set_local_matrix(&mut self, id: NodeId, m: Affine) {
        if let Some(n) = self.node_mut(id)
            && n.transform.set_matrix(m)
        {
            self.mark_matrix_dirty(id);
        }
    }

    // --- hierarchy ---

    /// The node's parent, or `None` for the root and detached roots.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// True when the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.attached)
    }

    /// Append `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        self.add_child_at(parent, child, -1)
    }

    /// Insert `child` under `parent` with sibling index `index` (negative
    /// appends).
    ///
    /// No-op returning `false` when `child` is already under `parent`, when
    /// either handle is stale, or when the move would create a cycle. A child
    /// that already had a parent keeps its world placement: its local matrix
    /// is rebased against the new parent's world matrix. Attaching under an
    /// attached parent recursively watches, indexes, and render-dirties the
    /// whole subtree.
    pub fn add_child_at(&mut self, parent: NodeId, child: NodeId, index: i32) -> bool {
        if child == self.root || parent == child {
            return false;
        }
        if !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.parent(child) == Some(parent) {
            return false;
        }
        // Re-rooting a node under its own descendant would orphan the tree.
        let mut at = Some(parent);
        while let Some(a) = at {
            if a == child {
                return false;
            }
            at = self.parent(a);
        }

        let index = if index < 0 {
            self.node(parent).map_or(0, |n| n.children.len()) as i32
        } else {
            index
        };

        let old_parent = self.parent(child);
        if let Some(op) = old_parent {
            if let Some(n) = self.node_mut(op) {
                n.children.retain(|c| *c != child);
                n.dirty.insert(DirtyFlags::CHILDREN_ORDER);
            }
            // Keep the world matrix across the reparent.
            let child_world = self.world_matrix(child);
            let parent_world = self.world_matrix(parent);
            if let Some(n) = self.node_mut(child) {
                n.transform.set_matrix(parent_world.inverse() * child_world);
                n.world_matrix = child_world;
                n.inv_world_matrix = child_world.inverse();
            }
        } else {
            self.mark_matrix_dirty(child);
        }

        if let Some(n) = self.node_mut(child) {
            n.parent = Some(parent);
        }
        if let Some(n) = self.node_mut(parent) {
            n.children.push(child);
        }
        self.mark_global_z_dirty(child);
        // The ancestor opacity chain changed with the parent.
        self.mark_opacity_dirty(child);

        if self.is_attached(parent) {
            self.attach_subtree(child);
        } else {
            self.detach_subtree(child);
        }
        self.set_local_index(child, index);
        true
    }

    /// Detach `child` from `parent`. Returns the child id, or `None` if it
    /// is not currently a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        let index = self.child_index(parent, child)?;
        self.remove_child_at(parent, index)
    }

    /// Detach the child at `index`. Out-of-range indices are a silent no-op
    /// returning `None`.
    ///
    /// The detached subtree reports one final render/world-bounds dirty
    /// pulse before leaving the watched set and the index, so the screen
    /// region it vacated is still scheduled for repaint.
    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.settle_children_order(parent);
        let children = &self.node(parent)?.children;
        if index >= children.len() {
            return None;
        }
        let child = children[index];

        // Keep world placement across the detach.
        let world = self.world_matrix(child);
        if let Some(n) = self.node_mut(parent) {
            n.children.remove(index);
            n.dirty.insert(DirtyFlags::CHILDREN_ORDER);
        }
        let stamp = self.next_stamp();
        if let Some(n) = self.node_mut(child) {
            n.transform.set_matrix(world);
            n.world_matrix = world;
            n.inv_world_matrix = world.inverse();
            n.parent = None;
            n.local_index = -1;
            n.reorder_seq = stamp;
        }
        self.mark_global_z_subtree(child);
        self.detach_subtree(child);
        Some(child)
    }

    fn attach_subtree(&mut self, id: NodeId) {
        let mut stack = alloc::vec![id];
        while let Some(at) = stack.pop() {
            let Some(n) = self.node_mut(at) else { continue };
            if n.attached {
                continue;
            }
            n.attached = true;
            let cached = n.world_bounds;
            stack.extend(n.children.iter().copied());
            self.watched.insert(at);
            self.index.insert(at, cached);
            self.mark_world_bounds_dirty(at);
            // The bounds flag may already be set from pre-attach mutations,
            // short-circuiting the mark above; the index still has to settle
            // this node before its first query.
            self.index.mark_moved(at);
            self.mark_render_dirty(at);
        }
    }

    fn detach_subtree(&mut self, id: NodeId) {
        let mut stack = alloc::vec![id];
        while let Some(at) = stack.pop() {
            let Some(n) = self.node(at) else { continue };
            if !n.attached {
                continue;
            }
            stack.extend(n.children.iter().copied());
            // Final pulse while still attached: the vacated region must
            // repaint, and the node stays dirty-listed until the next
            // clear_dirty.
            self.mark_world_bounds_dirty(at);
            self.mark_render_dirty(at);
            if let Some(n) = self.node_mut(at) {
                n.attached = false;
            }
            self.watched.remove(&at);
            self.index.remove(at);
        }
    }

    /// Exchange the sibling indices of two children.
    pub fn swap_children(&mut self, a: NodeId, b: NodeId) {
        let (Some(ia), Some(ib)) = (
            self.node(a).map(|n| n.local_index),
            self.node(b).map(|n| n.local_index),
        ) else {
            return;
        };
        self.set_local_index(a, ib);
        self.set_local_index(b, ia);
    }

    /// Set a node's explicit sibling paint index.
    ///
    /// The parent's child list is re-sorted lazily on its next ordered read;
    /// among equal indices the most recently assigned child sorts first.
    pub fn set_local_index(&mut self, id: NodeId, index: i32) {
        let stamp = self.next_stamp();
        let Some(n) = self.node_mut(id) else { return };
        if n.local_index == index {
            return;
        }
        n.local_index = index;
        n.reorder_seq = stamp;
        self.mark_global_z_dirty(id);
    }

    /// A node's current sibling index.
    pub fn local_index(&self, id: NodeId) -> Option<i32> {
        self.node(id).map(|n| n.local_index)
    }

    /// Position of `child` within `parent`'s ordered children.
    pub fn child_index(&mut self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.settle_children_order(parent);
        self.node(parent)?.children.iter().position(|c| *c == child)
    }

    /// Child at `index` in paint order.
    pub fn child_at(&mut self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.settle_children_order(parent);
        self.node(parent)?.children.get(index).copied()
    }

    /// Ordered children of `parent`, reindexed densely if stale.
    pub fn children(&mut self, parent: NodeId) -> &[NodeId] {
        self.settle_children_order(parent);
        self.node(parent).map_or(&[], |n| n.children.as_slice())
    }

    /// Depth-first search for the first node named `name`, direct children
    /// before grandchildren.
    pub fn child_by_name(&mut self, from: NodeId, name: &str) -> Option<NodeId> {
        self.settle_children_order(from);
        let children: SmallVec<[NodeId; 8]> =
            self.node(from)?.children.iter().copied().collect();
        for &c in &children {
            if self.node(c).is_some_and(|n| n.name == name) {
                return Some(c);
            }
        }
        for &c in &children {
            if let Some(found) = self.child_by_name(c, name) {
                return Some(found);
            }
        }
        None
    }

    fn next_stamp(&mut self) -> u64 {
        self.reorder_clock += 1;
        self.reorder_clock
    }

    fn settle_children_order(&mut self, id: NodeId) {
        let Some(n) = self.node(id) else { return };
        if !n.dirty.contains(DirtyFlags::CHILDREN_ORDER) {
            return;
        }
        let mut order: SmallVec<[(i32, Reverse<u64>, NodeId); 8]> = n
            .children
            .iter()
            .filter_map(|&c| {
                let cn = self.node(c)?;
                Some((cn.local_index, Reverse(cn.reorder_seq), c))
            })
            .collect();
        order.sort();
        for (i, &(li, _, c)) in order.iter().enumerate() {
            if li != i as i32 {
                self.set_local_index(c, i as i32);
            }
        }
        if let Some(n) = self.node_mut(id) {
            n.children.clear();
            n.children.extend(order.iter().map(|&(_, _, c)| c));
            // Marks made by the dense reindex above are consumed here.
            n.dirty.remove(DirtyFlags::CHILDREN_ORDER);
        }
    }

    // --- invalidation cascades ---

    fn mark_matrix_dirty(&mut self, id: NodeId) {
        let Some(n) = self.node_mut(id) else { return };
        if n.dirty.contains(DirtyFlags::MATRIX) {
            return;
        }
        n.dirty.insert(DirtyFlags::MATRIX);
        let children: SmallVec<[NodeId; 8]> = n.children.iter().copied().collect();
        self.mark_world_bounds_dirty(id);
        self.mark_render_dirty(id);
        for c in children {
            self.mark_matrix_dirty(c);
        }
    }

    fn mark_opacity_dirty(&mut self, id: NodeId) {
        let Some(n) = self.node_mut(id) else { return };
        if n.dirty.contains(DirtyFlags::GLOBAL_OPACITY) {
            return;
        }
        n.dirty.insert(DirtyFlags::GLOBAL_OPACITY);
        let children: SmallVec<[NodeId; 8]> = n.children.iter().copied().collect();
        self.mark_render_dirty(id);
        for c in children {
            self.mark_opacity_dirty(c);
        }
    }

    fn mark_world_bounds_dirty(&mut self, id: NodeId) {
        let is_root = id == self.root;
        let Some(n) = self.node_mut(id) else { return };
        if n.dirty.contains(DirtyFlags::WORLD_BOUNDS) {
            return;
        }
        n.dirty.insert(DirtyFlags::WORLD_BOUNDS);
        // The first invalidation of a tick pins the pre-change bounds; they
        // become the "from" half of this node's damage.
        if !n.bounds_captured {
            n.last_world_bounds = n.world_bounds;
            n.bounds_captured = true;
        }
        if n.attached && !is_root {
            self.index.mark_moved(id);
        }
    }

    fn mark_render_dirty(&mut self, id: NodeId) {
        let is_root = id == self.root;
        let Some(n) = self.node_mut(id) else { return };
        n.dirty.insert(DirtyFlags::RENDER);
        if n.attached && !is_root {
            self.dirty.insert(id);
        }
    }

    fn mark_global_z_dirty(&mut self, id: NodeId) {
        if let Some(p) = self.parent(id)
            && let Some(pn) = self.node_mut(p)
        {
            pn.dirty.insert(DirtyFlags::CHILDREN_ORDER);
        }
        self.mark_global_z_subtree(id);
    }

    fn mark_global_z_subtree(&mut self, id: NodeId) {
        let Some(n) = self.node_mut(id) else { return };
        if n.dirty.contains(DirtyFlags::GLOBAL_Z) {
            return;
        }
        n.dirty.insert(DirtyFlags::GLOBAL_Z);
        let children: SmallVec<[NodeId; 8]> = n.children.iter().copied().collect();
        for c in children {
            self.mark_global_z_subtree(c);
        }
    }

    // --- derived reads ---

    /// World matrix: the product of ancestor local matrices, root first.
    pub fn world_matrix(&mut self, id: NodeId) -> Affine {
        self.update_world_matrix(id);
        self.node(id).map_or(Affine::IDENTITY, |n| n.world_matrix)
    }

    /// Inverse of the world matrix.
    pub fn inv_world_matrix(&mut self, id: NodeId) -> Affine {
        self.update_world_matrix(id);
        self.node(id).map_or(Affine::IDENTITY, |n| n.inv_world_matrix)
    }

    fn update_world_matrix(&mut self, id: NodeId) {
        // Matrix dirt cascades down eagerly, so the nearest clean ancestor's
        // cache is valid; recompute from there downward.
        let mut chain: SmallVec<[NodeId; 8]> = SmallVec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let Some(n) = self.node(c) else { break };
            if !n.dirty.contains(DirtyFlags::MATRIX) {
                break;
            }
            chain.push(c);
            cur = n.parent;
        }
        for &c in chain.iter().rev() {
            let parent_world = self
                .node(c)
                .and_then(|n| n.parent)
                .and_then(|p| self.node(p))
                .map_or(Affine::IDENTITY, |p| p.world_matrix);
            if let Some(n) = self.node_mut(c) {
                let world = parent_world * n.transform.matrix();
                n.world_matrix = world;
                n.inv_world_matrix = world.inverse();
                n.dirty.remove(DirtyFlags::MATRIX);
            }
        }
    }

    /// Axis-aligned world bounds of the node's local bounds.
    pub fn world_bounds(&mut self, id: NodeId) -> Aabb2D {
        let Some(n) = self.node(id) else {
            return Aabb2D::new(0.0, 0.0, 0.0, 0.0);
        };
        if n.dirty
            .intersects(DirtyFlags::WORLD_BOUNDS | DirtyFlags::LOCAL_BOUNDS)
        {
            let world = self.world_matrix(id);
            if let Some(n) = self.node_mut(id) {
                n.world_bounds = rect_to_aabb(transform_rect_bbox(world, n.local_bounds));
                n.dirty
                    .remove(DirtyFlags::WORLD_BOUNDS | DirtyFlags::LOCAL_BOUNDS);
            }
        }
        self.node(id)
            .map_or(Aabb2D::new(0.0, 0.0, 0.0, 0.0), |n| n.world_bounds)
    }

    /// World bounds as of the start of the current dirty period.
    pub fn last_world_bounds(&self, id: NodeId) -> Aabb2D {
        self.node(id)
            .map_or(Aabb2D::new(0.0, 0.0, 0.0, 0.0), |n| n.last_world_bounds)
    }

    /// Product of local opacities down from the root. At or below zero the
    /// node is skipped by queries and painting.
    pub fn global_opacity(&mut self, id: NodeId) -> f64 {
        let Some(n) = self.node(id) else { return 0.0 };
        if n.dirty.contains(DirtyFlags::GLOBAL_OPACITY) {
            let parent_opacity = match n.parent {
                Some(p) => self.global_opacity(p),
                None => 1.0,
            };
            if let Some(n) = self.node_mut(id) {
                n.global_opacity = n.opacity * parent_opacity;
                n.dirty.remove(DirtyFlags::GLOBAL_OPACITY);
            }
        }
        self.node(id).map_or(0.0, |n| n.global_opacity)
    }

    /// Paint-order path: ancestor sibling indices from the root down to this
    /// node's own index.
    pub fn global_z(&mut self, id: NodeId) -> SmallVec<[i32; 8]> {
        self.update_global_z(id);
        self.node(id).map_or(SmallVec::new(), |n| n.global_z.clone())
    }

    fn update_global_z(&mut self, id: NodeId) {
        let Some(n) = self.node(id) else { return };
        if !n.dirty.contains(DirtyFlags::GLOBAL_Z) {
            return;
        }
        let parent = n.parent;
        let mut path: SmallVec<[i32; 8]> = SmallVec::new();
        if let Some(p) = parent {
            // Sibling indices must be dense before they enter a path.
            self.settle_children_order(p);
            self.update_global_z(p);
            if let Some(pn) = self.node(p) {
                path.extend_from_slice(&pn.global_z);
            }
        }
        if let Some(n) = self.node_mut(id) {
            path.push(n.local_index);
            n.global_z = path;
            n.dirty.remove(DirtyFlags::GLOBAL_Z);
        }
    }

    /// Strict total paint order: lexicographic on the global paint path,
    /// shorter prefix first on ties.
    pub fn paint_cmp(&mut self, a: NodeId, b: NodeId) -> Ordering {
        self.update_global_z(a);
        self.update_global_z(b);
        let empty: &[i32] = &[];
        let pa = self.node(a).map_or(empty, |n| n.global_z.as_slice());
        let pb = self.node(b).map_or(empty, |n| n.global_z.as_slice());
        pa.cmp(pb)
    }

    /// Sort `ids` into paint order.
    pub fn sort_for_paint(&mut self, ids: &mut [NodeId]) {
        for &id in ids.iter() {
            self.update_global_z(id);
        }
        let empty: SmallVec<[i32; 8]> = SmallVec::new();
        ids.sort_unstable_by(|&a, &b| {
            let pa = self.node(a).map_or(&empty, |n| &n.global_z);
            let pb = self.node(b).map_or(&empty, |n| &n.global_z);
            pa.cmp(pb).then(a.cmp(&b))
        });
    }

    // --- frame bookkeeping ---

    /// Forget all scheduled repaints.
    ///
    /// Clears each dirty node's render flag and its per-tick bounds guard,
    /// then empties the set. Called once per painted frame; skipping a frame
    /// merely leaves a superset of dirty state for the next one.
    pub fn clear_dirty(&mut self) {
        let mut set = mem::take(&mut self.dirty);
        for &id in &set {
            if let Some(n) = self.node_mut(id) {
                n.dirty.remove(DirtyFlags::RENDER);
                n.bounds_captured = false;
            }
        }
        set.clear();
        self.dirty = set;
    }

    /// Collect attached nodes overlapping `rect` that are visible with a
    /// positive global opacity.
    ///
    /// Settles pending index moves first by computing current world bounds,
    /// so results always reflect the latest mutations.
    pub fn nodes_overlapping(&mut self, rect: &Aabb2D, out: &mut Vec<NodeId>) {
        let mut index = mem::take(&mut self.index);
        index.settle(|id| {
            if !self.is_attached(id) {
                return None;
            }
            Some(self.world_bounds(id))
        });
        let mut hits = mem::take(&mut self.scratch);
        hits.clear();
        index.tree().query(rect, &mut hits);
        self.index = index;
        for id in hits.drain(..) {
            if self.visible(id) && self.global_opacity(id) > 0.0 {
                out.push(id);
            }
        }
        self.scratch = hits;
    }
}
