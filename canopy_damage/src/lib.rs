// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Damage: dirty-rectangle accumulation and geometric merging.
//!
//! One frame of incremental repaint starts from a pile of damage reports:
//! the previous and current world bounds of every node that changed. Clearing
//! and clipping per report would be wasteful — reports overlap heavily when
//! siblings move together. [`DamageList`] folds each report into a small
//! covering set of rectangles as it arrives.
//!
//! The merge is geometric, classifying how the corners of the incoming
//! rectangle sit relative to each tracked rectangle:
//!
//! - fully contained either way collapses to the larger rectangle;
//! - overlap along one axis (two corners inside) shrinks the overlapped
//!   rectangle to its non-overlapping remainder;
//! - diagonal overlap (one corner each) unions both into one bounding box.
//!
//! Ambiguity is always resolved toward *more* marked area: over-painting a
//! few pixels is invisible, under-painting leaves artifacts on screen.
//!
//! The tracked set is not guaranteed to be minimal or fully disjoint; it is
//! guaranteed to cover every reported rectangle.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;

use canopy_index::Aabb2D;

/// Where the corners of one rectangle fall inside another.
///
/// Built by [`corner_hits`]; edges count as inside, matching the overlap
/// convention of [`Aabb2D::overlaps`].
#[derive(Copy, Clone, Debug, Default)]
struct CornerHits {
    tl: bool,
    tr: bool,
    bl: bool,
    br: bool,
    count: u8,
}

/// Count how many corners of `b` lie inside `a`.
fn corner_hits(a: &Aabb2D, b: &Aabb2D) -> CornerHits {
    let mut hits = CornerHits::default();
    let x_min_in = a.min_x <= b.min_x && b.min_x <= a.max_x;
    let x_max_in = a.min_x <= b.max_x && b.max_x <= a.max_x;
    let y_min_in = a.min_y <= b.min_y && b.min_y <= a.max_y;
    let y_max_in = a.min_y <= b.max_y && b.max_y <= a.max_y;
    if x_min_in && y_min_in {
        hits.tl = true;
        hits.count += 1;
    }
    if x_min_in && y_max_in {
        hits.bl = true;
        hits.count += 1;
    }
    if x_max_in && y_min_in {
        hits.tr = true;
        hits.count += 1;
    }
    if x_max_in && y_max_in {
        hits.br = true;
        hits.count += 1;
    }
    hits
}

/// Cut `contained` down to its remainder outside `containing`.
///
/// `hits` must describe the corners of `contained` that lie inside
/// `containing`, and exactly one edge-pair of them must be set.
fn shrink(containing: &Aabb2D, contained: &mut Aabb2D, hits: CornerHits) {
    if hits.tl && hits.tr {
        contained.min_y = containing.max_y;
    } else if hits.tl && hits.bl {
        contained.min_x = containing.max_x;
    } else if hits.bl && hits.br {
        contained.max_y = containing.min_y;
    } else if hits.tr && hits.br {
        contained.max_x = containing.min_x;
    }
}

/// An ordered set of rectangles approximating the union of reported damage.
///
/// See the crate docs for the merge rules. `reset` keeps the backing
/// storage, so a collector reused across frames stops allocating once it has
/// seen its high-water mark.
#[derive(Clone, Debug, Default)]
pub struct DamageList {
    regions: Vec<Aabb2D>,
    /// Tracked rectangles swallowed by the incoming one, removed after the
    /// scan completes.
    doomed: Vec<usize>,
}

impl DamageList {
    /// Create an empty collector.
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
            doomed: Vec::new(),
        }
    }

    /// Rectangles currently covering the reported damage.
    pub fn regions(&self) -> &[Aabb2D] {
        &self.regions
    }

    /// Number of tracked rectangles.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when no damage has been reported since the last reset.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Drop all tracked rectangles, retaining capacity for the next frame.
    pub fn reset(&mut self) {
        self.regions.clear();
        self.doomed.clear();
    }

    /// Fold one damage rectangle into the tracked set.
    ///
    /// Degenerate rectangles are ignored.
    pub fn add(&mut self, r: Aabb2D) {
        if r.is_empty() {
            return;
        }
        self.doomed.clear();
        let mut region = r;
        for (i, tracked) in self.regions.iter_mut().enumerate() {
            if !tracked.overlaps(&region) {
                continue;
            }
            let in_tracked = corner_hits(tracked, &region);
            match in_tracked.count {
                // Tracked already covers the report.
                4 | 3 => return,
                2 => shrink(tracked, &mut region, in_tracked),
                1 => {
                    let in_region = corner_hits(&region, tracked);
                    match in_region.count {
                        // Diagonal overlap: grow the tracked rectangle to the
                        // common bounding box and stop.
                        1 => {
                            *tracked = tracked.union(&region);
                            return;
                        }
                        2 => shrink(&region, tracked, in_region),
                        4 => self.doomed.push(i),
                        _ => {}
                    }
                }
                0 => {
                    let in_region = corner_hits(&region, tracked);
                    match in_region.count {
                        4 => self.doomed.push(i),
                        2 => shrink(&region, tracked, in_region),
                        3 | 1 => return,
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        for &i in self.doomed.iter().rev() {
            self.regions.remove(i);
        }
        self.doomed.clear();
        if !region.is_empty() {
            self.regions.push(region);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Aabb2D {
        Aabb2D::from_xywh(x, y, w, h)
    }

    #[test]
    fn contained_report_is_discarded() {
        let mut list = DamageList::new();
        list.add(rect(0.0, 0.0, 100.0, 100.0));
        list.add(rect(10.0, 10.0, 20.0, 20.0));
        assert_eq!(list.regions(), &[rect(0.0, 0.0, 100.0, 100.0)]);
    }

    #[test]
    fn diagonal_overlap_unions_to_bounding_box() {
        let mut list = DamageList::new();
        list.add(rect(0.0, 0.0, 100.0, 100.0));
        list.add(rect(50.0, 50.0, 100.0, 100.0));
        assert_eq!(list.regions(), &[rect(0.0, 0.0, 150.0, 150.0)]);
    }

    #[test]
    fn containing_report_replaces_tracked() {
        let mut list = DamageList::new();
        list.add(rect(20.0, 20.0, 10.0, 10.0));
        list.add(rect(0.0, 0.0, 100.0, 100.0));
        assert_eq!(list.regions(), &[rect(0.0, 0.0, 100.0, 100.0)]);
    }

    #[test]
    fn axis_overlap_shrinks_report_to_remainder() {
        let mut list = DamageList::new();
        list.add(rect(0.0, 0.0, 100.0, 100.0));
        // Overlaps the right half along the full height: two left corners
        // inside, so the report keeps only the strip right of x=100.
        list.add(rect(50.0, 0.0, 100.0, 100.0));
        assert_eq!(
            list.regions(),
            &[
                rect(0.0, 0.0, 100.0, 100.0),
                Aabb2D::new(100.0, 0.0, 150.0, 100.0),
            ]
        );
    }

    #[test]
    fn disjoint_reports_are_kept_independent() {
        let mut list = DamageList::new();
        list.add(rect(0.0, 0.0, 10.0, 10.0));
        list.add(rect(500.0, 500.0, 10.0, 10.0));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn degenerate_report_is_ignored() {
        let mut list = DamageList::new();
        list.add(rect(0.0, 0.0, 0.0, 10.0));
        assert!(list.is_empty());
    }

    #[test]
    fn coverage_is_preserved_across_merges() {
        // Whatever the merge does, every reported rectangle must end up
        // covered by at least one tracked rectangle.
        let reports = [
            rect(0.0, 0.0, 60.0, 60.0),
            rect(40.0, 40.0, 60.0, 60.0),
            rect(90.0, 0.0, 30.0, 30.0),
            rect(10.0, 80.0, 30.0, 40.0),
            rect(0.0, 0.0, 120.0, 10.0),
        ];
        let mut list = DamageList::new();
        for r in reports {
            list.add(r);
        }
        for r in &reports {
            // Sample the report's corners and center.
            let pts = [
                (r.min_x, r.min_y),
                (r.max_x, r.min_y),
                (r.min_x, r.max_y),
                (r.max_x, r.max_y),
                (r.mid_x(), r.mid_y()),
            ];
            for (x, y) in pts {
                assert!(
                    list.regions().iter().any(|t| t.contains_point(x, y)),
                    "point ({x}, {y}) of report {r:?} left uncovered"
                );
            }
        }
    }

    #[test]
    fn reset_empties_but_keeps_capacity() {
        let mut list = DamageList::new();
        for i in 0..8 {
            let o = f64::from(i) * 200.0;
            list.add(rect(o, o, 10.0, 10.0));
        }
        let cap = list.regions.capacity();
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.regions.capacity(), cap);
    }
}
