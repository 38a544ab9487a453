// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The axis-aligned bounds primitive.

/// Axis-aligned bounding box in 2D, `f64` world coordinates.
///
/// Stored as min/max corners. An AABB with `max <= min` on either axis is
/// *degenerate*: it has no area, is rejected by the spatial index, and
/// overlaps nothing.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Aabb2D {
    /// Minimum x (left edge).
    pub min_x: f64,
    /// Minimum y (top edge).
    pub min_y: f64,
    /// Maximum x (right edge).
    pub max_x: f64,
    /// Maximum y (bottom edge).
    pub max_y: f64,
}

impl Aabb2D {
    /// Create a new AABB from min/max corners.
    #[inline(always)]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create an AABB from origin and size.
    #[inline]
    pub const fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x + w,
            max_y: y + h,
        }
    }

    /// Width of the AABB. Negative for inverted boxes.
    #[inline]
    pub const fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the AABB. Negative for inverted boxes.
    #[inline]
    pub const fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Return true if the AABB is degenerate (no area). Assumes no NaN.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }

    /// Whether this AABB contains the point. Edges are inclusive.
    #[inline]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    /// Whether this AABB fully contains `other`. Edges are inclusive.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Whether this AABB overlaps `other` in any way.
    ///
    /// The edge of an AABB is considered part of it, so two boxes sharing an
    /// edge overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// The smallest AABB enclosing both boxes.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// The intersection of both boxes. Degenerate when they do not overlap.
    #[inline]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }

    /// Snap outward to whole units so that the result covers `self`.
    ///
    /// Damage regions are rounded out before they are cleared so that a
    /// fractional box never leaves a one-pixel seam unpainted.
    #[inline]
    pub fn round_out(&self) -> Self {
        Self {
            min_x: floor(self.min_x),
            min_y: floor(self.min_y),
            max_x: ceil(self.max_x),
            max_y: ceil(self.max_y),
        }
    }

    /// Center along the x axis.
    #[inline]
    pub const fn mid_x(&self) -> f64 {
        (self.min_x + self.max_x) * 0.5
    }

    /// Center along the y axis.
    #[inline]
    pub const fn mid_y(&self) -> f64 {
        (self.min_y + self.max_y) * 0.5
    }
}

// `f64::floor`/`f64::ceil` live in std, which this crate does not link.
// Truncation through `i64` (saturating at the type limits) covers the
// coordinate magnitudes damage rects and quad-tree bounds take.
#[expect(
    clippy::cast_possible_truncation,
    reason = "Truncation toward zero is the first step of the rounding."
)]
fn floor(v: f64) -> f64 {
    let t = v as i64 as f64;
    if v < t { t - 1.0 } else { t }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "Truncation toward zero is the first step of the rounding."
)]
fn ceil(v: f64) -> f64 {
    let t = v as i64 as f64;
    if v > t { t + 1.0 } else { t }
}
