// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Decomposed local transform over [`kurbo::Affine`].

use kurbo::{Affine, Vec2};

/// A local 2D transform kept in decomposed form.
///
/// Translation, scale, rotation, skew, and pivot are the authoritative
/// inputs; the affine matrix and its inverse are caches recomposed on read.
/// Mutators return `true` when they actually changed something, so an owner
/// can cascade its own invalidation only on real changes.
///
/// Composition order, applied to a local point: move by `-pivot`, scale,
/// skew, rotate, move back by `pivot`, then translate.
#[derive(Clone, Debug)]
pub struct Transform2d {
    tx: f64,
    ty: f64,
    sx: f64,
    sy: f64,
    rotation: f64,
    skx: f64,
    sky: f64,
    px: f64,
    py: f64,
    matrix: Affine,
    inv_matrix: Affine,
    matrix_dirty: bool,
}

impl Default for Transform2d {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform2d {
    /// The identity transform.
    pub const fn new() -> Self {
        Self {
            tx: 0.0,
            ty: 0.0,
            sx: 1.0,
            sy: 1.0,
            rotation: 0.0,
            skx: 0.0,
            sky: 0.0,
            px: 0.0,
            py: 0.0,
            matrix: Affine::IDENTITY,
            inv_matrix: Affine::IDENTITY,
            matrix_dirty: false,
        }
    }

    /// The composed local matrix, recomposed from components if stale.
    pub fn matrix(&mut self) -> Affine {
        self.update_matrix();
        self.matrix
    }

    /// Inverse of the composed local matrix.
    pub fn inv_matrix(&mut self) -> Affine {
        self.update_matrix();
        self.inv_matrix
    }

    fn update_matrix(&mut self) {
        if !self.matrix_dirty {
            return;
        }
        self.matrix = Affine::translate(Vec2::new(self.tx + self.px, self.ty + self.py))
            * Affine::rotate(self.rotation)
            * Affine::skew(self.skx.tan(), self.sky.tan())
            * Affine::scale_non_uniform(self.sx, self.sy)
            * Affine::translate(Vec2::new(-self.px, -self.py));
        self.inv_matrix = self.matrix.inverse();
        self.matrix_dirty = false;
    }

    /// Translation components.
    pub const fn translation(&self) -> (f64, f64) {
        (self.tx, self.ty)
    }

    /// Scale components.
    pub const fn scale(&self) -> (f64, f64) {
        (self.sx, self.sy)
    }

    /// Rotation in radians.
    pub const fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Skew angles in radians.
    pub const fn skew(&self) -> (f64, f64) {
        (self.skx, self.sky)
    }

    /// Pivot point rotation and scale are anchored to.
    pub const fn pivot(&self) -> (f64, f64) {
        (self.px, self.py)
    }

    fn set(dst: &mut f64, v: f64, dirty: &mut bool) {
        if *dst != v {
            *dst = v;
            *dirty = true;
        }
    }

    /// Set the translation. Returns whether the matrix was dirtied.
    pub fn set_translation(&mut self, x: f64, y: f64) -> bool {
        let mut dirty = false;
        Self::set(&mut self.tx, x, &mut dirty);
        Self::set(&mut self.ty, y, &mut dirty);
        self.matrix_dirty |= dirty;
        dirty
    }

    /// Offset the translation.
    pub fn translate(&mut self, dx: f64, dy: f64) -> bool {
        self.set_translation(self.tx + dx, self.ty + dy)
    }

    /// Set the scale.
    pub fn set_scale(&mut self, x: f64, y: f64) -> bool {
        let mut dirty = false;
        Self::set(&mut self.sx, x, &mut dirty);
        Self::set(&mut self.sy, y, &mut dirty);
        self.matrix_dirty |= dirty;
        dirty
    }

    /// Multiply the scale.
    pub fn scale_by(&mut self, fx: f64, fy: f64) -> bool {
        self.set_scale(self.sx * fx, self.sy * fy)
    }

    /// Set the rotation, in radians.
    pub fn set_rotation(&mut self, r: f64) -> bool {
        let mut dirty = false;
        Self::set(&mut self.rotation, r, &mut dirty);
        self.matrix_dirty |= dirty;
        dirty
    }

    /// Add to the rotation.
    pub fn rotate(&mut self, dr: f64) -> bool {
        self.set_rotation(self.rotation + dr)
    }

    /// Set the skew angles, in radians.
    pub fn set_skew(&mut self, x: f64, y: f64) -> bool {
        let mut dirty = false;
        Self::set(&mut self.skx, x, &mut dirty);
        Self::set(&mut self.sky, y, &mut dirty);
        self.matrix_dirty |= dirty;
        dirty
    }

    /// Add to the skew angles.
    pub fn skew_by(&mut self, dx: f64, dy: f64) -> bool {
        self.set_skew(self.skx + dx, self.sky + dy)
    }

    /// Set the pivot point. The pivot alone never moves the node's
    /// translation; it re-anchors rotation and scale.
    pub fn set_pivot(&mut self, x: f64, y: f64) -> bool {
        let mut dirty = false;
        Self::set(&mut self.px, x, &mut dirty);
        Self::set(&mut self.py, y, &mut dirty);
        self.matrix_dirty |= dirty;
        dirty
    }

    /// Mirror horizontally by negating the x scale.
    pub fn flip_x(&mut self) -> bool {
        self.set_scale(-self.sx, self.sy)
    }

    /// Mirror vertically by negating the y scale.
    pub fn flip_y(&mut self) -> bool {
        self.set_scale(self.sx, -self.sy)
    }

    /// Adopt `m` as the local matrix and decompose it back into components.
    ///
    /// The stored matrix is authoritative after this call; the decomposed
    /// translation/scale/rotation/skew are a best-effort QR-style reading
    /// around a zero pivot. The pivot is left untouched.
    pub fn set_matrix(&mut self, m: Affine) -> bool {
        if !self.matrix_dirty && self.matrix == m {
            return false;
        }
        self.matrix = m;
        self.inv_matrix = m.inverse();
        self.decompose();
        self.matrix_dirty = false;
        true
    }

    fn decompose(&mut self) {
        const EPS: f64 = 1e-8;
        let [a, b, c, d, e, f] = self.matrix.as_coeffs();
        let skew_x = -(-c).atan2(d);
        let skew_y = b.atan2(a);
        let delta = (skew_x + skew_y).abs();
        if delta < EPS || (core::f64::consts::FRAC_PI_2 - delta).abs() < EPS {
            self.rotation = skew_y;
            if a < 0.0 && d >= 0.0 {
                self.rotation += if self.rotation <= 0.0 {
                    core::f64::consts::PI
                } else {
                    -core::f64::consts::PI
                };
            }
            self.skx = 0.0;
            self.sky = 0.0;
        } else {
            self.rotation = 0.0;
            self.skx = skew_x;
            self.sky = skew_y;
        }
        self.sx = (a * a + b * b).sqrt();
        self.sy = (c * c + d * d).sqrt();
        self.tx = e;
        self.ty = f;
    }

    /// Back to identity components; the pivot is kept.
    pub fn reset(&mut self) -> bool {
        let changed = self.tx != 0.0
            || self.ty != 0.0
            || self.sx != 1.0
            || self.sy != 1.0
            || self.rotation != 0.0
            || self.skx != 0.0
            || self.sky != 0.0;
        self.tx = 0.0;
        self.ty = 0.0;
        self.sx = 1.0;
        self.sy = 1.0;
        self.rotation = 0.0;
        self.skx = 0.0;
        self.sky = 0.0;
        self.matrix_dirty |= changed;
        changed
    }
}
