// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! CPU raster backend with damage-region clipping.

use alloc::vec::Vec;

use kurbo::{Affine, Rect};
use peniko::Color;

use canopy_index::Aabb2D;
use canopy_scene::CompositeOp;

use crate::renderer::RenderBackend;
use crate::surface::{RenderError, Surface, color_to_rgba8};

/// Paints into an owned [`Surface`], honoring the frame's damage regions as
/// a clip. Supports incremental repaint: pixels outside the regions keep
/// their previous frame's value.
pub struct RasterBackend {
    surface: Surface,
    clips: Vec<Aabb2D>,
}

impl core::fmt::Debug for RasterBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RasterBackend")
            .field("surface", &self.surface)
            .field("clips", &self.clips.len())
            .finish()
    }
}

impl RasterBackend {
    /// Create a backend with an owned surface of the given size.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        Ok(Self {
            surface: Surface::new(width, height)?,
            clips: Vec::new(),
        })
    }

    /// Fill `rect`, transformed by `transform`, with `color` at `alpha`.
    ///
    /// Each covered pixel is painted at most once even when the active clip
    /// regions overlap, so translucent fills never double-blend.
    pub fn fill_rect(
        &mut self,
        transform: Affine,
        rect: Rect,
        color: Color,
        alpha: f64,
        op: CompositeOp,
    ) {
        if self.clips.is_empty() || rect.is_zero_area() || alpha <= 0.0 {
            return;
        }
        let inverse = transform.inverse();
        let device = transform.transform_rect_bbox(rect);
        let x0 = (device.x0.floor().max(0.0) as u32).min(self.surface.width());
        let y0 = (device.y0.floor().max(0.0) as u32).min(self.surface.height());
        let x1 = (device.x1.ceil().max(0.0) as u32).min(self.surface.width());
        let y1 = (device.y1.ceil().max(0.0) as u32).min(self.surface.height());

        let src = color_to_rgba8(color);
        let src_alpha = f64::from(src[3]) / 255.0 * alpha.clamp(0.0, 1.0);
        for y in y0..y1 {
            for x in x0..x1 {
                let cx = f64::from(x) + 0.5;
                let cy = f64::from(y) + 0.5;
                if !self.clips.iter().any(|c| c.contains_point(cx, cy)) {
                    continue;
                }
                let local = inverse * kurbo::Point::new(cx, cy);
                if !rect.contains(local) {
                    continue;
                }
                let dst = self.surface.pixel(x, y);
                self.surface.put_pixel(x, y, blend(src, src_alpha, dst, op));
            }
        }
    }
}

/// Porter-Duff style blend of one pixel, non-premultiplied RGBA8 in and out.
fn blend(src: [u8; 4], src_alpha: f64, dst: [u8; 4], op: CompositeOp) -> [u8; 4] {
    let sa = src_alpha;
    let da = f64::from(dst[3]) / 255.0;
    // Premultiplied channels.
    let sc = |i: usize| f64::from(src[i]) / 255.0 * sa;
    let dc = |i: usize| f64::from(dst[i]) / 255.0 * da;

    let (oa, o): (f64, [f64; 3]) = match op {
        CompositeOp::SourceOver => {
            let oa = sa + da * (1.0 - sa);
            (oa, [0, 1, 2].map(|i| sc(i) + dc(i) * (1.0 - sa)))
        }
        CompositeOp::DestinationOver => {
            let oa = da + sa * (1.0 - da);
            (oa, [0, 1, 2].map(|i| dc(i) + sc(i) * (1.0 - da)))
        }
        CompositeOp::Lighter => {
            let oa = (sa + da).min(1.0);
            (oa, [0, 1, 2].map(|i| (sc(i) + dc(i)).min(1.0)))
        }
        CompositeOp::Copy => (sa, [0, 1, 2].map(sc)),
    };
    if oa <= 0.0 {
        return [0, 0, 0, 0];
    }
    let to_u8 = |v: f64| (v / oa * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(o[0]), to_u8(o[1]), to_u8(o[2]), (oa * 255.0).round() as u8]
}

impl RenderBackend for RasterBackend {
    fn size(&self) -> (u32, u32) {
        (self.surface.width(), self.surface.height())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.surface.resize(width, height)
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    fn begin_frame(&mut self, regions: &[Aabb2D], background: Color) {
        self.clips.clear();
        for region in regions {
            let r = region.round_out();
            self.surface.fill_region(
                r.min_x as i64,
                r.min_y as i64,
                r.max_x as i64,
                r.max_y as i64,
                background,
            );
            self.clips.push(r);
        }
    }

    fn end_frame(&mut self) {
        self.clips.clear();
    }

    fn surface(&self) -> Option<&Surface> {
        Some(&self.surface)
    }
}
