// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RGBA8 raster target.

use alloc::vec::Vec;
use core::fmt;

use peniko::Color;

/// Largest accepted surface edge, in pixels.
pub const MAX_SURFACE_DIM: u32 = 16384;

/// Fatal renderer setup failures.
///
/// Everything else in the render path is a documented silent no-op; only
/// backing-store creation can actually fail, and it fails at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// Requested surface dimensions were zero or above
    /// [`MAX_SURFACE_DIM`].
    SurfaceCreation { width: u32, height: u32 },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceCreation { width, height } => {
                write!(f, "cannot create a {width}x{height} surface")
            }
        }
    }
}

impl core::error::Error for RenderError {}

/// A resizable CPU-side RGBA8 pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

pub(crate) fn check_dims(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 || width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
        return Err(RenderError::SurfaceCreation { width, height });
    }
    Ok(())
}

impl Surface {
    /// Allocate a transparent surface.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        check_dims(width, height)?;
        Ok(Self {
            width,
            height,
            data: alloc::vec![0; width as usize * height as usize * 4],
        })
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 pixels, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reallocate the backing store. Existing content is dropped.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        check_dims(width, height)?;
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize * 4, 0);
        Ok(())
    }

    /// RGBA value of one pixel. `x`/`y` must be in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub(crate) fn put_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Overwrite every pixel with `color`.
    pub fn clear(&mut self, color: Color) {
        let px = color_to_rgba8(color);
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Overwrite a pixel-aligned rectangle with `color`, clipped to the
    /// surface.
    pub(crate) fn fill_region(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Color) {
        let px = color_to_rgba8(color);
        let x0 = x0.clamp(0, i64::from(self.width)) as u32;
        let y0 = y0.clamp(0, i64::from(self.height)) as u32;
        let x1 = x1.clamp(0, i64::from(self.width)) as u32;
        let y1 = y1.clamp(0, i64::from(self.height)) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                self.put_pixel(x, y, px);
            }
        }
    }

    /// Blit `src` onto this surface at the origin, cropped to the shared
    /// extent.
    pub fn composite_from(&mut self, src: &Surface) {
        let w = self.width.min(src.width) as usize;
        let h = self.height.min(src.height) as usize;
        for y in 0..h {
            let dst_row = y * self.width as usize * 4;
            let src_row = y * src.width as usize * 4;
            self.data[dst_row..dst_row + w * 4]
                .copy_from_slice(&src.data[src_row..src_row + w * 4]);
        }
    }
}

pub(crate) fn color_to_rgba8(color: Color) -> [u8; 4] {
    let c = color.to_rgba8();
    [c.r, c.g, c.b, c.a]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(matches!(
            Surface::new(0, 100),
            Err(RenderError::SurfaceCreation { width: 0, height: 100 })
        ));
        assert!(Surface::new(MAX_SURFACE_DIM + 1, 1).is_err());
    }

    #[test]
    fn clear_fills_every_pixel() {
        let mut s = Surface::new(4, 4).unwrap();
        s.clear(Color::from_rgba8(10, 20, 30, 255));
        assert_eq!(s.pixel(0, 0), [10, 20, 30, 255]);
        assert_eq!(s.pixel(3, 3), [10, 20, 30, 255]);
    }

    #[test]
    fn fill_region_is_clipped() {
        let mut s = Surface::new(4, 4).unwrap();
        s.fill_region(-10, -10, 2, 2, Color::from_rgba8(255, 0, 0, 255));
        assert_eq!(s.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(s.pixel(2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn composite_crops_to_shared_extent() {
        let mut dst = Surface::new(2, 2).unwrap();
        let mut src = Surface::new(4, 4).unwrap();
        src.clear(Color::from_rgba8(0, 255, 0, 255));
        dst.composite_from(&src);
        assert_eq!(dst.pixel(1, 1), [0, 255, 0, 255]);
    }

    #[test]
    fn resize_drops_content() {
        let mut s = Surface::new(2, 2).unwrap();
        s.clear(Color::from_rgba8(1, 2, 3, 4));
        s.resize(3, 3).unwrap();
        assert_eq!(s.width(), 3);
        assert_eq!(s.pixel(0, 0), [0, 0, 0, 0]);
    }
}
