// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame orchestration over a [`Stage`].

use alloc::string::ToString;
use alloc::vec::Vec;

use peniko::Color;

use canopy_damage::DamageList;
use canopy_index::Aabb2D;
use canopy_scene::{NodeId, Stage};

use crate::registry::{PaintFn, PaintNode, PaintRegistry};
use crate::surface::{RenderError, Surface};

/// The drawing half of a [`Renderer`].
///
/// Backends own the backing store and the mechanics of clearing, clipping
/// and flushing; the renderer decides what to paint and in what order.
pub trait RenderBackend {
    /// Current backing-store size in pixels.
    fn size(&self) -> (u32, u32);

    /// Reallocate the backing store.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Whether the backend can repaint only the damaged regions of the
    /// previous frame's output.
    fn supports_incremental(&self) -> bool;

    /// Prepare the damaged regions for painting. For incremental backends
    /// this clears and clips to `regions`; others clear everything.
    fn begin_frame(&mut self, regions: &[Aabb2D], background: Color);

    /// Finish the frame, flushing any buffered work.
    fn end_frame(&mut self);

    /// The finished pixels, if the backend rasterizes on the CPU.
    fn surface(&self) -> Option<&Surface>;
}

/// Counters accumulated across [`Renderer::render_stage`] calls.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that painted something.
    pub frames: u64,
    /// Of those, frames that repainted only damaged regions.
    pub incremental_frames: u64,
    /// Calls that returned without painting.
    pub noop_frames: u64,
    /// Nodes dispatched to paint functions.
    pub painted_nodes: u64,
    /// Damage regions painted, summed over frames.
    pub damage_regions: u64,
}

/// Repaints the damaged parts of a [`Stage`] through a [`RenderBackend`].
pub struct Renderer<B> {
    backend: B,
    background: Color,
    width: u32,
    height: u32,
    incremental_enabled: bool,
    incremental_ratio: f64,
    needs_refresh: bool,
    collector: DamageList,
    registry: PaintRegistry<B>,
    stats: FrameStats,
    dirty_scratch: Vec<NodeId>,
    paint_list: Vec<NodeId>,
}

impl<B: RenderBackend> core::fmt::Debug for Renderer<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("size", &(self.width, self.height))
            .field("incremental_enabled", &self.incremental_enabled)
            .field("needs_refresh", &self.needs_refresh)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<B: RenderBackend> Renderer<B> {
    /// The dirty-to-watched ratio above which a full refresh beats
    /// incremental repaint.
    pub const DEFAULT_INCREMENTAL_RATIO: f64 = 0.6;

    /// Wrap a backend. The first frame always repaints in full.
    pub fn new(backend: B, background: Color) -> Self {
        let (width, height) = backend.size();
        Self {
            backend,
            background,
            width,
            height,
            incremental_enabled: true,
            incremental_ratio: Self::DEFAULT_INCREMENTAL_RATIO,
            needs_refresh: true,
            collector: DamageList::new(),
            registry: PaintRegistry::new(),
            stats: FrameStats::default(),
            dirty_scratch: Vec::new(),
            paint_list: Vec::new(),
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the wrapped backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Counters accumulated so far.
    pub const fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Logical size in pixels.
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Change the logical size. The backing store is resized on the next
    /// frame, which then repaints in full.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Color damage regions are cleared to before painting.
    pub fn set_background(&mut self, background: Color) {
        self.background = background;
    }

    /// Turn incremental repaint off (or back on). While off every frame
    /// repaints the whole surface.
    pub fn set_incremental_enabled(&mut self, enabled: bool) {
        self.incremental_enabled = enabled;
    }

    /// Force the next frame to repaint everything.
    pub fn request_refresh(&mut self) {
        self.needs_refresh = true;
    }

    /// Register `paint` for nodes tagged `kind`.
    pub fn register(&mut self, kind: &str, paint: PaintFn<B>) {
        self.registry.register(kind, paint);
    }

    /// Paint one frame.
    ///
    /// With `Some(target)` the finished pixels are composited onto `target`
    /// and the stage's dirty state is left untouched, so further targets can
    /// read the same frame. With `None` the frame is considered consumed:
    /// the stage's dirty set and the damage accumulator are cleared.
    pub fn render_stage(
        &mut self,
        stage: &mut Stage,
        target: Option<&mut Surface>,
    ) -> Result<(), RenderError> {
        if stage.dirty_count() == 0 && !self.needs_refresh {
            self.stats.noop_frames += 1;
            return Ok(());
        }

        if self.backend.size() != (self.width, self.height) {
            self.backend.resize(self.width, self.height)?;
            self.needs_refresh = true;
        }
        let surface_rect =
            Aabb2D::new(0.0, 0.0, f64::from(self.width), f64::from(self.height));

        let incremental = !self.needs_refresh
            && self.backend.supports_incremental()
            && self.incremental_enabled
            && stage.watched_count() as f64 * self.incremental_ratio
                >= stage.dirty_count() as f64;

        if incremental {
            self.dirty_scratch.clear();
            self.dirty_scratch.extend(stage.dirty_nodes());
            for &id in &self.dirty_scratch {
                let last = stage.last_world_bounds(id);
                if !last.is_empty() && last.overlaps(&surface_rect) {
                    self.collector.add(last);
                }
                let current = stage.world_bounds(id);
                if !current.is_empty() && current.overlaps(&surface_rect) {
                    self.collector.add(current);
                }
            }
        } else {
            self.collector.add(surface_rect);
        }

        self.paint_list.clear();
        for region in self.collector.regions() {
            stage.nodes_overlapping(region, &mut self.paint_list);
        }
        stage.sort_for_paint(&mut self.paint_list);
        self.paint_list.dedup();

        self.backend.begin_frame(self.collector.regions(), self.background);
        for &id in &self.paint_list {
            let Some(kind) = stage.kind(id).map(ToString::to_string) else {
                continue;
            };
            let Some(paint) = self.registry.get(&kind) else { continue };
            let node = PaintNode {
                id,
                kind,
                world_transform: stage.world_matrix(id),
                world_bounds: stage.world_bounds(id),
                global_opacity: stage.global_opacity(id),
                composite: stage.composite(id),
            };
            paint(&mut self.backend, &node);
            self.stats.painted_nodes += 1;
        }
        self.backend.end_frame();

        self.stats.frames += 1;
        self.stats.damage_regions += self.collector.len() as u64;
        if incremental {
            self.stats.incremental_frames += 1;
        }

        match target {
            Some(target) => {
                if let Some(surface) = self.backend.surface() {
                    target.composite_from(surface);
                }
            }
            None => {
                stage.clear_dirty();
                self.collector.reset();
            }
        }
        self.needs_refresh = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;

    use crate::batch::{BatchBackend, Vertex};
    use crate::raster::RasterBackend;

    use super::*;

    const RED: Color = Color::from_rgb8(255, 0, 0);

    fn paint_bounds(b: &mut RasterBackend, node: &PaintNode) {
        let wb = node.world_bounds;
        b.fill_rect(
            kurbo::Affine::IDENTITY,
            Rect::new(wb.min_x, wb.min_y, wb.max_x, wb.max_y),
            RED,
            node.global_opacity,
            node.composite,
        );
    }

    fn raster_renderer(width: u32, height: u32) -> Renderer<RasterBackend> {
        let mut r = Renderer::new(
            RasterBackend::new(width, height).unwrap(),
            Color::TRANSPARENT,
        );
        r.register("sprite", paint_bounds);
        r
    }

    fn sprite_at(stage: &mut Stage, x: f64, y: f64) -> NodeId {
        let id = stage.spawn_kind("sprite");
        stage.set_local_bounds(id, Rect::new(0.0, 0.0, 4.0, 4.0));
        stage.add_child(stage.root(), id);
        stage.set_translation(id, x, y);
        id
    }

    #[test]
    fn clean_stage_is_a_noop_frame() {
        let mut stage = Stage::new();
        sprite_at(&mut stage, 0.0, 0.0);
        let mut r = raster_renderer(16, 16);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().frames, 1);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().frames, 1);
        assert_eq!(r.stats().noop_frames, 1);
    }

    #[test]
    fn small_change_repaints_incrementally() {
        let mut stage = Stage::new();
        let moved = sprite_at(&mut stage, 0.0, 0.0);
        sprite_at(&mut stage, 12.0, 0.0);
        sprite_at(&mut stage, 0.0, 12.0);
        sprite_at(&mut stage, 12.0, 12.0);
        let mut r = raster_renderer(16, 16);

        // First frame is forced full.
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().incremental_frames, 0);
        assert_eq!(r.backend().surface().unwrap().pixel(2, 2), [255, 0, 0, 255]);

        // One dirty node out of four watched repaints only its damage.
        stage.set_translation(moved, 5.0, 5.0);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().incremental_frames, 1);
        let s = r.backend().surface().unwrap();
        assert_eq!(s.pixel(2, 2), [0, 0, 0, 0]);
        assert_eq!(s.pixel(6, 6), [255, 0, 0, 255]);
        assert_eq!(s.pixel(13, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn disabling_incremental_forces_full_frames() {
        let mut stage = Stage::new();
        let moved = sprite_at(&mut stage, 0.0, 0.0);
        sprite_at(&mut stage, 12.0, 0.0);
        sprite_at(&mut stage, 0.0, 12.0);
        let mut r = raster_renderer(16, 16);
        r.set_incremental_enabled(false);
        r.render_stage(&mut stage, None).unwrap();
        stage.set_translation(moved, 5.0, 5.0);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().frames, 2);
        assert_eq!(r.stats().incremental_frames, 0);
    }

    #[test]
    fn too_many_dirty_nodes_fall_back_to_full() {
        let mut stage = Stage::new();
        let a = sprite_at(&mut stage, 0.0, 0.0);
        let b = sprite_at(&mut stage, 12.0, 0.0);
        let c = sprite_at(&mut stage, 0.0, 12.0);
        let mut r = raster_renderer(16, 16);
        r.render_stage(&mut stage, None).unwrap();
        // 3 watched * 0.6 < 3 dirty.
        stage.translate(a, 1.0, 0.0);
        stage.translate(b, 1.0, 0.0);
        stage.translate(c, 1.0, 0.0);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().incremental_frames, 0);
    }

    #[test]
    fn resize_forces_a_full_refresh() {
        let mut stage = Stage::new();
        let moved = sprite_at(&mut stage, 0.0, 0.0);
        sprite_at(&mut stage, 12.0, 0.0);
        sprite_at(&mut stage, 0.0, 12.0);
        sprite_at(&mut stage, 12.0, 12.0);
        let mut r = raster_renderer(16, 16);
        r.render_stage(&mut stage, None).unwrap();
        r.set_size(20, 20);
        stage.translate(moved, 1.0, 0.0);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.backend().size(), (20, 20));
        assert_eq!(r.stats().incremental_frames, 0);
    }

    #[test]
    fn target_composite_keeps_the_frame_readable() {
        let mut stage = Stage::new();
        sprite_at(&mut stage, 0.0, 0.0);
        let mut r = raster_renderer(16, 16);
        let mut a = Surface::new(16, 16).unwrap();
        let mut b = Surface::new(16, 16).unwrap();

        r.render_stage(&mut stage, Some(&mut a)).unwrap();
        assert_eq!(a.pixel(2, 2), [255, 0, 0, 255]);
        assert!(stage.dirty_count() > 0);

        // The same frame is still available to a second target.
        r.render_stage(&mut stage, Some(&mut b)).unwrap();
        assert_eq!(b.pixel(2, 2), [255, 0, 0, 255]);

        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(stage.dirty_count(), 0);
    }

    #[test]
    fn unregistered_kinds_are_skipped() {
        let mut stage = Stage::new();
        let id = stage.spawn_kind("mystery");
        stage.set_local_bounds(id, Rect::new(0.0, 0.0, 4.0, 4.0));
        stage.add_child(stage.root(), id);
        let mut r = raster_renderer(16, 16);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().frames, 1);
        assert_eq!(r.stats().painted_nodes, 0);
    }

    #[test]
    fn hidden_nodes_are_not_painted() {
        let mut stage = Stage::new();
        let id = sprite_at(&mut stage, 0.0, 0.0);
        stage.set_visible(id, false);
        let mut r = raster_renderer(16, 16);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().painted_nodes, 0);
    }

    #[test]
    fn batch_backend_records_draw_calls_and_never_goes_incremental() {
        fn paint_quad(b: &mut BatchBackend, _node: &PaintNode) {
            b.switch_program("sprite");
            b.push(&[Vertex::default(); 4], &[0, 1, 2, 0, 2, 3]);
        }
        let mut stage = Stage::new();
        let moved = sprite_at(&mut stage, 0.0, 0.0);
        sprite_at(&mut stage, 12.0, 0.0);
        sprite_at(&mut stage, 0.0, 12.0);
        sprite_at(&mut stage, 12.0, 12.0);
        let mut r = Renderer::new(BatchBackend::new(16, 16).unwrap(), Color::TRANSPARENT);
        r.register("sprite", paint_quad);

        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.backend().draw_calls().len(), 1);
        assert_eq!(r.backend().draw_calls()[0].vertex_count, 16);

        stage.set_translation(moved, 5.0, 5.0);
        r.render_stage(&mut stage, None).unwrap();
        assert_eq!(r.stats().incremental_frames, 0);
        // A full frame repaints all four sprites again.
        assert_eq!(r.backend().draw_calls()[0].vertex_count, 16);
    }
}

