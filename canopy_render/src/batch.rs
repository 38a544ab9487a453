// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Batched draw-call backend.
//!
//! Models a GPU-style pipeline at the draw-call-record level: geometry is
//! accumulated into one open batch and flushed as a [`DrawCall`] whenever the
//! program changes, the buffer fills, or the frame ends. Nothing is
//! rasterized; tests and hosts inspect the recorded calls.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use peniko::Color;

use canopy_index::Aabb2D;

use crate::renderer::RenderBackend;
use crate::surface::{RenderError, Surface, check_dims};

/// Vertices an open batch may hold before it must flush.
pub const VERTEX_CAPACITY: usize = 3000;

/// Concurrently bindable textures.
pub const TEXTURE_SLOTS: usize = 16;

/// Position, texture coordinate and color of one batched vertex.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    /// Device-space x.
    pub x: f32,
    /// Device-space y.
    pub y: f32,
    /// Texture u, in `[0, 1]`.
    pub u: f32,
    /// Texture v, in `[0, 1]`.
    pub v: f32,
    /// Straight-alpha RGBA multiplier.
    pub color: [f32; 4],
}

/// One flushed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    /// Program selected when the batch was flushed.
    pub program: String,
    /// Vertices submitted in this call.
    pub vertex_count: usize,
    /// Indices submitted in this call.
    pub index_count: usize,
}

#[derive(Debug)]
struct TextureEntry {
    refcount: u32,
    slot: Option<usize>,
}

/// Accumulates geometry into program batches and records flushed
/// [`DrawCall`]s, plus the texture-slot pool.
pub struct BatchBackend {
    width: u32,
    height: u32,
    program: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    draw_calls: Vec<DrawCall>,
    background: Color,
    textures: HashMap<u32, TextureEntry>,
    slots: [Option<u32>; TEXTURE_SLOTS],
    next_texture: u32,
}

impl core::fmt::Debug for BatchBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchBackend")
            .field("size", &(self.width, self.height))
            .field("program", &self.program)
            .field("pending_vertices", &self.vertices.len())
            .field("draw_calls", &self.draw_calls.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

impl BatchBackend {
    /// Create a backend with the given logical size.
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        check_dims(width, height)?;
        Ok(Self {
            width,
            height,
            program: String::new(),
            vertices: Vec::with_capacity(VERTEX_CAPACITY),
            indices: Vec::new(),
            draw_calls: Vec::new(),
            background: Color::TRANSPARENT,
            textures: HashMap::new(),
            slots: [None; TEXTURE_SLOTS],
            next_texture: 0,
        })
    }

    /// Draw calls flushed since `begin_frame`.
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Background the current frame was cleared to.
    pub const fn background(&self) -> Color {
        self.background
    }

    /// Select the shader program for subsequent geometry, flushing the open
    /// batch if the program actually changes.
    pub fn switch_program(&mut self, name: &str) {
        if self.program == name {
            return;
        }
        self.flush();
        self.program.clear();
        self.program.push_str(name);
    }

    /// Append geometry to the open batch. `indices` are relative to the
    /// start of `vertices` and are rebased onto the batch. Flushes first if
    /// the batch cannot take `vertices` whole.
    pub fn push(&mut self, vertices: &[Vertex], indices: &[u32]) {
        if vertices.is_empty() {
            return;
        }
        if self.vertices.len() + vertices.len() > VERTEX_CAPACITY {
            self.flush();
        }
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| base + i));
    }

    /// Record the open batch as a draw call. No-op while the batch is empty.
    pub fn flush(&mut self) {
        if self.vertices.is_empty() {
            return;
        }
        self.draw_calls.push(DrawCall {
            program: self.program.clone(),
            vertex_count: self.vertices.len(),
            index_count: self.indices.len(),
        });
        self.vertices.clear();
        self.indices.clear();
    }

    /// Register a texture with a reference count of one.
    pub fn create_texture(&mut self) -> u32 {
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(id, TextureEntry { refcount: 1, slot: None });
        id
    }

    /// Add one reference to a texture. Unknown ids are a silent no-op.
    pub fn retain_texture(&mut self, id: u32) {
        if let Some(entry) = self.textures.get_mut(&id) {
            entry.refcount += 1;
        }
    }

    /// Drop one reference. At zero the texture is destroyed and its slot
    /// freed.
    pub fn release_texture(&mut self, id: u32) {
        let Some(entry) = self.textures.get_mut(&id) else {
            return;
        };
        entry.refcount -= 1;
        if entry.refcount == 0 {
            if let Some(slot) = entry.slot {
                self.slots[slot] = None;
            }
            self.textures.remove(&id);
        }
    }

    /// Bind `id` to a texture slot and return the slot index.
    ///
    /// An already-bound texture keeps its slot. Otherwise a free slot is
    /// taken, or the bound texture with the lowest reference count is
    /// evicted. Unknown ids return `None`.
    pub fn bind_texture(&mut self, id: u32) -> Option<usize> {
        let entry = self.textures.get(&id)?;
        if let Some(slot) = entry.slot {
            return Some(slot);
        }
        let slot = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let (victim_slot, &victim_id) = self
                    .slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.as_ref().map(|id| (i, id)))
                    .min_by_key(|&(_, &id)| self.textures[&id].refcount)?;
                if let Some(victim) = self.textures.get_mut(&victim_id) {
                    victim.slot = None;
                }
                victim_slot
            }
        };
        self.slots[slot] = Some(id);
        if let Some(entry) = self.textures.get_mut(&id) {
            entry.slot = Some(slot);
        }
        Some(slot)
    }

    /// The slot a texture is currently bound to, if any.
    pub fn texture_slot(&self, id: u32) -> Option<usize> {
        self.textures.get(&id).and_then(|e| e.slot)
    }
}

impl RenderBackend for BatchBackend {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        check_dims(width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    // A batch has no previous-frame pixels to keep; every frame redraws.
    fn supports_incremental(&self) -> bool {
        false
    }

    fn begin_frame(&mut self, _regions: &[Aabb2D], background: Color) {
        self.background = background;
        self.vertices.clear();
        self.indices.clear();
        self.draw_calls.clear();
    }

    fn end_frame(&mut self) {
        self.flush();
    }

    fn surface(&self) -> Option<&Surface> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> ([Vertex; 4], [u32; 6]) {
        let v = Vertex::default();
        ([v; 4], [0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn program_change_flushes_the_open_batch() {
        let mut b = BatchBackend::new(100, 100).unwrap();
        let (v, i) = quad();
        b.switch_program("sprite");
        b.push(&v, &i);
        b.switch_program("sprite");
        assert!(b.draw_calls().is_empty());
        b.switch_program("text");
        assert_eq!(b.draw_calls().len(), 1);
        assert_eq!(b.draw_calls()[0].program, "sprite");
        assert_eq!(b.draw_calls()[0].vertex_count, 4);
    }

    #[test]
    fn capacity_overflow_flushes_first() {
        let mut b = BatchBackend::new(100, 100).unwrap();
        b.switch_program("sprite");
        let (v, i) = quad();
        for _ in 0..VERTEX_CAPACITY / 4 {
            b.push(&v, &i);
        }
        assert!(b.draw_calls().is_empty());
        b.push(&v, &i);
        assert_eq!(b.draw_calls().len(), 1);
        assert_eq!(b.draw_calls()[0].vertex_count, VERTEX_CAPACITY);
        b.end_frame();
        assert_eq!(b.draw_calls().len(), 2);
        assert_eq!(b.draw_calls()[1].vertex_count, 4);
    }

    #[test]
    fn indices_are_rebased_per_batch() {
        let mut b = BatchBackend::new(100, 100).unwrap();
        let (v, i) = quad();
        b.push(&v, &i);
        b.push(&v, &i);
        b.end_frame();
        assert_eq!(b.draw_calls()[0].index_count, 12);
    }

    #[test]
    fn bind_prefers_free_slots_then_evicts_lowest_refcount() {
        let mut b = BatchBackend::new(100, 100).unwrap();
        let ids: Vec<u32> = (0..TEXTURE_SLOTS as u32).map(|_| b.create_texture()).collect();
        for &id in &ids {
            b.bind_texture(id);
        }
        // Every slot is taken; raise everyone's refcount except ids[3].
        for &id in &ids {
            if id != ids[3] {
                b.retain_texture(id);
            }
        }
        let newcomer = b.create_texture();
        let slot = b.bind_texture(newcomer).unwrap();
        assert_eq!(b.texture_slot(ids[3]), None);
        assert_eq!(b.texture_slot(newcomer), Some(slot));
    }

    #[test]
    fn release_to_zero_frees_the_slot() {
        let mut b = BatchBackend::new(100, 100).unwrap();
        let id = b.create_texture();
        let slot = b.bind_texture(id).unwrap();
        b.release_texture(id);
        assert_eq!(b.bind_texture(id), None);
        let replacement = b.create_texture();
        assert_eq!(b.bind_texture(replacement), Some(slot));
    }
}
