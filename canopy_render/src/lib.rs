// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Render: damage-driven repaint of a Canopy stage.
//!
//! A [`Renderer`] turns the dirty set a [`canopy_scene::Stage`] accumulates
//! between frames into the smallest set of surface regions that must be
//! repainted, queries the stage's spatial index for the nodes each region
//! touches, and dispatches them in paint order to a [`RenderBackend`]:
//!
//! - [`RasterBackend`] rasterizes into an owned RGBA8 [`Surface`] and can
//!   repaint incrementally, leaving undamaged pixels untouched;
//! - [`BatchBackend`] records program/vertex batches as [`DrawCall`]s the
//!   way a GPU pipeline would submit them, and always repaints in full.
//!
//! Whether a frame is incremental is decided per frame: a forced refresh,
//! a backend without incremental support, or a dirty set that is large
//! relative to the watched set all fall back to repainting everything.
//!
//! How a node of a given kind paints is not built in; hosts register a
//! paint function per kind tag in the renderer's [`PaintRegistry`]. Kinds
//! without a registration are skipped.
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod batch;
mod raster;
mod registry;
mod renderer;
mod surface;

pub use batch::{BatchBackend, DrawCall, TEXTURE_SLOTS, VERTEX_CAPACITY, Vertex};
pub use raster::RasterBackend;
pub use registry::{PaintFn, PaintNode, PaintRegistry};
pub use renderer::{FrameStats, RenderBackend, Renderer};
pub use surface::{MAX_SURFACE_DIM, RenderError, Surface};
