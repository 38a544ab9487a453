// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use kurbo::Rect;

use canopy_scene::{NodeId, Stage};

/// A `width`-ary tree of `depth` levels under the root. Returns one leaf per
/// top-level subtree so benchmarks can touch deep nodes.
fn build_tree(stage: &mut Stage, width: usize, depth: usize) -> Vec<NodeId> {
    let mut deep_leaves = Vec::new();
    let root = stage.root();
    for _ in 0..width {
        let mut current = stage.spawn_kind("sprite");
        stage.set_local_bounds(current, Rect::new(0.0, 0.0, 16.0, 16.0));
        stage.add_child(root, current);
        for _ in 1..depth {
            let child = stage.spawn_kind("sprite");
            stage.set_local_bounds(child, Rect::new(0.0, 0.0, 16.0, 16.0));
            stage.add_child(current, child);
            stage.set_translation(child, 4.0, 4.0);
            current = child;
        }
        deep_leaves.push(current);
    }
    deep_leaves
}

fn settled(width: usize, depth: usize) -> (Stage, Vec<NodeId>) {
    let mut stage = Stage::new();
    let leaves = build_tree(&mut stage, width, depth);
    for &leaf in &leaves {
        black_box(stage.world_bounds(leaf));
    }
    stage.clear_dirty();
    (stage, leaves)
}

fn bench_invalidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_invalidate");
    group.sample_size(50);
    for &(width, depth) in &[(64_usize, 4_usize), (16, 16)] {
        group.bench_function(format!("move_top_levels(w={width},d={depth})"), |b| {
            b.iter_batched(
                || settled(width, depth),
                |(mut stage, leaves)| {
                    // Moving a top-level node dirties its whole subtree.
                    for &leaf in &leaves {
                        let mut top = leaf;
                        while let Some(p) = stage.parent(top) {
                            if p == stage.root() {
                                break;
                            }
                            top = p;
                        }
                        stage.translate(top, 1.0, 1.0);
                    }
                    black_box(stage.dirty_count())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_world_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_world_recompute");
    group.sample_size(50);
    for &(width, depth) in &[(64_usize, 4_usize), (16, 16)] {
        group.bench_function(format!("leaf_bounds(w={width},d={depth})"), |b| {
            b.iter_batched(
                || {
                    let (mut stage, leaves) = settled(width, depth);
                    for &leaf in &leaves {
                        stage.translate(leaf, 1.0, 1.0);
                    }
                    (stage, leaves)
                },
                |(mut stage, leaves)| {
                    for &leaf in &leaves {
                        black_box(stage.world_bounds(leaf));
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_invalidate, bench_world_recompute);
criterion_main!(benches);
