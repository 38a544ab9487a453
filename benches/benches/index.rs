// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

use canopy_index::{Aabb2D, QuadTree, SpatialIndex};

#[derive(Clone)]
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        let v = self.next_u64() >> 11;
        (v as f64) / ((1u64 << 53) as f64)
    }
}

fn gen_sprite_rects(count: usize, world: f64, size: f64) -> Vec<Aabb2D> {
    let mut rng = Rng::new(0xC4A0_97B5_0000_0001);
    (0..count)
        .map(|_| {
            let x = (rng.next_f64() - 0.5) * world;
            let y = (rng.next_f64() - 0.5) * world;
            Aabb2D::from_xywh(x, y, size, size)
        })
        .collect()
}

fn build_tree(rects: &[Aabb2D]) -> QuadTree<u32> {
    let mut tree = QuadTree::new(Aabb2D::new(-2500.0, -2500.0, 2500.0, 2500.0));
    for (i, r) in rects.iter().enumerate() {
        tree.insert(i as u32, *r);
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_insert");
    for &n in &[256_usize, 1024, 4096] {
        let rects = gen_sprite_rects(n, 4000.0, 16.0);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("n={n}"), |b| {
            b.iter(|| build_tree(black_box(&rects)));
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("quadtree_query");
    for &n in &[1024_usize, 4096] {
        let rects = gen_sprite_rects(n, 4000.0, 16.0);
        let tree = build_tree(&rects);
        let viewport = Aabb2D::new(-640.0, -360.0, 640.0, 360.0);
        let mut out = Vec::new();
        group.bench_function(format!("viewport(n={n})"), |b| {
            b.iter(|| {
                tree.query(black_box(&viewport), &mut out);
                black_box(out.len())
            });
        });
    }
    group.finish();
}

// Every item moves every frame; the deferred-update path should beat a naive
// remove/insert per move.
fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index_churn");
    group.sample_size(50);
    for &n in &[1024_usize, 4096] {
        let rects = gen_sprite_rects(n, 4000.0, 16.0);
        group.bench_function(format!("move_all_then_query(n={n})"), |b| {
            b.iter_batched(
                || {
                    let mut index = SpatialIndex::default();
                    for (i, r) in rects.iter().enumerate() {
                        index.insert(i as u32, *r);
                    }
                    index
                },
                |mut index| {
                    for i in 0..n as u32 {
                        index.mark_moved(i);
                    }
                    let moved: Vec<Aabb2D> = rects
                        .iter()
                        .map(|r| Aabb2D::from_xywh(r.min_x + 3.0, r.min_y + 3.0, 16.0, 16.0))
                        .collect();
                    let mut out = Vec::new();
                    index.query_with(
                        &Aabb2D::new(-640.0, -360.0, 640.0, 360.0),
                        |k| Some(moved[k as usize]),
                        |_| true,
                        &mut out,
                    );
                    black_box(out.len())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_query, bench_churn);
criterion_main!(benches);
