// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

use canopy_damage::DamageList;
use canopy_index::Aabb2D;

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

fn gen_reports(count: usize, world: f64, size: f64, seed: u64) -> Vec<Aabb2D> {
    let mut rng = Rng::new(seed);
    (0..count)
        .map(|_| {
            let x = rng.next_f64() * (world - size);
            let y = rng.next_f64() * (world - size);
            Aabb2D::from_xywh(x, y, size, size)
        })
        .collect()
}

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("damage_add");
    // Small rects over a large surface rarely merge; large rects over a
    // small surface merge constantly.
    for &(name, world, size) in &[
        ("sparse", 4000.0_f64, 32.0_f64),
        ("dense", 400.0, 96.0),
    ] {
        for &n in &[64_usize, 512] {
            let reports = gen_reports(n, world, size, 0xDA3A_6E00_0000_0007);
            group.throughput(Throughput::Elements(n as u64));
            group.bench_function(format!("{name}(n={n})"), |b| {
                b.iter_batched(
                    DamageList::new,
                    |mut list| {
                        for r in &reports {
                            list.add(*r);
                        }
                        black_box(list.len())
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_frame_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("damage_frame_reuse");
    let reports = gen_reports(256, 1000.0, 48.0, 0xDA3A_6E00_0000_0009);
    group.bench_function("add_reset_cycle", |b| {
        let mut list = DamageList::new();
        b.iter(|| {
            for r in &reports {
                list.add(*r);
            }
            black_box(list.len());
            list.reset();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_frame_reuse);
criterion_main!(benches);
