// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Performance benchmarks

use autoinstance::geometry::PointTree;
use autoinstance::matching::{AnalysisCache, SignatureIndex, SignatureOptions};
use autoinstance::scene::demo;
use autoinstance::{AssemblyMode, AutoInstancer, EqualityEngine, InstancerConfig, Primitive};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{Rotation3, Vector3};

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("signatures");

    for count in [10, 100] {
        let (scene, nodes) = demo::cubes(count, 1);
        let options = SignatureOptions::default();
        group.bench_with_input(BenchmarkId::new("index", count), &nodes, |b, nodes| {
            b.iter(|| {
                let mut cache = AnalysisCache::new();
                SignatureIndex::build(&scene, &mut cache, black_box(nodes), &options)
            });
        });
    }

    group.finish();
}

fn bench_equality(c: &mut Criterion) {
    let mut group = c.benchmark_group("equality");
    let engine = EqualityEngine::new(0.001);

    let torus = Primitive::torus(2.0, 0.5, 32, 16).to_mesh().positions;
    let shuffled: Vec<_> = torus.iter().rev().copied().collect();
    let turn = Rotation3::from_axis_angle(&Vector3::y_axis(), 0.4);
    let rotated: Vec<_> = torus.iter().map(|p| turn * p).collect();
    let tree = PointTree::build(&torus);

    group.bench_function("unordered", |b| {
        b.iter(|| engine.compare_points(black_box(&torus), &tree, black_box(&shuffled)));
    });
    group.bench_function("aligned", |b| {
        b.iter(|| engine.compare_points(black_box(&torus), &tree, black_box(&rotated)));
    });

    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");
    group.sample_size(20);

    group.bench_function("cubes_50", |b| {
        b.iter_batched(
            || demo::cubes(50, 3),
            |(mut scene, nodes)| AutoInstancer::default().run(&mut scene, Some(&nodes)),
            criterion::BatchSize::SmallInput,
        );
    });

    let config = InstancerConfig {
        separate_combined: true,
        assembly_mode: AssemblyMode::Hierarchy,
        ..Default::default()
    };
    group.bench_function("canisters_12", |b| {
        b.iter_batched(
            || demo::canisters(12, 3),
            |(mut scene, combined)| {
                AutoInstancer::new(config.clone()).run(&mut scene, Some(&[combined]));
                scene.node_count()
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_signatures, bench_equality, bench_run);
criterion_main!(benches);
