//! Benchmarks for format negotiation and bridge planning
//!
//! Run with: cargo bench --bench negotiation_benchmarks
//!
//! Negotiation runs on the session context during every configuration, and
//! bridge planning runs under the recorder lock, so both must stay cheap.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use duocam::device::{select_dual, select_single};
use duocam::recording::{filler_timestamps, FillerFrame};
use duocam::testing::{phone_back_triple, phone_front_true_depth, zoom_limited_back};
use duocam::types::{CameraPosition, DeviceDescriptor, DeviceFormat, DeviceKind};
use std::time::Duration;

/// Device with `count` formats spread over common sizes and rates
fn wide_format_device(count: usize, position: CameraPosition) -> DeviceDescriptor {
    let sizes = [(640, 480), (1280, 720), (1920, 1080), (2560, 1440), (3840, 2160)];
    let rates = [15.0, 24.0, 30.0, 60.0];
    let formats = (0..count)
        .map(|i| {
            let (w, h) = sizes[i % sizes.len()];
            DeviceFormat::new(w, h, 1.0, rates[i % rates.len()]).with_multi_cam(i % 3 != 0)
        })
        .collect();
    DeviceDescriptor::new("bench", "bench", position, DeviceKind::WideAngle).with_formats(formats)
}

fn bench_single_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Single Format Selection");

    let presets = [
        ("back_triple", phone_back_triple()),
        ("zoom_limited", zoom_limited_back()),
    ];
    for (name, device) in presets {
        group.bench_with_input(BenchmarkId::new("preset", name), &device, |b, device| {
            b.iter(|| select_single(black_box(device)))
        });
    }

    for count in [8, 64, 256] {
        let device = wide_format_device(count, CameraPosition::Back);
        group.bench_with_input(BenchmarkId::new("formats", count), &device, |b, device| {
            b.iter(|| select_single(black_box(device)))
        });
    }

    group.finish();
}

fn bench_dual_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Dual Format Selection");

    let back = phone_back_triple();
    let front = phone_front_true_depth();
    group.bench_function("phone_presets", |b| {
        b.iter(|| select_dual(black_box(&back), black_box(&front)))
    });

    for count in [8, 64, 256] {
        let back = wide_format_device(count, CameraPosition::Back);
        let front = wide_format_device(count, CameraPosition::Front);
        group.bench_with_input(
            BenchmarkId::new("formats", count),
            &(back, front),
            |b, (back, front)| b.iter(|| select_dual(black_box(back), black_box(front))),
        );
    }

    group.finish();
}

fn bench_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bridge");

    group.bench_function("timestamps_150ms_30fps", |b| {
        b.iter(|| {
            filler_timestamps(
                black_box(Duration::from_secs(12)),
                Duration::from_millis(150),
                Duration::from_secs_f64(1.0 / 30.0),
            )
        })
    });

    let filler = FillerFrame::new(1920, 1080);
    group.bench_function("filler_sample_1080p", |b| {
        b.iter(|| filler.sample(CameraPosition::Front, black_box(Duration::from_millis(500))))
    });

    group.finish();
}

criterion_group!(benches, bench_single_selection, bench_dual_selection, bench_bridge);
criterion_main!(benches);
