use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tjkit::engine::{
    best_factor_for, jpeg_buffer_size, resolve_crop, CroppingRegion, ScalingFactor, Subsampling,
    YuvLayout,
};

const SIZES: [(u32, u32); 3] = [(640, 480), (1920, 1080), (8000, 6000)];

fn bench_jpeg_buffer_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("jpeg_buffer_size");
    for subsampling in Subsampling::KNOWN {
        group.bench_with_input(BenchmarkId::from_parameter(subsampling), &subsampling, |b, &s| {
            b.iter(|| {
                for (w, h) in SIZES {
                    let _ = black_box(jpeg_buffer_size(black_box(w), black_box(h), s));
                }
            })
        });
    }
    group.finish();
}

fn bench_yuv_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuv_layout");
    for align in [1u32, 4, 64] {
        group.bench_with_input(BenchmarkId::new("S420", align), &align, |b, &align| {
            b.iter(|| YuvLayout::new(black_box(1921), align, black_box(1081), Subsampling::S420))
        });
    }
    group.finish();
}

fn bench_best_factor(c: &mut Criterion) {
    c.bench_function("best_factor_for 8000x6000 -> 300x200", |b| {
        b.iter(|| best_factor_for(black_box(8000), black_box(6000), black_box(300), black_box(200)))
    });
}

fn bench_resolve_crop(c: &mut Criterion) {
    let half = ScalingFactor::new(1, 2).unwrap();
    let region = CroppingRegion::new(64, 37, 0, 0);
    c.bench_function("resolve_crop 1/2 4:2:0", |b| {
        b.iter(|| resolve_crop(black_box(region), half, 1920, 1080, Subsampling::S420))
    });
}

criterion_group!(
    benches,
    bench_jpeg_buffer_size,
    bench_yuv_layout,
    bench_best_factor,
    bench_resolve_crop
);
criterion_main!(benches);
