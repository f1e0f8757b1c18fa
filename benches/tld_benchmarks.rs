//! TLD benchmarks using Criterion.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tld_rs::clustering::LinkageScratch;
use tld_rs::{BoundingBox, ClusterStrategy, Detection, Grid, IntegralImage};

fn noise_frame(width: u32, height: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(0);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.gen()]))
}

/// Detections jittered around a few object positions.
fn create_test_detections(n: usize) -> Vec<Detection> {
    let mut rng = StdRng::seed_from_u64(1);
    let centers = [(40, 40), (160, 90), (250, 170)];
    (0..n)
        .map(|i| {
            let (cx, cy) = centers[i % centers.len()];
            Detection {
                bbox: BoundingBox::new(cx + rng.gen_range(-6..=6), cy + rng.gen_range(-6..=6), 40, 40),
                confidence: rng.gen_range(0.5..1.0),
                relative_similarity: 0.8,
                grid_index: i,
            }
        })
        .collect()
}

fn benchmark_grid_build_vga(c: &mut Criterion) {
    let initial = BoundingBox::new(300, 200, 48, 64);
    c.bench_function("grid_build_640x480", |b| {
        b.iter(|| Grid::build(black_box(640), black_box(480), &initial, 15).unwrap())
    });
}

fn benchmark_variance_scan(c: &mut Criterion) {
    let frame = noise_frame(320, 240);
    let grid = Grid::build(320, 240, &BoundingBox::new(100, 80, 40, 40), 15).unwrap();

    c.bench_function("variance_scan_320x240", |b| {
        b.iter(|| {
            let integral = IntegralImage::new(black_box(&frame));
            grid.windows()
                .iter()
                .step_by(7)
                .filter(|w| integral.variance(&w.bbox) > 100.0)
                .count()
        })
    });
}

fn benchmark_clustering_partition_100(c: &mut Criterion) {
    let detections = create_test_detections(100);
    let strategy = ClusterStrategy::OverlapPartition;
    let mut scratch = LinkageScratch::default();

    c.bench_function("clustering_partition_100", |b| {
        b.iter(|| strategy.cluster(black_box(&detections), &mut scratch))
    });
}

fn benchmark_clustering_single_linkage_100(c: &mut Criterion) {
    let detections = create_test_detections(100);
    let strategy = ClusterStrategy::SingleLinkage { cutoff: 0.5 };
    let mut scratch = LinkageScratch::default();

    c.bench_function("clustering_single_linkage_100", |b| {
        b.iter(|| strategy.cluster(black_box(&detections), &mut scratch))
    });
}

criterion_group!(
    benches,
    benchmark_grid_build_vga,
    benchmark_variance_scan,
    benchmark_clustering_partition_100,
    benchmark_clustering_single_linkage_100,
);
criterion_main!(benches);
