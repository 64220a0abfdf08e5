//! Screenshot cropping benchmark suite.
//!
//! Benchmarks the executor-side crop step at different scales:
//! - Capture sizes: 1280x720, 2560x1440 (2x device pixel ratio)
//! - Selector counts: 1, 10, 50
//!
//! Run with: cargo bench --bench crop
//! Results saved to: target/criterion/

use std::io::Cursor;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{ImageFormat, Rgba, RgbaImage};

use tab_relay::DataUrl;
use tab_relay::executor::screenshot::{crop_all, crop_capture};
use tab_relay::executor::{ElementRect, Measurements};

// ============================================================================
// Benchmark Parameters
// ============================================================================

/// CSS viewport and device pixel ratio.
const SURFACES: &[(u32, u32, f64)] = &[(1280, 720, 1.0), (1280, 720, 2.0)];
const SELECTOR_COUNTS: &[usize] = &[1, 10, 50];

// ============================================================================
// Fixtures
// ============================================================================

fn surface(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

fn encode(image: &RgbaImage) -> String {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode fixture");
    DataUrl::png(&bytes)
}

/// `count` 120x40 elements laid out in a grid, one of them off-screen.
fn measurements(count: usize, ratio: f64) -> Measurements {
    (0..count)
        .map(|i| {
            let left = (i % 8) as f64 * 150.0;
            let top = (i / 8) as f64 * 60.0 - if i == 0 { 20.0 } else { 0.0 };
            let rect = ElementRect::new(left, top, 120.0, 40.0, ratio);
            (format!("#element-{i}"), Some(rect))
        })
        .collect()
}

// ============================================================================
// Benchmark: Crop Only
// ============================================================================

fn bench_crop_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("crop_all");

    for &(width, height, ratio) in SURFACES {
        let source = surface((width as f64 * ratio) as u32, (height as f64 * ratio) as u32);

        for &count in SELECTOR_COUNTS {
            let measured = measurements(count, ratio);
            let id = format!("{}x_{}sel", ratio, count);
            group.bench_with_input(BenchmarkId::new("crop", &id), &measured, |b, measured| {
                b.iter(|| crop_all(&source, measured).expect("crop"));
            });
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode + Crop
// ============================================================================

fn bench_crop_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("crop_capture");
    group.sample_size(20);

    for &(width, height, ratio) in SURFACES {
        let data_url = encode(&surface(
            (width as f64 * ratio) as u32,
            (height as f64 * ratio) as u32,
        ));
        let measured = measurements(10, ratio);

        group.bench_with_input(
            BenchmarkId::new("decode_and_crop", format!("{ratio}x")),
            &data_url,
            |b, data_url| {
                b.iter(|| crop_capture(data_url, &measured).expect("crop"));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_crop_all, bench_crop_capture);
criterion_main!(benches);
