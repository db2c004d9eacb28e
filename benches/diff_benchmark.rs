use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use regrecss::{SnapshotKey, compare};

fn page(width: u32, height: u32, seed: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, seed.wrapping_add((x ^ y) as u8)])
    })
}

fn benchmark_diff(c: &mut Criterion) {
    let key = SnapshotKey::new(0, "bench", "1280x800", 0);
    let baseline = page(1280, 800, 0);
    let identical = baseline.clone();
    let mut drifted = baseline.clone();
    for y in 100..300 {
        for x in 200..600 {
            drifted.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }

    c.bench_function("compare_identical_1280x800", |b| {
        b.iter(|| {
            let result = compare(key.clone(), black_box(baseline.clone()), black_box(identical.clone()));
            assert!(result.is_ok());
        })
    });

    c.bench_function("compare_drifted_1280x800", |b| {
        b.iter(|| {
            let result = compare(key.clone(), black_box(baseline.clone()), black_box(drifted.clone()));
            assert!(result.is_ok());
        })
    });
}

criterion_group!(benches, benchmark_diff);
criterion_main!(benches);
