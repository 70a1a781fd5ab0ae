use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};
use pm_core::Params;
use pm_stereo::PatchMatcher;

fn synthetic_pair(width: u32, height: u32, shift: i64) -> (RgbImage, RgbImage) {
    let sample = |x: i64, y: i64| -> u8 {
        (((x * 7 + y * 11) % 127) * 2).clamp(0, 255) as u8
    };
    let mut left = RgbImage::new(width, height);
    let mut right = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let v = sample(i64::from(x), i64::from(y));
            left.put_pixel(x, y, Rgb([v, v, v]));
            let v = sample(i64::from(x) + shift, i64::from(y));
            right.put_pixel(x, y, Rgb([v, v, v]));
        }
    }
    (left, right)
}

fn bench_patch_match(c: &mut Criterion) {
    let (left, right) = synthetic_pair(64, 48, 4);
    let params = Params {
        window_size: 9,
        min_d: 0,
        max_d: 12,
        iterations: 2,
        use_pseudorand: true,
        ..Params::default()
    };

    c.bench_function("patch_match_64x48", |b| {
        b.iter(|| {
            let matcher = PatchMatcher::new(params.clone());
            let maps = matcher
                .compute(black_box(&left), black_box(&right))
                .unwrap();
            black_box(maps)
        })
    });
}

criterion_group!(benches, bench_patch_match);
criterion_main!(benches);
