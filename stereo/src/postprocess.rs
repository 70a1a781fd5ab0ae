//! Disparity-map cleanup.
//!
//! Three sequential stages: a left-right consistency check that marks
//! occluded or mismatched pixels invalid, a horizontal fill that copies
//! the nearer of the two surrounding valid disparities (preferring the
//! farther surface), and a weighted-median pass that smooths the filled
//! pixels using color-similarity weights from the matching view.

use log::{debug, info};
use rayon::prelude::*;

use pm_core::Params;

use crate::disparity::DisparityMap;
use crate::view::{ViewData, ViewId};

/// Largest disparity disagreement the consistency check tolerates.
const CONSISTENCY_TOLERANCE: f64 = 1.0;

/// Run all three stages on both maps in place.
pub fn refine_pair(
    left: &mut DisparityMap,
    right: &mut DisparityMap,
    left_view: &ViewData,
    right_view: &ViewData,
    params: &Params,
) {
    cross_check(left, right);
    info!(
        "consistency check: left {:.1}% valid, right {:.1}% valid",
        left.valid_fraction() * 100.0,
        right.valid_fraction() * 100.0
    );

    fill_invalid(left);
    fill_invalid(right);
    debug!("invalid pixels filled");

    weighted_median(left, left_view, params);
    weighted_median(right, right_view, params);
    debug!("weighted median applied");
}

/// Mark pixels whose disparity does not agree with the other view.
pub fn cross_check(left: &mut DisparityMap, right: &mut DisparityMap) {
    let left_mask = consistency_mask(left, right, ViewId::Left);
    let right_mask = consistency_mask(right, left, ViewId::Right);
    left.valid = left_mask;
    right.valid = right_mask;
}

fn consistency_mask(map: &DisparityMap, other: &DisparityMap, view: ViewId) -> Vec<bool> {
    let width = map.width();
    let sign = view.disparity_sign();

    let mut mask = vec![false; map.data.len()];
    mask.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, ok) in row.iter_mut().enumerate() {
                let x = x as u32;
                let d = map.get(x, y);
                if !d.is_finite() {
                    continue;
                }
                let match_x = (f64::from(x) + sign * d).round();
                if match_x < 0.0 || match_x >= f64::from(width) {
                    continue;
                }
                let back = other.get(match_x as u32, y);
                *ok = (back - d).abs() <= CONSISTENCY_TOLERANCE;
            }
        });
    mask
}

/// Replace each invalid pixel by the nearer of the first valid disparities
/// found scanning left and right along its row; the smaller of the two is
/// chosen so background surfaces do not bleed into occlusions.
pub fn fill_invalid(map: &mut DisparityMap) {
    let width = map.width() as usize;
    let data = &mut map.data;
    let valid = &map.valid;

    data.par_chunks_mut(width)
        .zip(valid.par_chunks(width))
        .for_each(|(row, row_valid)| {
            let snapshot: Vec<f64> = row.to_vec();
            for x in 0..width {
                if row_valid[x] {
                    continue;
                }
                let left_hit = (0..x)
                    .rev()
                    .find(|&i| row_valid[i])
                    .map(|i| snapshot[i]);
                let right_hit = (x + 1..width).find(|&i| row_valid[i]).map(|i| snapshot[i]);
                row[x] = match (left_hit, right_hit) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(a), None) => a,
                    (None, Some(b)) => b,
                    (None, None) => row[x],
                };
            }
        });
}

/// Weighted median over the support window, applied to the pixels the
/// consistency check invalidated.
pub fn weighted_median(map: &mut DisparityMap, view: &ViewData, params: &Params) {
    let width = map.width();
    let height = map.height();
    let half = i64::from(params.window_size / 2);
    let snapshot = map.data.clone();
    let valid = map.valid.clone();

    map.data
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            let mut samples: Vec<(f64, f64)> = Vec::new();
            for (x, out) in row.iter_mut().enumerate() {
                let x = x as u32;
                if valid[(y as usize) * (width as usize) + x as usize] {
                    continue;
                }

                let center = view.color(x, y);
                samples.clear();
                let mut total_weight = 0.0;
                for dy in -half..=half {
                    let qy = i64::from(y) + dy;
                    if qy < 0 || qy >= i64::from(height) {
                        continue;
                    }
                    for dx in -half..=half {
                        let qx = i64::from(x) + dx;
                        if qx < 0 || qx >= i64::from(width) {
                            continue;
                        }
                        let d = snapshot[(qy as usize) * (width as usize) + qx as usize];
                        if !d.is_finite() {
                            continue;
                        }
                        let q = view.color(qx as u32, qy as u32);
                        let l1 = f64::from(
                            (center[0] - q[0]).abs()
                                + (center[1] - q[1]).abs()
                                + (center[2] - q[2]).abs(),
                        );
                        let weight = (-l1 / params.gamma).exp();
                        samples.push((d, weight));
                        total_weight += weight;
                    }
                }
                if samples.is_empty() {
                    continue;
                }

                samples.sort_by(|a, b| a.0.total_cmp(&b.0));
                let mut acc = 0.0;
                let mut median = samples[samples.len() - 1].0;
                for &(d, weight) in &samples {
                    acc += weight;
                    if acc >= total_weight / 2.0 {
                        median = d;
                        break;
                    }
                }
                *out = median;
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn map_from_rows(rows: &[&[f64]]) -> DisparityMap {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut map = DisparityMap::new(width, height, 0, 16);
        for (y, row) in rows.iter().enumerate() {
            for (x, &d) in row.iter().enumerate() {
                map.set(x as u32, y as u32, d);
            }
        }
        map
    }

    #[test]
    fn consistent_pixels_survive_the_cross_check() {
        // Constant disparity 2: left x matches right x-2 and vice versa.
        let mut left = map_from_rows(&[&[2.0; 8]]);
        let mut right = map_from_rows(&[&[2.0; 8]]);
        cross_check(&mut left, &mut right);

        // Left pixels 0 and 1 project out of the right image.
        assert!(!left.is_valid(0, 0));
        assert!(!left.is_valid(1, 0));
        for x in 2..8 {
            assert!(left.is_valid(x, 0));
        }
        // Right pixels near the right border project out of the left image.
        assert!(right.is_valid(0, 0));
        assert!(!right.is_valid(7, 0));
    }

    #[test]
    fn disagreeing_pixels_are_invalidated() {
        let mut left = map_from_rows(&[&[2.0, 2.0, 2.0, 6.0, 2.0, 2.0, 2.0, 2.0]]);
        let mut right = map_from_rows(&[&[2.0; 8]]);
        cross_check(&mut left, &mut right);
        assert!(!left.is_valid(3, 0));
        assert!(left.is_valid(4, 0));
    }

    #[test]
    fn fill_prefers_the_farther_surface() {
        let mut map = map_from_rows(&[&[5.0, 9.0, 9.0, 3.0]]);
        map.set_valid(1, 0, false);
        map.set_valid(2, 0, false);
        fill_invalid(&mut map);
        // min(5, 3) on both holes.
        assert_eq!(map.get(1, 0), 3.0);
        assert_eq!(map.get(2, 0), 3.0);
        // The mask records that these were filled, not measured.
        assert!(!map.is_valid(1, 0));
    }

    #[test]
    fn fill_uses_the_single_available_side() {
        let mut map = map_from_rows(&[&[7.0, 1.0, 4.0]]);
        map.set_valid(0, 0, false);
        fill_invalid(&mut map);
        assert_eq!(map.get(0, 0), 1.0);

        let mut map = map_from_rows(&[&[7.0, 1.0, 4.0]]);
        for x in 0..3 {
            map.set_valid(x, 0, false);
        }
        fill_invalid(&mut map);
        // Nothing valid on the row: values stay as they were.
        assert_eq!(map.get(0, 0), 7.0);
        assert_eq!(map.get(1, 0), 1.0);
    }

    #[test]
    fn weighted_median_smooths_filled_pixels() {
        let img = RgbImage::from_pixel(5, 5, Rgb([128, 128, 128]));
        let view = ViewData::from_rgb(&img, false);
        let params = Params {
            window_size: 3,
            ..Params::default()
        };

        let mut map = map_from_rows(&[
            &[4.0, 4.0, 4.0, 4.0, 4.0],
            &[4.0, 4.0, 4.0, 4.0, 4.0],
            &[4.0, 4.0, 99.0, 4.0, 4.0],
            &[4.0, 4.0, 4.0, 4.0, 4.0],
            &[4.0, 4.0, 4.0, 4.0, 4.0],
        ]);
        map.set_valid(2, 2, false);
        weighted_median(&mut map, &view, &params);
        // On a uniform image all weights agree, so the outlier collapses
        // to the neighborhood median.
        assert_eq!(map.get(2, 2), 4.0);
        // Valid pixels are untouched.
        assert_eq!(map.get(1, 1), 4.0);
    }
}
