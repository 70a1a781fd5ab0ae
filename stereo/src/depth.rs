//! Depth recovery from disparity maps.
//!
//! Disparity is inversely proportional to depth: `z = f * B / d` for a
//! rectified rig with focal length `f` and baseline `B`.

use nalgebra::Point3;

use crate::disparity::DisparityMap;

/// Rectified-rig geometry needed to turn disparity into metric depth.
#[derive(Debug, Clone, Copy)]
pub struct StereoParams {
    pub focal_length: f64,
    pub baseline: f64,
    pub cx: f64,
    pub cy: f64,
}

impl StereoParams {
    pub fn new(focal_length: f64, baseline: f64, cx: f64, cy: f64) -> Self {
        Self {
            focal_length,
            baseline,
            cx,
            cy,
        }
    }

    /// Depth of a single disparity; `None` for near-zero disparities.
    pub fn disparity_to_depth(&self, disparity: f64) -> Option<f64> {
        if disparity.abs() < 1e-6 {
            None
        } else {
            Some((self.focal_length * self.baseline) / disparity)
        }
    }
}

/// Per-pixel depth of a disparity map; invalid or non-finite pixels yield
/// `None`.
pub fn disparity_to_depth(map: &DisparityMap, params: &StereoParams) -> Vec<Option<f64>> {
    map.data
        .iter()
        .zip(&map.valid)
        .map(|(&d, &ok)| {
            if !ok || !d.is_finite() {
                None
            } else {
                params.disparity_to_depth(d)
            }
        })
        .collect()
}

/// Back-project one pixel to a 3D point in the left camera frame.
pub fn disparity_to_3d(
    x: u32,
    y: u32,
    disparity: f64,
    params: &StereoParams,
) -> Option<Point3<f64>> {
    let depth = params.disparity_to_depth(disparity)?;
    let xn = (f64::from(x) - params.cx) / params.focal_length;
    let yn = (f64::from(y) - params.cy) / params.focal_length;
    Some(Point3::new(xn * depth, yn * depth, depth))
}

/// Minimum, maximum and mean of the defined depths.
pub fn depth_stats(depths: &[Option<f64>]) -> Option<(f64, f64, f64)> {
    let defined: Vec<f64> = depths.iter().filter_map(|&d| d).collect();
    if defined.is_empty() {
        return None;
    }
    let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
    let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = defined.iter().sum::<f64>() / defined.len() as f64;
    Some((min, max, mean))
}
