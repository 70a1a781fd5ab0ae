//! Luminance gradient maps.

use rayon::prelude::*;

use crate::planar::Channel;

/// Horizontal and vertical derivative planes of a luminance channel.
#[derive(Debug, Clone)]
pub struct GradientMap {
    pub gx: Channel,
    pub gy: Channel,
}

impl GradientMap {
    #[inline]
    pub fn vector(&self, x: u32, y: u32) -> [f32; 2] {
        [self.gx.get(x, y), self.gy.get(x, y)]
    }
}

/// Central-difference gradients with replicated borders.
///
/// With `normalize` set, both planes are rescaled so the largest gradient
/// magnitude over the image is one; truncation thresholds must be chosen
/// for whichever scale is in use.
pub fn gradient_map(luma: &Channel, normalize: bool) -> GradientMap {
    let w = luma.width();
    let h = luma.height();
    let stride = w as usize;

    let mut gx = vec![0.0f32; stride * h as usize];
    let mut gy = vec![0.0f32; stride * h as usize];

    gx.par_chunks_mut(stride)
        .zip(gy.par_chunks_mut(stride))
        .enumerate()
        .for_each(|(y, (gx_row, gy_row))| {
            let y = y as i64;
            for x in 0..stride {
                let xi = x as i64;
                gx_row[x] = 0.5 * (luma.get_clamped(xi + 1, y) - luma.get_clamped(xi - 1, y));
                gy_row[x] = 0.5 * (luma.get_clamped(xi, y + 1) - luma.get_clamped(xi, y - 1));
            }
        });

    if normalize {
        let max_mag = gx
            .par_iter()
            .zip(gy.par_iter())
            .map(|(&dx, &dy)| dx * dx + dy * dy)
            .reduce(|| 0.0f32, f32::max)
            .sqrt();
        if max_mag > 0.0 {
            let inv = 1.0 / max_mag;
            gx.par_iter_mut().for_each(|v| *v *= inv);
            gy.par_iter_mut().for_each(|v| *v *= inv);
        }
    }

    GradientMap {
        gx: Channel::from_vec(gx, w, h),
        gy: Channel::from_vec(gy, w, h),
    }
}
