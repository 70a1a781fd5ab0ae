//! RGB decomposition and luminance conversion.

use image::RgbImage;
use rayon::prelude::*;

use crate::planar::Channel;

/// Planar RGB channels of one view, intensities in 0..255.
#[derive(Debug, Clone)]
pub struct RgbChannels {
    pub r: Channel,
    pub g: Channel,
    pub b: Channel,
}

impl RgbChannels {
    #[inline]
    pub fn color(&self, x: u32, y: u32) -> [f32; 3] {
        [self.r.get(x, y), self.g.get(x, y), self.b.get(x, y)]
    }

    pub fn width(&self) -> u32 {
        self.r.width()
    }

    pub fn height(&self) -> u32 {
        self.r.height()
    }
}

/// Split an interleaved RGB buffer into float planes.
pub fn split_channels(rgb: &RgbImage) -> RgbChannels {
    let (w, h) = rgb.dimensions();
    let count = (w as usize) * (h as usize);
    let src = rgb.as_raw();

    let mut r = vec![0.0f32; count];
    let mut g = vec![0.0f32; count];
    let mut b = vec![0.0f32; count];

    let stride = w as usize;
    r.par_chunks_mut(stride)
        .zip(g.par_chunks_mut(stride))
        .zip(b.par_chunks_mut(stride))
        .zip(src.par_chunks(stride * 3))
        .for_each(|(((r_row, g_row), b_row), src_row)| {
            for (i, px) in src_row.chunks_exact(3).enumerate() {
                r_row[i] = px[0] as f32;
                g_row[i] = px[1] as f32;
                b_row[i] = px[2] as f32;
            }
        });

    RgbChannels {
        r: Channel::from_vec(r, w, h),
        g: Channel::from_vec(g, w, h),
        b: Channel::from_vec(b, w, h),
    }
}

/// BT.601 luminance of an RGB image as a float plane.
pub fn luminance(rgb: &RgbImage) -> Channel {
    let (w, h) = rgb.dimensions();
    let src = rgb.as_raw();
    let mut luma = vec![0.0f32; (w as usize) * (h as usize)];

    luma.par_chunks_mut(w as usize)
        .zip(src.par_chunks((w as usize) * 3))
        .for_each(|(dst_row, src_row)| {
            for (dst, px) in dst_row.iter_mut().zip(src_row.chunks_exact(3)) {
                *dst = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            }
        });

    Channel::from_vec(luma, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn channels_are_split_in_order() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(1, 1, Rgb([10, 20, 30]));

        let planes = split_channels(&img);
        assert_eq!(planes.color(1, 1), [10.0, 20.0, 30.0]);
        assert_eq!(planes.color(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn luminance_of_gray_pixel_is_identity() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([100, 100, 100]));

        let luma = luminance(&img);
        assert!((luma.get(0, 0) - 100.0).abs() < 1e-3);
    }
}
