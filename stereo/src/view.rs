//! Per-view pixel data, shared read-only across the whole run.

use image::RgbImage;
use pm_imgproc::{gradient_map, luminance, split_channels, GradientMap, RgbChannels};

/// One of the two rectified views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewId {
    Left,
    Right,
}

impl ViewId {
    /// The other member of the pair.
    pub fn other(self) -> ViewId {
        match self {
            ViewId::Left => ViewId::Right,
            ViewId::Right => ViewId::Left,
        }
    }

    /// Sign applied to a disparity when projecting a pixel of this view
    /// onto the other one: left-view matches lie at `x - d`, right-view
    /// matches at `x + d`.
    pub fn disparity_sign(self) -> f64 {
        match self {
            ViewId::Left => -1.0,
            ViewId::Right => 1.0,
        }
    }
}

/// Color channels and luminance gradients of one view.
#[derive(Debug, Clone)]
pub struct ViewData {
    pub channels: RgbChannels,
    pub gradients: GradientMap,
}

impl ViewData {
    /// Precompute everything the cost evaluator reads from this view.
    pub fn from_rgb(rgb: &RgbImage, normalize_gradients: bool) -> Self {
        let channels = split_channels(rgb);
        let gradients = gradient_map(&luminance(rgb), normalize_gradients);
        Self {
            channels,
            gradients,
        }
    }

    pub fn width(&self) -> u32 {
        self.channels.width()
    }

    pub fn height(&self) -> u32 {
        self.channels.height()
    }

    #[inline]
    pub fn color(&self, x: u32, y: u32) -> [f32; 3] {
        self.channels.color(x, y)
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width()) && y < i64::from(self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn other_is_an_involution() {
        assert_eq!(ViewId::Left.other(), ViewId::Right);
        assert_eq!(ViewId::Right.other().other(), ViewId::Right);
    }

    #[test]
    fn view_data_exposes_both_layers() {
        let mut img = RgbImage::new(4, 4);
        for y in 0..4 {
            for x in 0..4 {
                img.put_pixel(x, y, Rgb([(x * 60) as u8, 0, 0]));
            }
        }
        let view = ViewData::from_rgb(&img, false);
        assert_eq!(view.width(), 4);
        assert_eq!(view.color(1, 0), [60.0, 0.0, 0.0]);
        // A pure red ramp still produces a luminance gradient.
        assert!(view.gradients.vector(2, 2)[0] > 0.0);
        assert!(!view.contains(-1, 0));
        assert!(!view.contains(0, 4));
    }
}
