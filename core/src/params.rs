//! Run configuration shared by every stage of the pipeline.
//!
//! A [`Params`] value is built once (normally by the CLI), validated, and
//! then threaded read-only through the cost evaluator, the optimizer and
//! the post-processor.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Behavior of the cost evaluator when a sample falls outside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBounds {
    /// Clamp the coordinate to the nearest valid pixel.
    RepeatPixel,
    /// Treat the sample as a zero pixel with zero gradient.
    BlackPixel,
    /// The sample contributes nothing to the aggregated cost.
    ZeroCost,
    /// Fail the evaluation; out-of-range queries indicate a logic bug.
    Error,
    /// The sample contributes the maximum finite per-sample penalty.
    NanCost,
}

impl FromStr for OutOfBounds {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "repeat" => Ok(OutOfBounds::RepeatPixel),
            "black" => Ok(OutOfBounds::BlackPixel),
            "zero" => Ok(OutOfBounds::ZeroCost),
            "error" => Ok(OutOfBounds::Error),
            "nan" => Ok(OutOfBounds::NanCost),
            other => Err(Error::InvalidParameters(format!(
                "unknown out-of-bounds policy '{other}', expected one of \
                 repeat, black, zero, error, nan"
            ))),
        }
    }
}

impl fmt::Display for OutOfBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            OutOfBounds::RepeatPixel => "repeat",
            OutOfBounds::BlackPixel => "black",
            OutOfBounds::ZeroCost => "zero",
            OutOfBounds::Error => "error",
            OutOfBounds::NanCost => "nan",
        };
        f.write_str(token)
    }
}

/// Parameters of one stereo-matching run.
///
/// Intensity-dependent thresholds (`tau_col`, `tau_grad`, `gamma`) are
/// calibrated to pixel channels in the 0..255 range.
#[derive(Debug, Clone)]
pub struct Params {
    /// Balance between the color term (at 0) and the gradient term (at 1).
    pub alfa: f64,
    /// Truncation of the per-sample color L1 difference.
    pub tau_col: f64,
    /// Truncation of the per-sample gradient L1 difference.
    pub tau_grad: f64,
    /// Falloff of the adaptive support weight with color distance.
    pub gamma: f64,
    /// Side of the square support window; must be odd.
    pub window_size: u32,
    /// Smallest admissible disparity.
    pub min_d: i32,
    /// Largest admissible disparity; must be positive and exceed `min_d`.
    pub max_d: i32,
    /// Number of optimization sweeps.
    pub iterations: u32,
    /// Largest admissible plane slope, in degrees.
    pub max_slope: f64,
    /// Rescale the gradient planes to unit maximum magnitude.
    pub normalize_gradients: bool,
    /// What an out-of-range cost sample contributes.
    pub out_of_bounds: OutOfBounds,
    /// Shrink the support window for steep planes.
    pub resize_windows: bool,
    /// Clamp every evaluated disparity to `[min_d, max_d]`.
    pub planes_saturation: bool,
    /// Derive all random draws from a fixed seed (repeatable runs).
    pub use_pseudorand: bool,
    /// Restrict planes to fronto-parallel (constant disparity).
    pub const_disparities: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            alfa: 0.5,
            tau_col: 60.0,
            tau_grad: 30.0,
            gamma: 15.0,
            window_size: 35,
            min_d: 0,
            max_d: 70,
            iterations: 3,
            max_slope: 45.0,
            normalize_gradients: true,
            out_of_bounds: OutOfBounds::NanCost,
            resize_windows: true,
            planes_saturation: true,
            use_pseudorand: false,
            const_disparities: false,
        }
    }
}

impl Params {
    /// Check the internal consistency of the block.
    ///
    /// Called once before any pixel is touched; the rest of the pipeline
    /// relies on these invariants without re-checking them.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.window_size % 2 == 0 {
            return Err(Error::InvalidParameters(format!(
                "window_size must be odd, got {}",
                self.window_size
            )));
        }
        if self.max_d <= 0 {
            return Err(Error::InvalidParameters(format!(
                "max_d must be positive, got {}",
                self.max_d
            )));
        }
        if self.max_d <= self.min_d {
            return Err(Error::InvalidParameters(format!(
                "max_d ({}) must exceed min_d ({})",
                self.max_d, self.min_d
            )));
        }
        if !(0.0..=1.0).contains(&self.alfa) {
            return Err(Error::InvalidParameters(format!(
                "alfa must lie in [0, 1], got {}",
                self.alfa
            )));
        }
        if self.gamma <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        if self.tau_col < 0.0 || self.tau_grad < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "truncation thresholds must be non-negative, got tau_col {} tau_grad {}",
                self.tau_col, self.tau_grad
            )));
        }
        if self.max_slope < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "max_slope must be non-negative, got {}",
                self.max_slope
            )));
        }
        Ok(())
    }

    /// Width of the admissible disparity interval.
    pub fn disparity_range(&self) -> f64 {
        (self.max_d - self.min_d) as f64
    }

    /// Largest finite value a single window sample can contribute.
    pub fn max_dissimilarity(&self) -> f64 {
        (1.0 - self.alfa) * self.tau_col + self.alfa * self.tau_grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn even_window_is_rejected() {
        let params = Params {
            window_size: 4,
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn inverted_disparity_range_is_rejected() {
        let params = Params {
            min_d: 10,
            max_d: 5,
            ..Params::default()
        };
        assert!(params.validate().is_err());

        let params = Params {
            min_d: -10,
            max_d: 0,
            ..Params::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn policy_tokens_round_trip() {
        for token in ["repeat", "black", "zero", "error", "nan"] {
            let policy: OutOfBounds = token.parse().unwrap();
            assert_eq!(policy.to_string(), token);
        }
        assert!("nearest".parse::<OutOfBounds>().is_err());
    }

    #[test]
    fn max_dissimilarity_blends_thresholds() {
        let params = Params {
            alfa: 0.25,
            tau_col: 40.0,
            tau_grad: 8.0,
            ..Params::default()
        };
        assert!((params.max_dissimilarity() - (0.75 * 40.0 + 0.25 * 8.0)).abs() < 1e-12);
    }
}
