//! Asymmetric adaptive-support-window matching cost.
//!
//! The cost of assigning a plane to a pixel aggregates, over a square
//! window, the truncated color and gradient dissimilarity between each
//! window pixel and its reprojection into the other view, weighted by
//! color similarity to the window center. The evaluator is a pure
//! function of its inputs; out-of-range samples are resolved by the
//! configured boundary policy.

use pm_core::{Error, OutOfBounds, Params, Result};
use pm_imgproc::bilinear;

use crate::plane::Plane;
use crate::view::{ViewData, ViewId};

/// Read-only matching context shared by every cost query of a run.
pub struct CostEvaluator<'a> {
    left: &'a ViewData,
    right: &'a ViewData,
    params: &'a Params,
}

impl<'a> CostEvaluator<'a> {
    pub fn new(left: &'a ViewData, right: &'a ViewData, params: &'a Params) -> Self {
        Self {
            left,
            right,
            params,
        }
    }

    pub fn params(&self) -> &Params {
        self.params
    }

    pub fn view(&self, id: ViewId) -> &ViewData {
        match id {
            ViewId::Left => self.left,
            ViewId::Right => self.right,
        }
    }

    /// Aggregated cost of `plane` at pixel `(x, y)` of the `base` view.
    pub fn plane_cost(&self, base: ViewId, x: u32, y: u32, plane: &Plane) -> Result<f64> {
        let base_view = self.view(base);
        let other_view = self.view(base.other());
        let center = base_view.color(x, y);
        let half = self.window_half(plane);

        let mut total = 0.0;
        for dy in -half..=half {
            let qy = i64::from(y) + dy;
            for dx in -half..=half {
                let qx = i64::from(x) + dx;
                total += self.sample_cost(base, base_view, other_view, center, plane, qx, qy)?;
            }
        }
        Ok(total)
    }

    /// Half-side of the support window for `plane`.
    ///
    /// With window resizing enabled, steep planes get a smaller window so
    /// the disparity variation across it stays within half the disparity
    /// range.
    fn window_half(&self, plane: &Plane) -> i64 {
        let mut half = i64::from(self.params.window_size / 2);
        if self.params.resize_windows {
            let limit = self.params.disparity_range() / 2.0;
            let spread = plane.a.abs() + plane.b.abs();
            while half > 0 && spread * half as f64 > limit {
                half /= 2;
            }
        }
        half
    }

    /// Contribution of the window pixel `(qx, qy)`.
    fn sample_cost(
        &self,
        base: ViewId,
        base_view: &ViewData,
        other_view: &ViewData,
        center: [f32; 3],
        plane: &Plane,
        qx: i64,
        qy: i64,
    ) -> Result<f64> {
        let rho_max = self.params.max_dissimilarity();

        // Resolve the window pixel against the base image.
        let (qx, qy, base_color, base_grad) = if base_view.contains(qx, qy) {
            let (ux, uy) = (qx as u32, qy as u32);
            (
                qx,
                qy,
                base_view.color(ux, uy),
                base_view.gradients.vector(ux, uy),
            )
        } else {
            match self.params.out_of_bounds {
                OutOfBounds::RepeatPixel => {
                    let cx = qx.clamp(0, i64::from(base_view.width()) - 1);
                    let cy = qy.clamp(0, i64::from(base_view.height()) - 1);
                    let (ux, uy) = (cx as u32, cy as u32);
                    (
                        cx,
                        cy,
                        base_view.color(ux, uy),
                        base_view.gradients.vector(ux, uy),
                    )
                }
                OutOfBounds::BlackPixel => (qx, qy, [0.0; 3], [0.0; 2]),
                OutOfBounds::ZeroCost => return Ok(0.0),
                // No color to weight with: full penalty, unit weight.
                OutOfBounds::NanCost => return Ok(rho_max),
                OutOfBounds::Error => {
                    return Err(Error::BoundaryViolation(format!(
                        "window pixel ({qx}, {qy}) outside the base image"
                    )))
                }
            }
        };

        let weight = (-f64::from(color_l1(center, base_color)) / self.params.gamma).exp();

        // Reproject into the other view along the epipolar line.
        let d = plane.evaluate_clamped(qx as f64, qy as f64, self.params);
        let mx = qx as f64 + base.disparity_sign() * d;
        let my = qy as f64;

        let in_other = mx >= 0.0
            && my >= 0.0
            && mx <= f64::from(other_view.width() - 1)
            && my <= f64::from(other_view.height() - 1);

        let (other_color, other_grad) = if in_other {
            sample_other(other_view, mx, my)
        } else {
            match self.params.out_of_bounds {
                OutOfBounds::RepeatPixel => sample_other(other_view, mx, my),
                OutOfBounds::BlackPixel => ([0.0; 3], [0.0; 2]),
                OutOfBounds::ZeroCost => return Ok(0.0),
                OutOfBounds::NanCost => return Ok(weight * rho_max),
                OutOfBounds::Error => {
                    return Err(Error::BoundaryViolation(format!(
                        "sample ({mx:.2}, {my:.2}) outside the other image"
                    )))
                }
            }
        };

        let color_diff = (f64::from(base_color[0]) - other_color[0]).abs()
            + (f64::from(base_color[1]) - other_color[1]).abs()
            + (f64::from(base_color[2]) - other_color[2]).abs();
        let grad_diff = (f64::from(base_grad[0]) - other_grad[0]).abs()
            + (f64::from(base_grad[1]) - other_grad[1]).abs();

        let rho = (1.0 - self.params.alfa) * color_diff.min(self.params.tau_col)
            + self.params.alfa * grad_diff.min(self.params.tau_grad);
        Ok(weight * rho)
    }
}

/// Bilinear color and gradient of the other view at a fractional column.
fn sample_other(view: &ViewData, x: f64, y: f64) -> ([f64; 3], [f64; 2]) {
    let color = [
        bilinear(&view.channels.r, x, y),
        bilinear(&view.channels.g, x, y),
        bilinear(&view.channels.b, x, y),
    ];
    let grad = [
        bilinear(&view.gradients.gx, x, y),
        bilinear(&view.gradients.gy, x, y),
    ];
    (color, grad)
}

#[inline]
fn color_l1(a: [f32; 3], b: [f32; 3]) -> f32 {
    (a[0] - b[0]).abs() + (a[1] - b[1]).abs() + (a[2] - b[2]).abs()
}
