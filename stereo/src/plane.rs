//! Slanted disparity planes.
//!
//! A plane assigns every pixel of a view the disparity
//! `d(x, y) = a*x + b*y + c`. Sampling and perturbation go through the
//! unit normal of the plane in `(x, y, d)` space, which keeps the slope
//! cap easy to express: the slope angle equals the angle between the
//! normal and the `d` axis.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::Rng;

use pm_core::Params;

use crate::view::ViewId;

/// Attempts at drawing an admissible perturbed normal before giving up
/// and keeping the current orientation.
const REFINE_ATTEMPTS: u32 = 16;

/// Affine disparity function over image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    /// Fronto-parallel plane with constant disparity `d`.
    pub fn constant(d: f64) -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            c: d,
        }
    }

    /// Plane with unit normal `n` (`n.z > 0`) passing through `(x, y, d)`.
    pub fn from_normal(n: Vector3<f64>, x: f64, y: f64, d: f64) -> Self {
        let a = -n.x / n.z;
        let b = -n.y / n.z;
        Self {
            a,
            b,
            c: d - a * x - b * y,
        }
    }

    /// Unit normal in `(x, y, d)` space, oriented with positive `z`.
    pub fn normal(&self) -> Vector3<f64> {
        Vector3::new(-self.a, -self.b, 1.0).normalize()
    }

    /// Disparity at `(x, y)`.
    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    /// Disparity at `(x, y)`, clamped into the configured range when
    /// saturation is enabled.
    #[inline]
    pub fn evaluate_clamped(&self, x: f64, y: f64, params: &Params) -> f64 {
        let d = self.evaluate(x, y);
        if params.planes_saturation {
            d.clamp(f64::from(params.min_d), f64::from(params.max_d))
        } else {
            d
        }
    }

    /// Slope of the plane in degrees.
    pub fn slope_degrees(&self) -> f64 {
        (self.a * self.a + self.b * self.b).sqrt().atan().to_degrees()
    }

    /// Random plane through pixel `(x, y)`: disparity uniform over the
    /// configured range, normal uniform over the spherical cap admitted
    /// by the slope cap.
    pub fn random_at(x: u32, y: u32, rng: &mut StdRng, params: &Params) -> Self {
        let d = rng.gen_range(f64::from(params.min_d)..=f64::from(params.max_d));
        if params.const_disparities {
            return Plane::constant(d);
        }
        let n = sample_cap_normal(rng, params.max_slope);
        Plane::from_normal(n, f64::from(x), f64::from(y), d)
    }

    /// Perturbed copy re-based at pixel `(x, y)`: the disparity moves by
    /// up to `max_dd`, the normal by a vector from the ball of radius
    /// `max_dn`. The slope cap and the disparity range are preserved.
    pub fn refine(
        &self,
        x: u32,
        y: u32,
        max_dd: f64,
        max_dn: f64,
        rng: &mut StdRng,
        params: &Params,
    ) -> Self {
        let (xf, yf) = (f64::from(x), f64::from(y));
        let dd = rng.gen_range(-max_dd..=max_dd);
        let d = (self.evaluate(xf, yf) + dd)
            .clamp(f64::from(params.min_d), f64::from(params.max_d));
        if params.const_disparities {
            return Plane::constant(d);
        }

        let mut n = self.normal();
        for _ in 0..REFINE_ATTEMPTS {
            let candidate = n + sample_ball(rng) * max_dn;
            if candidate.z <= f64::EPSILON {
                continue;
            }
            let candidate = candidate.normalize();
            if slope_of_normal(&candidate) <= params.max_slope {
                n = candidate;
                break;
            }
        }
        Plane::from_normal(n, xf, yf, d)
    }

    /// Equivalent plane expressed in the other view's coordinates.
    ///
    /// The pixel `(x, y)` of `view` projects to column `x -/+ d` of the
    /// other view; the disparity coefficients change sign and the plane is
    /// re-based so it evaluates to the same disparity at the projected
    /// point. Applying the transfer twice restores the original plane
    /// exactly.
    pub fn transfer(&self, x: f64, y: f64, view: ViewId) -> Self {
        let d = self.evaluate(x, y);
        let xm = x + view.disparity_sign() * d;
        let a = -self.a;
        let b = -self.b;
        Self {
            a,
            b,
            c: d - a * xm - b * y,
        }
    }
}

fn slope_of_normal(n: &Vector3<f64>) -> f64 {
    (n.x * n.x + n.y * n.y).sqrt().atan2(n.z).to_degrees()
}

/// Uniform draw over the spherical cap `{n : |n| = 1, n.z >= cos(slope)}`.
fn sample_cap_normal(rng: &mut StdRng, max_slope_degrees: f64) -> Vector3<f64> {
    let z_min = max_slope_degrees.min(89.9).to_radians().cos();
    let z = rng.gen_range(z_min..=1.0);
    let phi = rng.gen_range(0.0..std::f64::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vector3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Uniform draw from the closed unit ball.
fn sample_ball(rng: &mut StdRng) -> Vector3<f64> {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.norm_squared() <= 1.0 {
            return v;
        }
    }
}
