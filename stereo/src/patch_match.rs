//! PatchMatch optimization over per-pixel disparity planes.
//!
//! Sweeps alternate between the two views and between scan directions.
//! Within a sweep, pixels on one anti-diagonal only depend on pixels of
//! earlier diagonals, so each diagonal is processed as a parallel
//! wavefront: every pixel computes its final cell against the immutable
//! grids and the batch is committed before the next diagonal starts.

use image::RgbImage;
use log::{debug, info};
use rayon::prelude::*;

use pm_core::{pixel_rng, Error, Params, Result};

use crate::cost::CostEvaluator;
use crate::disparity::DisparityMap;
use crate::grid::{Cell, PlaneGrid};
use crate::plane::Plane;
use crate::postprocess::refine_pair;
use crate::view::{ViewData, ViewId};

/// Seed used for repeatable runs unless one is supplied explicitly.
const DEFAULT_SEED: u64 = 0x706d_7374_6572_656f;

/// Smallest disparity perturbation tried during plane refinement.
const MIN_REFINE_DELTA: f64 = 0.1;

/// PatchMatch stereo matcher.
///
/// ```no_run
/// use pm_core::Params;
/// use pm_stereo::PatchMatcher;
///
/// # fn main() -> pm_core::Result<()> {
/// let left = image::open("left.png").unwrap().to_rgb8();
/// let right = image::open("right.png").unwrap().to_rgb8();
///
/// let matcher = PatchMatcher::new(Params::default());
/// let (left_disp, right_disp) = matcher.compute(&left, &right)?;
/// left_disp.to_image().save("disparityL.png").unwrap();
/// # Ok(())
/// # }
/// ```
pub struct PatchMatcher {
    params: Params,
    seed_override: Option<u64>,
}

impl PatchMatcher {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            seed_override: None,
        }
    }

    /// Fix the seed of a repeatable run (implies deterministic draws).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_override = Some(seed);
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn seed(&self) -> Option<u64> {
        match self.seed_override {
            Some(seed) => Some(seed),
            None if self.params.use_pseudorand => Some(DEFAULT_SEED),
            None => None,
        }
    }

    /// Compute post-processed disparity maps for both views.
    pub fn compute(&self, left: &RgbImage, right: &RgbImage) -> Result<(DisparityMap, DisparityMap)> {
        let (left_view, right_view) = self.prepare_views(left, right)?;
        let eval = CostEvaluator::new(&left_view, &right_view, &self.params);

        let (left_grid, right_grid) = self.optimize(&eval)?;

        let mut left_disp = left_grid.extract_disparity(&self.params);
        let mut right_disp = right_grid.extract_disparity(&self.params);
        refine_pair(
            &mut left_disp,
            &mut right_disp,
            &left_view,
            &right_view,
            &self.params,
        );
        Ok((left_disp, right_disp))
    }

    /// Compute raw disparity maps, skipping post-processing.
    pub fn compute_raw(
        &self,
        left: &RgbImage,
        right: &RgbImage,
    ) -> Result<(DisparityMap, DisparityMap)> {
        let (left_view, right_view) = self.prepare_views(left, right)?;
        let eval = CostEvaluator::new(&left_view, &right_view, &self.params);
        let (left_grid, right_grid) = self.optimize(&eval)?;
        Ok((
            left_grid.extract_disparity(&self.params),
            right_grid.extract_disparity(&self.params),
        ))
    }

    fn prepare_views(&self, left: &RgbImage, right: &RgbImage) -> Result<(ViewData, ViewData)> {
        self.params.validate()?;
        if left.dimensions() != right.dimensions() {
            return Err(Error::InvalidInput(format!(
                "stereo pair dimensions differ: {:?} vs {:?}",
                left.dimensions(),
                right.dimensions()
            )));
        }
        if left.width() == 0 || left.height() == 0 {
            return Err(Error::InvalidInput("empty input images".to_string()));
        }

        info!(
            "building view data for a {}x{} pair",
            left.width(),
            left.height()
        );
        let normalize = self.params.normalize_gradients;
        let (left_view, right_view) = rayon::join(
            || ViewData::from_rgb(left, normalize),
            || ViewData::from_rgb(right, normalize),
        );
        Ok((left_view, right_view))
    }

    /// Run initialization and all sweeps, returning the final grids.
    fn optimize(&self, eval: &CostEvaluator<'_>) -> Result<(PlaneGrid, PlaneGrid)> {
        let seed = self.seed();

        let mut left_grid = PlaneGrid::initialize(ViewId::Left, eval, seed, &self.params)?;
        let mut right_grid = PlaneGrid::initialize(ViewId::Right, eval, seed, &self.params)?;
        debug!("grids initialized");

        for sweep in 0..self.params.iterations {
            // Even sweeps refine the left view scanning forward, odd
            // sweeps the right view scanning backward.
            let forward = sweep % 2 == 0;
            let (active, other) = if forward {
                (&mut left_grid, &right_grid)
            } else {
                (&mut right_grid, &left_grid)
            };
            self.sweep(sweep, forward, active, other, eval)?;
            info!(
                "sweep {}/{} done ({:?} view)",
                sweep + 1,
                self.params.iterations,
                if forward { ViewId::Left } else { ViewId::Right }
            );
        }
        Ok((left_grid, right_grid))
    }

    fn sweep(
        &self,
        sweep: u32,
        forward: bool,
        active: &mut PlaneGrid,
        other: &PlaneGrid,
        eval: &CostEvaluator<'_>,
    ) -> Result<()> {
        let width = active.width();
        let height = active.height();
        let seed = self.seed();

        // The other grid does not change during this sweep, so the
        // projection targets can be indexed once up front.
        let projections = ProjectionIndex::build(other, &self.params);
        debug!(
            "sweep {sweep}: view {:?}, {} diagonals",
            active.view(),
            width + height - 1
        );

        let diagonals = 0..(width + height - 1);
        let order: Vec<u32> = if forward {
            diagonals.collect()
        } else {
            diagonals.rev().collect()
        };

        let mut wavefront: Vec<(u32, u32)> = Vec::new();
        for k in order {
            wavefront.clear();
            let x_lo = k.saturating_sub(height - 1);
            let x_hi = k.min(width - 1);
            wavefront.extend((x_lo..=x_hi).map(|x| (x, k - x)));

            let grid: &PlaneGrid = active;
            let updates: Vec<(u32, u32, Cell)> = wavefront
                .par_iter()
                .map(|&(x, y)| -> Result<(u32, u32, Cell)> {
                    let cell =
                        self.improve_pixel(sweep, forward, x, y, grid, other, &projections, eval, seed)?;
                    Ok((x, y, cell))
                })
                .collect::<Result<_>>()?;

            for (x, y, cell) in updates {
                active.set_cell(x, y, cell);
            }
        }
        Ok(())
    }

    /// Run the three update stages for one pixel against the immutable
    /// grids, returning its final cell for batch commit.
    #[allow(clippy::too_many_arguments)]
    fn improve_pixel(
        &self,
        sweep: u32,
        forward: bool,
        x: u32,
        y: u32,
        active: &PlaneGrid,
        other: &PlaneGrid,
        projections: &ProjectionIndex,
        eval: &CostEvaluator<'_>,
        seed: Option<u64>,
    ) -> Result<Cell> {
        let view = active.view();
        let mut cell = active.cell(x, y);
        let mut rng = pixel_rng(seed, u64::from(sweep), x, y);

        // Spatial propagation from the two neighbors already visited in
        // this sweep's scan order.
        let neighbors: [Option<(u32, u32)>; 2] = if forward {
            [
                x.checked_sub(1).map(|nx| (nx, y)),
                y.checked_sub(1).map(|ny| (x, ny)),
            ]
        } else {
            [
                (x + 1 < active.width()).then_some((x + 1, y)),
                (y + 1 < active.height()).then_some((x, y + 1)),
            ]
        };
        for (nx, ny) in neighbors.into_iter().flatten() {
            self.consider(view, x, y, active.plane(nx, ny), &mut cell, eval)?;
        }

        // View propagation: planes of the other view whose disparity
        // projects them onto this pixel.
        let other_view = view.other();
        for &qx in projections.contributors(x, y) {
            let candidate = other
                .plane(qx, y)
                .transfer(f64::from(qx), f64::from(y), other_view);
            self.consider(view, x, y, candidate, &mut cell, eval)?;
        }

        // Plane refinement with an exponentially shrinking search radius.
        let mut max_dd = self.params.disparity_range() / 2.0;
        let mut max_dn = 1.0;
        while max_dd >= MIN_REFINE_DELTA {
            let candidate = cell
                .plane
                .refine(x, y, max_dd, max_dn, &mut rng, &self.params);
            self.consider(view, x, y, candidate, &mut cell, eval)?;
            max_dd /= 2.0;
            max_dn /= 2.0;
        }

        Ok(cell)
    }

    fn consider(
        &self,
        view: ViewId,
        x: u32,
        y: u32,
        candidate: Plane,
        cell: &mut Cell,
        eval: &CostEvaluator<'_>,
    ) -> Result<()> {
        let cost = eval.plane_cost(view, x, y, &candidate)?;
        if cost < cell.cost {
            *cell = Cell {
                plane: candidate,
                cost,
            };
        }
        Ok(())
    }
}

/// For each pixel of the active view, the other-view columns on the same
/// row whose current planes project onto it.
struct ProjectionIndex {
    buckets: Vec<Vec<u32>>,
    width: u32,
}

impl ProjectionIndex {
    fn build(other: &PlaneGrid, params: &Params) -> Self {
        let width = other.width();
        let height = other.height();
        let sign = other.view().disparity_sign();

        let rows: Vec<Vec<Vec<u32>>> = (0..height)
            .into_par_iter()
            .map(|y| {
                let mut row: Vec<Vec<u32>> = vec![Vec::new(); width as usize];
                for qx in 0..width {
                    let d = other
                        .plane(qx, y)
                        .evaluate_clamped(f64::from(qx), f64::from(y), params);
                    let target = (f64::from(qx) + sign * d).round();
                    if target >= 0.0 && target < f64::from(width) {
                        row[target as usize].push(qx);
                    }
                }
                row
            })
            .collect();

        Self {
            buckets: rows.into_iter().flatten().collect(),
            width,
        }
    }

    fn contributors(&self, x: u32, y: u32) -> &[u32] {
        &self.buckets[(y as usize) * (self.width as usize) + x as usize]
    }
}
