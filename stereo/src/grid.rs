//! Dense per-pixel plane assignment with cached costs.

use rayon::prelude::*;

use pm_core::{pixel_rng, Params, Result};

use crate::cost::CostEvaluator;
use crate::disparity::DisparityMap;
use crate::plane::Plane;
use crate::view::ViewId;

/// Stage tags fed into the per-pixel seed derivation. Sweeps use their own
/// index; initialization gets reserved tags so it never collides with one.
pub(crate) const INIT_STAGE_LEFT: u64 = u64::MAX;
pub(crate) const INIT_STAGE_RIGHT: u64 = u64::MAX - 1;

fn init_stage(view: ViewId) -> u64 {
    match view {
        ViewId::Left => INIT_STAGE_LEFT,
        ViewId::Right => INIT_STAGE_RIGHT,
    }
}

/// One grid cell: the current plane and its cached aggregated cost.
///
/// The two fields are only ever replaced together, so the cache can never
/// disagree with the plane it describes.
#[derive(Debug, Clone, Copy)]
pub struct Cell {
    pub plane: Plane,
    pub cost: f64,
}

/// Dense `W x H` plane assignment for one view.
#[derive(Debug, Clone)]
pub struct PlaneGrid {
    cells: Vec<Cell>,
    width: u32,
    height: u32,
    view: ViewId,
}

impl PlaneGrid {
    /// Assign every pixel a random plane and cache its cost.
    pub fn initialize(
        view: ViewId,
        eval: &CostEvaluator<'_>,
        seed: Option<u64>,
        params: &Params,
    ) -> Result<Self> {
        let width = eval.view(view).width();
        let height = eval.view(view).height();
        let stage = init_stage(view);

        let rows: Vec<Vec<Cell>> = (0..height)
            .into_par_iter()
            .map(|y| -> Result<Vec<Cell>> {
                let mut row = Vec::with_capacity(width as usize);
                for x in 0..width {
                    let mut rng = pixel_rng(seed, stage, x, y);
                    let plane = Plane::random_at(x, y, &mut rng, params);
                    let cost = eval.plane_cost(view, x, y, &plane)?;
                    row.push(Cell { plane, cost });
                }
                Ok(row)
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            cells: rows.into_iter().flatten().collect(),
            width,
            height,
            view,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + x as usize
    }

    #[inline]
    pub fn cell(&self, x: u32, y: u32) -> Cell {
        self.cells[self.index(x, y)]
    }

    #[inline]
    pub fn plane(&self, x: u32, y: u32) -> Plane {
        self.cells[self.index(x, y)].plane
    }

    #[inline]
    pub fn cost(&self, x: u32, y: u32) -> f64 {
        self.cells[self.index(x, y)].cost
    }

    /// Commit a cell computed off-grid (wavefront batches).
    pub(crate) fn set_cell(&mut self, x: u32, y: u32, cell: Cell) {
        let idx = self.index(x, y);
        self.cells[idx] = cell;
    }

    /// Replace the pixel's plane when the candidate is strictly cheaper.
    ///
    /// This is the sole mutation primitive of a grid; the cached cost is
    /// updated in the same step.
    pub fn try_replace(
        &mut self,
        x: u32,
        y: u32,
        candidate: Plane,
        eval: &CostEvaluator<'_>,
    ) -> Result<bool> {
        let cost = eval.plane_cost(self.view, x, y, &candidate)?;
        let idx = self.index(x, y);
        if cost < self.cells[idx].cost {
            self.cells[idx] = Cell {
                plane: candidate,
                cost,
            };
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Disparity map obtained by evaluating each pixel's plane at itself.
    pub fn extract_disparity(&self, params: &Params) -> DisparityMap {
        let mut map = DisparityMap::new(self.width, self.height, params.min_d, params.max_d);
        let width = self.width as usize;
        let cells = &self.cells;
        map.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let cell = &cells[y * width + x];
                    *out = cell.plane.evaluate_clamped(x as f64, y as f64, params);
                }
            });
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewData;
    use image::{Rgb, RgbImage};

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = (x * 255 / w.max(1)) as u8;
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        img
    }

    fn small_params() -> Params {
        Params {
            window_size: 3,
            min_d: 0,
            max_d: 8,
            use_pseudorand: true,
            ..Params::default()
        }
    }

    #[test]
    fn initialization_is_deterministic_for_a_fixed_seed() {
        let img = gradient_image(12, 6);
        let params = small_params();
        let left = ViewData::from_rgb(&img, params.normalize_gradients);
        let right = ViewData::from_rgb(&img, params.normalize_gradients);
        let eval = CostEvaluator::new(&left, &right, &params);

        let a = PlaneGrid::initialize(ViewId::Left, &eval, Some(42), &params).unwrap();
        let b = PlaneGrid::initialize(ViewId::Left, &eval, Some(42), &params).unwrap();
        for y in 0..a.height() {
            for x in 0..a.width() {
                assert_eq!(a.plane(x, y), b.plane(x, y));
                assert_eq!(a.cost(x, y), b.cost(x, y));
            }
        }

        // The two views draw from distinct streams.
        let r = PlaneGrid::initialize(ViewId::Right, &eval, Some(42), &params).unwrap();
        assert_ne!(a.plane(3, 3), r.plane(3, 3));
    }

    #[test]
    fn initial_costs_match_a_fresh_evaluation() {
        let img = gradient_image(10, 5);
        let params = small_params();
        let left = ViewData::from_rgb(&img, params.normalize_gradients);
        let right = ViewData::from_rgb(&img, params.normalize_gradients);
        let eval = CostEvaluator::new(&left, &right, &params);

        let grid = PlaneGrid::initialize(ViewId::Left, &eval, Some(3), &params).unwrap();
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let fresh = eval.plane_cost(ViewId::Left, x, y, &grid.plane(x, y)).unwrap();
                assert_eq!(grid.cost(x, y), fresh);
            }
        }
    }

    #[test]
    fn try_replace_keeps_the_cheaper_plane() {
        let img = gradient_image(10, 5);
        let params = small_params();
        let left = ViewData::from_rgb(&img, params.normalize_gradients);
        let right = ViewData::from_rgb(&img, params.normalize_gradients);
        let eval = CostEvaluator::new(&left, &right, &params);

        let mut grid = PlaneGrid::initialize(ViewId::Left, &eval, Some(5), &params).unwrap();
        let before = grid.cost(4, 2);

        // Identical views: zero disparity matches perfectly, so the
        // fronto-parallel zero plane can only improve the cell.
        let replaced = grid
            .try_replace(4, 2, Plane::constant(0.0), &eval)
            .unwrap();
        assert!(grid.cost(4, 2) <= before);
        if replaced {
            assert_eq!(grid.plane(4, 2), Plane::constant(0.0));
        }

        // Re-offering the stored plane never replaces: the comparison is strict.
        let again = grid.try_replace(4, 2, grid.plane(4, 2), &eval).unwrap();
        assert!(!again);
    }

    #[test]
    fn extracted_disparities_stay_in_range() {
        let img = gradient_image(10, 5);
        let params = small_params();
        let left = ViewData::from_rgb(&img, params.normalize_gradients);
        let right = ViewData::from_rgb(&img, params.normalize_gradients);
        let eval = CostEvaluator::new(&left, &right, &params);

        let grid = PlaneGrid::initialize(ViewId::Left, &eval, Some(11), &params).unwrap();
        let map = grid.extract_disparity(&params);
        for &d in &map.data {
            assert!(d >= f64::from(params.min_d) && d <= f64::from(params.max_d));
        }
    }
}
