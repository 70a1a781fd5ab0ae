//! PatchMatch stereo matching with slanted support windows.
//!
//! Computes dense floating-point disparity maps for a rectified stereo
//! pair by randomized iterative refinement of a per-pixel assignment of
//! slanted disparity planes (Bleyer, Rhemann and Rother, BMVC 2011),
//! followed by a left-right consistency check, hole filling and a
//! weighted-median cleanup.

pub mod cost;
pub mod depth;
pub mod disparity;
pub mod grid;
pub mod parallel;
pub mod patch_match;
pub mod plane;
pub mod postprocess;
pub mod view;

pub use cost::*;
pub use depth::*;
pub use disparity::*;
pub use grid::*;
pub use parallel::*;
pub use patch_match::*;
pub use plane::*;
pub use postprocess::*;
pub use view::*;

pub use pm_core::{Error, OutOfBounds, Params, Result};
