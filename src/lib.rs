//! Facade crate re-exporting the PatchMatch stereo workspace.
//!
//! Most applications only need [`stereo::PatchMatcher`] together with a
//! [`core::Params`] block; the member crates remain available for finer
//! control over image preparation and post-processing.

pub use pm_core as core;
pub use pm_imgproc as imgproc;
pub use pm_stereo as stereo;

pub use pm_stereo::init_thread_pool;
pub use pm_stereo::PatchMatcher;
