//! Shared primitives
//!
//! Geometry and region types used by every other module.

pub mod geometry;
pub mod region;

pub use geometry::{Geometry, Point, Rect};
pub use region::{Overlap, Region};
