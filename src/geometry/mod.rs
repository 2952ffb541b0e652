//! Geometry utilities: SE3 transforms and point-cloud alignment.

pub mod arun;
pub mod se3;

pub use arun::{align_points_ransac, ArunRansacConfig, ArunRansacResult};
pub use se3::SE3;
