//! Core math and data types for `camlidar`.
//!
//! This crate provides the foundational building blocks used by all other
//! crates in the workspace:
//!
//! - linear algebra type aliases (`Real`, `Vec3`, `Pt3`, `Iso3`, ...),
//! - board observations as produced by the camera and lidar extractors,
//! - a deterministic, model-agnostic RANSAC engine,
//! - deterministic synthetic scenes for tests and benchmarks.
//!
//! Frame convention: a camera-to-lidar extrinsic `T` maps camera-frame points
//! into the lidar frame, `p_lidar = T * p_camera`.

/// Calibration-board observations.
mod board;
/// Linear algebra type aliases and helpers.
mod math;
/// Generic RANSAC engine and traits.
mod ransac;
/// Deterministic synthetic data generation helpers.
///
/// Used by workspace tests; public so integration tests and downstream
/// benchmarks can build the same scenes.
pub mod synthetic;

pub use board::*;
pub use math::*;
pub use ransac::*;
