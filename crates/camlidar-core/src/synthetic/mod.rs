//! Deterministic synthetic data generation helpers.
//!
//! Small, reusable building blocks for synthetic camera/lidar calibration
//! problems used in tests and examples:
//! - planar board point grids and background clutter,
//! - a ground-truth camera-to-lidar transform generator,
//! - complete scenes with camera boards, lidar boards and a lidar cloud,
//! - deterministic pseudo-random noise utilities.
//!
//! # Example
//!
//! ```no_run
//! use camlidar_core::synthetic::scene::{lidar_from_camera, CalibrationScene};
//! use camlidar_core::Vec3;
//!
//! let truth = lidar_from_camera(0.0, 0.02, -0.05, Vec3::new(0.1, 0.0, -0.2));
//! let scene = CalibrationScene::four_boards(truth).unwrap();
//! assert_eq!(scene.camera_boards.len(), 4);
//! ```

pub mod noise;
pub mod scene;
