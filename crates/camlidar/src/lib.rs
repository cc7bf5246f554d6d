//! High-level entry crate for camera–lidar extrinsic registration.
//!
//! Given planar calibration boards seen by a camera and by a lidar, plus the
//! full lidar cloud, [`registration::register`] estimates the rigid transform
//! mapping camera-frame points into the lidar frame.
//!
//! ```no_run
//! use camlidar::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera_boards: Vec<Vec<Pt3>> = /* board points from the camera */
//! # vec![];
//! let lidar_boards: Vec<Vec<Pt3>> = /* segmented board points from the lidar */
//! # vec![];
//! let lidar_cloud: Vec<Pt3> = /* full lidar scan */
//! # vec![];
//!
//! let camera = BoardSet::new(Sensor::Camera, camera_boards);
//! let lidar = BoardSet::new(Sensor::Lidar, lidar_boards);
//! let report = register(&camera, &lidar, &lidar_cloud, &RegistrationConfig::default())?;
//!
//! println!("rotation: {}", report.rotation());
//! println!("translation: {}", report.translation());
//! std::fs::write("extrinsics.json", report.to_json()?)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`core`]**: Math types, board containers, RANSAC, synthetic scenes
//! - **[`linear`]**: Plane fitting and closed-form rigid solvers
//! - **[`registration`]**: Global search, ICP refinement and the end-to-end pipeline
//! - **[`prelude`]**: Convenient re-exports for common use cases
//!
//! ## Stability
//!
//! The `camlidar` crate is the public compatibility boundary. Lower-level
//! crates may evolve more quickly.

/// Core math types, board containers, RANSAC primitives and synthetic scenes.
pub mod core {
    pub use camlidar_core::*;
}

/// Board descriptors and closed-form rigid transform solvers.
pub mod linear {
    pub use camlidar_linear::*;
}

/// Correspondence search, candidate pool, ICP refinement and the pipeline.
pub mod registration {
    pub use camlidar_registration::*;
}

/// Convenient re-exports for common use cases.
///
/// Import with `use camlidar::prelude::*;` to get started quickly.
pub mod prelude {
    // Common types
    pub use crate::core::{BoardSet, Iso3, Mat3, PlanarBoardSample, Pt3, Real, Sensor, Vec3};

    // Descriptors
    pub use crate::linear::{BoardDescriptor, NormalOrientation};

    // Pipeline
    pub use crate::registration::{
        register, register_fine_only, register_input, CorrespondenceFilter, RefineOptions,
        RegistrationConfig, RegistrationError, RegistrationInput, RegistrationReport,
        SearchOptions,
    };
}
