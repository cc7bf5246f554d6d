//! Closed-form solvers for camera/lidar board registration.
//!
//! - [`BoardDescriptor`]: centroid + oriented normal of a planar board sample.
//! - [`rotation_from_directions`] / [`kabsch_rotation`]: proper rotations from
//!   paired directions or a cross-covariance.
//! - [`translation_point_to_plane`]: translation from board centroids and
//!   normals once the rotation is known.
//! - [`rigid_transform_svd`] and [`RigidEstimator`]: rigid alignment of point
//!   correspondences, plain or inside RANSAC.

mod descriptor;
mod rigid;

pub use descriptor::*;
pub use rigid::*;
