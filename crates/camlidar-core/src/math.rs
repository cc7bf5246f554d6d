//! Mathematical type aliases and small geometric helpers.
//!
//! Everything in the workspace is expressed with these aliases so the scalar
//! type can be changed in one place.

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Build a rigid transform from a rotation matrix and a translation vector.
///
/// The matrix is assumed to be a proper rotation; it is not re-orthonormalized.
pub fn iso_from_rt(rotation: &Mat3, translation: &Vec3) -> Iso3 {
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
    Iso3::from_parts(Translation3::from(*translation), rot)
}

/// Apply `transform` to every point of `points`.
pub fn transform_points(transform: &Iso3, points: &[Pt3]) -> Vec<Pt3> {
    points.iter().map(|p| transform.transform_point(p)).collect()
}

/// Arithmetic mean of a point set, `None` for an empty slice.
pub fn centroid(points: &[Pt3]) -> Option<Pt3> {
    if points.is_empty() {
        return None;
    }
    let mut sum = Vec3::zeros();
    for p in points {
        sum += p.coords;
    }
    Some(Pt3::from(sum / points.len() as Real))
}

/// Geodesic angle (radians) between two rotations.
pub fn rotation_angle(a: &Mat3, b: &Mat3) -> Real {
    let r_diff = a.transpose() * b;
    let cos_theta = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    cos_theta.acos()
}
