//! Board descriptors: centroid and oriented unit normal of a planar point set.
//!
//! # Algorithm
//!
//! 1. Centroid = coordinate-wise mean of the points.
//! 2. 3×3 scatter matrix of the centered points.
//! 3. Eigenvector of the smallest eigenvalue = plane normal.
//! 4. Per-sensor sign convention removes the ±n ambiguity.
//!
//! A set that spans less than a plane (fewer than 3 points, all points on a
//! line or coincident) has no defined normal and is rejected.

use camlidar_core::{PlanarBoardSample, Pt3, Real, Sensor, Vec3};
use nalgebra::UnitVector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while describing a board sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    /// Not enough points to span a plane.
    #[error("need at least 3 points to fit a board plane, got {points}")]
    TooFewPoints { points: usize },
    /// Points span a line or a single location.
    #[error("board points are collinear or coincident")]
    Collinear,
    /// A point has a NaN or infinite coordinate.
    #[error("board point {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// Coordinate axis of a sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Sign required on the reference axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisSign {
    Positive,
    Negative,
}

/// Sign convention applied to estimated board normals.
///
/// A normal is flipped when its component along `axis` has the wrong sign.
/// A zero component leaves it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalOrientation {
    pub axis: Axis,
    pub sign: AxisSign,
}

impl NormalOrientation {
    /// Camera convention: normals point toward negative depth (`-z`).
    pub const fn camera() -> Self {
        Self {
            axis: Axis::Z,
            sign: AxisSign::Negative,
        }
    }

    /// Lidar convention: normals point toward positive `x`.
    ///
    /// This suits boards behind a lidar looking along `-x`. For a
    /// forward-looking mount (boards at positive `x`), the sensor-facing
    /// normals point along `-x`; use `AxisSign::Negative` on `Axis::X`
    /// there so the lidar normals agree with the camera's `-z` convention.
    pub const fn lidar() -> Self {
        Self {
            axis: Axis::X,
            sign: AxisSign::Positive,
        }
    }

    /// Default convention for a sensor.
    pub const fn for_sensor(sensor: Sensor) -> Self {
        match sensor {
            Sensor::Camera => Self::camera(),
            Sensor::Lidar => Self::lidar(),
        }
    }

    /// Flip `n` if needed so it satisfies this convention.
    pub fn orient(&self, n: Vec3) -> Vec3 {
        let c = n[self.axis.index()];
        let wrong = match self.sign {
            AxisSign::Positive => c < 0.0,
            AxisSign::Negative => c > 0.0,
        };
        if wrong {
            -n
        } else {
            n
        }
    }
}

/// Centroid and unit normal summarizing one planar board sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDescriptor {
    pub sensor: Sensor,
    /// Index of the board within its sensor's list.
    pub index: usize,
    /// Mean of the board points.
    pub centroid: Pt3,
    /// Oriented unit plane normal.
    pub normal: UnitVector3<Real>,
    /// RMS point-to-plane distance of the sample.
    pub plane_rms: Real,
    pub num_points: usize,
}

/// Relative eigenvalue ratio below which a direction is considered empty.
const RANK_THRESHOLD: Real = 1e-10;

impl BoardDescriptor {
    /// Descriptor from an explicit centroid and normal.
    ///
    /// The normal is normalized and oriented with `orientation`.
    pub fn new(
        sensor: Sensor,
        index: usize,
        centroid: Pt3,
        normal: Vec3,
        orientation: &NormalOrientation,
    ) -> Self {
        Self {
            sensor,
            index,
            centroid,
            normal: UnitVector3::new_normalize(orientation.orient(normal)),
            plane_rms: 0.0,
            num_points: 0,
        }
    }

    /// Fit a descriptor to a board sample.
    pub fn from_sample(
        sample: &PlanarBoardSample,
        orientation: &NormalOrientation,
    ) -> Result<Self, DescriptorError> {
        let (centroid, normal, plane_rms) = fit_plane(&sample.points)?;
        Ok(Self {
            sensor: sample.sensor,
            index: sample.index,
            centroid,
            normal: UnitVector3::new_normalize(orientation.orient(normal)),
            plane_rms,
            num_points: sample.points.len(),
        })
    }

    /// Unit normal as a plain vector.
    pub fn normal_vec(&self) -> Vec3 {
        self.normal.into_inner()
    }
}

/// Least-squares plane through `points`: `(centroid, unit normal, rms)`.
///
/// The normal sign is whatever the eigen solver returns.
pub fn fit_plane(points: &[Pt3]) -> Result<(Pt3, Vec3, Real), DescriptorError> {
    if points.len() < 3 {
        return Err(DescriptorError::TooFewPoints {
            points: points.len(),
        });
    }
    if let Some(index) = points
        .iter()
        .position(|p| !p.coords.iter().all(|v| v.is_finite()))
    {
        return Err(DescriptorError::NonFinite { index });
    }

    let n = points.len() as Real;
    let mut mean = Vec3::zeros();
    for p in points {
        mean += p.coords;
    }
    mean /= n;

    let mut scatter = nalgebra::Matrix3::<Real>::zeros();
    for p in points {
        let d = p.coords - mean;
        scatter += d * d.transpose();
    }
    scatter /= n;

    let eigen = scatter.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
    let (min_idx, mid_idx, max_idx) = (order[0], order[1], order[2]);

    // A plane needs two significant directions.
    let max_ev = eigen.eigenvalues[max_idx];
    if max_ev <= 0.0 || eigen.eigenvalues[mid_idx] / max_ev < RANK_THRESHOLD {
        return Err(DescriptorError::Collinear);
    }

    let normal: Vec3 = eigen.eigenvectors.column(min_idx).normalize();
    let mut sum_sq = 0.0;
    for p in points {
        let d = normal.dot(&(p.coords - mean));
        sum_sq += d * d;
    }

    Ok((Pt3::from(mean), normal, (sum_sq / n).sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_on_plane(center: Vec3, u: Vec3, v: Vec3) -> Vec<Pt3> {
        let mut pts = Vec::new();
        for i in -2..=2 {
            for j in -2..=2 {
                pts.push(Pt3::from(center + u * (i as Real * 0.1) + v * (j as Real * 0.1)));
            }
        }
        pts
    }

    #[test]
    fn descriptor_has_unit_normal_and_mean_centroid() {
        let u = Vec3::new(1.0, 0.0, 0.2).normalize();
        let v = Vec3::new(0.0, 1.0, -0.1).normalize();
        let pts = square_on_plane(Vec3::new(0.5, -0.3, 2.0), u, v);
        let sample = PlanarBoardSample::new(Sensor::Camera, 2, pts.clone());

        let desc = BoardDescriptor::from_sample(&sample, &NormalOrientation::camera()).unwrap();
        assert_eq!(desc.index, 2);
        assert_eq!(desc.num_points, pts.len());
        assert!((desc.normal.norm() - 1.0).abs() < 1e-12);

        let mut mean = Vec3::zeros();
        for p in &pts {
            mean += p.coords;
        }
        mean /= pts.len() as Real;
        assert!((desc.centroid.coords - mean).norm() < 1e-12);

        let expected = u.cross(&v).normalize();
        assert!(desc.normal.dot(&expected).abs() > 1.0 - 1e-9);
        assert!(desc.normal.z < 0.0, "camera normal must face -z");
        assert!(desc.plane_rms < 1e-12);
    }

    #[test]
    fn lidar_convention_points_along_positive_x() {
        let pts = square_on_plane(Vec3::new(-3.0, 0.0, 0.0), Vec3::y(), Vec3::z());
        let sample = PlanarBoardSample::new(Sensor::Lidar, 0, pts);
        let desc = BoardDescriptor::from_sample(&sample, &NormalOrientation::lidar()).unwrap();
        assert!((desc.normal.into_inner() - Vec3::x()).norm() < 1e-9);
    }

    #[test]
    fn forward_mount_faces_boards_toward_sensor() {
        // board 3 m ahead of a forward-looking lidar
        let pts = square_on_plane(Vec3::new(3.0, 0.0, 0.0), Vec3::y(), Vec3::z());
        let sample = PlanarBoardSample::new(Sensor::Lidar, 0, pts);
        let forward = NormalOrientation {
            axis: Axis::X,
            sign: AxisSign::Negative,
        };
        let desc = BoardDescriptor::from_sample(&sample, &forward).unwrap();
        assert!((desc.normal.into_inner() + Vec3::x()).norm() < 1e-9);
        // the normal points from the board back to the sensor origin
        assert!(desc.normal.dot(&(Pt3::origin() - desc.centroid)) > 0.0);

        let default = BoardDescriptor::from_sample(&sample, &NormalOrientation::lidar()).unwrap();
        assert!(default.normal.dot(&(Pt3::origin() - default.centroid)) < 0.0);
    }

    #[test]
    fn orientation_leaves_zero_component_alone() {
        let o = NormalOrientation::camera();
        assert_eq!(o.orient(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(o.orient(Vec3::new(0.0, 0.0, 1.0)), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(o.orient(Vec3::new(0.0, 0.0, -1.0)), Vec3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn too_few_points_is_rejected() {
        let pts = vec![Pt3::origin(), Pt3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            fit_plane(&pts).unwrap_err(),
            DescriptorError::TooFewPoints { points: 2 }
        );
    }

    #[test]
    fn collinear_points_are_rejected() {
        let pts: Vec<Pt3> = (0..10).map(|i| Pt3::new(i as Real, 2.0 * i as Real, 0.5)).collect();
        assert_eq!(fit_plane(&pts).unwrap_err(), DescriptorError::Collinear);

        let same = vec![Pt3::new(1.0, 1.0, 1.0); 5];
        assert_eq!(fit_plane(&same).unwrap_err(), DescriptorError::Collinear);
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let pts = vec![
            Pt3::origin(),
            Pt3::new(1.0, 0.0, 0.0),
            Pt3::new(0.0, Real::NAN, 0.0),
        ];
        assert_eq!(
            fit_plane(&pts).unwrap_err(),
            DescriptorError::NonFinite { index: 2 }
        );
    }

    #[test]
    fn explicit_descriptor_is_normalized_and_oriented() {
        let d = BoardDescriptor::new(
            Sensor::Lidar,
            1,
            Pt3::new(1.0, 2.0, 3.0),
            Vec3::new(-2.0, 0.0, 0.0),
            &NormalOrientation::lidar(),
        );
        assert!((d.normal_vec() - Vec3::x()).norm() < 1e-12);
    }
}
