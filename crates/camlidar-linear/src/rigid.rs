//! Closed-form rigid alignment solvers.
//!
//! - [`kabsch_rotation`]: proper rotation from a 3×3 cross-covariance.
//! - [`rotation_from_directions`]: rotation aligning paired unit directions
//!   (board normals).
//! - [`translation_point_to_plane`]: translation minimizing point-to-plane
//!   residuals of paired board centroids, given the rotation.
//! - [`rigid_transform_svd`]: least-squares rigid transform between paired
//!   point sets (centroid removal + SVD).
//!
//! Convention: every solver returns the transform mapping `src` into `dst`,
//! `dst ≈ R * src + t`.

use camlidar_core::{centroid, iso_from_rt, Estimator, Iso3, Mat3, Pt3, Real, Vec3};
use thiserror::Error;

/// Errors that can occur in the closed-form solvers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// Fewer pairs than the solver needs.
    #[error("need at least {needed} pairs, got {got}")]
    NotEnoughPairs { needed: usize, got: usize },
    /// Input slices have different lengths.
    #[error("input length mismatch: {src} vs {dst}")]
    LengthMismatch { src: usize, dst: usize },
    /// The linear system is (near-)singular.
    #[error("ill-conditioned system (eigenvalue ratio {ratio:.3e})")]
    IllConditioned { ratio: Real },
    /// SVD did not produce the requested factors.
    #[error("svd failed")]
    SvdFailed,
}

/// Proper rotation maximizing `trace(R H)` for `H = Σ src_i * dst_iᵀ`.
///
/// With `H = U S Vᵀ` the rotation is `R = V Uᵀ`. If that is a reflection
/// (`det < 0`), the row of `Vᵀ` belonging to the smallest singular value is
/// negated, so the result always has determinant `+1`.
pub fn kabsch_rotation(h: &Mat3) -> Result<Mat3, SolveError> {
    let svd = h.svd(true, true);
    let u = svd.u.ok_or(SolveError::SvdFailed)?;
    let mut v_t = svd.v_t.ok_or(SolveError::SvdFailed)?;

    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let weakest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(2);
        let flipped = -v_t.row(weakest);
        v_t.set_row(weakest, &flipped);
        r = v_t.transpose() * u.transpose();
    }
    Ok(r)
}

/// Rotation best aligning `src[i]` onto `dst[i]` for paired unit directions.
///
/// Accumulates `H = Σ src_i * dst_iᵀ` and solves with [`kabsch_rotation`].
pub fn rotation_from_directions(src: &[Vec3], dst: &[Vec3]) -> Result<Mat3, SolveError> {
    if src.len() != dst.len() {
        return Err(SolveError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 2 {
        return Err(SolveError::NotEnoughPairs {
            needed: 2,
            got: src.len(),
        });
    }
    let mut h = Mat3::zeros();
    for (a, b) in src.iter().zip(dst.iter()) {
        h += a * b.transpose();
    }
    kabsch_rotation(&h)
}

/// One board correspondence for the point-to-plane translation solve.
#[derive(Debug, Clone, Copy)]
pub struct PlanePair {
    /// Board centroid in the source (camera) frame.
    pub src_centroid: Pt3,
    /// Board centroid in the destination (lidar) frame.
    pub dst_centroid: Pt3,
    /// Unit board normal in the destination (lidar) frame.
    pub dst_normal: Vec3,
}

/// Translation minimizing `Σ (n_iᵀ (R c_src_i + t − c_dst_i))²`.
///
/// Solves `A t = B` with `A = Σ n nᵀ` and `B = Σ n nᵀ (c_dst − R c_src)`.
/// Fails with [`SolveError::IllConditioned`] when `λ_min(A) / λ_max(A)` is
/// below `min_condition`, i.e. when the normals do not constrain all three
/// translation directions.
pub fn translation_point_to_plane(
    rotation: &Mat3,
    pairs: &[PlanePair],
    min_condition: Real,
) -> Result<Vec3, SolveError> {
    if pairs.len() < 3 {
        return Err(SolveError::NotEnoughPairs {
            needed: 3,
            got: pairs.len(),
        });
    }

    let mut a = Mat3::zeros();
    let mut b = Vec3::zeros();
    for p in pairs {
        let nnt = p.dst_normal * p.dst_normal.transpose();
        a += nnt;
        b += nnt * (p.dst_centroid.coords - rotation * p.src_centroid.coords);
    }

    let eig = a.symmetric_eigen();
    let max_ev = eig.eigenvalues.max();
    let min_ev = eig.eigenvalues.min();
    let ratio = if max_ev > 0.0 { min_ev / max_ev } else { 0.0 };
    if ratio.is_nan() || ratio < min_condition {
        return Err(SolveError::IllConditioned { ratio });
    }

    let chol = a
        .cholesky()
        .ok_or(SolveError::IllConditioned { ratio })?;
    Ok(chol.solve(&b))
}

/// Least-squares rigid transform mapping `src[i]` onto `dst[i]`.
///
/// Centroids are removed, the cross-covariance is solved with
/// [`kabsch_rotation`], and the translation follows from the centroids.
pub fn rigid_transform_svd(src: &[Pt3], dst: &[Pt3]) -> Result<Iso3, SolveError> {
    if src.len() != dst.len() {
        return Err(SolveError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    let (Some(c_src), Some(c_dst)) = (centroid(src), centroid(dst)) else {
        return Err(SolveError::NotEnoughPairs { needed: 1, got: 0 });
    };

    let mut h = Mat3::zeros();
    for (a, b) in src.iter().zip(dst.iter()) {
        h += (a - c_src) * (b - c_dst).transpose();
    }
    let r = kabsch_rotation(&h)?;
    let t = c_dst.coords - r * c_src.coords;
    Ok(iso_from_rt(&r, &t))
}

/// [`Estimator`] for a rigid transform from point correspondences
/// `(src, dst)`; the residual is the Euclidean distance after alignment.
#[derive(Debug, Clone, Copy)]
pub struct RigidEstimator;

impl Estimator for RigidEstimator {
    type Datum = (Pt3, Pt3);
    type Model = Iso3;

    const MIN_SAMPLES: usize = 3;

    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
        let src: Vec<Pt3> = sample.iter().map(|&i| data[i].0).collect();
        let dst: Vec<Pt3> = sample.iter().map(|&i| data[i].1).collect();

        // reject (near-)collinear minimal samples
        let e1 = src[1] - src[0];
        let e2 = src[2] - src[0];
        let area = e1.cross(&e2).norm();
        let scale = e1.norm_squared().max(e2.norm_squared());
        if scale <= 0.0 || area <= 1e-9 * scale {
            return None;
        }
        rigid_transform_svd(&src, &dst).ok()
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> Real {
        (model.transform_point(&datum.0) - datum.1).norm()
    }

    fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        if inliers.len() < Self::MIN_SAMPLES {
            return None;
        }
        let src: Vec<Pt3> = inliers.iter().map(|&i| data[i].0).collect();
        let dst: Vec<Pt3> = inliers.iter().map(|&i| data[i].1).collect();
        rigid_transform_svd(&src, &dst).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlidar_core::{ransac, rotation_angle, RansacOptions};
    use nalgebra::Rotation3;

    fn rot(roll: Real, pitch: Real, yaw: Real) -> Mat3 {
        *Rotation3::from_euler_angles(roll, pitch, yaw).matrix()
    }

    #[test]
    fn kabsch_corrects_reflection() {
        // H = diag(3, 2, -1): the naive V Uᵀ is diag(1, 1, -1)
        let h = Mat3::from_diagonal(&Vec3::new(3.0, 2.0, -1.0));
        let r = kabsch_rotation(&h).unwrap();
        assert!((r.determinant() - 1.0).abs() < 1e-12, "det {}", r.determinant());
        assert!((r - Mat3::identity()).norm() < 1e-12, "r = {}", r);
    }

    #[test]
    fn kabsch_on_reflected_point_sets_returns_proper_rotation() {
        let src = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        // mirror through the xy plane
        let dst: Vec<Vec3> = src.iter().map(|v| Vec3::new(v.x, v.y, -v.z)).collect();
        let r = rotation_from_directions(&src, &dst).unwrap();
        assert!((r.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rotation_from_three_normals_is_exact() {
        let r_true = rot(0.3, -0.5, 1.1);
        let src = vec![
            Vec3::new(1.0, 0.2, 0.0).normalize(),
            Vec3::new(0.0, 1.0, 0.3).normalize(),
            Vec3::new(-0.2, 0.1, 1.0).normalize(),
        ];
        let dst: Vec<Vec3> = src.iter().map(|n| r_true * n).collect();
        let r = rotation_from_directions(&src, &dst).unwrap();
        assert!(rotation_angle(&r, &r_true) < 1e-9);
    }

    #[test]
    fn rotation_rejects_mismatched_input() {
        let err = rotation_from_directions(&[Vec3::x()], &[Vec3::x(), Vec3::y()]).unwrap_err();
        assert_eq!(err, SolveError::LengthMismatch { src: 1, dst: 2 });
    }

    #[test]
    fn point_to_plane_translation_recovers_offset() {
        let r = rot(0.1, 0.2, -0.3);
        let t_true = Vec3::new(0.5, -1.0, 2.0);
        let boards = [
            (Pt3::new(1.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0)),
            (Pt3::new(-1.0, 0.5, 4.0), Vec3::new(1.0, 0.0, -1.0).normalize()),
            (Pt3::new(0.0, -1.0, 3.5), Vec3::new(0.0, 1.0, -1.0).normalize()),
        ];
        let pairs: Vec<PlanePair> = boards
            .iter()
            .map(|(c, n)| PlanePair {
                src_centroid: *c,
                dst_centroid: Pt3::from(r * c.coords + t_true),
                dst_normal: r * n,
            })
            .collect();

        let t = translation_point_to_plane(&r, &pairs, 1e-6).unwrap();
        assert!((t - t_true).norm() < 1e-9, "t = {:?}", t);
    }

    #[test]
    fn parallel_normals_are_ill_conditioned() {
        let pairs: Vec<PlanePair> = (0..3)
            .map(|i| PlanePair {
                src_centroid: Pt3::new(i as Real, 0.0, 1.0),
                dst_centroid: Pt3::new(i as Real, 0.0, 1.0),
                dst_normal: Vec3::z(),
            })
            .collect();
        let err = translation_point_to_plane(&Mat3::identity(), &pairs, 1e-6).unwrap_err();
        assert!(matches!(err, SolveError::IllConditioned { .. }));
    }

    #[test]
    fn svd_transform_recovers_pose() {
        let r = rot(-0.2, 0.4, 0.9);
        let t = Vec3::new(1.0, 2.0, -3.0);
        let src: Vec<Pt3> = (0..12)
            .map(|i| {
                let a = i as Real;
                Pt3::new(a.sin(), (0.5 * a).cos(), 0.1 * a)
            })
            .collect();
        let dst: Vec<Pt3> = src.iter().map(|p| Pt3::from(r * p.coords + t)).collect();

        let iso = rigid_transform_svd(&src, &dst).unwrap();
        let r_est = iso.rotation.to_rotation_matrix().into_inner();
        assert!(rotation_angle(&r_est, &r) < 1e-9);
        assert!((iso.translation.vector - t).norm() < 1e-9);
    }

    #[test]
    fn svd_transform_rejects_empty_input() {
        assert!(rigid_transform_svd(&[], &[]).is_err());
    }

    #[test]
    fn rigid_ransac_ignores_outlier_matches() {
        let r = rot(0.05, -0.1, 0.2);
        let t = Vec3::new(0.2, 0.0, -0.1);
        let mut data: Vec<(Pt3, Pt3)> = (0..30)
            .map(|i| {
                let a = i as Real * 0.37;
                let p = Pt3::new(a.cos() * 2.0, a.sin(), 0.05 * i as Real);
                (p, Pt3::from(r * p.coords + t))
            })
            .collect();
        for i in 0..8 {
            let p = Pt3::new(i as Real, -(i as Real), 1.0);
            data.push((p, Pt3::new(10.0 + i as Real, 5.0, -4.0)));
        }

        let opts = RansacOptions {
            threshold: 0.05,
            min_inliers: 10,
            ..RansacOptions::default()
        };
        let res = ransac::<RigidEstimator>(&data, &opts);
        let model = res.model.expect("consensus");
        assert_eq!(res.inliers, (0..30).collect::<Vec<_>>());
        assert!((model.translation.vector - t).norm() < 1e-9);
    }
}
