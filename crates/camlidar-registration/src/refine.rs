//! ICP fine registration of coarse candidates.
//!
//! Every round matches each transformed camera point to its nearest lidar
//! point, fits a rigid update to the selected matches with the SVD solver and
//! composes it onto the running transform. The transform with the lowest
//! observed squared residual is reported, so a round that makes things worse
//! never degrades the result.

use camlidar_core::{ransac, transform_points, Iso3, Pt3, RansacOptions, Real};
use camlidar_linear::{rigid_transform_svd, RigidEstimator};
use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::RefineOptions;
use crate::error::RegistrationError;
use crate::search::Candidate;
use crate::spatial::{Neighbor, SpatialIndex};

/// Which nearest-neighbour matches feed the rigid fit of a round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrespondenceFilter {
    /// Every match.
    #[default]
    All,
    /// Matches no farther apart than `max_distance`.
    MaxDistance { max_distance: Real },
    /// Consensus set of a RANSAC rigid fit with inlier `threshold`.
    Ransac {
        threshold: Real,
        max_iters: usize,
        min_inliers: usize,
        seed: u64,
    },
}

impl CorrespondenceFilter {
    /// Robust variant with the usual settings.
    pub fn ransac() -> Self {
        CorrespondenceFilter::Ransac {
            threshold: 0.5,
            max_iters: 200,
            min_inliers: 3,
            seed: 0,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), RegistrationError> {
        let ok = match self {
            CorrespondenceFilter::All => true,
            CorrespondenceFilter::MaxDistance { max_distance } => {
                max_distance.is_finite() && *max_distance > 0.0
            }
            CorrespondenceFilter::Ransac {
                threshold,
                max_iters,
                ..
            } => threshold.is_finite() && *threshold > 0.0 && *max_iters > 0,
        };
        if ok {
            Ok(())
        } else {
            Err(RegistrationError::InvalidConfig(format!(
                "invalid correspondence filter {:?}",
                self
            )))
        }
    }

    /// Indices of the matches `(src[i], dst[i])` to fit, ascending.
    ///
    /// `distances[i]` is `‖src[i] − dst[i]‖`.
    pub fn select(&self, src: &[Pt3], dst: &[Pt3], distances: &[Real]) -> Vec<usize> {
        match self {
            CorrespondenceFilter::All => (0..src.len()).collect(),
            CorrespondenceFilter::MaxDistance { max_distance } => distances
                .iter()
                .enumerate()
                .filter(|(_, d)| **d <= *max_distance)
                .map(|(i, _)| i)
                .collect(),
            CorrespondenceFilter::Ransac {
                threshold,
                max_iters,
                min_inliers,
                seed,
            } => {
                let data: Vec<(Pt3, Pt3)> =
                    src.iter().copied().zip(dst.iter().copied()).collect();
                let opts = RansacOptions {
                    max_iters: *max_iters,
                    threshold: *threshold,
                    min_inliers: *min_inliers,
                    seed: *seed,
                    ..RansacOptions::default()
                };
                let res = ransac::<RigidEstimator>(&data, &opts);
                if res.is_success() {
                    res.inliers
                } else {
                    trace!("no rigid consensus among {} matches", data.len());
                    Vec::new()
                }
            }
        }
    }
}

/// Result of refining one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedCandidate {
    /// Starting transform.
    pub initial: Iso3,
    /// Lowest-residual transform visited.
    pub transform: Iso3,
    /// Sum of squared nearest-neighbour distances at `transform`.
    pub residual: Real,
    /// Residual of every transform visited, starting with `initial`.
    pub history: Vec<Real>,
    /// Rigid updates applied.
    pub iterations: usize,
    /// Stopped because an update fell below the tolerance.
    pub converged: bool,
    /// Matches used by the last update.
    pub inliers: usize,
    /// Coarse candidate this refinement started from, if any.
    pub source: Option<Candidate>,
}

impl RefinedCandidate {
    /// Residual of the starting transform.
    pub fn initial_residual(&self) -> Real {
        self.history.first().copied().unwrap_or(self.residual)
    }
}

fn squared_residual(neighbors: &[Neighbor]) -> Real {
    neighbors.iter().map(|n| n.distance * n.distance).sum()
}

/// Rotation angle plus translation norm of an update.
fn step_size(delta: &Iso3) -> Real {
    delta.rotation.angle() + delta.translation.vector.norm()
}

/// ICP from `initial`, aligning `camera_points` to the indexed cloud.
pub fn refine_candidate(
    initial: &Iso3,
    camera_points: &[Pt3],
    index: &SpatialIndex,
    opts: &RefineOptions,
) -> Result<RefinedCandidate, RegistrationError> {
    if camera_points.is_empty() {
        return Err(RegistrationError::EmptyCameraPoints);
    }

    let mut current = *initial;
    let mut moved = transform_points(&current, camera_points);
    let mut best = (Real::INFINITY, current);
    let mut history = Vec::with_capacity(opts.num_iter + 1);
    let mut iterations = 0;
    let mut converged = false;
    let mut inliers = 0;

    loop {
        let neighbors = index.nearest_batch(&moved);
        let residual = squared_residual(&neighbors);
        history.push(residual);
        if residual < best.0 {
            best = (residual, current);
        }
        trace!(
            "icp round {}: residual {:.6e}, {} matches in last fit",
            iterations,
            residual,
            inliers
        );

        if converged || iterations >= opts.num_iter {
            break;
        }

        let matched: Vec<Pt3> = neighbors.iter().map(|n| *index.point(n.index)).collect();
        let distances: Vec<Real> = neighbors.iter().map(|n| n.distance).collect();
        let selected = opts.filter.select(&moved, &matched, &distances);
        if selected.len() < 3 {
            debug!(
                "icp stopped at round {}: only {} usable matches",
                iterations,
                selected.len()
            );
            break;
        }
        let src: Vec<Pt3> = selected.iter().map(|&i| moved[i]).collect();
        let dst: Vec<Pt3> = selected.iter().map(|&i| matched[i]).collect();
        let delta = match rigid_transform_svd(&src, &dst) {
            Ok(delta) => delta,
            Err(err) => {
                debug!("icp stopped at round {}: {}", iterations, err);
                break;
            }
        };

        for p in &mut moved {
            *p = delta.transform_point(p);
        }
        current = delta * current;
        iterations += 1;
        inliers = selected.len();
        converged = step_size(&delta) <= opts.tolerance;
    }

    Ok(RefinedCandidate {
        initial: *initial,
        transform: best.1,
        residual: best.0,
        history,
        iterations,
        converged,
        inliers,
        source: None,
    })
}

/// All refined candidates plus the position of the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineRegistration {
    pub refined: Vec<RefinedCandidate>,
    /// Index into `refined` of the lowest residual.
    pub best: usize,
}

impl FineRegistration {
    pub fn best(&self) -> &RefinedCandidate {
        &self.refined[self.best]
    }
}

/// Refine every candidate, in parallel when `opts.parallel` is set, and pick
/// the lowest residual. Ties go to the earlier (higher-scored) candidate.
pub fn refine_candidates(
    candidates: &[Candidate],
    camera_points: &[Pt3],
    index: &SpatialIndex,
    opts: &RefineOptions,
) -> Result<FineRegistration, RegistrationError> {
    if candidates.is_empty() {
        return Err(RegistrationError::NoInitialCandidates);
    }
    opts.validate()?;

    let run = |c: &Candidate| {
        refine_candidate(&c.transform, camera_points, index, opts).map(|mut r| {
            r.source = Some(c.clone());
            r
        })
    };
    let refined: Vec<RefinedCandidate> = if opts.parallel {
        candidates.par_iter().map(run).collect::<Result<Vec<_>, _>>()?
    } else {
        candidates.iter().map(run).collect::<Result<Vec<_>, _>>()?
    };

    for (i, r) in refined.iter().enumerate() {
        debug!(
            "candidate {}: residual {:.6e} -> {:.6e} after {} rounds",
            i,
            r.initial_residual(),
            r.residual,
            r.iterations
        );
    }

    let best = refined
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.residual.total_cmp(&b.1.residual))
        .map(|(i, _)| i)
        .ok_or(RegistrationError::NoInitialCandidates)?;
    info!(
        "fine registration picked candidate {} of {} with residual {:.6e}",
        best,
        refined.len(),
        refined[best].residual
    );
    Ok(FineRegistration { refined, best })
}
