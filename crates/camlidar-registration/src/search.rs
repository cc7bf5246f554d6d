//! Randomized global search for coarse camera-to-lidar transforms.
//!
//! Each iteration draws a camera triple and a lidar triple, pairs them
//! position by position, and solves for the transform in closed form:
//!
//! 1. Rotation from the three normal pairs (Kabsch on `Σ n_cam n_lidarᵀ`).
//! 2. Translation from the point-to-plane system `Σ n nᵀ t = Σ n nᵀ (c_lidar − R c_cam)`.
//! 3. Score = `−Σ d_nn(T p_cam) − λ ‖t‖` over every camera point.
//!
//! Up to `tau_comb` candidates within `tau_score` of the best score seen so far
//! are kept in a [`CandidatePool`]. Ill-conditioned triples are skipped and resampled.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use camlidar_core::{iso_from_rt, Iso3, Mat3, Pt3, Real, Sensor, Vec3};
use camlidar_linear::{
    rotation_from_directions, translation_point_to_plane, BoardDescriptor, PlanePair,
};
use log::{debug, info, trace, warn};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SearchOptions;
use crate::error::RegistrationError;
use crate::sampler::{CorrespondenceSampler, TripleIndex};
use crate::spatial::SpatialIndex;

/// Candidate transform with its score and the hypothesis that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Maps camera points into the lidar frame.
    pub transform: Iso3,
    /// Higher is better; never positive with a non-negative penalty.
    pub score: Real,
    /// Camera triple of the hypothesis, `None` for supplied transforms.
    pub camera_triple: Option<TripleIndex>,
    pub lidar_triple: Option<TripleIndex>,
    /// Search iteration that produced the candidate.
    pub iteration: usize,
}

impl Candidate {
    /// Candidate supplied from outside the search.
    pub fn from_transform(transform: Iso3, score: Real) -> Self {
        Self {
            transform,
            score,
            camera_triple: None,
            lidar_triple: None,
            iteration: 0,
        }
    }

    pub fn rotation(&self) -> Mat3 {
        self.transform.rotation.to_rotation_matrix().into_inner()
    }

    pub fn translation(&self) -> Vec3 {
        self.transform.translation.vector
    }
}

/// Alignment score of `transform`: negative summed nearest-neighbour distance
/// of all camera points, minus `translation_penalty * ‖t‖`.
pub fn score_transform(
    transform: &Iso3,
    camera_points: &[Pt3],
    index: &SpatialIndex,
    translation_penalty: Real,
) -> Real {
    let sum: Real = camera_points
        .iter()
        .map(|p| index.nearest(&transform.transform_point(p)).distance)
        .sum();
    -sum - translation_penalty * transform.translation.vector.norm()
}

/// Effect of [`CandidatePool::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolUpdate {
    /// Below the admission threshold, or no better than every entry of a
    /// full pool.
    Rejected,
    /// Admitted without changing the best score.
    Admitted,
    /// Admitted as the new best; `pruned` entries fell out of the band.
    NewBest { pruned: usize },
}

/// At most `capacity` candidates within `tau_score` of the best score seen
/// so far.
///
/// Invariant: after every [`offer`](Self::offer), each entry satisfies
/// `score >= tau_score * best_score` and `len() <= capacity`. A full pool
/// evicts its lowest-scored entry to make room.
#[derive(Debug, Clone)]
pub struct CandidatePool {
    tau_score: Real,
    capacity: usize,
    best_score: Real,
    entries: Vec<Candidate>,
    evicted: usize,
}

impl CandidatePool {
    /// Empty pool holding at most `capacity` entries (at least one).
    pub fn new(tau_score: Real, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tau_score,
            capacity,
            best_score: Real::NEG_INFINITY,
            entries: Vec::with_capacity(capacity),
            evicted: 0,
        }
    }

    /// Current admission threshold, `tau_score * best_score`.
    pub fn threshold(&self) -> Real {
        self.tau_score * self.best_score
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped so far to respect the capacity.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Admit `candidate` if it beats the threshold; on a new best, prune
    /// entries that fell out of the band. Admission, eviction and pruning
    /// happen as one step.
    pub fn offer(&mut self, candidate: Candidate) -> PoolUpdate {
        let score = candidate.score;
        if !score.is_finite() || score <= self.threshold() {
            return PoolUpdate::Rejected;
        }
        if self.entries.len() >= self.capacity {
            let worst = self
                .entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
                .map(|(i, c)| (i, c.score));
            match worst {
                Some((_, worst_score)) if score <= worst_score => {
                    return PoolUpdate::Rejected;
                }
                Some((i, _)) => {
                    self.entries.swap_remove(i);
                    self.evicted += 1;
                }
                None => {}
            }
        }
        self.entries.push(candidate);
        if score <= self.best_score {
            return PoolUpdate::Admitted;
        }
        self.best_score = score;
        let threshold = self.threshold();
        let before = self.entries.len();
        self.entries.retain(|c| c.score >= threshold);
        PoolUpdate::NewBest {
            pruned: before - self.entries.len(),
        }
    }

    /// Best score seen so far, `-inf` before the first admission.
    pub fn best_score(&self) -> Real {
        self.best_score
    }

    pub fn best(&self) -> Option<&Candidate> {
        self.entries.iter().max_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn entries(&self) -> &[Candidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-validate the band, sort best first and keep at most `target` entries.
    pub fn finalize(mut self, target: usize) -> Vec<Candidate> {
        let threshold = self.threshold();
        self.entries.retain(|c| c.score >= threshold);
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.entries.truncate(target);
        self.entries
    }
}

/// Why the search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTermination {
    /// Pool reached `tau_comb` after the minimum iteration count.
    TargetReached,
    /// `max_iterations` exhausted.
    IterationBudget,
    /// Every distinct hypothesis has been evaluated.
    HypothesesExhausted,
    /// Wall-clock limit hit.
    TimeBudget,
}

impl fmt::Display for SearchTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchTermination::TargetReached => "target pool size reached",
            SearchTermination::IterationBudget => "iteration budget exhausted",
            SearchTermination::HypothesesExhausted => "all hypotheses evaluated",
            SearchTermination::TimeBudget => "time budget exhausted",
        };
        f.write_str(s)
    }
}

/// Counters from one search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    /// Hypotheses that produced a scored candidate.
    pub evaluated: usize,
    /// Hypotheses dropped because the closed-form solve was ill-conditioned.
    pub ill_conditioned: usize,
    /// Hypotheses skipped as already evaluated.
    pub repeated: usize,
    /// Pool size when the loop stopped, before finalization.
    pub pool_size: usize,
    pub best_score: Real,
    pub termination: SearchTermination,
    pub elapsed_ms: u64,
}

/// Finalized pool, best first, plus run counters.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    pub stats: SearchStats,
}

/// Global search over board-triple hypotheses.
#[derive(Debug)]
pub struct GlobalSearch<'a> {
    camera: &'a [BoardDescriptor],
    lidar: &'a [BoardDescriptor],
    camera_points: &'a [Pt3],
    index: &'a SpatialIndex,
    sampler: CorrespondenceSampler,
    opts: SearchOptions,
}

impl<'a> GlobalSearch<'a> {
    /// Prepare a search. `camera_points` are all camera board points used
    /// for scoring; `index` wraps the full lidar cloud.
    pub fn new(
        camera: &'a [BoardDescriptor],
        lidar: &'a [BoardDescriptor],
        camera_points: &'a [Pt3],
        index: &'a SpatialIndex,
        opts: SearchOptions,
    ) -> Result<Self, RegistrationError> {
        opts.validate()?;
        if camera_points.is_empty() {
            return Err(RegistrationError::EmptyCameraPoints);
        }
        let sampler = CorrespondenceSampler::new(camera, lidar)?;
        debug!(
            "global search: {} camera triples, {} lidar triples, {} camera points, {} cloud points",
            sampler.camera_table().len(),
            sampler.lidar_triples().len(),
            camera_points.len(),
            index.len()
        );
        Ok(Self {
            camera,
            lidar,
            camera_points,
            index,
            sampler,
            opts,
        })
    }

    fn check_triple(
        sensor: Sensor,
        triple: TripleIndex,
        boards: usize,
    ) -> Result<(), RegistrationError> {
        if triple.max_index() >= boards {
            return Err(RegistrationError::InvalidTriple {
                sensor,
                triple: triple.indices(),
                boards,
            });
        }
        Ok(())
    }

    /// Closed-form transform for pairing `camera[i]` with `lidar[i]`.
    fn solve(&self, camera: TripleIndex, lidar: TripleIndex) -> Result<Iso3, RegistrationError> {
        let cam = camera.indices().map(|i| &self.camera[i]);
        let lid = lidar.indices().map(|i| &self.lidar[i]);

        let cam_normals = cam.map(|d| d.normal_vec());
        let lid_normals = lid.map(|d| d.normal_vec());
        let rotation = rotation_from_directions(&cam_normals, &lid_normals)?;

        let pairs = [0, 1, 2].map(|i| PlanePair {
            src_centroid: cam[i].centroid,
            dst_centroid: lid[i].centroid,
            dst_normal: lid_normals[i],
        });
        let translation =
            translation_point_to_plane(&rotation, &pairs, self.opts.condition_threshold)?;
        Ok(iso_from_rt(&rotation, &translation))
    }

    /// Solve and score a single hypothesis.
    ///
    /// Unlike [`run`](Self::run), numeric failures are returned to the caller.
    pub fn evaluate_hypothesis(
        &self,
        camera: TripleIndex,
        lidar: TripleIndex,
    ) -> Result<Candidate, RegistrationError> {
        Self::check_triple(Sensor::Camera, camera, self.camera.len())?;
        Self::check_triple(Sensor::Lidar, lidar, self.lidar.len())?;
        let transform = self.solve(camera, lidar)?;
        let score = score_transform(
            &transform,
            self.camera_points,
            self.index,
            self.opts.translation_penalty,
        );
        Ok(Candidate {
            transform,
            score,
            camera_triple: Some(camera),
            lidar_triple: Some(lidar),
            iteration: 0,
        })
    }

    /// Run the sampling loop until a termination criterion holds and return
    /// the finalized pool.
    ///
    /// Fails only when no hypothesis produced a usable candidate.
    pub fn run(&self) -> Result<SearchOutcome, RegistrationError> {
        let opts = &self.opts;
        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut pool = CandidatePool::new(opts.tau_score, opts.tau_comb);
        let mut tried: HashSet<(TripleIndex, TripleIndex)> = HashSet::new();
        let distinct = self.sampler.num_distinct_hypotheses();
        let time_budget = opts.time_budget_ms.map(Duration::from_millis);
        let start = Instant::now();

        let mut iterations = 0usize;
        let mut evaluated = 0usize;
        let mut ill_conditioned = 0usize;
        let mut repeated = 0usize;

        let termination = loop {
            if iterations >= opts.max_iterations {
                break SearchTermination::IterationBudget;
            }
            if time_budget.is_some_and(|b| start.elapsed() >= b) {
                break SearchTermination::TimeBudget;
            }
            iterations += 1;

            let camera = self.sampler.draw_camera(&mut rng);
            let lidar = self.sampler.draw_lidar(&mut rng);
            if opts.skip_repeated_hypotheses
                && !tried.insert(TripleIndex::canonical_pair(camera, lidar))
            {
                repeated += 1;
                continue;
            }

            match self.solve(camera, lidar) {
                Ok(transform) => {
                    evaluated += 1;
                    let score = score_transform(
                        &transform,
                        self.camera_points,
                        self.index,
                        opts.translation_penalty,
                    );
                    let candidate = Candidate {
                        transform,
                        score,
                        camera_triple: Some(camera),
                        lidar_triple: Some(lidar),
                        iteration: iterations,
                    };
                    if let PoolUpdate::NewBest { pruned } = pool.offer(candidate) {
                        debug!(
                            "iter {}: new best score {:.6} ({:?} -> {:?}), pool {} (pruned {})",
                            iterations,
                            score,
                            camera.indices(),
                            lidar.indices(),
                            pool.len(),
                            pruned
                        );
                    }
                }
                Err(err) => {
                    ill_conditioned += 1;
                    trace!(
                        "iter {}: skipping {:?} -> {:?}: {}",
                        iterations,
                        camera.indices(),
                        lidar.indices(),
                        err
                    );
                }
            }

            if pool.len() >= opts.tau_comb && iterations >= opts.min_iterations {
                break SearchTermination::TargetReached;
            }
            if opts.skip_repeated_hypotheses && tried.len() >= distinct {
                break SearchTermination::HypothesesExhausted;
            }
        };

        let pool_size = pool.len();
        let best_score = pool.best_score();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            "global search stopped after {} iterations ({}): pool {}, best score {:.6}, {} ill-conditioned, {} repeated, {} evicted",
            iterations,
            termination,
            pool_size,
            best_score,
            ill_conditioned,
            repeated,
            pool.evicted()
        );

        if pool.is_empty() {
            return Err(RegistrationError::NoViableCandidate { iterations });
        }
        if pool_size < opts.tau_comb {
            warn!(
                "candidate pool holds {} of {} requested transforms",
                pool_size, opts.tau_comb
            );
        }

        Ok(SearchOutcome {
            candidates: pool.finalize(opts.tau_comb),
            stats: SearchStats {
                iterations,
                evaluated,
                ill_conditioned,
                repeated,
                pool_size,
                best_score,
                termination,
                elapsed_ms,
            },
        })
    }
}
