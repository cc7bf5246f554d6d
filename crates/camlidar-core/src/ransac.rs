//! Generic, model-agnostic RANSAC.
//!
//! Implement [`Estimator`] for a model and call [`ransac`] with the data and
//! [`RansacOptions`]. The loop is seeded explicitly, so a given input always
//! produces the same consensus set.
//!
//! Failure is not an error: when no model gathers enough inliers the returned
//! [`RansacOutcome`] has `model == None`.

use log::trace;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::Real;

/// Configuration parameters for the generic RANSAC engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RansacOptions {
    /// Maximum number of hypotheses.
    pub max_iters: usize,
    /// Inlier residual threshold, in the units of [`Estimator::residual`].
    pub threshold: Real,
    /// Minimum number of inliers for a model to be accepted.
    pub min_inliers: usize,
    /// Desired probability in `[0, 1]` of drawing one all-inlier sample;
    /// shrinks the iteration budget adaptively. `0` disables it.
    pub confidence: Real,
    /// RNG seed.
    pub seed: u64,
    /// Refit the model on its consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 500,
            threshold: 0.5,
            min_inliers: 3,
            confidence: 0.99,
            seed: 1_234_567,
            refit_on_inliers: true,
        }
    }
}

/// Result of a RANSAC run.
#[derive(Debug, Clone)]
pub struct RansacOutcome<M> {
    /// Best model found, if any reached `min_inliers`.
    pub model: Option<M>,
    /// Indices of the inliers of `model`, ascending.
    pub inliers: Vec<usize>,
    /// RMS residual over `inliers`.
    pub inlier_rms: Real,
    /// Hypotheses drawn.
    pub iters: usize,
}

impl<M> Default for RansacOutcome<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: Real::INFINITY,
            iters: 0,
        }
    }
}

impl<M> RansacOutcome<M> {
    pub fn is_success(&self) -> bool {
        self.model.is_some()
    }
}

/// A model that can be fit from minimal samples and scored per datum.
pub trait Estimator {
    type Datum;
    type Model;

    /// Minimal number of data needed to fit a model.
    const MIN_SAMPLES: usize;

    /// Fit a model from the data at `sample`.
    ///
    /// Return `None` for degenerate samples.
    fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum under `model`.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> Real;

    /// Fit a model from a full consensus set. Defaults to no refit.
    fn refit(_data: &[Self::Datum], _inliers: &[usize]) -> Option<Self::Model> {
        None
    }
}

fn collect_inliers<E: Estimator>(
    model: &E::Model,
    data: &[E::Datum],
    threshold: Real,
    inliers: &mut Vec<usize>,
) -> Real {
    inliers.clear();
    let mut sum_sq = 0.0;
    for (i, datum) in data.iter().enumerate() {
        let r = E::residual(model, datum);
        if r <= threshold {
            inliers.push(i);
            sum_sq += r * r;
        }
    }
    if inliers.is_empty() {
        Real::INFINITY
    } else {
        (sum_sq / inliers.len() as Real).sqrt()
    }
}

/// Iteration bound needed to hit `confidence` at the observed inlier ratio.
fn adaptive_iterations(
    confidence: Real,
    inlier_ratio: Real,
    min_samples: usize,
    iters_so_far: usize,
    max_iters: usize,
) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max_iters;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max_iters;
    }
    let needed = ((1.0 - confidence.min(1.0 - 1e-12)).ln() / denom).ceil() as usize;
    needed.clamp(iters_so_far, max_iters)
}

/// Run RANSAC for estimator `E` over `data`.
///
/// More inliers wins; ties are broken by lower inlier RMS.
pub fn ransac<E: Estimator>(data: &[E::Datum], opts: &RansacOptions) -> RansacOutcome<E::Model> {
    let mut best = RansacOutcome::default();
    if data.len() < E::MIN_SAMPLES {
        return best;
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut budget = opts.max_iters;
    let mut inliers = Vec::with_capacity(data.len());
    let mut iters = 0;

    while iters < budget {
        iters += 1;
        let sample = index::sample(&mut rng, data.len(), E::MIN_SAMPLES).into_vec();

        let Some(mut model) = E::fit(data, &sample) else {
            continue;
        };
        let mut rms = collect_inliers::<E>(&model, data, opts.threshold, &mut inliers);
        if inliers.len() < opts.min_inliers {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refit) = E::refit(data, &inliers) {
                let mut refit_inliers = Vec::with_capacity(data.len());
                let refit_rms =
                    collect_inliers::<E>(&refit, data, opts.threshold, &mut refit_inliers);
                if refit_inliers.len() >= opts.min_inliers {
                    model = refit;
                    rms = refit_rms;
                    inliers = refit_inliers;
                }
            }
        }

        let better = best.model.is_none()
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && rms < best.inlier_rms);
        if better {
            trace!(
                "ransac iter {}: {} inliers, rms {:.6}",
                iters,
                inliers.len(),
                rms
            );
            best.model = Some(model);
            best.inliers = inliers.clone();
            best.inlier_rms = rms;
            budget = adaptive_iterations(
                opts.confidence,
                inliers.len() as Real / data.len() as Real,
                E::MIN_SAMPLES,
                iters,
                opts.max_iters,
            );
        }
    }

    best.iters = iters;
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1D offset model: datum `(x, y)` fits if `y = x + c`.
    struct OffsetEstimator;

    impl Estimator for OffsetEstimator {
        type Datum = (Real, Real);
        type Model = Real;

        const MIN_SAMPLES: usize = 1;

        fn fit(data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model> {
            let (x, y) = data[sample[0]];
            Some(y - x)
        }

        fn residual(model: &Self::Model, datum: &Self::Datum) -> Real {
            (datum.1 - datum.0 - model).abs()
        }

        fn refit(data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
            if inliers.is_empty() {
                return None;
            }
            let sum: Real = inliers.iter().map(|&i| data[i].1 - data[i].0).sum();
            Some(sum / inliers.len() as Real)
        }
    }

    #[test]
    fn finds_offset_despite_outliers() {
        let mut data: Vec<(Real, Real)> = (0..40).map(|i| (i as Real, i as Real + 2.0)).collect();
        data.extend((0..10).map(|i| (i as Real, 50.0 - 3.0 * i as Real)));

        let opts = RansacOptions {
            threshold: 0.1,
            min_inliers: 20,
            ..RansacOptions::default()
        };
        let res = ransac::<OffsetEstimator>(&data, &opts);
        assert!(res.is_success());
        let offset = res.model.unwrap();
        assert!((offset - 2.0).abs() < 1e-12, "offset {}", offset);
        assert_eq!(res.inliers, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn reports_failure_without_consensus() {
        let data = vec![(0.0, 1.0), (1.0, 5.0), (2.0, -3.0)];
        let opts = RansacOptions {
            threshold: 0.01,
            min_inliers: 2,
            ..RansacOptions::default()
        };
        let res = ransac::<OffsetEstimator>(&data, &opts);
        assert!(!res.is_success());
        assert!(res.inliers.is_empty());
        assert_eq!(res.iters, opts.max_iters);
    }

    #[test]
    fn too_little_data_returns_default() {
        let res = ransac::<OffsetEstimator>(&[], &RansacOptions::default());
        assert!(res.model.is_none());
        assert_eq!(res.iters, 0);
    }

    #[test]
    fn adaptive_bound_respects_limits() {
        assert_eq!(adaptive_iterations(0.99, 1.0, 3, 5, 100), 5);
        assert_eq!(adaptive_iterations(0.0, 0.5, 3, 5, 100), 100);
        let n = adaptive_iterations(0.99, 0.5, 3, 1, 1000);
        assert!(n > 1 && n < 1000, "n = {}", n);
    }
}
