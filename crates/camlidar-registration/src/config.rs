//! Serializable configuration for a registration run.
//!
//! Every section implements `Default` with the values used in practice, and
//! missing fields fall back to those defaults when deserializing, so a JSON
//! file only needs to name what it changes.

use camlidar_core::Real;
use camlidar_linear::NormalOrientation;
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::refine::CorrespondenceFilter;

/// Normal sign conventions per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorOptions {
    pub camera: NormalOrientation,
    pub lidar: NormalOrientation,
}

impl Default for DescriptorOptions {
    fn default() -> Self {
        Self {
            camera: NormalOrientation::camera(),
            lidar: NormalOrientation::lidar(),
        }
    }
}

/// Parameters of the randomized global search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Pool admission factor. A candidate enters the pool when its score
    /// exceeds `tau_score * best_score`. Scores are non-positive, so values
    /// above 1 admit candidates somewhat worse than the best.
    pub tau_score: Real,
    /// Pool size at which the search may stop.
    pub tau_comb: usize,
    /// Weight of the translation magnitude in the score.
    pub translation_penalty: Real,
    /// Iterations required before the pool size can end the search.
    pub min_iterations: usize,
    /// Hard iteration cap.
    pub max_iterations: usize,
    pub seed: u64,
    /// Evaluate each distinct (camera triple, lidar triple) matching at most
    /// once. Reordering both triples by the same permutation counts as the
    /// same matching.
    pub skip_repeated_hypotheses: bool,
    /// Smallest accepted `λ_min / λ_max` of the translation system.
    pub condition_threshold: Real,
    /// Optional wall-clock limit in milliseconds.
    pub time_budget_ms: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            tau_score: 1.5,
            tau_comb: 25,
            translation_penalty: 0.5,
            min_iterations: 100_000,
            max_iterations: 500_000,
            seed: 0,
            skip_repeated_hypotheses: false,
            condition_threshold: 1e-6,
            time_budget_ms: None,
        }
    }
}

/// Parameters of ICP fine registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineOptions {
    /// Maximum refinement rounds per candidate.
    pub num_iter: usize,
    /// Which nearest-neighbour matches feed each rigid fit.
    pub filter: CorrespondenceFilter,
    /// Stop early once an update moves less than this (radians plus scene
    /// units). `0` always runs `num_iter` rounds.
    pub tolerance: Real,
    /// Refine candidates on the rayon thread pool.
    pub parallel: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            num_iter: 40,
            filter: CorrespondenceFilter::default(),
            tolerance: 1e-10,
            parallel: true,
        }
    }
}

/// Complete configuration for [`crate::register`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub descriptor: DescriptorOptions,
    pub search: SearchOptions,
    pub refine: RefineOptions,
}

fn invalid(msg: impl Into<String>) -> RegistrationError {
    RegistrationError::InvalidConfig(msg.into())
}

impl SearchOptions {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !(self.tau_score.is_finite() && self.tau_score >= 1.0) {
            return Err(invalid(format!(
                "tau_score must be finite and >= 1, got {}",
                self.tau_score
            )));
        }
        if self.tau_comb == 0 {
            return Err(invalid("tau_comb must be positive"));
        }
        if !(self.translation_penalty.is_finite() && self.translation_penalty >= 0.0) {
            return Err(invalid(format!(
                "translation_penalty must be finite and non-negative, got {}",
                self.translation_penalty
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be positive"));
        }
        if self.min_iterations > self.max_iterations {
            return Err(invalid(format!(
                "min_iterations ({}) exceeds max_iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        if !(self.condition_threshold.is_finite() && self.condition_threshold >= 0.0) {
            return Err(invalid("condition_threshold must be finite and non-negative"));
        }
        Ok(())
    }
}

impl RefineOptions {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(invalid("refine tolerance must be finite and non-negative"));
        }
        self.filter.validate()
    }
}

impl RegistrationConfig {
    /// Check every section for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        self.search.validate()?;
        self.refine.validate()
    }
}
