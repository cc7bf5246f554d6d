//! Camera-to-lidar extrinsic registration from planar boards.
//!
//! The engine takes board point sets observed by each sensor plus the full
//! lidar cloud and estimates the rigid transform `T` with
//! `p_lidar = T * p_camera`:
//!
//! 1. [`compute_descriptors`]: centroid and oriented normal per board.
//! 2. [`GlobalSearch`]: randomized hypothesize-and-score over board triples,
//!    keeping a [`CandidatePool`] of near-best transforms.
//! 3. [`refine_candidates`]: ICP on every pooled transform; the lowest
//!    residual wins.
//!
//! [`register`] runs all three steps with a [`RegistrationConfig`].

mod config;
mod error;
mod pipeline;
mod refine;
mod sampler;
mod search;
mod spatial;

pub use config::{DescriptorOptions, RefineOptions, RegistrationConfig, SearchOptions};
pub use error::RegistrationError;
pub use pipeline::{
    compute_descriptors, register, register_fine_only, register_input, RegistrationInput,
    RegistrationReport,
};
pub use refine::{
    refine_candidate, refine_candidates, CorrespondenceFilter, FineRegistration,
    RefinedCandidate,
};
pub use sampler::{
    triple_weight, CorrespondenceSampler, DiscreteDistribution, ProbabilityTable, TripleIndex,
};
pub use search::{
    score_transform, Candidate, CandidatePool, GlobalSearch, PoolUpdate, SearchOutcome,
    SearchStats, SearchTermination,
};
pub use spatial::{Neighbor, SpatialIndex};
