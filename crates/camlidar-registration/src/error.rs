use camlidar_core::Sensor;
use camlidar_linear::{DescriptorError, SolveError};
use thiserror::Error;

/// Errors returned by the registration engine.
///
/// Numeric trouble inside the search (ill-conditioned triples, failed SVDs)
/// is handled locally by resampling and never surfaces here; only a run that
/// cannot produce any candidate is a hard failure.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Fewer than three boards: no triple can be formed.
    #[error("{sensor} needs at least 3 boards, got {boards}")]
    NotEnoughBoards { sensor: Sensor, boards: usize },
    /// The full lidar cloud has no points.
    #[error("lidar cloud is empty")]
    EmptyCloud,
    /// The camera boards hold no points to align.
    #[error("camera boards contain no points")]
    EmptyCameraPoints,
    /// A board sample has no well-defined plane.
    #[error("{sensor} board {board}: {source}")]
    Descriptor {
        sensor: Sensor,
        board: usize,
        #[source]
        source: DescriptorError,
    },
    /// A triple refers to a board that does not exist.
    #[error("{sensor} triple {triple:?} is out of range for {boards} boards")]
    InvalidTriple {
        sensor: Sensor,
        triple: [usize; 3],
        boards: usize,
    },
    /// A closed-form solve failed for an explicitly requested hypothesis.
    #[error(transparent)]
    Solve(#[from] SolveError),
    /// The search ended without a single usable candidate.
    #[error("no viable candidate transform after {iterations} iterations")]
    NoViableCandidate { iterations: usize },
    /// Fine registration was asked to refine nothing.
    #[error("no initial transforms to refine")]
    NoInitialCandidates,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
