//! End-to-end registration: descriptors, global search, fine registration.

use camlidar_core::{BoardSet, Iso3, Mat3, Pt3, Real, Sensor, Vec3};
use camlidar_linear::{BoardDescriptor, NormalOrientation};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::refine::{refine_candidates, FineRegistration, RefinedCandidate};
use crate::search::{score_transform, Candidate, GlobalSearch, SearchStats};
use crate::spatial::SpatialIndex;

/// Raw inputs of a registration run, as produced by board extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInput {
    /// One point set per camera-visible board, in the camera frame.
    pub camera_boards: Vec<Vec<Pt3>>,
    /// One point set per lidar-visible board, in the lidar frame.
    pub lidar_boards: Vec<Vec<Pt3>>,
    /// Full lidar cloud; a superset of the lidar board points.
    pub lidar_cloud: Vec<Pt3>,
}

/// Outcome of [`register`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReport {
    /// Best refined `lidar_from_camera` transform.
    pub transform: Iso3,
    /// Sum of squared nearest-neighbour distances at `transform`.
    pub residual: Real,
    pub camera_descriptors: Vec<BoardDescriptor>,
    pub lidar_descriptors: Vec<BoardDescriptor>,
    /// Counters of the global search, absent for fine-only runs.
    pub search: Option<SearchStats>,
    /// Every refined candidate, in pool order.
    pub candidates: Vec<RefinedCandidate>,
    /// Index into `candidates` of the winner.
    pub best_candidate: usize,
}

impl RegistrationReport {
    pub fn rotation(&self) -> Mat3 {
        self.transform.rotation.to_rotation_matrix().into_inner()
    }

    pub fn translation(&self) -> Vec3 {
        self.transform.translation.vector
    }

    /// Pretty-printed JSON for calibration logs.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Descriptors for every board of `boards`, oriented with `orientation`.
pub fn compute_descriptors(
    boards: &BoardSet,
    orientation: &NormalOrientation,
) -> Result<Vec<BoardDescriptor>, RegistrationError> {
    boards
        .boards
        .iter()
        .map(|sample| {
            BoardDescriptor::from_sample(sample, orientation).map_err(|source| {
                RegistrationError::Descriptor {
                    sensor: boards.sensor,
                    board: sample.index,
                    source,
                }
            })
        })
        .collect()
}

fn require_boards(boards: &BoardSet) -> Result<(), RegistrationError> {
    if boards.len() < 3 {
        return Err(RegistrationError::NotEnoughBoards {
            sensor: boards.sensor,
            boards: boards.len(),
        });
    }
    Ok(())
}

fn camera_points(camera: &BoardSet) -> Result<Vec<Pt3>, RegistrationError> {
    let points = camera.all_points();
    if points.is_empty() {
        return Err(RegistrationError::EmptyCameraPoints);
    }
    Ok(points)
}

/// Register the camera frame to the lidar frame.
///
/// `camera` and `lidar` hold at least three boards each, `cloud` is the full
/// lidar scene. The returned transform maps camera points into the lidar
/// frame.
pub fn register(
    camera: &BoardSet,
    lidar: &BoardSet,
    cloud: &[Pt3],
    config: &RegistrationConfig,
) -> Result<RegistrationReport, RegistrationError> {
    config.validate()?;
    require_boards(camera)?;
    require_boards(lidar)?;

    let camera_descriptors = compute_descriptors(camera, &config.descriptor.camera)?;
    let lidar_descriptors = compute_descriptors(lidar, &config.descriptor.lidar)?;
    for d in camera_descriptors.iter().chain(lidar_descriptors.iter()) {
        debug!(
            "{} board {}: centroid {:?}, normal {:?}, rms {:.3e}",
            d.sensor,
            d.index,
            d.centroid.coords.as_slice(),
            d.normal.as_slice(),
            d.plane_rms
        );
    }

    let points = camera_points(camera)?;
    let index = SpatialIndex::new(cloud.to_vec())?;

    let search = GlobalSearch::new(
        &camera_descriptors,
        &lidar_descriptors,
        &points,
        &index,
        config.search.clone(),
    )?;
    let outcome = search.run()?;

    let fine = refine_candidates(&outcome.candidates, &points, &index, &config.refine)?;
    let report = assemble(
        fine,
        camera_descriptors,
        lidar_descriptors,
        Some(outcome.stats),
    );
    info!(
        "registration done: residual {:.6e}, translation {:?}",
        report.residual,
        report.translation().as_slice()
    );
    Ok(report)
}

/// [`register`] on a bundled [`RegistrationInput`].
pub fn register_input(
    input: &RegistrationInput,
    config: &RegistrationConfig,
) -> Result<RegistrationReport, RegistrationError> {
    let camera = BoardSet::new(Sensor::Camera, input.camera_boards.clone());
    let lidar = BoardSet::new(Sensor::Lidar, input.lidar_boards.clone());
    register(&camera, &lidar, &input.lidar_cloud, config)
}

/// Refine externally supplied initial transforms without a global search.
///
/// Useful when a rough extrinsic is already known. Camera descriptors are
/// still reported.
pub fn register_fine_only(
    camera: &BoardSet,
    cloud: &[Pt3],
    initial: &[Iso3],
    config: &RegistrationConfig,
) -> Result<RegistrationReport, RegistrationError> {
    config.validate()?;
    if initial.is_empty() {
        return Err(RegistrationError::NoInitialCandidates);
    }
    let camera_descriptors = compute_descriptors(camera, &config.descriptor.camera)?;
    let points = camera_points(camera)?;
    let index = SpatialIndex::new(cloud.to_vec())?;

    let candidates: Vec<Candidate> = initial
        .iter()
        .map(|t| {
            let score = score_transform(t, &points, &index, config.search.translation_penalty);
            Candidate::from_transform(*t, score)
        })
        .collect();
    let fine = refine_candidates(&candidates, &points, &index, &config.refine)?;
    Ok(assemble(fine, camera_descriptors, Vec::new(), None))
}

fn assemble(
    fine: FineRegistration,
    camera_descriptors: Vec<BoardDescriptor>,
    lidar_descriptors: Vec<BoardDescriptor>,
    search: Option<SearchStats>,
) -> RegistrationReport {
    let (transform, residual) = (fine.best().transform, fine.best().residual);
    RegistrationReport {
        transform,
        residual,
        camera_descriptors,
        lidar_descriptors,
        search,
        best_candidate: fine.best,
        candidates: fine.refined,
    }
}
