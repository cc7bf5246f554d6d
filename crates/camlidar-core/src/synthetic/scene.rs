//! Synthetic camera/lidar calibration scenes.
//!
//! Boards are laid out in the lidar frame as regular point grids. The camera
//! sees the same boards through a known `lidar_from_camera` transform, so a
//! registration run on the scene has an exact answer to compare against.

use crate::synthetic::noise::{unit_from_key, UniformPointNoise};
use crate::{BoardSet, Iso3, Pt3, Real, Sensor, Vec3};
use anyhow::Result;
use nalgebra::{Rotation3, Translation3, UnitQuaternion};

/// Geometry of one rectangular synthetic board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardSpec {
    /// Board center.
    pub center: Pt3,
    /// Board normal (need not be unit length).
    pub normal: Vec3,
    /// Extent along the first in-plane axis.
    pub width: Real,
    /// Extent along the second in-plane axis.
    pub height: Real,
    /// Grid spacing.
    pub spacing: Real,
}

/// In-plane axes `(u, v)` for a plane with normal `n`, deterministic in `n`.
fn plane_axes(n: &Vec3) -> (Vec3, Vec3) {
    let helper = if n.z.abs() < 0.9 { Vec3::z() } else { Vec3::x() };
    let u = helper.cross(n).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Number of grid samples covering `extent`, tolerant to round-off in the ratio.
fn grid_count(extent: Real, spacing: Real) -> usize {
    (extent / spacing + 1e-9).floor() as usize + 1
}

/// Regular grid of points covering the board, centered on `board.center`.
///
/// Points are ordered row-major (v outer, u inner).
pub fn board_grid(board: &BoardSpec) -> Vec<Pt3> {
    let n = board.normal.normalize();
    let (u, v) = plane_axes(&n);
    let nu = grid_count(board.width, board.spacing);
    let nv = grid_count(board.height, board.spacing);
    let u0 = -0.5 * (nu - 1) as Real * board.spacing;
    let v0 = -0.5 * (nv - 1) as Real * board.spacing;

    let mut points = Vec::with_capacity(nu * nv);
    for j in 0..nv {
        for i in 0..nu {
            let a = u0 + i as Real * board.spacing;
            let b = v0 + j as Real * board.spacing;
            points.push(board.center + u * a + v * b);
        }
    }
    points
}

/// Horizontal ground patch at height `z` with pseudo-random clutter points above it.
///
/// The patch spans `x_range × y_range`; `clutter` extra points are scattered up
/// to `clutter_height` above the ground, deterministically from `seed`.
pub fn ground_with_clutter(
    z: Real,
    x_range: (Real, Real),
    y_range: (Real, Real),
    spacing: Real,
    clutter: usize,
    clutter_height: Real,
    seed: u64,
) -> Vec<Pt3> {
    let nx = grid_count(x_range.1 - x_range.0, spacing);
    let ny = grid_count(y_range.1 - y_range.0, spacing);
    let mut points = Vec::with_capacity(nx * ny + clutter);
    for j in 0..ny {
        for i in 0..nx {
            points.push(Pt3::new(
                x_range.0 + i as Real * spacing,
                y_range.0 + j as Real * spacing,
                z,
            ));
        }
    }
    for k in 0..clutter {
        let x = x_range.0 + unit_from_key(seed, k, 0) * (x_range.1 - x_range.0);
        let y = y_range.0 + unit_from_key(seed, k, 1) * (y_range.1 - y_range.0);
        let h = z + unit_from_key(seed, k, 2) * clutter_height;
        points.push(Pt3::new(x, y, h));
    }
    points
}

/// Camera-to-lidar axis permutation used by the standard layouts:
/// lidar `x = -camera z`, lidar `y = camera x`, lidar `z = -camera y`.
pub fn camera_axes_in_lidar() -> Rotation3<Real> {
    Rotation3::from_matrix_unchecked(nalgebra::Matrix3::new(
        0.0, 0.0, -1.0, //
        1.0, 0.0, 0.0, //
        0.0, -1.0, 0.0,
    ))
}

/// Ground-truth transform built from the standard axis permutation followed
/// by a small extra rotation (`roll`, `pitch`, `yaw`) and a translation.
pub fn lidar_from_camera(roll: Real, pitch: Real, yaw: Real, translation: Vec3) -> Iso3 {
    let extra = Rotation3::from_euler_angles(roll, pitch, yaw);
    let rot = extra * camera_axes_in_lidar();
    Iso3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::from_rotation_matrix(&rot),
    )
}

/// Four well-separated boards in the lidar frame, facing roughly along +x.
///
/// Compatible with the default normal orientation conventions (camera
/// normals toward negative depth, lidar normals toward positive x) when the
/// camera is placed with [`lidar_from_camera`].
pub fn four_board_layout() -> Vec<BoardSpec> {
    vec![
        BoardSpec {
            center: Pt3::new(-3.0, 1.0, 0.2),
            normal: Vec3::new(1.0, -0.35, 0.1),
            width: 0.8,
            height: 0.6,
            spacing: 0.1,
        },
        BoardSpec {
            center: Pt3::new(-4.0, -1.2, 0.5),
            normal: Vec3::new(1.0, 0.5, -0.2),
            width: 1.0,
            height: 0.7,
            spacing: 0.1,
        },
        BoardSpec {
            center: Pt3::new(-2.5, -0.3, -0.6),
            normal: Vec3::new(1.0, 0.05, 0.6),
            width: 0.6,
            height: 0.6,
            spacing: 0.1,
        },
        BoardSpec {
            center: Pt3::new(-5.0, 0.4, 1.1),
            normal: Vec3::new(1.0, -0.1, -0.45),
            width: 1.2,
            height: 0.9,
            spacing: 0.15,
        },
    ]
}

/// A complete synthetic calibration problem with known answer.
#[derive(Debug, Clone)]
pub struct CalibrationScene {
    /// Ground truth: maps camera-frame points into the lidar frame.
    pub lidar_from_camera: Iso3,
    pub camera_boards: BoardSet,
    pub lidar_boards: BoardSet,
    /// Full lidar cloud: every lidar board point plus the background.
    pub lidar_cloud: Vec<Pt3>,
}

impl CalibrationScene {
    /// Build a scene from boards given in the lidar frame.
    ///
    /// Lidar board points are the grids (with `lidar_noise`), camera board
    /// points are the noiseless grids mapped through `lidar_from_camera⁻¹`
    /// (with `camera_noise`). The lidar cloud contains the lidar board points
    /// followed by `background`.
    pub fn from_lidar_boards(
        boards: &[BoardSpec],
        background: Vec<Pt3>,
        lidar_from_camera: Iso3,
        camera_noise: UniformPointNoise,
        lidar_noise: UniformPointNoise,
    ) -> Result<Self> {
        anyhow::ensure!(!boards.is_empty(), "scene needs at least one board");
        let camera_from_lidar = lidar_from_camera.inverse();

        let mut lidar_sets = Vec::with_capacity(boards.len());
        let mut camera_sets = Vec::with_capacity(boards.len());
        for (idx, board) in boards.iter().enumerate() {
            anyhow::ensure!(
                board.spacing > 0.0 && board.width >= 0.0 && board.height >= 0.0,
                "board {} has invalid size or spacing",
                idx
            );
            anyhow::ensure!(
                board.normal.norm() > 0.0,
                "board {} has a zero normal",
                idx
            );
            let grid = board_grid(board);
            let camera_pts: Vec<Pt3> = grid
                .iter()
                .map(|p| camera_from_lidar.transform_point(p))
                .collect();
            camera_sets.push(camera_noise.apply_all(idx, &camera_pts));
            lidar_sets.push(lidar_noise.apply_all(idx, &grid));
        }

        let lidar_boards = BoardSet::new(Sensor::Lidar, lidar_sets);
        let mut lidar_cloud = lidar_boards.all_points();
        lidar_cloud.extend(background);

        Ok(Self {
            lidar_from_camera,
            camera_boards: BoardSet::new(Sensor::Camera, camera_sets),
            lidar_boards,
            lidar_cloud,
        })
    }

    /// Noiseless four-board scene over a cluttered ground patch.
    pub fn four_boards(lidar_from_camera: Iso3) -> Result<Self> {
        let background = ground_with_clutter(-1.5, (-6.0, 0.0), (-3.0, 3.0), 0.25, 150, 0.6, 7);
        Self::from_lidar_boards(
            &four_board_layout(),
            background,
            lidar_from_camera,
            UniformPointNoise::default(),
            UniformPointNoise::default(),
        )
    }
}
