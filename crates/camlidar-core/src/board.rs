//! Calibration-board observations as supplied by the board extractors.
//!
//! Board extraction itself (corner finding on images, lidar segmentation) is
//! done upstream. This module only holds its output: one unordered point set
//! per detected board, tagged with the sensor it came from.

use crate::Pt3;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor that observed a calibration board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Camera,
    Lidar,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensor::Camera => write!(f, "camera"),
            Sensor::Lidar => write!(f, "lidar"),
        }
    }
}

/// Points believed to lie on one planar calibration board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarBoardSample {
    /// Sensor that produced the points.
    pub sensor: Sensor,
    /// Position of this board in the sensor's board list.
    pub index: usize,
    /// Board points in the sensor frame.
    pub points: Vec<Pt3>,
}

impl PlanarBoardSample {
    pub fn new(sensor: Sensor, index: usize, points: Vec<Pt3>) -> Self {
        Self {
            sensor,
            index,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Ordered list of board samples from a single sensor.
///
/// Board indices are positions in this list; [`BoardSet::new`] assigns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSet {
    pub sensor: Sensor,
    pub boards: Vec<PlanarBoardSample>,
}

impl BoardSet {
    /// Build a board set from raw point sets, in order.
    pub fn new(sensor: Sensor, point_sets: Vec<Vec<Pt3>>) -> Self {
        let boards = point_sets
            .into_iter()
            .enumerate()
            .map(|(index, points)| PlanarBoardSample::new(sensor, index, points))
            .collect();
        Self { sensor, boards }
    }

    /// Build a board set from already tagged samples.
    ///
    /// Fails if a sample belongs to another sensor or its index does not match
    /// its position.
    pub fn from_samples(sensor: Sensor, boards: Vec<PlanarBoardSample>) -> Result<Self> {
        for (pos, board) in boards.iter().enumerate() {
            anyhow::ensure!(
                board.sensor == sensor,
                "board {} was observed by {}, expected {}",
                pos,
                board.sensor,
                sensor
            );
            anyhow::ensure!(
                board.index == pos,
                "board at position {} carries index {}",
                pos,
                board.index
            );
        }
        Ok(Self { sensor, boards })
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Total number of points over all boards.
    pub fn num_points(&self) -> usize {
        self.boards.iter().map(PlanarBoardSample::len).sum()
    }

    /// All board points concatenated in board order.
    pub fn all_points(&self) -> Vec<Pt3> {
        let mut out = Vec::with_capacity(self.num_points());
        for board in &self.boards {
            out.extend_from_slice(&board.points);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_set_assigns_indices_in_order() {
        let set = BoardSet::new(
            Sensor::Lidar,
            vec![
                vec![Pt3::new(0.0, 0.0, 0.0)],
                vec![Pt3::new(1.0, 0.0, 0.0), Pt3::new(0.0, 1.0, 0.0)],
            ],
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.boards[1].index, 1);
        assert_eq!(set.boards[1].sensor, Sensor::Lidar);
        assert_eq!(set.num_points(), 3);
        assert_eq!(set.all_points().len(), 3);
    }

    #[test]
    fn from_samples_rejects_foreign_sensor() {
        let boards = vec![PlanarBoardSample::new(Sensor::Lidar, 0, vec![])];
        assert!(BoardSet::from_samples(Sensor::Camera, boards).is_err());
    }

    #[test]
    fn from_samples_rejects_misplaced_index() {
        let boards = vec![PlanarBoardSample::new(Sensor::Camera, 3, vec![])];
        assert!(BoardSet::from_samples(Sensor::Camera, boards).is_err());
    }

    #[test]
    fn sensor_serde_is_snake_case() {
        let json = serde_json::to_string(&Sensor::Camera).unwrap();
        assert_eq!(json, "\"camera\"");
        let back: Sensor = serde_json::from_str("\"lidar\"").unwrap();
        assert_eq!(back, Sensor::Lidar);
    }
}
