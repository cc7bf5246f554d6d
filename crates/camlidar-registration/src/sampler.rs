//! Hypothesis sampling over board triples.
//!
//! Camera triples are drawn from a [`ProbabilityTable`] that favours triples
//! whose normals are close to mutually orthogonal. Lidar triples are drawn
//! uniformly, since the camera/lidar correspondence is exactly what the search
//! is looking for.

use camlidar_core::{Real, Sensor, Vec3};
use camlidar_linear::BoardDescriptor;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// Ordered triple of pairwise distinct board indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[usize; 3]", into = "[usize; 3]")]
pub struct TripleIndex([usize; 3]);

impl TripleIndex {
    /// `None` unless `a`, `b`, `c` are pairwise distinct.
    pub fn new(a: usize, b: usize, c: usize) -> Option<Self> {
        (a != b && a != c && b != c).then_some(Self([a, b, c]))
    }

    pub fn indices(&self) -> [usize; 3] {
        self.0
    }

    /// Largest index in the triple.
    pub fn max_index(&self) -> usize {
        self.0[0].max(self.0[1]).max(self.0[2])
    }

    /// Every ordered triple over `n` boards, lexicographically.
    ///
    /// There are `n (n - 1) (n - 2)` of them; empty for `n < 3`.
    pub fn all_ordered(n: usize) -> Vec<Self> {
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) * n.saturating_sub(2));
        for a in 0..n {
            for b in 0..n {
                for c in 0..n {
                    if let Some(t) = Self::new(a, b, c) {
                        out.push(t);
                    }
                }
            }
        }
        out
    }

    /// Canonical key of a `(camera, lidar)` hypothesis.
    ///
    /// Both triples are reordered by the permutation that sorts the camera
    /// triple. Hypotheses that pair the same boards position by position map
    /// to the same key and produce the same transform.
    pub fn canonical_pair(camera: Self, lidar: Self) -> (Self, Self) {
        let mut order = [0usize, 1, 2];
        order.sort_by_key(|&i| camera.0[i]);
        (
            Self(order.map(|i| camera.0[i])),
            Self(order.map(|i| lidar.0[i])),
        )
    }
}

impl TryFrom<[usize; 3]> for TripleIndex {
    type Error = String;

    fn try_from(v: [usize; 3]) -> Result<Self, Self::Error> {
        Self::new(v[0], v[1], v[2]).ok_or_else(|| format!("triple {v:?} repeats an index"))
    }
}

impl From<TripleIndex> for [usize; 3] {
    fn from(t: TripleIndex) -> Self {
        t.0
    }
}

/// Sampling weight of a normal triple: `exp(-(|a·b| + |a·c| + |b·c|))`.
pub fn triple_weight(a: &Vec3, b: &Vec3, c: &Vec3) -> Real {
    (-(a.dot(b).abs() + a.dot(c).abs() + b.dot(c).abs())).exp()
}

/// Normalized sampling weights over every ordered camera triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityTable {
    triples: Vec<TripleIndex>,
    weights: Vec<Real>,
}

impl ProbabilityTable {
    /// Build the table from unit normals. `None` for fewer than 3 normals.
    pub fn from_normals(normals: &[Vec3]) -> Option<Self> {
        let triples = TripleIndex::all_ordered(normals.len());
        if triples.is_empty() {
            return None;
        }
        let mut weights: Vec<Real> = triples
            .iter()
            .map(|t| {
                let [a, b, c] = t.indices();
                triple_weight(&normals[a], &normals[b], &normals[c])
            })
            .collect();
        let total: Real = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        Some(Self { triples, weights })
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> &[TripleIndex] {
        &self.triples
    }

    pub fn weights(&self) -> &[Real] {
        &self.weights
    }

    /// Weight of `triple`, `0` if absent.
    pub fn weight(&self, triple: TripleIndex) -> Real {
        self.triples
            .iter()
            .position(|&t| t == triple)
            .map_or(0.0, |i| self.weights[i])
    }
}

/// Discrete distribution sampled by binary search over cumulative weights.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDistribution {
    cumulative: Vec<Real>,
}

impl DiscreteDistribution {
    /// `None` if `weights` is empty, has a negative or non-finite entry, or
    /// sums to zero. Weights need not be normalized.
    pub fn new(weights: &[Real]) -> Option<Self> {
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for &w in weights {
            if !(w.is_finite() && w >= 0.0) {
                return None;
            }
            acc += w;
            cumulative.push(acc);
        }
        (acc > 0.0 && acc.is_finite()).then_some(Self { cumulative })
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Draw an index with probability proportional to its weight.
    ///
    /// Zero-weight entries are never returned.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let total = self.cumulative[self.cumulative.len() - 1];
        let u = rng.random::<Real>() * total;
        self.cumulative
            .partition_point(|&c| c <= u)
            .min(self.cumulative.len() - 1)
    }
}

/// Draws `(camera triple, lidar triple)` hypotheses.
#[derive(Debug, Clone)]
pub struct CorrespondenceSampler {
    camera: ProbabilityTable,
    camera_dist: DiscreteDistribution,
    lidar: Vec<TripleIndex>,
}

impl CorrespondenceSampler {
    /// Build the camera table and the lidar triple index.
    ///
    /// Both sides need at least three boards.
    pub fn new(
        camera: &[BoardDescriptor],
        lidar: &[BoardDescriptor],
    ) -> Result<Self, RegistrationError> {
        for (sensor, boards) in [(Sensor::Camera, camera.len()), (Sensor::Lidar, lidar.len())] {
            if boards < 3 {
                return Err(RegistrationError::NotEnoughBoards { sensor, boards });
            }
        }
        let normals: Vec<Vec3> = camera.iter().map(|d| d.normal_vec()).collect();
        let table = ProbabilityTable::from_normals(&normals).ok_or(
            RegistrationError::NotEnoughBoards {
                sensor: Sensor::Camera,
                boards: camera.len(),
            },
        )?;
        let camera_dist = DiscreteDistribution::new(table.weights()).ok_or_else(|| {
            RegistrationError::InvalidConfig("camera triple weights are degenerate".into())
        })?;
        Ok(Self {
            camera: table,
            camera_dist,
            lidar: TripleIndex::all_ordered(lidar.len()),
        })
    }

    pub fn camera_table(&self) -> &ProbabilityTable {
        &self.camera
    }

    pub fn lidar_triples(&self) -> &[TripleIndex] {
        &self.lidar
    }

    /// Weighted draw of a camera triple.
    pub fn draw_camera<R: Rng>(&self, rng: &mut R) -> TripleIndex {
        self.camera.triples[self.camera_dist.sample(rng)]
    }

    /// Uniform draw of a lidar triple.
    pub fn draw_lidar<R: Rng>(&self, rng: &mut R) -> TripleIndex {
        self.lidar[rng.random_range(0..self.lidar.len())]
    }

    /// Number of distinct hypotheses up to a common reordering of both
    /// triples. Triples with zero camera weight still count.
    pub fn num_distinct_hypotheses(&self) -> usize {
        self.camera.len() * self.lidar.len() / 6
    }
}
