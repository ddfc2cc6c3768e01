use libm::hypot;
use rkyv::{Archive, Deserialize, Serialize};

use crate::cities::City;

/// Pairwise Euclidean distances between every city, stored row-major.
///
/// Built once on the master and shipped alongside every chunk, so a worker
/// never needs to know anything about the cities themselves.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, PartialEq)]
#[archive(check_bytes)]
pub struct DistanceMatrix {
    size: u32,
    cells: Vec<f64>,
}

impl DistanceMatrix {
    pub fn build(cities: &[City]) -> Self {
        let n = cities.len();
        let mut cells = vec![0.; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = hypot(cities[i].x - cities[j].x, cities[i].y - cities[j].y);
                cells[i * n + j] = d;
                cells[j * n + i] = d;
            }
        }
        Self {
            size: n as u32,
            cells,
        }
    }

    /// Builds a matrix from explicit rows, for fixtures with no coordinates.
    #[cfg(test)]
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|row| row.len() != n) {
            return None;
        }
        Some(Self {
            size: n as u32,
            cells: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn distance(&self, from: u32, to: u32) -> f64 {
        self.cells[from as usize * self.size as usize + to as usize]
    }
}
