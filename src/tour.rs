use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::matrix::DistanceMatrix;

/// An ordered visit of every city. The edge from the last city back to the
/// first is implied.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct Tour(pub Vec<u32>);

impl Tour {
    pub fn cities(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of every edge including the closing one. Tours of fewer than two
    /// cities have no edges.
    pub fn cost(&self, matrix: &DistanceMatrix) -> f64 {
        let t = &self.0;
        if t.len() < 2 {
            return 0.;
        }
        let open: f64 = t.windows(2).map(|w| matrix.distance(w[0], w[1])).sum();
        open + matrix.distance(t[t.len() - 1], t[0])
    }

    /// Returns true if this is a permutation of `0..n` starting at city 0.
    pub fn is_valid_for(&self, n: usize) -> bool {
        if self.0.len() != n || (n > 0 && self.0[0] != 0) {
            return false;
        }
        let mut seen = vec![false; n];
        for &city in &self.0 {
            match seen.get_mut(city as usize) {
                Some(s) if !*s => *s = true,
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Tour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, city) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", city)?;
        }
        Ok(())
    }
}

/// Scans a chunk for its cheapest tour. The first of several equally cheap
/// tours wins. Returns `None` for an empty chunk.
pub fn best_of<'a, I>(tours: I, matrix: &DistanceMatrix) -> Option<(&'a Tour, f64)>
where
    I: IntoIterator<Item = &'a Tour>,
{
    let mut best: Option<(&Tour, f64)> = None;
    for tour in tours {
        let cost = tour.cost(matrix);
        if best.map_or(true, |(_, min)| cost < min) {
            best = Some((tour, cost));
        }
    }
    best
}
