use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    tour::Tour,
};

/// `20!` is the largest factorial that fits in a `u64`, and city 0 is fixed,
/// so 21 cities is as far as the index space reaches.
pub const MAX_CITIES: usize = 21;

/// A half-open range `[start, end)` of permutation indices.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize, PartialEq, Eq)]
#[archive(check_bytes)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A claimed range along with the tours it covers.
#[derive(Debug, Clone)]
pub struct WorkChunk {
    pub range: ChunkRange,
    pub tours: Vec<Tour>,
}

/// Every tour over `cities` cities that starts at city 0, in lexicographic
/// order of the remaining indices. Rotations of the same cycle are never
/// enumerated twice, so the space holds `(cities - 1)!` tours.
///
/// Nothing is held in memory: any tour can be recovered from its index.
#[derive(Debug, Clone)]
pub struct PermutationSpace {
    cities: usize,
    total: u64,
}

impl PermutationSpace {
    pub fn new(cities: usize) -> Result<Self> {
        if cities > MAX_CITIES {
            Err(Error::TooManyCities(cities))?
        }
        let total = match cities {
            0 => 0,
            n => factorial(n - 1),
        };
        Ok(Self { cities, total })
    }

    pub fn cities(&self) -> usize {
        self.cities
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// The tour at position `index` of the enumeration.
    ///
    /// # Panics
    ///
    /// If `index` is outside the space.
    pub fn unrank(&self, mut index: u64) -> Tour {
        assert!(index < self.total, "permutation index out of range");
        let mut remaining: Vec<u32> = (1..self.cities as u32).collect();
        let mut tour = Vec::with_capacity(self.cities);
        tour.push(0);
        while !remaining.is_empty() {
            let block = factorial(remaining.len() - 1);
            let pick = (index / block) as usize;
            index %= block;
            tour.push(remaining.remove(pick));
        }
        Tour(tour)
    }

    /// All tours in `range`, in enumeration order.
    pub fn materialize(&self, range: ChunkRange) -> Vec<Tour> {
        assert!(range.end <= self.total, "chunk extends past the space");
        if range.is_empty() {
            return Vec::new();
        }
        let mut tours = Vec::with_capacity(range.len() as usize);
        let mut current = self.unrank(range.start);
        for _ in 1..range.len() {
            let mut next = current.clone();
            next_permutation(&mut next.0[1..]);
            tours.push(current);
            current = next;
        }
        tours.push(current);
        tours
    }
}

/// Hands out consecutive ranges of the space. The cursor only moves forward
/// and never passes the end.
#[derive(Debug)]
pub struct Partitioner {
    total: u64,
    cursor: u64,
    chunk_size: u64,
}

impl Partitioner {
    pub fn new(total: u64, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be at least 1");
        Self {
            total,
            cursor: 0,
            chunk_size,
        }
    }

    pub fn next_range(&mut self) -> Option<ChunkRange> {
        if self.cursor >= self.total {
            return None;
        }
        let start = self.cursor;
        let end = start.saturating_add(self.chunk_size).min(self.total);
        self.cursor = end;
        Some(ChunkRange { start, end })
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

fn factorial(n: usize) -> u64 {
    (1..=n as u64).product()
}

/// Rearranges `xs` into the next permutation in lexicographic order. Returns
/// false, leaving `xs` sorted ascending, if it was already the last one.
fn next_permutation(xs: &mut [u32]) -> bool {
    if xs.len() < 2 {
        return false;
    }
    let mut i = xs.len() - 1;
    while i > 0 && xs[i - 1] >= xs[i] {
        i -= 1;
    }
    if i == 0 {
        xs.reverse();
        return false;
    }
    let mut j = xs.len() - 1;
    while xs[j] <= xs[i - 1] {
        j -= 1;
    }
    xs.swap(i - 1, j);
    xs[i..].reverse();
    true
}
