use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::{net::TcpListener, select, sync::Mutex};
use tracing::{debug, info, warn};

use crate::{
    cities::City,
    config::Config,
    error::{Error, Result},
    matrix::DistanceMatrix,
    partition::{ChunkRange, Partitioner, PermutationSpace, WorkChunk},
    tour::Tour,
    wire::{Directive, WorkPackage, WorkResult},
};

mod reporter;
mod session;

/// Relative tolerance when checking a worker's distance against our own.
const COST_TOLERANCE: f64 = 1e-9;

/// The cheapest tour any worker has reported so far.
#[derive(Debug, Clone, PartialEq)]
pub struct BestResult {
    pub tour: Tour,
    pub distance: f64,
}

/// Everything that's shared between connections. Only ever touched through
/// [`Master`]'s methods, and never held across a network call.
struct SearchState {
    partitioner: Partitioner,
    best: Option<BestResult>,
    active_workers: usize,
    completed: u64,
    abandoned: Vec<ChunkRange>,
}

/// Owns the permutation space and the global best, and serves chunks of it
/// to any worker that connects.
pub struct Master {
    config: Config,
    names: Vec<String>,
    matrix: Arc<DistanceMatrix>,
    space: PermutationSpace,
    state: Mutex<SearchState>,
    started_at: DateTime<Utc>,
}

impl Master {
    pub fn new(config: Config, cities: &[City]) -> Result<Self> {
        config.validate()?;
        let space = PermutationSpace::new(cities.len())?;
        let matrix = Arc::new(DistanceMatrix::build(cities));
        check_frame_budget(&config, &space, &matrix)?;
        info!(
            "master initialised with {} cities and {} permutations to consider",
            cities.len(),
            space.total()
        );
        Ok(Self {
            state: Mutex::new(SearchState {
                partitioner: Partitioner::new(space.total(), config.chunk_size),
                best: None,
                active_workers: 0,
                completed: 0,
                abandoned: Vec::new(),
            }),
            names: cities.iter().map(|c| c.name.clone()).collect(),
            matrix,
            space,
            config,
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn matrix(&self) -> Arc<DistanceMatrix> {
        self.matrix.clone()
    }

    /// Claims the next unassigned range and materialises its tours. Returns
    /// `None` once the whole space has been handed out.
    pub async fn claim_chunk(&self) -> Option<WorkChunk> {
        let range = self.state.lock().await.partitioner.next_range()?;
        debug!("handing out permutations {}", range);
        Some(WorkChunk {
            range,
            tours: self.space.materialize(range),
        })
    }

    /// Folds a worker's answer for `range` into the global best. Only a
    /// strictly shorter distance replaces the current best, so the first of
    /// several equal tours is the one that sticks.
    ///
    /// Returns whether the global best changed.
    pub async fn record_result(&self, range: ChunkRange, result: WorkResult) -> Result<bool> {
        let candidate = match result.best_tour {
            Some(tour) => Some(self.verify(tour, result.min_distance)?),
            None if range.is_empty() => None,
            None => Err(Error::InvalidResult(format!(
                "no tour reported for non-empty chunk {}",
                range
            )))?,
        };

        let mut state = self.state.lock().await;
        state.completed += range.len();
        let Some(candidate) = candidate else {
            return Ok(false);
        };
        let improved = state
            .best
            .as_ref()
            .map_or(true, |best| candidate.distance < best.distance);
        if improved {
            info!(
                "new best tour {} with distance {:.2}",
                self.format_tour(&candidate.tour),
                candidate.distance
            );
            state.best = Some(candidate);
        }
        Ok(improved)
    }

    /// Checks a reported tour against our own matrix before it can become the
    /// global best.
    fn verify(&self, tour: Tour, reported: f64) -> Result<BestResult> {
        if !tour.is_valid_for(self.space.cities()) {
            Err(Error::InvalidResult(format!(
                "{} is not a tour of {} cities starting at 0",
                tour,
                self.space.cities()
            )))?
        }
        let distance = tour.cost(&self.matrix);
        if !((distance - reported).abs() <= COST_TOLERANCE * distance.max(1.)) {
            Err(Error::InvalidResult(format!(
                "reported distance {} for {} but it costs {}",
                reported, tour, distance
            )))?
        }
        Ok(BestResult { tour, distance })
    }

    pub async fn worker_connected(&self) {
        self.state.lock().await.active_workers += 1;
    }

    pub async fn worker_disconnected(&self) {
        let mut state = self.state.lock().await;
        state.active_workers = state.active_workers.saturating_sub(1);
    }

    /// Notes a range whose result never came back. It isn't handed out
    /// again, so the search finishes without it.
    pub async fn chunk_abandoned(&self, range: ChunkRange) {
        warn!(
            "permutations {} were lost with their worker and won't be searched",
            range
        );
        self.state.lock().await.abandoned.push(range);
    }

    pub async fn best(&self) -> Option<BestResult> {
        self.state.lock().await.best.clone()
    }

    pub async fn progress(&self) -> ProgressReport {
        let state = self.state.lock().await;
        ProgressReport {
            dispatched: state.partitioner.cursor(),
            completed: state.completed,
            total: state.partitioner.total(),
            active_workers: state.active_workers,
            abandoned: state.abandoned.clone(),
            best: state.best.clone(),
            sampled_at: Utc::now(),
            started_at: self.started_at,
        }
    }

    /// Spells a tour out using city names.
    pub fn format_tour(&self, tour: &Tour) -> String {
        tour.cities()
            .iter()
            .map(|&i| {
                self.names
                    .get(i as usize)
                    .map_or_else(|| i.to_string(), |name| name.clone())
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Binds the configured address and serves until the search drains.
    pub async fn listen(self: Arc<Self>) -> Result<ProgressReport> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        info!("listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accepts workers on `listener`, giving each one its own task. Returns
    /// the final report once every range has been handed out and no workers
    /// are left connected.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<ProgressReport> {
        let mut reporter = tokio::spawn(reporter::run(self.clone(), self.config.report_interval));
        loop {
            select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        tokio::spawn(session::run(self.clone(), stream, remote));
                    }
                    Err(e) => warn!("failed to accept a connection: {}", e),
                },
                report = &mut reporter => return Ok(report?),
            }
        }
    }
}

/// Refuses a chunk size whose packages don't fit in one frame.
fn check_frame_budget(config: &Config, space: &PermutationSpace, matrix: &DistanceMatrix) -> Result<()> {
    let tours = config.chunk_size.min(space.total());
    let cells = matrix.size() as u64 * matrix.size() as u64;
    // an archived tour is at least an 8 byte vec header plus 4 bytes a city
    let floor = tours
        .saturating_mul(8 + 4 * space.cities() as u64)
        .saturating_add(8 * cells);
    if floor > config.max_frame_len as u64 {
        Err(Error::InvalidConfig("chunk size doesn't fit in a frame"))?
    }

    // every full chunk encodes to the same size
    let range = ChunkRange { start: 0, end: tours };
    let package = Directive::Work(WorkPackage {
        range,
        tours: space.materialize(range),
        distances: matrix.clone(),
    });
    if package.encode()?.len() > config.max_frame_len {
        Err(Error::InvalidConfig("chunk size doesn't fit in a frame"))?
    }
    Ok(())
}

/// A point-in-time view of the search.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    /// Permutations handed out so far.
    pub dispatched: u64,
    /// Permutations whose results have come back.
    pub completed: u64,
    pub total: u64,
    pub active_workers: usize,
    pub abandoned: Vec<ChunkRange>,
    pub best: Option<BestResult>,
    pub sampled_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl ProgressReport {
    pub fn percent_dispatched(&self) -> f64 {
        match self.total {
            0 => 100.,
            total => self.dispatched as f64 / total as f64 * 100.,
        }
    }

    /// Nothing left to hand out and nobody left working.
    pub fn is_drained(&self) -> bool {
        self.dispatched >= self.total && self.active_workers == 0
    }

    pub fn lost(&self) -> u64 {
        self.abandoned.iter().map(ChunkRange::len).sum()
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}% dispatched ({}/{}), {} completed, {} workers, {} lost, {}s elapsed",
            self.percent_dispatched(),
            self.dispatched,
            self.total,
            self.completed,
            self.active_workers,
            self.lost(),
            (self.sampled_at - self.started_at).num_seconds()
        )?;
        match &self.best {
            Some(best) => write!(f, ", best {:.2}", best.distance),
            None => write!(f, ", no tour yet"),
        }
    }
}
