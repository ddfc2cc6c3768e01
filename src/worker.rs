use tokio::net::TcpStream;
use tracing::{debug, debug_span, info, Instrument};

use crate::{
    config::Config,
    error::{Error, Result},
    tour::best_of,
    wire::{Directive, FrameReader, FrameWriter, WorkPackage, WorkResult},
};

/// What a worker got through before the master ran out of work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub chunks: u64,
    pub tours: u64,
}

/// Scores chunks for a master over a single connection. Keeps no state
/// between chunks; the master is the only place a global best exists.
pub struct Worker {
    config: Config,
}

impl Worker {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Connects once and works until the master says there's nothing left.
    /// There is no retry: failing to connect, or losing the connection before
    /// the master is done, is an error.
    pub async fn run(&self) -> Result<WorkerSummary> {
        let addr = self.config.addr();
        let span = debug_span!("worker", master = %addr);
        self.work(addr).instrument(span).await
    }

    async fn work(&self, addr: String) -> Result<WorkerSummary> {
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!("connected to master");
        let (rx, tx) = stream.into_split();
        let mut reader = FrameReader::new(rx, self.config.max_frame_len);
        let mut writer = FrameWriter::new(tx, self.config.max_frame_len);

        let mut summary = WorkerSummary::default();
        loop {
            let package = match reader.receive_directive().await? {
                Some(Directive::Work(package)) => package,
                Some(Directive::Done) => {
                    info!(
                        "master has no more work, processed {} chunks ({} tours)",
                        summary.chunks, summary.tours
                    );
                    return Ok(summary);
                }
                None => Err(Error::ConnectionClosed)?,
            };

            let range = package.range;
            let tours = package.tours.len() as u64;
            debug!("received {} permutations {}", tours, range);
            // scoring is CPU bound, keep it off the runtime's threads
            let result = tokio::task::spawn_blocking(move || evaluate(&package)).await?;
            writer.send_result(&result).await?;
            debug!("chunk {} done, local best {:.2}", range, result.min_distance);

            summary.chunks += 1;
            summary.tours += tours;
        }
    }
}

/// Finds the cheapest tour in a package.
pub fn evaluate(package: &WorkPackage) -> WorkResult {
    match best_of(&package.tours, &package.distances) {
        Some((tour, distance)) => WorkResult {
            best_tour: Some(tour.clone()),
            min_distance: distance,
        },
        None => WorkResult {
            best_tour: None,
            min_distance: f64::INFINITY,
        },
    }
}
