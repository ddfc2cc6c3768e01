use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use salesman::{
    cities::City,
    master::{Master, ProgressReport},
    matrix::DistanceMatrix,
    partition::{ChunkRange, PermutationSpace},
    tour::{best_of, Tour},
    wire::{Directive, FrameReader, FrameWriter, WorkPackage, WorkResult},
    worker::{evaluate, Worker},
    Config, Error, Result,
};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    task::JoinHandle,
    time::{sleep, timeout},
};

const MAX_FRAME: usize = 1 << 24;

fn unit_square() -> Vec<City> {
    vec![
        City::new("sw", 0., 0.),
        City::new("se", 1., 0.),
        City::new("ne", 1., 1.),
        City::new("nw", 0., 1.),
    ]
}

fn random_cities(count: usize, seed: u64) -> Vec<City> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| City::new(format!("c{}", i), rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
        .collect()
}

/// Starts a master on an ephemeral port. The returned config points workers
/// at it.
async fn start_master(
    cities: &[City],
    chunk_size: u64,
) -> (Arc<Master>, Config, JoinHandle<Result<ProgressReport>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = Config::builder()
        .port(listener.local_addr().unwrap().port())
        .chunk_size(chunk_size)
        .report_interval(Duration::from_millis(200))
        .max_frame_len(MAX_FRAME)
        .build();
    let master = Arc::new(Master::new(config.clone(), cities).unwrap());
    let serving = tokio::spawn(master.clone().serve(listener));
    (master, config, serving)
}

async fn run_workers(config: &Config, count: usize) -> Vec<Result<salesman::worker::WorkerSummary>> {
    let handles = (0..count).map(|_| {
        let worker = Worker::new(config.clone()).unwrap();
        tokio::spawn(async move { worker.run().await })
    });
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

fn brute_force(cities: &[City], skip: Option<ChunkRange>) -> f64 {
    let space = PermutationSpace::new(cities.len()).unwrap();
    let matrix = DistanceMatrix::build(cities);
    let tours: Vec<Tour> = space
        .materialize(ChunkRange {
            start: 0,
            end: space.total(),
        })
        .into_iter()
        .enumerate()
        .filter(|(i, _)| skip.map_or(true, |r| !(r.start..r.end).contains(&(*i as u64))))
        .map(|(_, tour)| tour)
        .collect();
    best_of(&tours, &matrix).unwrap().1
}

fn is_square_cycle(tour: &Tour) -> bool {
    tour.cities() == [0, 1, 2, 3] || tour.cities() == [0, 3, 2, 1]
}

/// Polls the master until `check` holds.
async fn wait_for<F>(master: &Master, check: F) -> ProgressReport
where
    F: Fn(&ProgressReport) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            let report = master.progress().await;
            if check(&report) {
                return report;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("master never reached the expected state")
}

/// A hand-driven worker connection.
struct Peer {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl Peer {
    async fn connect(config: &Config) -> Self {
        let stream = TcpStream::connect(config.addr()).await.unwrap();
        let (rx, tx) = stream.into_split();
        Self {
            reader: FrameReader::new(rx, MAX_FRAME),
            writer: FrameWriter::new(tx, MAX_FRAME),
        }
    }

    async fn next_package(&mut self) -> Option<WorkPackage> {
        match self.reader.receive_directive().await.unwrap() {
            Some(Directive::Work(package)) => Some(package),
            Some(Directive::Done) => None,
            None => panic!("master hung up without saying it was done"),
        }
    }

    async fn answer(&mut self, result: &WorkResult) {
        self.writer.send_result(result).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_worker_finds_the_square() {
    let (_master, config, serving) = start_master(&unit_square(), 2).await;

    let summaries = run_workers(&config, 1).await;
    let summary = summaries[0].as_ref().unwrap();
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.tours, 6);

    let report = serving.await.unwrap().unwrap();
    let best = report.best.unwrap();
    assert_eq!(best.distance, 4.);
    assert!(is_square_cycle(&best.tour), "unexpected tour {}", best.tour);
    assert_eq!(report.completed, 6);
    assert_eq!(report.active_workers, 0);
    assert!(report.abandoned.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_workers_find_the_square() {
    let (_master, config, serving) = start_master(&unit_square(), 1).await;

    let summaries = run_workers(&config, 3).await;
    let chunks: u64 = summaries.iter().map(|s| s.as_ref().unwrap().chunks).sum();
    assert_eq!(chunks, 6);

    let report = serving.await.unwrap().unwrap();
    let best = report.best.unwrap();
    assert_eq!(best.distance, 4.);
    assert!(is_square_cycle(&best.tour), "unexpected tour {}", best.tour);
    assert_eq!(report.completed, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_agree_with_brute_force() {
    let cities = random_cities(8, 7);
    let (_master, config, serving) = start_master(&cities, 300).await;

    let summaries = run_workers(&config, 3).await;
    let tours: u64 = summaries.iter().map(|s| s.as_ref().unwrap().tours).sum();
    assert_eq!(tours, 5040);

    let report = serving.await.unwrap().unwrap();
    let best = report.best.unwrap();
    assert!((best.distance - brute_force(&cities, None)).abs() < 1e-9);
    assert!(best.tour.is_valid_for(8));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_is_isolated() {
    let cities = random_cities(6, 11);
    let (master, config, serving) = start_master(&cities, 10).await;

    let mut quitter = Peer::connect(&config).await;
    let lost = quitter.next_package().await.unwrap().range;
    let mut stayer = Peer::connect(&config).await;
    let mut package = stayer.next_package().await.unwrap();
    wait_for(&master, |r| r.active_workers == 2).await;

    // hang up while holding a chunk
    drop(quitter);
    let report = wait_for(&master, |r| r.active_workers == 1 && !r.abandoned.is_empty()).await;
    assert_eq!(report.abandoned, vec![lost]);
    assert_eq!(report.active_workers, 1);

    // the other worker carries on until the space runs out
    let mut chunks = 0;
    loop {
        stayer.answer(&evaluate(&package)).await;
        chunks += 1;
        match stayer.next_package().await {
            Some(next) => package = next,
            None => break,
        }
    }
    assert_eq!(chunks, 11);

    let report = serving.await.unwrap().unwrap();
    assert_eq!(report.dispatched, 120);
    assert_eq!(report.completed, 110);
    assert_eq!(report.lost(), 10);
    assert_eq!(report.active_workers, 0);
    let best = report.best.unwrap();
    assert!((best.distance - brute_force(&cities, Some(lost))).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bogus_result_drops_only_that_worker() {
    let (master, config, serving) = start_master(&unit_square(), 3).await;

    let mut cheat = Peer::connect(&config).await;
    let package = cheat.next_package().await.unwrap();
    cheat
        .answer(&WorkResult {
            best_tour: package.tours.first().cloned(),
            min_distance: 0.1,
        })
        .await;
    // the master hangs up on it rather than sending more work
    assert!(matches!(cheat.reader.receive_directive().await, Ok(None)));
    let report = wait_for(&master, |r| !r.abandoned.is_empty()).await;
    assert_eq!(report.abandoned, vec![package.range]);
    assert!(report.best.is_none());

    let summaries = run_workers(&config, 1).await;
    assert_eq!(summaries[0].as_ref().unwrap().chunks, 1);

    let report = serving.await.unwrap().unwrap();
    assert_eq!(report.completed, 3);
    assert_eq!(report.lost(), 3);
}

#[tokio::test]
async fn worker_fails_without_master() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let worker = Worker::new(Config::builder().port(port).build()).unwrap();
    assert!(matches!(worker.run().await, Err(Error::Connect { .. })));
}

#[tokio::test]
async fn worker_notices_master_hanging_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let worker = Worker::new(Config::builder().port(port).build()).unwrap();
    assert!(matches!(worker.run().await, Err(Error::ConnectionClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serving_waits_for_the_last_chunk() {
    let (master, config, serving) = start_master(&unit_square(), 6).await;
    let mut peer = Peer::connect(&config).await;
    let package = peer.next_package().await.unwrap();
    assert_eq!(package.range, ChunkRange { start: 0, end: 6 });

    // everything is dispatched but the only result is still outstanding
    sleep(Duration::from_millis(600)).await;
    assert!(!serving.is_finished());
    let report = master.progress().await;
    assert_eq!(report.dispatched, 6);
    assert_eq!(report.completed, 0);

    peer.answer(&evaluate(&package)).await;
    assert!(peer.next_package().await.is_none());
    drop(peer);

    let report = timeout(Duration::from_secs(10), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.completed, 6);
    assert!(report.abandoned.is_empty());
    assert!(is_square_cycle(&report.best.unwrap().tour));
}
