use std::{process::exit, sync::Arc, time::Duration};

use clap::{arg, ArgMatches, Command};
use salesman::{
    cities::{mordor, mordor_prefix},
    master::Master,
    worker::Worker,
    Config,
};
use tracing::error;

fn connection_args(cmd: Command) -> Command {
    cmd.arg(
        arg!(--host [HOST] "Address the master listens on")
            .default_value("127.0.0.1")
            .value_parser(clap::value_parser!(String)),
    )
    .arg(
        arg!(--port [PORT] "Port the master listens on")
            .default_value("65432")
            .value_parser(clap::value_parser!(u16)),
    )
}

fn cli() -> Command {
    Command::new("salesman")
        .about("Distributed brute-force travelling salesman search")
        .arg_required_else_help(true)
        .subcommand(
            connection_args(Command::new("master").about("Hands out permutations and collects results"))
                .arg(
                    arg!(--"chunk-size" [CHUNK_SIZE] "Permutations per unit of work")
                        .default_value("1000")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--interval [SECONDS] "Seconds between progress reports")
                        .default_value("10")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--cities [COUNT] "Only use the first COUNT cities of the table")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(connection_args(
            Command::new("worker").about("Scores permutations handed out by a master"),
        ))
}

fn config(matches: &ArgMatches) -> Config {
    Config::builder()
        .host(matches.get_one::<String>("host").unwrap().clone())
        .port(*matches.get_one::<u16>("port").unwrap())
        .build()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let code = match cli().get_matches().subcommand() {
        Some(("master", matches)) => {
            let config = Config {
                chunk_size: *matches.get_one::<u64>("chunk-size").unwrap(),
                report_interval: Duration::from_secs(*matches.get_one::<u64>("interval").unwrap()),
                ..config(matches)
            };
            let cities = match matches.get_one::<usize>("cities") {
                Some(&count) => mordor_prefix(count),
                None => mordor(),
            };
            match Master::new(config, &cities) {
                Ok(master) => {
                    let master = Arc::new(master);
                    match master.clone().listen().await {
                        Ok(report) => {
                            if let Some(best) = &report.best {
                                println!("best tour: {}", master.format_tour(&best.tour));
                                println!("distance: {:.2}", best.distance);
                            }
                            if !report.abandoned.is_empty() {
                                println!("permutations never searched: {}", report.lost());
                            }
                            0
                        }
                        Err(e) => {
                            error!("master failed: {}", e);
                            1
                        }
                    }
                }
                Err(e) => {
                    error!("could not start master: {}", e);
                    1
                }
            }
        }
        Some(("worker", matches)) => match Worker::new(config(matches)) {
            Ok(worker) => match worker.run().await {
                Ok(summary) => {
                    println!("processed {} chunks ({} tours)", summary.chunks, summary.tours);
                    0
                }
                Err(e) => {
                    error!("worker stopped: {}", e);
                    1
                }
            },
            Err(e) => {
                error!("could not start worker: {}", e);
                1
            }
        },
        _ => unreachable!("a subcommand is required"),
    };
    exit(code);
}
