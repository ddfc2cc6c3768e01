use std::{sync::Arc, time::Duration};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug_span, info, Instrument};

use super::{Master, ProgressReport};

/// Logs the master's progress every `period` until the search has drained,
/// then returns the final state.
pub(super) async fn run(master: Arc<Master>, period: Duration) -> ProgressReport {
    let span = debug_span!("reporter");
    async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = master.progress().await;
            info!("progress: {}", report);
            if let Some(best) = &report.best {
                info!("current best tour: {}", master.format_tour(&best.tour));
            }
            if report.is_drained() {
                match &report.best {
                    Some(best) => info!(
                        "search complete, best tour {} with distance {:.2}",
                        master.format_tour(&best.tour),
                        best.distance
                    ),
                    None => info!("search complete without finding a tour"),
                }
                return report;
            }
        }
    }
    .instrument(span)
    .await
}
