use std::{net::SocketAddr, sync::Arc};

use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};
use tracing::{debug, debug_span, info, warn, Instrument};

use super::Master;
use crate::{
    error::{Error, Result},
    partition::ChunkRange,
    wire::{Directive, FrameReader, FrameWriter, WorkPackage},
};

/// Serves a single worker until either the space runs out or the worker goes
/// away. Whatever happens here stays here: errors are logged and the
/// connection dropped, and other sessions carry on.
pub(super) async fn run(master: Arc<Master>, stream: TcpStream, remote: SocketAddr) {
    let span = debug_span!("session", remote = %remote);
    async move {
        master.worker_connected().await;
        info!("worker connected");

        let max_frame_len = master.config().max_frame_len;
        let (rx, tx) = stream.into_split();
        let mut session = Session {
            master: master.clone(),
            reader: FrameReader::new(rx, max_frame_len),
            writer: FrameWriter::new(tx, max_frame_len),
            in_flight: None,
        };

        match session.serve().await {
            Ok(chunks) => info!("no work left after {} chunks, closing", chunks),
            Err(Error::ConnectionClosed) => warn!("worker disconnected"),
            Err(e) => warn!("closing connection: {}", e),
        }

        // the worker's range isn't handed out again
        if let Some(range) = session.in_flight.take() {
            master.chunk_abandoned(range).await;
        }
        master.worker_disconnected().await;
    }
    .instrument(span)
    .await
}

struct Session {
    master: Arc<Master>,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    /// The range the worker is currently holding, if any.
    in_flight: Option<ChunkRange>,
}

impl Session {
    /// Claim, send, wait, record, until there's nothing left to claim.
    /// Returns the number of chunks the worker completed.
    async fn serve(&mut self) -> Result<u64> {
        let mut chunks = 0;
        loop {
            let Some(chunk) = self.master.claim_chunk().await else {
                self.writer.send_directive(&Directive::Done).await?;
                if let Err(e) = self.writer.shutdown().await {
                    debug!("shutting down the connection failed: {}", e);
                }
                return Ok(chunks);
            };

            self.in_flight = Some(chunk.range);
            let package = WorkPackage {
                range: chunk.range,
                tours: chunk.tours,
                distances: (*self.master.matrix()).clone(),
            };
            self.writer.send_directive(&Directive::Work(package)).await?;
            debug!("sent permutations {}", chunk.range);

            // no timeout: a worker that never answers holds its range forever
            let result = self
                .reader
                .receive_result()
                .await?
                .ok_or(Error::ConnectionClosed)?;
            self.master.record_result(chunk.range, result).await?;
            self.in_flight = None;
            chunks += 1;
        }
    }
}
