use byteorder::{ByteOrder, LittleEndian};
use rkyv::{from_bytes, to_bytes, AlignedVec, Archive, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{Error, Result},
    matrix::DistanceMatrix,
    partition::ChunkRange,
    tour::Tour,
};

/// Every frame on the wire is `len | payload`, where `len` is a little endian
/// u32 counting payload bytes only.
pub const HEADER_LEN: usize = 4;

/// One unit of work, complete with everything needed to score it.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, PartialEq)]
#[archive(check_bytes)]
pub struct WorkPackage {
    pub range: ChunkRange,
    pub tours: Vec<Tour>,
    pub distances: DistanceMatrix,
}

/// Sent from the master to a worker.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, PartialEq)]
#[archive(check_bytes)]
pub enum Directive {
    /// Score these tours and report back.
    Work(WorkPackage),
    /// Nothing is left to hand out. The worker may disconnect.
    Done,
}

/// Sent from a worker to the master after every package.
#[derive(Debug, Clone, Archive, Serialize, Deserialize, PartialEq)]
#[archive(check_bytes)]
pub struct WorkResult {
    /// The cheapest tour in the package, absent if the package was empty.
    pub best_tour: Option<Tour>,
    pub min_distance: f64,
}

impl Directive {
    pub fn encode(&self) -> Result<AlignedVec> {
        to_bytes::<_, 4096>(self).map_err(|_| Error::CouldNotEncodeMessage)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        from_bytes::<Self>(buf).map_err(|_| Error::CouldNotDecodeMessage)
    }
}

impl WorkResult {
    pub fn encode(&self) -> Result<AlignedVec> {
        to_bytes::<_, 256>(self).map_err(|_| Error::CouldNotEncodeMessage)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        from_bytes::<Self>(buf).map_err(|_| Error::CouldNotDecodeMessage)
    }
}

/// Writes length-prefixed frames.
pub struct FrameWriter<W> {
    inner: W,
    max_frame_len: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_frame_len: usize) -> Self {
        Self {
            inner,
            max_frame_len,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = payload.len();
        if len > self.max_frame_len || len > u32::MAX as usize {
            Err(Error::MessageLengthOverflowed(len))?
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + len);
        buf.resize(HEADER_LEN, 0);
        LittleEndian::write_u32(&mut buf[..HEADER_LEN], len as u32);
        buf.extend_from_slice(payload);
        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn send_directive(&mut self, msg: &Directive) -> Result<()> {
        self.send(&msg.encode()?).await
    }

    pub async fn send_result(&mut self, msg: &WorkResult) -> Result<()> {
        self.send(&msg.encode()?).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Reads length-prefixed frames, however the bytes happen to be split up by
/// the transport.
pub struct FrameReader<R> {
    inner: R,
    max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            max_frame_len,
        }
    }

    /// Returns the next frame's payload, or `None` if the peer closed the
    /// connection cleanly between frames.
    pub async fn receive(&mut self) -> Result<Option<AlignedVec>> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.inner.read(&mut header[filled..]).await?;
            if n == 0 {
                return match filled {
                    0 => Ok(None),
                    _ => Err(Error::TruncatedFrame),
                };
            }
            filled += n;
        }

        let len = LittleEndian::read_u32(&header) as usize;
        if len > self.max_frame_len {
            Err(Error::MessageLengthOverflowed(len))?
        }

        // archives have to be aligned before they can be validated
        let mut buf = AlignedVec::with_capacity(len);
        buf.resize(len, 0);
        let mut filled = 0;
        while filled < len {
            let n = self.inner.read(&mut buf.as_mut_slice()[filled..]).await?;
            if n == 0 {
                Err(Error::TruncatedFrame)?
            }
            filled += n;
        }
        Ok(Some(buf))
    }

    pub async fn receive_directive(&mut self) -> Result<Option<Directive>> {
        match self.receive().await? {
            Some(buf) => Directive::decode(&buf).map(Some),
            None => Ok(None),
        }
    }

    pub async fn receive_result(&mut self) -> Result<Option<WorkResult>> {
        match self.receive().await? {
            Some(buf) => WorkResult::decode(&buf).map(Some),
            None => Ok(None),
        }
    }
}
