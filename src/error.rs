use std::{fmt, io};

use tokio::task::JoinError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The worker couldn't reach the master.
    Connect { addr: String, source: io::Error },
    /// The peer closed the connection while we were waiting on a message.
    ConnectionClosed,
    /// The peer closed the connection part way through a frame.
    TruncatedFrame,
    MessageLengthOverflowed(usize),
    CouldNotEncodeMessage,
    CouldNotDecodeMessage,
    /// A worker reported a tour or distance the master doesn't agree with.
    InvalidResult(String),
    TooManyCities(usize),
    InvalidConfig(&'static str),
    TaskFailed(JoinError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Connect { addr, source } => {
                write!(f, "could not connect to master at {}: {}", addr, source)
            }
            Error::ConnectionClosed => write!(f, "connection closed by peer"),
            Error::TruncatedFrame => {
                write!(f, "connection closed in the middle of a frame")
            }
            Error::MessageLengthOverflowed(len) => {
                write!(f, "frame of {} bytes exceeds the allowed length", len)
            }
            Error::CouldNotEncodeMessage => write!(f, "could not encode message"),
            Error::CouldNotDecodeMessage => write!(f, "could not decode message"),
            Error::InvalidResult(reason) => {
                write!(f, "worker sent an invalid result: {}", reason)
            }
            Error::TooManyCities(n) => write!(
                f,
                "{} cities is more than the permutation space can index",
                n
            ),
            Error::InvalidConfig(reason) => {
                write!(f, "invalid configuration: {}", reason)
            }
            Error::TaskFailed(e) => write!(f, "task failed: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Connect { source, .. } => Some(source),
            Error::TaskFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Self::TaskFailed(e)
    }
}
