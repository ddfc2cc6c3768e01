use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 65432;
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Runtime settings shared by the master and its workers. Built once at
/// startup and handed to [`crate::master::Master::new`] or
/// [`crate::worker::Worker::new`].
#[derive(TypedBuilder, Clone, Debug)]
pub struct Config {
    /// Host the master listens on and workers connect to.
    #[builder(default = String::from("127.0.0.1"), setter(into))]
    pub host: String,
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
    /// Number of permutations handed to a worker per request.
    #[builder(default = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,
    /// How often the master logs its progress.
    #[builder(default = DEFAULT_REPORT_INTERVAL)]
    pub report_interval: Duration,
    /// Largest frame either side will accept.
    #[builder(default = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

impl Config {
    /// `host:port`, as accepted by tokio's `ToSocketAddrs`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            Err(Error::InvalidConfig("chunk size must be at least 1"))?
        }
        if self.report_interval.is_zero() {
            Err(Error::InvalidConfig("report interval must be non-zero"))?
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            Err(Error::InvalidConfig(
                "max frame length must fit in a 32-bit header",
            ))?
        }
        Ok(())
    }
}
