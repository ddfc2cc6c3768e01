// The master owns the permutation space and hands it out in fixed-size
// ranges. Workers never see more of the problem than the range they're
// currently scoring plus the distance matrix that comes with it, so any
// number of them can be attached to a single master without sharing state
// with one another.
//
// All cross-connection state lives behind one lock inside the master. Every
// critical section is index arithmetic or a single comparison; network IO
// always happens outside of it.

pub mod cities;
pub mod config;
pub mod error;
#[cfg(feature = "master")]
pub mod master;
pub mod matrix;
pub mod partition;
pub mod tour;
pub mod wire;
#[cfg(feature = "worker")]
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
