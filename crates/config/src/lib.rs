//! Configuration parameters for the eventide sync core.

mod config;
pub mod defaults;
mod params;

pub use config::{Ordering, Source, SyncConfig};
pub use params::ChainParams;
