//! Monitoring surface.
//!
//! Only built with the `stats-server` feature.

mod stats_server;

pub use stats_server::{StatsServer, DEFAULT_STATS_PORT};
