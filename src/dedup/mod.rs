//! Retransmission filtering.
//!
//! This module provides:
//! - [`DuplicateFilter`]: time-windowed set of seen packet keys

mod filter;

pub use filter::{DuplicateFilter, FilterEntry};
