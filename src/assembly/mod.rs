//! Measurement cycle reassembly.
//!
//! This module provides:
//! - [`CycleAssembler`]: per (device, cycle id) accumulation of unique packets

mod cycle;

pub use cycle::{
    AssembledBuffer, CycleAssembler, CycleOutcome, CycleProgress, ExpiredCycle, RejectReason,
};
