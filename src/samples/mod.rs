//! Sample decoding for completed cycles.
//!
//! This module contains:
//! - [`SampleLayout`]: per-version group layouts
//! - [`ProtocolRegistry`]: version byte → layout or custom parser
//! - [`SampleDecoder`]: assembled buffer → [`DecodedMeasurement`]

mod decoder;
mod layout;
mod measurement;
mod registry;

pub use decoder::SampleDecoder;
pub use layout::{GroupSpec, LayoutError, SampleLayout, SAMPLE_SIZE};
pub use measurement::{DecodedMeasurement, SampleGroup, SummaryStats};
pub use registry::{DecodePath, PayloadParser, ProtocolRegistry, RawGroup};
