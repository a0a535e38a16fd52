//! Decoded measurement records.

use crate::frame::DeviceId;
use serde::Serialize;

/// Summary statistics over a run of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStats {
    /// Smallest sample.
    pub min: i16,
    /// Largest sample.
    pub max: i16,
    /// Arithmetic mean.
    pub mean: f64,
    /// `max - min` (widened so it cannot overflow).
    pub range: i32,
}

impl SummaryStats {
    /// Compute statistics; `None` for an empty slice.
    pub fn from_samples(samples: &[i16]) -> Option<Self> {
        let first = *samples.first()?;
        let (mut min, mut max, mut sum) = (first, first, 0i64);
        for &s in samples {
            min = min.min(s);
            max = max.max(s);
            sum += i64::from(s);
        }
        Some(Self {
            min,
            max,
            mean: sum as f64 / samples.len() as f64,
            range: i32::from(max) - i32::from(min),
        })
    }
}

/// A named group of decoded samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleGroup {
    /// Group name.
    pub name: String,
    /// Samples in buffer order.
    pub samples: Vec<i16>,
    /// Statistics over `samples` (`None` if the group is empty).
    pub stats: Option<SummaryStats>,
}

impl SampleGroup {
    /// Create a group and compute its statistics.
    pub fn new(name: impl Into<String>, samples: Vec<i16>) -> Self {
        let stats = SummaryStats::from_samples(&samples);
        Self {
            name: name.into(),
            samples,
            stats,
        }
    }
}

/// A completed, decoded measurement cycle.
///
/// Produced once per completed cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMeasurement {
    /// Sending device.
    pub device: DeviceId,
    /// Cycle identifier.
    pub cycle_id: u16,
    /// Protocol version.
    pub version: u8,
    /// Length of the assembled buffer in bytes.
    pub byte_len: usize,
    /// Sample groups in buffer order.
    pub groups: Vec<SampleGroup>,
    /// Statistics over every sample of every group.
    pub overall: Option<SummaryStats>,
    /// Difference of the reference group means, when the layout names a pair.
    pub reference_span: Option<f64>,
}

impl DecodedMeasurement {
    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&SampleGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Total number of samples across groups.
    pub fn sample_count(&self) -> usize {
        self.groups.iter().map(|g| g.samples.len()).sum()
    }

    /// All samples in buffer order.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.groups.iter().flat_map(|g| g.samples.iter().copied())
    }
}
