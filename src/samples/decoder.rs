//! Assembled buffer → typed sample groups.

use super::layout::{SampleLayout, SAMPLE_SIZE};
use super::measurement::{DecodedMeasurement, SampleGroup, SummaryStats};
use super::registry::{DecodePath, PayloadParser, ProtocolRegistry};
use crate::assembly::AssembledBuffer;
use crate::frame::FormatError;

/// Decodes completed cycles using a [`ProtocolRegistry`].
///
/// # Example
///
/// ```
/// use multipacket_ble::assembly::AssembledBuffer;
/// use multipacket_ble::frame::{DeviceId, VERSION_RAW};
/// use multipacket_ble::samples::{ProtocolRegistry, SampleDecoder};
///
/// let decoder = SampleDecoder::new(ProtocolRegistry::default());
/// let buffer = AssembledBuffer {
///     device: DeviceId::new("AA:BB:CC:DD:EE:FF"),
///     cycle_id: 1,
///     version: VERSION_RAW,
///     packet_count: 14,
///     declared_len: 168,
///     bytes: [0x05, 0x91].repeat(84),
/// };
/// let measurement = decoder.decode(&buffer).unwrap();
/// assert_eq!(measurement.sample_count(), 84);
/// assert_eq!(measurement.groups[0].samples[0], 1425);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleDecoder {
    registry: ProtocolRegistry,
}

impl SampleDecoder {
    /// Create a decoder over a registry.
    pub fn new(registry: ProtocolRegistry) -> Self {
        Self { registry }
    }

    /// Get the registry.
    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    /// Decode an assembled buffer.
    pub fn decode(&self, buffer: &AssembledBuffer) -> Result<DecodedMeasurement, FormatError> {
        let groups = match self.registry.path(buffer.version) {
            Some(DecodePath::Layout(layout)) => decode_layout(layout, &buffer.bytes)?,
            Some(DecodePath::Custom(parser)) => decode_custom(parser.as_ref(), &buffer.bytes)?,
            None => return Err(FormatError::UnsupportedVersion(buffer.version)),
        };

        let reference_span = match self.registry.path(buffer.version) {
            Some(DecodePath::Layout(layout)) => reference_span(layout, &groups),
            _ => None,
        };

        let all: Vec<i16> = groups
            .iter()
            .flat_map(|g| g.samples.iter().copied())
            .collect();

        Ok(DecodedMeasurement {
            device: buffer.device.clone(),
            cycle_id: buffer.cycle_id,
            version: buffer.version,
            byte_len: buffer.bytes.len(),
            overall: SummaryStats::from_samples(&all),
            groups,
            reference_span,
        })
    }
}

/// Split a buffer of big-endian `i16` samples into the layout's groups.
fn decode_layout(layout: &SampleLayout, bytes: &[u8]) -> Result<Vec<SampleGroup>, FormatError> {
    if bytes.len() != layout.byte_len() {
        return Err(FormatError::LengthMismatch {
            expected: layout.byte_len(),
            actual: bytes.len(),
        });
    }

    let mut samples = bytes
        .chunks_exact(SAMPLE_SIZE)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]));

    Ok(layout
        .groups()
        .iter()
        .map(|spec| SampleGroup::new(spec.name, samples.by_ref().take(spec.len).collect()))
        .collect())
}

fn decode_custom(
    parser: &dyn PayloadParser,
    bytes: &[u8],
) -> Result<Vec<SampleGroup>, FormatError> {
    let raw = parser.parse(bytes).map_err(FormatError::Parser)?;
    Ok(raw
        .into_iter()
        .map(|group| SampleGroup::new(group.name, group.samples))
        .collect())
}

fn reference_span(layout: &SampleLayout, groups: &[SampleGroup]) -> Option<f64> {
    let (high, low) = layout.reference()?;
    let mean_of = |name: &str| {
        groups
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.stats)
            .map(|s| s.mean)
    };
    Some(mean_of(high)? - mean_of(low)?)
}
