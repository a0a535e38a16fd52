//! Fixed-layout advertisement header parsing.
//!
//! # Wire Format
//!
//! Offsets are relative to the start of the manufacturer-specific section:
//! ```text
//! [version:1][reserved:7][cycle_id:2 LE][reserved:1][index:1][reserved:1][count:1][payload:12]
//! ```
//!
//! The payload carries six big-endian `i16` samples. Bytes past the fixed
//! payload length are ignored.
//!
//! # Example
//!
//! ```
//! use multipacket_ble::frame::{decode_header, Frame, VERSION_RAW};
//! use multipacket_ble::samples::ProtocolRegistry;
//!
//! let frame = Frame::new(VERSION_RAW, 1000, 3, 14, vec![0x05, 0x91]);
//! let parsed = decode_header(&frame.to_bytes(), &ProtocolRegistry::default()).unwrap();
//! assert_eq!(parsed.cycle_id, 1000);
//! assert_eq!(parsed.index, 3);
//! ```

use crate::samples::{DecodePath, ProtocolRegistry};

/// Protocol version byte for the standard raw sample mode.
pub const VERSION_RAW: u8 = 0xDD;

/// Fixed header length in bytes (everything before the payload).
pub const HEADER_LEN: usize = 14;

/// Fixed payload length per packet in bytes.
pub const PAYLOAD_LEN: usize = 12;

/// Full advertisement length (header plus payload).
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_LEN;

const VERSION_OFFSET: usize = 0;
const CYCLE_ID_OFFSET: usize = 8;
const INDEX_OFFSET: usize = 11;
const COUNT_OFFSET: usize = 13;

/// Errors produced while decoding advertisements or assembled buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Input is shorter than the fixed header.
    Truncated {
        /// Bytes received.
        len: usize,
        /// Minimum bytes required.
        min: usize,
    },
    /// No layout or parser is registered for this version byte.
    UnsupportedVersion(u8),
    /// Declared packet count disagrees with the version's fixed layout.
    CountMismatch {
        /// Count carried by the packet.
        declared: u8,
        /// Count the layout requires.
        expected: u8,
    },
    /// Assembled buffer length does not match what the protocol declares.
    LengthMismatch {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },
    /// A custom payload parser rejected the buffer.
    Parser(String),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { len, min } => {
                write!(f, "frame truncated: {} bytes (minimum: {})", len, min)
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported protocol version 0x{:02X}", v),
            Self::CountMismatch { declared, expected } => write!(
                f,
                "packet count {} does not match layout ({} packets)",
                declared, expected
            ),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch: expected {} bytes, got {}", expected, actual)
            }
            Self::Parser(msg) => write!(f, "payload parser failed: {}", msg),
        }
    }
}

impl std::error::Error for FormatError {}

/// A single decoded advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol version byte.
    pub version: u8,
    /// Measurement cycle identifier.
    pub cycle_id: u16,
    /// Zero-based packet index within the cycle.
    pub index: u8,
    /// Number of packets making up the cycle.
    pub count: u8,
    /// Payload body (at most [`PAYLOAD_LEN`] bytes).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(version: u8, cycle_id: u16, index: u8, count: u8, payload: Vec<u8>) -> Self {
        Self {
            version,
            cycle_id,
            index,
            count,
            payload,
        }
    }

    /// Serialize to the wire layout. Reserved bytes are written as zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[VERSION_OFFSET] = self.version;
        bytes[CYCLE_ID_OFFSET..CYCLE_ID_OFFSET + 2].copy_from_slice(&self.cycle_id.to_le_bytes());
        bytes[INDEX_OFFSET] = self.index;
        bytes[COUNT_OFFSET] = self.count;
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Parse the fixed header without checking the version byte.
pub fn parse_frame(raw: &[u8]) -> Result<Frame, FormatError> {
    if raw.len() < HEADER_LEN {
        return Err(FormatError::Truncated {
            len: raw.len(),
            min: HEADER_LEN,
        });
    }

    let body_end = raw.len().min(FRAME_LEN);
    Ok(Frame {
        version: raw[VERSION_OFFSET],
        cycle_id: u16::from_le_bytes([raw[CYCLE_ID_OFFSET], raw[CYCLE_ID_OFFSET + 1]]),
        index: raw[INDEX_OFFSET],
        count: raw[COUNT_OFFSET],
        payload: raw[HEADER_LEN..body_end].to_vec(),
    })
}

/// Decode an advertisement, accepting only versions the registry knows.
///
/// Versions with a fixed layout also pin the packet count.
///
/// Pure and stateless; safe to call from any number of ingestion paths.
pub fn decode_header(raw: &[u8], registry: &ProtocolRegistry) -> Result<Frame, FormatError> {
    let frame = parse_frame(raw)?;
    match registry.path(frame.version) {
        None => Err(FormatError::UnsupportedVersion(frame.version)),
        Some(DecodePath::Layout(layout)) if layout.packet_count() != frame.count => {
            Err(FormatError::CountMismatch {
                declared: frame.count,
                expected: layout.packet_count(),
            })
        }
        Some(_) => Ok(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_packet(cycle_id: u16, index: u8, count: u8) -> Vec<u8> {
        let mut raw = vec![0u8; FRAME_LEN];
        raw[0] = VERSION_RAW;
        raw[1..8].copy_from_slice(&[0xAA; 7]);
        raw[8..10].copy_from_slice(&cycle_id.to_le_bytes());
        raw[11] = index;
        raw[13] = count;
        raw[14..26].copy_from_slice(&[
            0x05, 0x91, 0x05, 0x90, 0x05, 0x93, 0x05, 0x91, 0x05, 0x94, 0x05, 0x90,
        ]);
        raw
    }

    #[test]
    fn test_decode_fields_at_fixed_offsets() {
        let registry = ProtocolRegistry::default();
        let frame = decode_header(&raw_packet(0x03E8, 7, 14), &registry).unwrap();

        assert_eq!(frame.version, VERSION_RAW);
        assert_eq!(frame.cycle_id, 1000);
        assert_eq!(frame.index, 7);
        assert_eq!(frame.count, 14);
        assert_eq!(frame.payload.len(), PAYLOAD_LEN);
        assert_eq!(&frame.payload[..2], &[0x05, 0x91]);
    }

    #[test]
    fn test_cycle_id_is_little_endian() {
        let raw = raw_packet(0x1234, 0, 14);
        assert_eq!(raw[8], 0x34);
        assert_eq!(raw[9], 0x12);
        assert_eq!(parse_frame(&raw).unwrap().cycle_id, 0x1234);
    }

    #[test]
    fn test_truncated_input() {
        let raw = raw_packet(1, 0, 14);
        let result = parse_frame(&raw[..HEADER_LEN - 1]);
        assert_eq!(
            result,
            Err(FormatError::Truncated {
                len: HEADER_LEN - 1,
                min: HEADER_LEN
            })
        );
        assert!(matches!(parse_frame(&[]), Err(FormatError::Truncated { len: 0, .. })));
    }

    #[test]
    fn test_header_only_has_empty_payload() {
        let raw = raw_packet(1, 0, 14);
        let frame = parse_frame(&raw[..HEADER_LEN]).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut raw = raw_packet(1, 0, 14);
        raw.extend_from_slice(&[0xFF; 4]);
        let frame = parse_frame(&raw).unwrap();
        assert_eq!(frame.payload.len(), PAYLOAD_LEN);
        assert_eq!(frame.payload[PAYLOAD_LEN - 1], 0x90);
    }

    #[test]
    fn test_unsupported_version() {
        let mut raw = raw_packet(1, 0, 14);
        raw[0] = 0x42;
        let result = decode_header(&raw, &ProtocolRegistry::default());
        assert_eq!(result, Err(FormatError::UnsupportedVersion(0x42)));
    }

    #[test]
    fn test_layout_pins_packet_count() {
        let registry = ProtocolRegistry::default();
        assert_eq!(
            decode_header(&raw_packet(1, 0, 12), &registry),
            Err(FormatError::CountMismatch {
                declared: 12,
                expected: 14
            })
        );

        // Custom parsers accept any count
        let mut registry = ProtocolRegistry::default();
        registry.register_parser(0xA0, |_: &[u8]| Ok(Vec::new()));
        let mut raw = raw_packet(1, 0, 3);
        raw[0] = 0xA0;
        assert_eq!(decode_header(&raw, &registry).unwrap().count, 3);
    }

    #[test]
    fn test_to_bytes_matches_wire_layout() {
        let frame = Frame::new(VERSION_RAW, 1000, 3, 14, vec![1, 2, 3]);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        assert_eq!(bytes[0], VERSION_RAW);
        assert_eq!(&bytes[8..10], &1000u16.to_le_bytes());
        assert_eq!(bytes[11], 3);
        assert_eq!(bytes[13], 14);
        assert_eq!(&bytes[HEADER_LEN..], &[1, 2, 3]);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FormatError::UnsupportedVersion(0x42).to_string(),
            "unsupported protocol version 0x42"
        );
        assert_eq!(
            FormatError::Truncated { len: 3, min: 14 }.to_string(),
            "frame truncated: 3 bytes (minimum: 14)"
        );
    }
}
