//! Result of a single ingestion call.

use crate::assembly::RejectReason;
use crate::frame::FormatError;
use crate::samples::DecodedMeasurement;
use std::sync::Arc;

/// What happened to one advertisement.
///
/// Every ingestion returns one of these; nothing is raised past the engine.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "outcomes report duplicates, rejections and completions"]
pub enum Outcome {
    /// The advertisement could not be decoded and was dropped.
    Invalid(FormatError),
    /// Retransmission of a packet already seen.
    Duplicate,
    /// Unique packet the assembler refused.
    Rejected(RejectReason),
    /// Unique packet stored; the cycle is still incomplete.
    Accumulating {
        /// Unique packets stored so far.
        received: u8,
        /// Declared packet count.
        expected: u8,
    },
    /// This packet completed its cycle.
    Complete(Arc<DecodedMeasurement>),
    /// This packet completed its cycle, but the buffer could not be decoded.
    Malformed(FormatError),
}

impl Outcome {
    /// Check if this outcome completed a cycle.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Check if the packet was a retransmission.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }

    /// Get the decoded measurement, if this outcome completed a cycle.
    pub fn measurement(&self) -> Option<&Arc<DecodedMeasurement>> {
        match self {
            Self::Complete(measurement) => Some(measurement),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "invalid: {}", e),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Rejected(reason) => write!(f, "rejected: {}", reason),
            Self::Accumulating { received, expected } => {
                write!(f, "accumulating {}/{}", received, expected)
            }
            Self::Complete(m) => write!(
                f,
                "complete: cycle {} ({} samples)",
                m.cycle_id,
                m.sample_count()
            ),
            Self::Malformed(e) => write!(f, "malformed: {}", e),
        }
    }
}
