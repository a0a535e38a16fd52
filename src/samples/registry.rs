//! Protocol version registry.
//!
//! Maps a protocol version byte to either a [`SampleLayout`] or a custom
//! [`PayloadParser`]. The frame decoder consults it to decide which versions
//! are accepted at all; the sample decoder uses it to pick a decode path.

use super::layout::SampleLayout;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// A named run of samples produced by a custom parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGroup {
    /// Group name.
    pub name: String,
    /// Decoded samples.
    pub samples: Vec<i16>,
}

impl RawGroup {
    /// Create a raw group.
    pub fn new(name: impl Into<String>, samples: Vec<i16>) -> Self {
        Self {
            name: name.into(),
            samples,
        }
    }
}

/// Alternate decoder for non-standard payloads.
///
/// Receives the full assembled buffer; returns the sample groups or a
/// description of why the buffer could not be parsed.
pub trait PayloadParser: Send + Sync {
    /// Parse an assembled buffer.
    fn parse(&self, data: &[u8]) -> Result<Vec<RawGroup>, String>;
}

impl<F> PayloadParser for F
where
    F: Fn(&[u8]) -> Result<Vec<RawGroup>, String> + Send + Sync,
{
    fn parse(&self, data: &[u8]) -> Result<Vec<RawGroup>, String> {
        self(data)
    }
}

/// How a given version is decoded.
#[derive(Clone)]
pub enum DecodePath {
    /// Fixed layout of big-endian `i16` groups.
    Layout(Arc<SampleLayout>),
    /// Registered custom parser.
    Custom(Arc<dyn PayloadParser>),
}

impl std::fmt::Debug for DecodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layout(layout) => f.debug_tuple("Layout").field(layout).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Registry of decode paths keyed by protocol version byte.
///
/// The default registry knows the raw capacitive-sense layout (`0xDD`).
///
/// # Example
///
/// ```
/// use multipacket_ble::samples::{ProtocolRegistry, RawGroup};
///
/// let mut registry = ProtocolRegistry::default();
/// registry.register_parser(0xA0, |data: &[u8]| {
///     Ok(vec![RawGroup::new("bytes", data.iter().map(|&b| i16::from(b)).collect())])
/// });
/// assert!(registry.supports(0xDD));
/// assert!(registry.supports(0xA0));
/// assert!(!registry.supports(0x01));
/// ```
#[derive(Clone, Debug)]
pub struct ProtocolRegistry {
    paths: HashMap<u8, DecodePath>,
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_layout(SampleLayout::raw_captouch());
        registry
    }
}

impl ProtocolRegistry {
    /// Create a registry that accepts no versions.
    pub fn empty() -> Self {
        Self {
            paths: HashMap::new(),
        }
    }

    /// Register (or replace) the layout for its version.
    pub fn register_layout(&mut self, layout: SampleLayout) -> &mut Self {
        info!(
            "Registered layout for version 0x{:02X} ({} samples)",
            layout.version(),
            layout.sample_count()
        );
        self.paths
            .insert(layout.version(), DecodePath::Layout(Arc::new(layout)));
        self
    }

    /// Register (or replace) a parser function for a version.
    pub fn register_parser<F>(&mut self, version: u8, parser: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<Vec<RawGroup>, String> + Send + Sync + 'static,
    {
        self.register_payload_parser(version, Arc::new(parser))
    }

    /// Register (or replace) a shared [`PayloadParser`] for a version.
    pub fn register_payload_parser(
        &mut self,
        version: u8,
        parser: Arc<dyn PayloadParser>,
    ) -> &mut Self {
        info!("Registered parser for version 0x{:02X}", version);
        self.paths.insert(version, DecodePath::Custom(parser));
        self
    }

    /// Check whether a version can be decoded.
    pub fn supports(&self, version: u8) -> bool {
        self.paths.contains_key(&version)
    }

    /// Look up the decode path for a version.
    pub fn path(&self, version: u8) -> Option<&DecodePath> {
        self.paths.get(&version)
    }

    /// Registered versions, sorted.
    pub fn versions(&self) -> Vec<u8> {
        let mut versions: Vec<u8> = self.paths.keys().copied().collect();
        versions.sort_unstable();
        versions
    }
}
