//! Advertisement frame decoding.
//!
//! This module provides:
//! - [`decode_header`]: parse a raw advertisement into a [`Frame`]
//! - [`PacketKey`]: identity of one logical packet across retransmissions
//! - [`DeviceId`]: sender identity

mod header;
mod key;

pub use header::{
    decode_header, parse_frame, FormatError, Frame, FRAME_LEN, HEADER_LEN, PAYLOAD_LEN,
    VERSION_RAW,
};
pub use key::{DeviceId, PacketKey};
