//! Transport-boundary payload normalization.
//!
//! Scanners and log captures hand payloads over as hex text in a handful of
//! shapes (`0xDD...`, `dd aa bb`, `DD:AA:BB`). The engine only takes bytes,
//! so this is where those shapes are flattened.

/// Error decoding a hex payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// No hex digits at all.
    Empty,
    /// Odd number of hex digits.
    OddLength(usize),
    /// A character that is neither a hex digit nor a separator.
    InvalidDigit {
        /// Byte offset in the input.
        position: usize,
        /// Offending character.
        ch: char,
    },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty payload"),
            Self::OddLength(n) => write!(f, "odd number of hex digits: {}", n),
            Self::InvalidDigit { position, ch } => {
                write!(f, "invalid hex digit {:?} at offset {}", ch, position)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || ch == ':' || ch == '-'
}

/// Decode a hex payload, ignoring `0x` prefixes, whitespace and `:`/`-`
/// separators. Digits are case-insensitive.
///
/// # Example
///
/// ```
/// use multipacket_ble::normalize::payload_from_hex;
///
/// assert_eq!(payload_from_hex("0xDD 05:91").unwrap(), vec![0xDD, 0x05, 0x91]);
/// ```
pub fn payload_from_hex(text: &str) -> Result<Vec<u8>, NormalizeError> {
    let mut nibbles = Vec::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    let mut token_start = true;

    while let Some((position, ch)) = chars.next() {
        if is_separator(ch) {
            token_start = true;
            continue;
        }
        // A prefix only counts at the start of a token
        if token_start && ch == '0' && matches!(chars.peek(), Some((_, 'x' | 'X'))) {
            chars.next();
            token_start = false;
            continue;
        }
        token_start = false;

        let nibble = ch
            .to_digit(16)
            .ok_or(NormalizeError::InvalidDigit { position, ch })?;
        nibbles.push(nibble as u8);
    }

    if nibbles.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if nibbles.len() % 2 != 0 {
        return Err(NormalizeError::OddLength(nibbles.len()));
    }

    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_hex() {
        assert_eq!(payload_from_hex("dd0591").unwrap(), vec![0xDD, 0x05, 0x91]);
        assert_eq!(payload_from_hex("DD0591").unwrap(), vec![0xDD, 0x05, 0x91]);
    }

    #[test]
    fn test_separators_and_prefixes() {
        let expected = vec![0xDD, 0xAA, 0x0B];
        assert_eq!(payload_from_hex("0xDDAA0B").unwrap(), expected);
        assert_eq!(payload_from_hex("DD:AA:0B").unwrap(), expected);
        assert_eq!(payload_from_hex("dd-aa-0b").unwrap(), expected);
        assert_eq!(payload_from_hex("  0xdd 0xaa\t0x0b\n").unwrap(), expected);
    }

    #[test]
    fn test_zero_inside_token_is_a_digit() {
        // "0x" mid-token would be invalid, not a prefix
        assert_eq!(
            payload_from_hex("100x"),
            Err(NormalizeError::InvalidDigit {
                position: 3,
                ch: 'x'
            })
        );
        assert_eq!(payload_from_hex("00").unwrap(), vec![0x00]);
    }

    #[test]
    fn test_empty() {
        assert_eq!(payload_from_hex(""), Err(NormalizeError::Empty));
        assert_eq!(payload_from_hex(" : - "), Err(NormalizeError::Empty));
        assert_eq!(payload_from_hex("0x"), Err(NormalizeError::Empty));
    }

    #[test]
    fn test_odd_length() {
        assert_eq!(payload_from_hex("dd0"), Err(NormalizeError::OddLength(3)));
    }

    #[test]
    fn test_invalid_digit() {
        assert_eq!(
            payload_from_hex("dd zz"),
            Err(NormalizeError::InvalidDigit {
                position: 3,
                ch: 'z'
            })
        );
    }

    #[test]
    fn test_full_advertisement() {
        let text = "DD AA BB CC DD EE FF 00 E8 03 00 00 00 0E 05 91 00 00 00 00 00 00 00 00 00 00";
        let bytes = payload_from_hex(text).unwrap();
        assert_eq!(bytes.len(), 26);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 1000);
        assert_eq!(bytes[13], 14);
        assert_eq!(&bytes[14..16], &[0x05, 0x91]);
    }
}
