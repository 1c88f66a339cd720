//! ## Block Data
//!
//! IEEE-488.2 definite length arbitrary block data:
//!
//! ```text
//! #<digits><count><count bytes of payload>\n
//! ```
//!
//! `digits` is a single ASCII digit giving the width of the decimal `count`
//! field. The helpers below validate each piece separately so that a block can
//! be decoded while it is still being read from the instrument.
//!

use crate::error::{Error, Result};

/// The first byte of every block
pub const BLOCK_MARKER: u8 = b'#';
/// The byte following the payload
pub const BLOCK_TERMINATOR: u8 = b'\n';

fn malformed(reason: String) -> Error {
    Error::MalformedBlockData(reason)
}

/// ### Block
///
/// A decoded block: the `#<digits><count>` header as sent by the instrument and
/// the payload without its terminator.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Vec<u8>,
    pub data: Vec<u8>,
}

/// Parse the two byte `#<digits>` prefix and return `digits`.
pub fn parse_digit_count(prefix: &[u8]) -> Result<usize> {
    match prefix {
        [BLOCK_MARKER, digit @ b'1'..=b'9'] => Ok(usize::from(digit - b'0')),
        [BLOCK_MARKER, other] => Err(malformed(format!(
            "digit count {:?} is not in 1..=9",
            char::from(*other)
        ))),
        [marker, _] => Err(malformed(format!(
            "block starts with {:#04x} instead of '#'",
            marker
        ))),
        _ => Err(malformed(format!(
            "block prefix is {} bytes, expected 2",
            prefix.len()
        ))),
    }
}

/// Parse the decimal payload length field.
pub fn parse_length(field: &[u8]) -> Result<usize> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(malformed(format!("length field {:02x?} is not decimal", field)));
    }

    field.iter().try_fold(0usize, |count, digit| {
        count
            .checked_mul(10)
            .and_then(|c| c.checked_add(usize::from(digit - b'0')))
            .ok_or_else(|| malformed("length field overflows".to_string()))
    })
}

/// Check `payload` is `count` bytes followed by the terminator and return the
/// bytes without it.
pub fn strip_terminator(mut payload: Vec<u8>, count: usize) -> Result<Vec<u8>> {
    let expected = count
        .checked_add(1)
        .ok_or_else(|| malformed(format!("declared {} payload bytes", count)))?;
    if payload.len() != expected {
        return Err(malformed(format!(
            "declared {} payload bytes, received {}",
            count,
            payload.len().saturating_sub(1)
        )));
    }
    if payload.last() != Some(&BLOCK_TERMINATOR) {
        return Err(malformed("payload is not terminated by a newline".to_string()));
    }

    payload.pop();
    Ok(payload)
}

/// Encode `data` as a block, terminator included.
pub fn encode_block(data: &[u8]) -> Vec<u8> {
    let count = data.len().to_string();

    let mut block = Vec::with_capacity(2 + count.len() + data.len() + 1);
    block.push(BLOCK_MARKER);
    block.push(b'0' + count.len() as u8);
    block.extend_from_slice(count.as_bytes());
    block.extend_from_slice(data);
    block.push(BLOCK_TERMINATOR);
    block
}

/// Decode a complete block held in memory.
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let digits = parse_digit_count(bytes.get(..2).unwrap_or(bytes))?;
    let length_field = bytes
        .get(2..2 + digits)
        .ok_or_else(|| malformed("block ends inside the length field".to_string()))?;
    let count = parse_length(length_field)?;

    let data = strip_terminator(bytes[2 + digits..].to_vec(), count)?;

    Ok(Block {
        header: bytes[..2 + digits].to_vec(),
        data,
    })
}
