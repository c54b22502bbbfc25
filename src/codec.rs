//! Little-endian binary codec shared by blocks and transactions.
//!
//! Layout rules:
//! - integers are fixed-width little-endian
//! - strings are a 4-byte little-endian length followed by the raw UTF-8 bytes
//!
//! Lengths are bounded by the 4-byte prefix, so individual strings must stay
//! below 4 GiB.

use thiserror::Error;

/// Errors produced while decoding stored bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),
    #[error("invalid {what} length {len} ({remaining} bytes remaining)")]
    InvalidLength {
        what: &'static str,
        len: usize,
        remaining: usize,
    },
    #[error("malformed transaction: {0}")]
    MalformedTransaction(Box<CodecError>),
    #[error("block carries no transactions")]
    EmptyBlock,
}

/// Types with a fixed binary representation.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types that can be read back from their binary representation.
pub trait Decode: Sized {
    /// Decodes a value, advancing `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, CodecError>;

    /// Decodes a value that must span the whole buffer.
    fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::TrailingBytes(input.len()));
        }
        Ok(value)
    }
}

/// Reads exactly `n` bytes, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if input.len() < n {
        return Err(CodecError::UnexpectedEof {
            needed: n,
            remaining: input.len(),
        });
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(read_bytes(input, N)?);
    Ok(buf)
}

pub fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Writes a length prefix for a collection or byte run.
pub fn put_len(out: &mut Vec<u8>, len: usize) {
    put_u32(out, len as u32);
}

pub fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

pub fn get_u32(input: &mut &[u8]) -> Result<u32, CodecError> {
    Ok(u32::from_le_bytes(read_array(input)?))
}

pub fn get_i32(input: &mut &[u8]) -> Result<i32, CodecError> {
    Ok(i32::from_le_bytes(read_array(input)?))
}

pub fn get_i64(input: &mut &[u8]) -> Result<i64, CodecError> {
    Ok(i64::from_le_bytes(read_array(input)?))
}

/// Reads a length prefix and checks that at least `min_item_size * len`
/// bytes remain, so a corrupted count cannot trigger a huge allocation.
pub fn get_len(
    input: &mut &[u8],
    what: &'static str,
    min_item_size: usize,
) -> Result<usize, CodecError> {
    let len = get_u32(input)? as usize;
    if len.saturating_mul(min_item_size) > input.len() {
        return Err(CodecError::InvalidLength {
            what,
            len,
            remaining: input.len(),
        });
    }
    Ok(len)
}

pub fn get_str(input: &mut &[u8]) -> Result<String, CodecError> {
    let len = get_u32(input)? as usize;
    let bytes = read_bytes(input, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_is_length_prefixed_little_endian() {
        let mut out = Vec::new();
        put_str(&mut out, "abc");
        assert_eq!(out, vec![3, 0, 0, 0, b'a', b'b', b'c']);

        let mut input = out.as_slice();
        assert_eq!(get_str(&mut input).unwrap(), "abc");
        assert!(input.is_empty());
    }

    #[test]
    fn short_string_body_is_eof() {
        let data = [5u8, 0, 0, 0, b'a', b'b'];
        let mut input = &data[..];
        assert_eq!(
            get_str(&mut input),
            Err(CodecError::UnexpectedEof {
                needed: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let data = [2u8, 0, 0, 0, 0xff, 0xfe];
        let mut input = &data[..];
        assert_eq!(get_str(&mut input), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn oversized_count_is_rejected_before_allocating() {
        let mut out = Vec::new();
        put_u32(&mut out, u32::MAX);
        let mut input = out.as_slice();
        assert!(matches!(
            get_len(&mut input, "input", 4),
            Err(CodecError::InvalidLength { .. })
        ));
    }

    #[test]
    fn signed_integers_keep_sign() {
        let mut out = Vec::new();
        put_i32(&mut out, -1);
        put_i64(&mut out, i64::MIN);
        let mut input = out.as_slice();
        assert_eq!(get_i32(&mut input).unwrap(), -1);
        assert_eq!(get_i64(&mut input).unwrap(), i64::MIN);
    }
}
