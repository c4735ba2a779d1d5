//! Canonical binary codec.
//!
//! Every hashed identity in the chain is the SHA-256 of a canonical encoding,
//! so this codec is the single source of truth for object identity. The rules
//! are fixed: counters and other fixed-width integers are little-endian,
//! byte strings and sequences carry an 8-byte little-endian length prefix,
//! currency values are length-prefixed big-endian (see `currency`). Decoding
//! a top-level object rejects trailing bytes.

use crate::error::{ConsensusError, Result, StructuralError};

/// Types with a canonical binary form. The encoding must be injective over
/// valid values: two distinct values never share an encoding.
pub trait CanonicalEncode {
    fn encode(&self, buf: &mut Vec<u8>);

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Types reconstructible from their canonical binary form.
pub trait CanonicalDecode: Sized {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;
}

/// Decode a complete top-level object, rejecting trailing bytes.
pub fn from_canonical_bytes<T: CanonicalDecode>(bytes: &[u8]) -> Result<T> {
    let mut dec = Decoder::new(bytes);
    let value = T::decode(&mut dec)?;
    dec.finish()?;
    Ok(value)
}

/// Cursor over a byte slice being decoded.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Decoder<'a> {
        Decoder { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ConsensusError::Structural(StructuralError::UnexpectedEof));
        }
        let out = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_exact(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_hash(&mut self) -> Result<[u8; 32]> {
        let bytes = self.read_exact(32)?;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(bytes);
        Ok(raw)
    }

    /// Read an 8-byte length prefix, bounds-checked against the remaining
    /// input so a corrupt prefix cannot trigger a huge allocation.
    pub fn read_length(&mut self) -> Result<usize> {
        let len = self.read_u64_le()?;
        if len > self.remaining() as u64 {
            return Err(ConsensusError::Structural(StructuralError::LengthOutOfBounds(len)));
        }
        Ok(len as usize)
    }

    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(ConsensusError::Structural(StructuralError::TrailingBytes));
        }
        Ok(())
    }
}

pub fn encode_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn encode_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Byte string: 8-byte little-endian length prefix, then the raw bytes.
pub fn encode_byte_slice(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_u64(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub fn decode_byte_vec(dec: &mut Decoder<'_>) -> Result<Vec<u8>> {
    let len = dec.read_length()?;
    Ok(dec.read_exact(len)?.to_vec())
}

/// Sequence: 8-byte little-endian element count, then concatenated elements.
pub fn encode_slice<T: CanonicalEncode>(buf: &mut Vec<u8>, items: &[T]) {
    encode_u64(buf, items.len() as u64);
    for item in items {
        item.encode(buf);
    }
}

pub fn decode_vec<T: CanonicalDecode>(dec: &mut Decoder<'_>) -> Result<Vec<T>> {
    let len = dec.read_length()?;
    let mut out = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        out.push(T::decode(dec)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Pair(u64, Vec<u8>);

    impl CanonicalEncode for Pair {
        fn encode(&self, buf: &mut Vec<u8>) {
            encode_u64(buf, self.0);
            encode_byte_slice(buf, &self.1);
        }
    }

    impl CanonicalDecode for Pair {
        fn decode(dec: &mut Decoder<'_>) -> Result<Pair> {
            Ok(Pair(dec.read_u64_le()?, decode_byte_vec(dec)?))
        }
    }

    #[test]
    fn test_round_trip_pair() {
        let pair = Pair(42, vec![1, 2, 3]);
        let bytes = pair.canonical_bytes();
        let back: Pair = from_canonical_bytes(&bytes).unwrap();
        assert_eq!(back.0, 42);
        assert_eq!(back.1, vec![1, 2, 3]);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Pair(1, vec![]).canonical_bytes();
        bytes.push(0xff);
        let result: Result<Pair> = from_canonical_bytes(&bytes);
        assert_eq!(
            result,
            Err(ConsensusError::Structural(StructuralError::TrailingBytes))
        );
    }

    #[test]
    fn test_truncated_input_rejected() {
        let bytes = Pair(1, vec![9; 8]).canonical_bytes();
        // Cutting into the byte string makes its length prefix over-claim.
        let result: Result<Pair> = from_canonical_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            result,
            Err(ConsensusError::Structural(StructuralError::LengthOutOfBounds(_)))
        ));
        // Cutting into the fixed-width integer runs out of input outright.
        let result: Result<Pair> = from_canonical_bytes(&bytes[..4]);
        assert!(matches!(
            result,
            Err(ConsensusError::Structural(StructuralError::UnexpectedEof))
        ));
    }

    #[test]
    fn test_oversize_length_prefix_rejected() {
        // Claims 2^32 bytes follow while only a handful remain.
        let mut bytes = Vec::new();
        encode_u64(&mut bytes, 1u64 << 32);
        bytes.extend_from_slice(&[0u8; 4]);
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.read_length(),
            Err(ConsensusError::Structural(StructuralError::LengthOutOfBounds(_)))
        ));
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = Vec::new();
        encode_u64(&mut buf, 0x0102030405060708);
        assert_eq!(buf, vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }
}
