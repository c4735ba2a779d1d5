//! Unsigned currency amounts.
//!
//! One `Currency` type covers both coin values and blockstake counts. The
//! canonical encoding is a big-endian byte string with leading zeros trimmed,
//! carried under the usual length prefix; the all-zero value encodes as the
//! empty string. Arithmetic is checked: underflow and overflow surface as
//! `None` rather than wrapping, and validation maps them to typed errors.

use crate::encoding::{encode_byte_slice, CanonicalDecode, CanonicalEncode, Decoder};
use crate::error::{ConsensusError, Result, StructuralError};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency(U256);

impl Currency {
    pub const ZERO: Currency = Currency(U256::zero());

    pub fn from_u64(v: u64) -> Currency {
        Currency(U256::from(v))
    }

    pub fn from_u256(v: U256) -> Currency {
        Currency(v)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Currency) -> Option<Currency> {
        self.0.checked_add(other.0).map(Currency)
    }

    /// Subtraction fails on underflow; currency values are unsigned.
    pub fn checked_sub(&self, other: Currency) -> Option<Currency> {
        self.0.checked_sub(other.0).map(Currency)
    }

    pub fn checked_mul(&self, other: Currency) -> Option<Currency> {
        self.0.checked_mul(other.0).map(Currency)
    }

    /// Big-endian bytes of the value with leading zeros trimmed.
    pub fn to_be_trimmed(&self) -> Vec<u8> {
        let mut raw = [0u8; 32];
        self.0.to_big_endian(&mut raw);
        let first = raw.iter().position(|&b| b != 0).unwrap_or(32);
        raw[first..].to_vec()
    }
}

impl CanonicalEncode for Currency {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_byte_slice(buf, &self.to_be_trimmed());
    }
}

impl CanonicalDecode for Currency {
    fn decode(dec: &mut Decoder<'_>) -> Result<Currency> {
        let len = dec.read_length()?;
        if len > 32 {
            return Err(ConsensusError::Structural(StructuralError::CurrencyTooWide));
        }
        let bytes = dec.read_exact(len)?;
        Ok(Currency(U256::from_big_endian(bytes)))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Currency {
    fn from(v: u64) -> Currency {
        Currency::from_u64(v)
    }
}

/// Sum an iterator of currency values, failing on overflow.
pub fn sum<'a, I: IntoIterator<Item = &'a Currency>>(values: I) -> Option<Currency> {
    let mut total = Currency::ZERO;
    for v in values {
        total = total.checked_add(*v)?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::from_canonical_bytes;

    #[test]
    fn test_checked_sub_underflow() {
        let a = Currency::from_u64(5);
        let b = Currency::from_u64(6);
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(Currency::from_u64(1)));
    }

    #[test]
    fn test_checked_add_overflow() {
        let max = Currency(U256::MAX);
        assert_eq!(max.checked_add(Currency::from_u64(1)), None);
    }

    #[test]
    fn test_encoding_trims_leading_zeros() {
        let c = Currency::from_u64(0x01_00_ff);
        let bytes = c.canonical_bytes();
        // 8-byte length prefix (3) + the three significant bytes.
        assert_eq!(bytes, vec![3, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x00, 0xff]);
    }

    #[test]
    fn test_zero_encodes_empty() {
        let bytes = Currency::ZERO.canonical_bytes();
        assert_eq!(bytes, vec![0u8; 8]);
        let back: Currency = from_canonical_bytes(&bytes).unwrap();
        assert_eq!(back, Currency::ZERO);
    }

    #[test]
    fn test_round_trip() {
        for v in [0u64, 1, 255, 256, u64::MAX] {
            let c = Currency::from_u64(v);
            let back: Currency = from_canonical_bytes(&c.canonical_bytes()).unwrap();
            assert_eq!(back, c);
        }
    }

    #[test]
    fn test_too_wide_rejected() {
        let mut bytes = Vec::new();
        encode_byte_slice(&mut bytes, &[1u8; 33]);
        let result: Result<Currency> = from_canonical_bytes(&bytes);
        assert_eq!(
            result,
            Err(ConsensusError::Structural(StructuralError::CurrencyTooWide))
        );
    }

    #[test]
    fn test_sum() {
        let values = [Currency::from_u64(1), Currency::from_u64(2), Currency::from_u64(3)];
        assert_eq!(sum(values.iter()), Some(Currency::from_u64(6)));
    }

    #[test]
    fn test_ordering() {
        assert!(Currency::from_u64(2) > Currency::from_u64(1));
        assert!(Currency::from_u64(1 << 40) > Currency::from_u64(1 << 39));
    }
}
