//! 256-bit field values exchanged with the prover and the ledger.
//!
//! Public signals, derived seeds and the random output are all carried as
//! 32-byte big-endian integers. The prover speaks decimal strings, the
//! ledger speaks `bytes32`, so both encodings live here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{GridzeroError, Result};

/// A 256-bit unsigned integer in big-endian byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FieldElement(pub [u8; 32]);

impl FieldElement {
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Keep only the low `len` bytes of a digest, zeroing the high bytes.
    ///
    /// Used to squeeze a SHA-256 digest under the circuit's field modulus.
    #[must_use]
    pub fn truncated(digest: [u8; 32], len: usize) -> Self {
        let len = len.min(32);
        let mut bytes = [0u8; 32];
        bytes[32 - len..].copy_from_slice(&digest[..len]);
        Self(bytes)
    }

    /// `self mod modulus`, computed without a bignum dependency.
    ///
    /// # Panics
    /// Panics if `modulus` is zero.
    #[must_use]
    pub fn mod_u64(&self, modulus: u64) -> u64 {
        assert!(modulus > 0, "modulus must be > 0");
        let m = u128::from(modulus);
        let mut rem: u128 = 0;
        for byte in self.0 {
            rem = ((rem << 8) | u128::from(byte)) % m;
        }
        // rem < modulus <= u64::MAX
        u64::try_from(rem).unwrap_or(u64::MAX)
    }

    /// Parse a base-10 string (snarkjs public signal encoding).
    pub fn from_decimal_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(GridzeroError::Serialization("empty decimal field element".into()));
        }
        let mut bytes = [0u8; 32];
        for ch in s.chars() {
            let digit = ch.to_digit(10).ok_or_else(|| {
                GridzeroError::Serialization(format!("invalid decimal digit {ch:?} in {s}"))
            })?;
            let mut carry = digit;
            for byte in bytes.iter_mut().rev() {
                let v = u32::from(*byte) * 10 + carry;
                *byte = (v & 0xff) as u8;
                carry = v >> 8;
            }
            if carry != 0 {
                return Err(GridzeroError::Serialization(format!(
                    "decimal value exceeds 256 bits: {s}"
                )));
            }
        }
        Ok(Self(bytes))
    }

    /// Render as a base-10 string.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        let mut work = self.0;
        let mut digits = Vec::new();
        while work.iter().any(|b| *b != 0) {
            let mut rem: u32 = 0;
            for byte in &mut work {
                let v = (rem << 8) | u32::from(*byte);
                *byte = (v / 10) as u8;
                rem = v % 10;
            }
            digits.push(char::from(b'0' + rem as u8));
        }
        if digits.is_empty() {
            return "0".to_string();
        }
        digits.iter().rev().collect()
    }

    /// Parse `0x`-prefixed (or bare) hex of at most 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.trim().trim_start_matches("0x");
        let padded = if raw.len() % 2 == 1 {
            format!("0{raw}")
        } else {
            raw.to_string()
        };
        let decoded = hex::decode(&padded)
            .map_err(|e| GridzeroError::Serialization(format!("invalid hex field element: {e}")))?;
        if decoded.len() > 32 {
            return Err(GridzeroError::Serialization(format!(
                "hex field element longer than 32 bytes: {} bytes",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes[32 - decoded.len()..].copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for FieldElement {
    type Err = GridzeroError;

    /// Accepts `0x` hex or base-10.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().starts_with("0x") {
            Self::from_hex(s)
        } else {
            Self::from_decimal_str(s)
        }
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The verifiable random output of a round: the first public signal of a
/// verified randomness proof, submitted to the ledger as `bytes32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomOutput(pub FieldElement);

impl RandomOutput {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// `uint256(output) mod modulus`.
    #[must_use]
    pub fn mod_u64(&self, modulus: u64) -> u64 {
        self.0.mod_u64(modulus)
    }
}

impl From<FieldElement> for RandomOutput {
    fn from(value: FieldElement) -> Self {
        Self(value)
    }
}

impl fmt::Display for RandomOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_matches_small_values() {
        let fe = FieldElement::from_u64(1_000_003);
        assert_eq!(fe.mod_u64(4), 1_000_003 % 4);
        assert_eq!(fe.mod_u64(100), 3);
    }

    #[test]
    fn mod_uses_full_width() {
        // 2^255 mod 7: 2^3 = 1 (mod 7), 255 = 3*85 -> 1
        let mut bytes = [0u8; 32];
        bytes[0] = 0x80;
        assert_eq!(FieldElement(bytes).mod_u64(7), 1);
    }

    #[test]
    fn decimal_parse_and_render() {
        let fe = FieldElement::from_decimal_str("123456789012345678901234567890").unwrap();
        assert_eq!(fe.to_decimal_string(), "123456789012345678901234567890");
        assert_eq!(FieldElement::ZERO.to_decimal_string(), "0");
    }

    #[test]
    fn decimal_overflow_rejected() {
        // 2^256
        let too_big =
            "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert!(FieldElement::from_decimal_str(too_big).is_err());
        assert!(FieldElement::from_decimal_str("12a").is_err());
    }

    #[test]
    fn hex_accepts_short_values() {
        let fe = FieldElement::from_hex("0x2a").unwrap();
        assert_eq!(fe, FieldElement::from_u64(42));
        assert_eq!("42".parse::<FieldElement>().unwrap(), fe);
    }

    #[test]
    fn truncation_clears_high_bytes() {
        let fe = FieldElement::truncated([0xff; 32], 31);
        assert_eq!(fe.0[0], 0);
        assert!(fe.0[1..].iter().all(|b| *b == 0xff));
    }

    #[test]
    fn serde_uses_hex_strings() {
        let fe = FieldElement::from_u64(7);
        let json = serde_json::to_string(&fe).unwrap();
        assert!(json.contains("0x"));
        let back: FieldElement = serde_json::from_str(&json).unwrap();
        assert_eq!(fe, back);
    }
}
