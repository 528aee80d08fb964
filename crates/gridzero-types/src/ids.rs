//! Identifiers used throughout the settlement pipeline.
//!
//! Ledger-owned identifiers (`RoundId`, `CellIndex`, `PlayerAddress`) are
//! plain integers or byte arrays. Process-local identifiers (`AttemptId`,
//! `RecordId`) use UUIDv7 for time-ordered sorting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::GridzeroError;

// ---------------------------------------------------------------------------
// RoundId
// ---------------------------------------------------------------------------

/// Monotonically increasing identifier of a ledger round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RoundId(pub u64);

impl RoundId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Big-endian encoding used in seed derivation and tx payloads.
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CellIndex
// ---------------------------------------------------------------------------

/// Index of a grid cell, `0..grid_cells`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellIndex(pub u16);

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PlayerAddress
// ---------------------------------------------------------------------------

/// 20-byte ledger account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PlayerAddress(pub [u8; 20]);

impl PlayerAddress {
    #[must_use]
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PlayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PlayerAddress {
    type Err = GridzeroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(raw)
            .map_err(|e| GridzeroError::Serialization(format!("invalid address {s}: {e}")))?;
        let arr: [u8; 20] = bytes.try_into().map_err(|_| {
            GridzeroError::Serialization(format!("address must be 20 bytes: {s}"))
        })?;
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// Attestation-side identifiers
// ---------------------------------------------------------------------------

/// Identifier of a registered aggregation domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DomainId(pub u32);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain:{}", self.0)
    }
}

/// Identifier of one aggregation (batch) within a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AggregationId(pub u64);

impl fmt::Display for AggregationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aggregation:{}", self.0)
    }
}

/// Handle returned by verification-key registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyHandle(pub String);

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Process-local identifiers
// ---------------------------------------------------------------------------

/// Identifies one resolution attempt; carried in logs and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_id_next() {
        assert_eq!(RoundId(5).next(), RoundId(6));
    }

    #[test]
    fn round_id_be_bytes() {
        assert_eq!(RoundId(1).to_be_bytes(), [0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn player_address_parse_and_display() {
        let addr: PlayerAddress = "0x00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(addr.to_string(), "0x00112233445566778899aabbccddeeff00112233");
        assert_eq!(addr.short(), "0x00112233");
    }

    #[test]
    fn player_address_rejects_wrong_length() {
        assert!("0x0011".parse::<PlayerAddress>().is_err());
        assert!("zz".parse::<PlayerAddress>().is_err());
    }

    #[test]
    fn attempt_ids_are_ordered() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert!(a < b);
    }
}
