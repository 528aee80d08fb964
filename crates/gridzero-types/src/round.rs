//! Round and chain-context types.
//!
//! A [`Round`] is owned by the ledger. The pipeline only ever holds a
//! read-through copy for the duration of one settlement cycle.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CellIndex, PlayerAddress, RoundId};

/// One fixed-duration selection window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Cells picked by at least one player, in canonical (ascending) order.
    pub occupied_cells: BTreeSet<CellIndex>,
    pub total_players: u32,
    pub resolved: bool,
    pub winning_cell: Option<CellIndex>,
    pub is_bonus_round: bool,
}

impl Round {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_players == 0
    }

    /// Whether the round's window has elapsed at `now`.
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

/// A player's pick of a cell, observed from ledger events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPick {
    pub round_id: RoundId,
    pub player: PlayerAddress,
    pub cell: CellIndex,
}

/// The chain block the scheduler observed on wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: [u8; 32],
    pub timestamp: DateTime<Utc>,
}

impl BlockRef {
    #[must_use]
    pub fn short_hash(&self) -> String {
        hex::encode(&self.hash[..4])
    }
}

/// Receipt of an accepted ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
}

/// Dummy constructors for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Round {
    /// An open round with the given occupied cells, one player per cell.
    pub fn dummy(id: u64, cells: &[u16]) -> Self {
        let start = Utc::now() - chrono::Duration::seconds(60);
        Self {
            id: RoundId(id),
            start_time: start,
            end_time: start + chrono::Duration::seconds(30),
            occupied_cells: cells.iter().copied().map(CellIndex).collect(),
            total_players: u32::try_from(cells.len()).unwrap_or(u32::MAX),
            resolved: false,
            winning_cell: None,
            is_bonus_round: false,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl BlockRef {
    /// A block with a random hash at the current time.
    pub fn dummy(number: u64) -> Self {
        Self {
            number,
            hash: rand::random::<[u8; 32]>(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_round() {
        let round = Round::dummy(1, &[]);
        assert!(round.is_empty());
        let round = Round::dummy(1, &[3]);
        assert!(!round.is_empty());
    }

    #[test]
    fn has_ended_is_inclusive() {
        let round = Round::dummy(1, &[]);
        assert!(round.has_ended(round.end_time));
        assert!(!round.has_ended(round.end_time - chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn occupied_cells_are_canonically_ordered() {
        let round = Round::dummy(1, &[13, 2, 9, 5]);
        let cells: Vec<u16> = round.occupied_cells.iter().map(|c| c.0).collect();
        assert_eq!(cells, vec![2, 5, 9, 13]);
    }

    #[test]
    fn round_serde_roundtrip() {
        let round = Round::dummy(7, &[1, 4]);
        let json = serde_json::to_string(&round).unwrap();
        let back: Round = serde_json::from_str(&json).unwrap();
        assert_eq!(round, back);
    }
}
