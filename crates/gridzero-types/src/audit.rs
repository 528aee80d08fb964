//! Audit records written to the off-ledger event store.
//!
//! Records are append-only and write-only from the pipeline's point of
//! view: settlement decisions never read them back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AttemptId, CellIndex, CellPick, RandomOutput, RecordId, RoundId};

/// How a round reached its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundOutcomeKind {
    /// Resolved by this process.
    Resolved,
    /// Skipped (no players) by this process.
    Skipped,
    /// Another resolver committed first; this process observed the result.
    SettledElsewhere,
}

impl fmt::Display for RoundOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::SettledElsewhere => write!(f, "SETTLED_ELSEWHERE"),
        }
    }
}

/// Outcome of one round as recorded for audit and UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub record_id: RecordId,
    pub attempt_id: AttemptId,
    pub round_id: RoundId,
    pub outcome: RoundOutcomeKind,
    pub winning_cell: Option<CellIndex>,
    pub is_bonus_round: bool,
    pub random_output: Option<RandomOutput>,
    pub occupied_cells: Vec<CellIndex>,
    pub total_players: u32,
    pub block_number: u64,
    pub tx_hash: Option<[u8; 32]>,
    pub recorded_at: DateTime<Utc>,
}

/// Player participation in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub record_id: RecordId,
    pub round_id: RoundId,
    pub picks: Vec<CellPick>,
    pub recorded_at: DateTime<Utc>,
}
