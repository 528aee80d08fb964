//! Immutable event records.
//!
//! [`LedgerEvent`]s are observed from the chain by the watcher.
//! [`PipelineEvent`]s are published by pipeline components onto the event
//! bus; subscribers filter by [`EventKind`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AggregationId, CellIndex, DomainId, PlayerAddress, ProofCategory, RandomOutput, RoundId,
};

/// Events emitted by the ledger contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    CellPicked {
        round_id: RoundId,
        player: PlayerAddress,
        cell: CellIndex,
    },
    RoundResolved {
        round_id: RoundId,
        winning_cell: CellIndex,
        random_output: RandomOutput,
        is_bonus_round: bool,
    },
    RoundStarted {
        round_id: RoundId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    EmptyRoundSkipped {
        round_id: RoundId,
    },
}

impl LedgerEvent {
    #[must_use]
    pub fn round_id(&self) -> RoundId {
        match self {
            Self::CellPicked { round_id, .. }
            | Self::RoundResolved { round_id, .. }
            | Self::RoundStarted { round_id, .. }
            | Self::EmptyRoundSkipped { round_id } => *round_id,
        }
    }
}

/// A ledger event with the block it was included in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedLedgerEvent {
    pub block_number: u64,
    pub event: LedgerEvent,
}

/// Discriminant used to subscribe to a subset of pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RoundResolved,
    RoundSkipped,
    ResolutionRaced,
    ResolutionFailed,
    ProofVerified,
    AttestationSubmitted,
    AttestationFailed,
    AggregationReceived,
    LedgerActivity,
}

/// Events published by the settlement pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// This process committed a resolution.
    RoundResolved {
        round_id: RoundId,
        winning_cell: CellIndex,
        is_bonus_round: bool,
        random_output: RandomOutput,
        tx_hash: [u8; 32],
        timestamp: DateTime<Utc>,
    },
    /// This process committed a skip for an empty round.
    RoundSkipped {
        round_id: RoundId,
        timestamp: DateTime<Utc>,
    },
    /// The ledger reported another resolver got there first.
    ResolutionRaced {
        round_id: RoundId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// The attempt failed; the round stays unresolved until the next wake.
    ResolutionFailed {
        round_id: RoundId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ProofVerified {
        round_id: RoundId,
        random_output: RandomOutput,
        timestamp: DateTime<Utc>,
    },
    AttestationSubmitted {
        category: ProofCategory,
        round_ids: Vec<RoundId>,
        tx_id: String,
        domain_id: DomainId,
        timestamp: DateTime<Utc>,
    },
    AttestationFailed {
        category: ProofCategory,
        round_ids: Vec<RoundId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AggregationReceived {
        domain_id: DomainId,
        aggregation_id: AggregationId,
        root: [u8; 32],
        statement: [u8; 32],
        timestamp: DateTime<Utc>,
    },
    LedgerActivity {
        block_number: u64,
        event: LedgerEvent,
    },
}

impl PipelineEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoundResolved { .. } => EventKind::RoundResolved,
            Self::RoundSkipped { .. } => EventKind::RoundSkipped,
            Self::ResolutionRaced { .. } => EventKind::ResolutionRaced,
            Self::ResolutionFailed { .. } => EventKind::ResolutionFailed,
            Self::ProofVerified { .. } => EventKind::ProofVerified,
            Self::AttestationSubmitted { .. } => EventKind::AttestationSubmitted,
            Self::AttestationFailed { .. } => EventKind::AttestationFailed,
            Self::AggregationReceived { .. } => EventKind::AggregationReceived,
            Self::LedgerActivity { .. } => EventKind::LedgerActivity,
        }
    }
}

/// Anything pipeline components can publish events to.
///
/// Publishing never blocks and never fails from the caller's point of view:
/// an event nobody listens to is dropped.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: PipelineEvent);
}

/// Publisher that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEvents;

impl EventPublisher for DiscardEvents {
    fn publish(&self, _event: PipelineEvent) {}
}
