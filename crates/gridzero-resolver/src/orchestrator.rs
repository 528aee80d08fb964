//! Settlement orchestrator: drives one round from "ended" to "settled".
//!
//! One call to [`SettlementOrchestrator::settle`] is one attempt:
//! 1. Take the in-process resolving flag (fail fast if held)
//! 2. Detect: read the current round; resolved or not yet ended → no-op
//! 3. Empty round → submit the skip transaction (no proof is ever requested)
//! 4. Otherwise prove the random output, hand the proof to attestation in
//!    the background, and submit the resolve transaction
//! 5. Re-read the round and check the ledger's winner against ours
//! 6. Record the outcome and participation, publish an event, clear the flag
//!
//! Any error leaves the round unresolved; the scheduler's next wake starts
//! over from step 2. A ledger rejection saying another resolver got there
//! first counts as success.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use gridzero_attestation::ProofAttestationClient;
use gridzero_ledger::outcome::occupied_from_occupancy;
use gridzero_ledger::{LedgerGateway, RoundOutcome, compute_outcome};
use gridzero_prover::RandomnessProofPipeline;
use gridzero_types::{
    AttemptId, BlockRef, CellIndex, CellPick, EventPublisher, GridzeroError, ParticipationRecord,
    PipelineEvent, RandomOutput, RecordId, Result, Round, RoundId, RoundOutcomeKind, RoundRecord,
    TxReceipt, constants,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::recorder::EventRecorder;
use crate::settled_guard::SettledRoundGuard;
use crate::state::{AlertKind, PipelineState};

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The round's end time has not been reached at the observed block.
    NotDue {
        round_id: RoundId,
        end_time: DateTime<Utc>,
    },
    /// Nothing to do: the round is already settled.
    AlreadyResolved { round_id: RoundId },
    Skipped {
        round_id: RoundId,
        receipt: TxReceipt,
    },
    Resolved {
        round_id: RoundId,
        outcome: RoundOutcome,
        random_output: RandomOutput,
        receipt: TxReceipt,
    },
    /// Another resolver committed first.
    SettledElsewhere { round_id: RoundId },
}

impl SettlementOutcome {
    #[must_use]
    pub fn round_id(&self) -> RoundId {
        match self {
            Self::NotDue { round_id, .. }
            | Self::AlreadyResolved { round_id }
            | Self::Skipped { round_id, .. }
            | Self::Resolved { round_id, .. }
            | Self::SettledElsewhere { round_id } => *round_id,
        }
    }

    /// Whether the ledger moved on to a new round as a result.
    #[must_use]
    pub fn advanced(&self) -> bool {
        matches!(
            self,
            Self::Skipped { .. } | Self::Resolved { .. } | Self::SettledElsewhere { .. }
        )
    }
}

pub struct SettlementOrchestrator {
    ledger: Arc<dyn LedgerGateway>,
    proofs: Arc<RandomnessProofPipeline>,
    attestation: Arc<ProofAttestationClient>,
    recorder: Arc<dyn EventRecorder>,
    events: Arc<dyn EventPublisher>,
    state: Arc<PipelineState>,
    settled: Mutex<SettledRoundGuard>,
    bonus_odds: u64,
}

impl SettlementOrchestrator {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        proofs: Arc<RandomnessProofPipeline>,
        attestation: Arc<ProofAttestationClient>,
        recorder: Arc<dyn EventRecorder>,
        events: Arc<dyn EventPublisher>,
        state: Arc<PipelineState>,
        bonus_odds: u64,
    ) -> Self {
        Self {
            ledger,
            proofs,
            attestation,
            recorder,
            events,
            state,
            settled: Mutex::new(SettledRoundGuard::new(constants::SETTLED_ROUND_CACHE_SIZE)),
            bonus_odds,
        }
    }

    #[must_use]
    pub fn state(&self) -> &Arc<PipelineState> {
        &self.state
    }

    /// Run one settlement attempt against the round current at `block`.
    ///
    /// # Errors
    /// - [`GridzeroError::ResolutionInProgress`] if another attempt holds the flag
    /// - any ledger, proof or consistency error from the attempt; the round
    ///   stays unresolved
    pub async fn settle(&self, block: BlockRef) -> Result<SettlementOutcome> {
        let Some(_resolving) = self.state.try_begin_resolving() else {
            debug!(block = block.number, "resolution already in progress");
            return Err(GridzeroError::ResolutionInProgress);
        };
        self.state.observe_block(block.number);
        let attempt = AttemptId::new();

        let round_id = match self.ledger.current_round_id().await {
            Ok(id) => id,
            Err(e) => {
                self.state.record_failure(None, &e);
                warn!(attempt = %attempt, error = %e, "current round read failed");
                return Err(e);
            }
        };
        self.state.set_current_round(round_id);

        match self.settle_round(attempt, round_id, &block).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_benign_race() => {
                info!(round = round_id.0, reason = %e, "round settled by another resolver");
                self.events.publish(PipelineEvent::ResolutionRaced {
                    round_id,
                    reason: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.mark_settled(round_id);
                self.record_settled_elsewhere(attempt, round_id, &block).await;
                self.state
                    .record_outcome(round_id, RoundOutcomeKind::SettledElsewhere);
                Ok(SettlementOutcome::SettledElsewhere { round_id })
            }
            Err(e) => {
                let streak = self.state.record_failure(Some(round_id), &e);
                if e.needs_operator() {
                    error!(round = round_id.0, attempt = %attempt, failures = streak, error = %e, "settlement attempt failed; operator attention required");
                } else {
                    warn!(round = round_id.0, attempt = %attempt, failures = streak, error = %e, "settlement attempt failed");
                }
                self.events.publish(PipelineEvent::ResolutionFailed {
                    round_id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn settle_round(
        &self,
        attempt: AttemptId,
        round_id: RoundId,
        block: &BlockRef,
    ) -> Result<SettlementOutcome> {
        let round = self.ledger.get_round(round_id).await?;
        if round.resolved {
            debug!(round = round_id.0, "round already resolved");
            self.mark_settled(round_id);
            return Ok(SettlementOutcome::AlreadyResolved { round_id });
        }
        if self.is_settled(round_id) {
            debug!(round = round_id.0, "ledger read is behind our own settlement");
            return Ok(SettlementOutcome::AlreadyResolved { round_id });
        }
        if !round.has_ended(block.timestamp) {
            debug!(
                round = round_id.0,
                block = block.number,
                end_time = %round.end_time,
                "round not ended at observed block"
            );
            return Ok(SettlementOutcome::NotDue {
                round_id,
                end_time: round.end_time,
            });
        }

        if round.is_empty() {
            self.skip(attempt, &round, block).await
        } else {
            self.resolve(attempt, &round, block).await
        }
    }

    async fn skip(
        &self,
        attempt: AttemptId,
        round: &Round,
        block: &BlockRef,
    ) -> Result<SettlementOutcome> {
        let receipt = self.ledger.skip_empty_round(round.id).await?;
        self.mark_settled(round.id);
        info!(
            round = round.id.0,
            tx = %hex::encode(&receipt.tx_hash[..8]),
            block = receipt.block_number,
            "empty round skipped"
        );

        self.record(RoundRecord {
            record_id: RecordId::new(),
            attempt_id: attempt,
            round_id: round.id,
            outcome: RoundOutcomeKind::Skipped,
            winning_cell: None,
            is_bonus_round: false,
            random_output: None,
            occupied_cells: Vec::new(),
            total_players: 0,
            block_number: block.number,
            tx_hash: Some(receipt.tx_hash),
            recorded_at: Utc::now(),
        })
        .await;
        self.events.publish(PipelineEvent::RoundSkipped {
            round_id: round.id,
            timestamp: Utc::now(),
        });
        self.state.record_outcome(round.id, RoundOutcomeKind::Skipped);
        Ok(SettlementOutcome::Skipped {
            round_id: round.id,
            receipt,
        })
    }

    async fn resolve(
        &self,
        attempt: AttemptId,
        round: &Round,
        block: &BlockRef,
    ) -> Result<SettlementOutcome> {
        let occupancy = self.ledger.get_cell_occupancy(round.id).await?;
        let occupied = occupied_from_occupancy(&occupancy);
        if occupied.is_empty() {
            return Err(GridzeroError::LedgerInconsistent {
                round_id: round.id,
                reason: format!(
                    "{} players recorded but no occupied cells",
                    round.total_players
                ),
            });
        }

        let proof = self.proofs.prove_for_block(round.id, block).await?;
        let random_output = proof.random_output;
        self.events.publish(PipelineEvent::ProofVerified {
            round_id: round.id,
            random_output,
            timestamp: Utc::now(),
        });
        self.attestation
            .spawn_attestation(proof, self.proofs.verification_key().clone());

        let expected = compute_outcome(&random_output, occupied.iter().copied(), self.bonus_odds)
            .ok_or_else(|| GridzeroError::Internal("no winner over occupied cells".into()))?;
        let receipt = self.ledger.resolve_round(random_output, round.id).await?;
        self.mark_settled(round.id);
        info!(
            round = round.id.0,
            winner = expected.winning_cell.0,
            bonus = expected.is_bonus_round,
            occupied = occupied.len(),
            output = %hex::encode(&random_output.as_bytes()[..8]),
            tx = %hex::encode(&receipt.tx_hash[..8]),
            "round resolved"
        );

        self.check_winner(round.id, expected.winning_cell).await;
        self.record(RoundRecord {
            record_id: RecordId::new(),
            attempt_id: attempt,
            round_id: round.id,
            outcome: RoundOutcomeKind::Resolved,
            winning_cell: Some(expected.winning_cell),
            is_bonus_round: expected.is_bonus_round,
            random_output: Some(random_output),
            occupied_cells: occupied.clone(),
            total_players: round.total_players,
            block_number: block.number,
            tx_hash: Some(receipt.tx_hash),
            recorded_at: Utc::now(),
        })
        .await;
        self.record_participation(round.id, &occupied).await;

        self.events.publish(PipelineEvent::RoundResolved {
            round_id: round.id,
            winning_cell: expected.winning_cell,
            is_bonus_round: expected.is_bonus_round,
            random_output,
            tx_hash: receipt.tx_hash,
            timestamp: Utc::now(),
        });
        self.state.record_outcome(round.id, RoundOutcomeKind::Resolved);
        Ok(SettlementOutcome::Resolved {
            round_id: round.id,
            outcome: expected,
            random_output,
            receipt,
        })
    }

    /// The resolve transaction is already committed; a mismatch here is an
    /// integrity alert, not a failed attempt.
    async fn check_winner(&self, round_id: RoundId, expected: CellIndex) {
        let round = match self.ledger.get_round(round_id).await {
            Ok(round) => round,
            Err(e) => {
                warn!(round = round_id.0, error = %e, "post-resolve read failed; winner not cross-checked");
                return;
            }
        };
        if round.winning_cell == Some(expected) {
            return;
        }
        let mismatch = GridzeroError::WinnerMismatch {
            round_id,
            expected,
            actual: round.winning_cell,
        };
        error!(round = round_id.0, error = %mismatch, "ledger winner differs from local computation");
        self.state
            .raise_alert(AlertKind::Integrity, Some(round_id), mismatch.to_string());
    }

    async fn record_settled_elsewhere(&self, attempt: AttemptId, round_id: RoundId, block: &BlockRef) {
        let round = self.ledger.get_round(round_id).await.ok();
        self.record(RoundRecord {
            record_id: RecordId::new(),
            attempt_id: attempt,
            round_id,
            outcome: RoundOutcomeKind::SettledElsewhere,
            winning_cell: round.as_ref().and_then(|r| r.winning_cell),
            is_bonus_round: round.as_ref().is_some_and(|r| r.is_bonus_round),
            random_output: None,
            occupied_cells: round
                .as_ref()
                .map(|r| r.occupied_cells.iter().copied().collect())
                .unwrap_or_default(),
            total_players: round.as_ref().map_or(0, |r| r.total_players),
            block_number: block.number,
            tx_hash: None,
            recorded_at: Utc::now(),
        })
        .await;
    }

    async fn record(&self, record: RoundRecord) {
        if let Err(e) = self.recorder.record_round(&record).await {
            warn!(round = record.round_id.0, error = %e, "audit record write failed");
        }
    }

    async fn record_participation(&self, round_id: RoundId, occupied: &[CellIndex]) {
        let mut picks = Vec::new();
        for cell in occupied {
            match self.ledger.get_cell_members(round_id, *cell).await {
                Ok(members) => picks.extend(members.into_iter().map(|player| CellPick {
                    round_id,
                    player,
                    cell: *cell,
                })),
                Err(e) => {
                    warn!(round = round_id.0, cell = cell.0, error = %e, "cell members read failed; participation incomplete");
                }
            }
        }
        let record = ParticipationRecord {
            record_id: RecordId::new(),
            round_id,
            picks,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.recorder.record_participation(&record).await {
            warn!(round = round_id.0, error = %e, "participation record write failed");
        }
    }

    fn is_settled(&self, round_id: RoundId) -> bool {
        self.settled
            .lock()
            .is_ok_and(|guard| guard.is_settled(round_id))
    }

    fn mark_settled(&self, round_id: RoundId) {
        if let Ok(mut guard) = self.settled.lock() {
            // A repeat only means we already knew.
            let _ = guard.mark_settled(round_id);
        }
    }
}

impl std::fmt::Debug for SettlementOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementOrchestrator")
            .field("bonus_odds", &self.bonus_odds)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
