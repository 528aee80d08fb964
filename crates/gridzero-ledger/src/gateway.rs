//! The seam between the pipeline and the ledger.

use async_trait::async_trait;
use gridzero_types::{
    BlockRef, CellIndex, ObservedLedgerEvent, PlayerAddress, RandomOutput, Result, Round,
    RoundId, TxReceipt,
};

/// Read and write access to the game ledger.
///
/// Reads are side-effect free. The two writes are signed by the resolver
/// credentials held by the implementation and are rejected by the ledger
/// when the round is not in the expected state. Callers must treat
/// [`RevertReason::AlreadyResolved`](gridzero_types::RevertReason) and
/// `WrongRound` as "someone else settled it", not as failures.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// The round currently accepting (or awaiting settlement of) picks.
    async fn current_round_id(&self) -> Result<RoundId>;

    async fn get_round(&self, round_id: RoundId) -> Result<Round>;

    /// Per-cell pick counts, indexed by cell.
    async fn get_cell_occupancy(&self, round_id: RoundId) -> Result<Vec<u32>>;

    async fn get_cell_members(
        &self,
        round_id: RoundId,
        cell: CellIndex,
    ) -> Result<Vec<PlayerAddress>>;

    async fn latest_block(&self) -> Result<BlockRef>;

    /// Commit a random output for a non-empty, ended round. The ledger
    /// recomputes winner and bonus flag from `random_output` itself.
    async fn resolve_round(&self, random_output: RandomOutput, round_id: RoundId)
    -> Result<TxReceipt>;

    /// Advance past an ended round that nobody played.
    async fn skip_empty_round(&self, round_id: RoundId) -> Result<TxReceipt>;
}

/// Source of observed ledger events, for telemetry.
#[async_trait]
pub trait LedgerEventSource: Send + Sync {
    /// Events included in blocks `>= from_block`, in block order.
    async fn events_since(&self, from_block: u64) -> Result<Vec<ObservedLedgerEvent>>;
}
