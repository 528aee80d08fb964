//! In-process devnet ledger.
//!
//! Implements the same acceptance rules the on-chain contract enforces for
//! the resolver-facing surface:
//!
//! - writes must be signed by the authorized resolver for this chain id
//! - a round that is already resolved or skipped rejects further writes
//! - only the current round can be resolved or skipped
//! - a round can only be settled once its window has elapsed
//! - resolve needs players, skip needs none
//!
//! Winner and bonus flag are recomputed here from the submitted random
//! output with [`crate::outcome`], exactly as the contract does. Settling a
//! round opens the next one immediately.
//!
//! Blocks are produced lazily: every transaction mines one, and
//! [`LedgerGateway::latest_block`] mines an empty block whenever at least
//! `block_time` has passed since the last one. Block hashes form a SHA-256
//! chain. Only the chain tip and the most recent [`EVENT_RETENTION`] events
//! are kept; round history is kept in full.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use gridzero_types::{
    BlockRef, CellIndex, GameConfig, GridzeroError, LedgerEvent, ObservedLedgerEvent,
    PlayerAddress, RandomOutput, Result, RevertReason, Round, RoundId, TxReceipt,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::credentials::{LedgerAction, ResolverCredentials, SignedLedgerTx};
use crate::gateway::{LedgerEventSource, LedgerGateway};
use crate::outcome;

/// Ledger events kept for [`LedgerEventSource::events_since`] by default.
pub const EVENT_RETENTION: usize = 4_096;

/// Game parameters of a devnet instance.
#[derive(Debug, Clone, Copy)]
pub struct DevnetParams {
    pub chain_id: u64,
    pub grid_cells: u16,
    pub bonus_odds: u64,
    pub round_duration: chrono::Duration,
    pub block_time: chrono::Duration,
}

impl DevnetParams {
    #[must_use]
    pub fn from_game(game: &GameConfig, chain_id: u64) -> Self {
        Self {
            chain_id,
            grid_cells: game.grid_cells,
            bonus_odds: game.bonus_odds,
            round_duration: chrono::Duration::seconds(
                i64::try_from(game.round_duration_secs).unwrap_or(i64::MAX / 1_000),
            ),
            block_time: chrono::Duration::seconds(1),
        }
    }
}

/// One-shot and counted fault injection, for exercising failure paths.
#[derive(Debug, Clone, Default)]
pub struct DevnetFaults {
    /// Number of upcoming reads that fail with `LedgerUnavailable`.
    pub fail_reads: u32,
    /// Number of upcoming writes that fail with `LedgerUnavailable`.
    pub fail_writes: u32,
    /// Revert the next write with this reason.
    pub forced_revert: Option<RevertReason>,
    /// Store a different winner than the one the output selects.
    pub misreport_winner: bool,
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevnetCalls {
    pub reads: u64,
    pub resolve_attempts: u64,
    pub skip_attempts: u64,
    pub accepted_writes: u64,
}

#[derive(Debug)]
struct RoundEntry {
    round: Round,
    members: BTreeMap<CellIndex, Vec<PlayerAddress>>,
}

impl RoundEntry {
    fn open(id: RoundId, start: DateTime<Utc>, duration: chrono::Duration) -> Self {
        Self {
            round: Round {
                id,
                start_time: start,
                end_time: start + duration,
                occupied_cells: BTreeSet::new(),
                total_players: 0,
                resolved: false,
                winning_cell: None,
                is_bonus_round: false,
            },
            members: BTreeMap::new(),
        }
    }

    fn occupancy(&self, grid_cells: u16) -> Vec<u32> {
        (0..grid_cells)
            .map(|cell| {
                self.members
                    .get(&CellIndex(cell))
                    .map_or(0, |m| u32::try_from(m.len()).unwrap_or(u32::MAX))
            })
            .collect()
    }
}

#[derive(Debug)]
struct DevnetState {
    authorized: VerifyingKey,
    current: RoundId,
    rounds: BTreeMap<RoundId, RoundEntry>,
    tip: BlockRef,
    events: VecDeque<ObservedLedgerEvent>,
    event_retention: usize,
    faults: DevnetFaults,
    calls: DevnetCalls,
}

impl DevnetState {
    fn tip(&self) -> BlockRef {
        self.tip
    }

    fn mine(&mut self, now: DateTime<Utc>, events: Vec<LedgerEvent>) -> BlockRef {
        let parent = self.tip;
        let number = parent.number + 1;
        let mut hasher = Sha256::new();
        hasher.update(parent.hash);
        hasher.update(number.to_be_bytes());
        hasher.update(now.timestamp_millis().to_be_bytes());
        let block = BlockRef {
            number,
            hash: hasher.finalize().into(),
            timestamp: now.max(parent.timestamp),
        };
        self.tip = block;
        self.events.extend(
            events
                .into_iter()
                .map(|event| ObservedLedgerEvent {
                    block_number: number,
                    event,
                }),
        );
        self.trim_events();
        block
    }

    fn trim_events(&mut self) {
        let excess = self.events.len().saturating_sub(self.event_retention);
        self.events.drain(..excess);
    }

    fn entry(&self, round_id: RoundId) -> Result<&RoundEntry> {
        self.rounds
            .get(&round_id)
            .ok_or(GridzeroError::RoundNotFound(round_id))
    }

    fn take_read_fault(&mut self) -> Result<()> {
        self.calls.reads += 1;
        if self.faults.fail_reads > 0 {
            self.faults.fail_reads -= 1;
            return Err(GridzeroError::LedgerUnavailable {
                reason: "devnet: injected read failure".into(),
            });
        }
        Ok(())
    }
}

/// Shared handle to a devnet ledger. Clones see the same chain.
#[derive(Clone)]
pub struct DevnetLedger {
    state: Arc<Mutex<DevnetState>>,
    params: DevnetParams,
    clock: Arc<dyn Clock>,
}

impl DevnetLedger {
    /// Start a chain whose first round opens now, resolvable only by `authorized`.
    #[must_use]
    pub fn new(params: DevnetParams, authorized: VerifyingKey, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let genesis = BlockRef {
            number: 0,
            hash: Sha256::digest(params.chain_id.to_be_bytes()).into(),
            timestamp: now,
        };
        let first = RoundId(1);
        let mut state = DevnetState {
            authorized,
            current: first,
            rounds: BTreeMap::new(),
            tip: genesis,
            events: VecDeque::new(),
            event_retention: EVENT_RETENTION,
            faults: DevnetFaults::default(),
            calls: DevnetCalls::default(),
        };
        let entry = RoundEntry::open(first, now, params.round_duration);
        let started = LedgerEvent::RoundStarted {
            round_id: first,
            start_time: entry.round.start_time,
            end_time: entry.round.end_time,
        };
        state.rounds.insert(first, entry);
        state.mine(now, vec![started]);
        Self {
            state: Arc::new(Mutex::new(state)),
            params,
            clock,
        }
    }

    /// A gateway client that signs its writes with `credentials`.
    #[must_use]
    pub fn client(&self, credentials: ResolverCredentials) -> DevnetClient {
        DevnetClient {
            ledger: self.clone(),
            credentials,
        }
    }

    #[must_use]
    pub fn params(&self) -> DevnetParams {
        self.params
    }

    /// Keep only the `keep` most recent ledger events (at least one).
    pub fn set_event_retention(&self, keep: usize) -> Result<()> {
        let mut state = self.lock()?;
        state.event_retention = keep.max(1);
        state.trim_events();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, DevnetState>> {
        self.state
            .lock()
            .map_err(|_| GridzeroError::Internal("devnet state lock poisoned".into()))
    }

    /// Place a pick in the current round.
    pub fn pick_cell(&self, player: PlayerAddress, cell: CellIndex) -> Result<BlockRef> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let round_id = state.current;
        let revert = |reason: &str| GridzeroError::LedgerReverted {
            round_id,
            reason: RevertReason::Other(reason.into()),
        };
        if cell.0 >= self.params.grid_cells {
            return Err(revert("cell out of range"));
        }
        let entry = state
            .rounds
            .get_mut(&round_id)
            .ok_or(GridzeroError::RoundNotFound(round_id))?;
        if entry.round.has_ended(now) {
            return Err(revert("round ended"));
        }
        if entry.members.values().any(|m| m.contains(&player)) {
            return Err(revert("player already picked"));
        }
        entry.members.entry(cell).or_default().push(player);
        entry.round.occupied_cells.insert(cell);
        entry.round.total_players += 1;
        debug!(round = round_id.0, cell = cell.0, player = %player.short(), "devnet pick");
        Ok(state.mine(
            now,
            vec![LedgerEvent::CellPicked {
                round_id,
                player,
                cell,
            }],
        ))
    }

    /// Place `count` picks from fresh random players on random cells.
    pub fn simulate_picks<R: Rng + ?Sized>(&self, count: u32, rng: &mut R) -> Result<()> {
        for _ in 0..count {
            let player = PlayerAddress(rng.r#gen());
            let cell = CellIndex(rng.gen_range(0..self.params.grid_cells));
            self.pick_cell(player, cell)?;
        }
        Ok(())
    }

    /// Apply a signed resolver transaction.
    pub fn submit(&self, tx: &SignedLedgerTx) -> Result<TxReceipt> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let round_id = tx.action.round_id();
        match tx.action {
            LedgerAction::Resolve { .. } => state.calls.resolve_attempts += 1,
            LedgerAction::Skip { .. } => state.calls.skip_attempts += 1,
        }
        if state.faults.fail_writes > 0 {
            state.faults.fail_writes -= 1;
            return Err(GridzeroError::LedgerUnavailable {
                reason: "devnet: injected write failure".into(),
            });
        }
        if let Some(reason) = state.faults.forced_revert.take() {
            return Err(GridzeroError::LedgerReverted { round_id, reason });
        }
        tx.verify(self.params.chain_id, &state.authorized)?;

        let revert = |reason| GridzeroError::LedgerReverted { round_id, reason };
        let current = state.current;
        let entry = state.entry(round_id)?;
        if entry.round.resolved {
            return Err(revert(RevertReason::AlreadyResolved));
        }
        if round_id != current {
            return Err(revert(RevertReason::WrongRound {
                current: Some(current),
                submitted: round_id,
            }));
        }
        if !entry.round.has_ended(now) {
            return Err(revert(RevertReason::RoundNotEnded));
        }

        let mut events = Vec::with_capacity(2);
        match &tx.action {
            LedgerAction::Resolve { random_output, .. } => {
                if entry.round.is_empty() {
                    return Err(revert(RevertReason::RoundEmpty));
                }
                let result = self.settle_with(entry, random_output, state.faults.misreport_winner)?;
                let entry = state
                    .rounds
                    .get_mut(&round_id)
                    .ok_or(GridzeroError::RoundNotFound(round_id))?;
                entry.round.resolved = true;
                entry.round.winning_cell = Some(result.winning_cell);
                entry.round.is_bonus_round = result.is_bonus_round;
                info!(
                    round = round_id.0,
                    winner = result.winning_cell.0,
                    bonus = result.is_bonus_round,
                    "devnet round resolved"
                );
                events.push(LedgerEvent::RoundResolved {
                    round_id,
                    winning_cell: result.winning_cell,
                    random_output: *random_output,
                    is_bonus_round: result.is_bonus_round,
                });
            }
            LedgerAction::Skip { .. } => {
                if !entry.round.is_empty() {
                    return Err(revert(RevertReason::RoundNotEmpty));
                }
                if let Some(entry) = state.rounds.get_mut(&round_id) {
                    entry.round.resolved = true;
                }
                info!(round = round_id.0, "devnet empty round skipped");
                events.push(LedgerEvent::EmptyRoundSkipped { round_id });
            }
        }

        let next = round_id.next();
        let entry = RoundEntry::open(next, now, self.params.round_duration);
        events.push(LedgerEvent::RoundStarted {
            round_id: next,
            start_time: entry.round.start_time,
            end_time: entry.round.end_time,
        });
        state.rounds.insert(next, entry);
        state.current = next;
        state.calls.accepted_writes += 1;
        let block = state.mine(now, events);
        Ok(TxReceipt {
            tx_hash: tx.tx_hash(),
            block_number: block.number,
        })
    }

    fn settle_with(
        &self,
        entry: &RoundEntry,
        random_output: &RandomOutput,
        misreport: bool,
    ) -> Result<outcome::RoundOutcome> {
        let mut result = outcome::compute_outcome(
            random_output,
            entry.round.occupied_cells.iter().copied(),
            self.params.bonus_odds,
        )
        .ok_or_else(|| GridzeroError::LedgerInconsistent {
            round_id: entry.round.id,
            reason: "players recorded but no occupied cells".into(),
        })?;
        if misreport {
            result.winning_cell = CellIndex((result.winning_cell.0 + 1) % self.params.grid_cells);
        }
        Ok(result)
    }

    /// Replace the fault injection settings.
    pub fn set_faults(&self, faults: DevnetFaults) -> Result<()> {
        self.lock()?.faults = faults;
        Ok(())
    }

    pub fn calls(&self) -> Result<DevnetCalls> {
        Ok(self.lock()?.calls)
    }

    pub fn current_round(&self) -> Result<Round> {
        let state = self.lock()?;
        Ok(state.entry(state.current)?.round.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&mut DevnetState) -> Result<T>) -> Result<T> {
        let mut state = self.lock()?;
        state.take_read_fault()?;
        f(&mut state)
    }
}

impl std::fmt::Debug for DevnetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevnetLedger")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A [`LedgerGateway`] over a [`DevnetLedger`], signing as one resolver.
#[derive(Debug)]
pub struct DevnetClient {
    ledger: DevnetLedger,
    credentials: ResolverCredentials,
}

impl DevnetClient {
    #[must_use]
    pub fn ledger(&self) -> &DevnetLedger {
        &self.ledger
    }
}

#[async_trait]
impl LedgerGateway for DevnetClient {
    async fn current_round_id(&self) -> Result<RoundId> {
        self.ledger.read(|s| Ok(s.current))
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Round> {
        self.ledger.read(|s| Ok(s.entry(round_id)?.round.clone()))
    }

    async fn get_cell_occupancy(&self, round_id: RoundId) -> Result<Vec<u32>> {
        let cells = self.ledger.params.grid_cells;
        self.ledger.read(|s| Ok(s.entry(round_id)?.occupancy(cells)))
    }

    async fn get_cell_members(
        &self,
        round_id: RoundId,
        cell: CellIndex,
    ) -> Result<Vec<PlayerAddress>> {
        self.ledger.read(|s| {
            Ok(s.entry(round_id)?
                .members
                .get(&cell)
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn latest_block(&self) -> Result<BlockRef> {
        let now = self.ledger.clock.now();
        let block_time = self.ledger.params.block_time;
        self.ledger.read(|s| {
            let tip = s.tip();
            if now - tip.timestamp >= block_time {
                Ok(s.mine(now, Vec::new()))
            } else {
                Ok(tip)
            }
        })
    }

    async fn resolve_round(
        &self,
        random_output: RandomOutput,
        round_id: RoundId,
    ) -> Result<TxReceipt> {
        self.ledger
            .submit(&self.credentials.sign_resolve(round_id, random_output))
    }

    async fn skip_empty_round(&self, round_id: RoundId) -> Result<TxReceipt> {
        self.ledger.submit(&self.credentials.sign_skip(round_id))
    }
}

#[async_trait]
impl LedgerEventSource for DevnetClient {
    async fn events_since(&self, from_block: u64) -> Result<Vec<ObservedLedgerEvent>> {
        self.ledger.read(|s| {
            Ok(s.events
                .iter()
                .filter(|e| e.block_number >= from_block)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use gridzero_types::FieldElement;

    const CHAIN: u64 = 31_337;

    fn setup() -> (DevnetLedger, ManualClock, DevnetClient) {
        let clock = ManualClock::new(Utc::now());
        let creds = ResolverCredentials::generate(CHAIN);
        let params = DevnetParams {
            chain_id: CHAIN,
            grid_cells: 25,
            bonus_odds: 100,
            round_duration: chrono::Duration::seconds(30),
            block_time: chrono::Duration::seconds(1),
        };
        let ledger = DevnetLedger::new(params, creds.verifying_key(), Arc::new(clock.clone()));
        let client = ledger.client(creds);
        (ledger, clock, client)
    }

    fn player(n: u8) -> PlayerAddress {
        PlayerAddress([n; 20])
    }

    fn output(v: u64) -> RandomOutput {
        RandomOutput(FieldElement::from_u64(v))
    }

    fn end_round(clock: &ManualClock) {
        clock.advance(chrono::Duration::seconds(31));
    }

    #[tokio::test]
    async fn scenario_a_resolves_to_ninth_cell() {
        let (ledger, clock, client) = setup();
        for (i, cell) in [2u16, 5, 9, 13].into_iter().enumerate() {
            ledger.pick_cell(player(i as u8), CellIndex(cell)).unwrap();
        }
        end_round(&clock);
        client.resolve_round(output(6), RoundId(1)).await.unwrap();

        let round = client.get_round(RoundId(1)).await.unwrap();
        assert!(round.resolved);
        assert_eq!(round.winning_cell, Some(CellIndex(9)));
        assert_eq!(client.current_round_id().await.unwrap(), RoundId(2));
    }

    #[tokio::test]
    async fn resolve_before_end_reverts() {
        let (ledger, _clock, client) = setup();
        ledger.pick_cell(player(1), CellIndex(3)).unwrap();
        let err = client.resolve_round(output(1), RoundId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            GridzeroError::LedgerReverted {
                reason: RevertReason::RoundNotEnded,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn second_resolve_is_benign_race() {
        let (ledger, clock, client) = setup();
        ledger.pick_cell(player(1), CellIndex(3)).unwrap();
        end_round(&clock);
        client.resolve_round(output(1), RoundId(1)).await.unwrap();
        let err = client.resolve_round(output(2), RoundId(1)).await.unwrap_err();
        assert!(err.is_benign_race());
        // the first output stands
        let round = client.get_round(RoundId(1)).await.unwrap();
        assert_eq!(round.winning_cell, Some(CellIndex(3)));
    }

    #[tokio::test]
    async fn unknown_round_not_found() {
        let (_ledger, clock, client) = setup();
        end_round(&clock);
        let err = client.skip_empty_round(RoundId(2)).await.unwrap_err();
        assert!(matches!(err, GridzeroError::RoundNotFound(RoundId(2))));
        client.skip_empty_round(RoundId(1)).await.unwrap();
        end_round(&clock);
        let err = client.resolve_round(output(1), RoundId(3)).await.unwrap_err();
        assert!(matches!(err, GridzeroError::RoundNotFound(_)));
    }

    #[tokio::test]
    async fn skip_and_resolve_guard_player_count() {
        let (ledger, clock, client) = setup();
        end_round(&clock);
        let err = client.resolve_round(output(1), RoundId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            GridzeroError::LedgerReverted {
                reason: RevertReason::RoundEmpty,
                ..
            }
        ));
        client.skip_empty_round(RoundId(1)).await.unwrap();

        ledger.pick_cell(player(1), CellIndex(0)).unwrap();
        end_round(&clock);
        let err = client.skip_empty_round(RoundId(2)).await.unwrap_err();
        assert!(matches!(
            err,
            GridzeroError::LedgerReverted {
                reason: RevertReason::RoundNotEmpty,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unauthorized_signer_rejected() {
        let (ledger, clock, _client) = setup();
        end_round(&clock);
        let intruder = ledger.client(ResolverCredentials::generate(CHAIN));
        let err = intruder.skip_empty_round(RoundId(1)).await.unwrap_err();
        assert!(err.needs_operator());
        assert_eq!(ledger.current_round().unwrap().id, RoundId(1));
    }

    #[tokio::test]
    async fn picks_validated() {
        let (ledger, clock, client) = setup();
        ledger.pick_cell(player(1), CellIndex(4)).unwrap();
        assert!(ledger.pick_cell(player(1), CellIndex(5)).is_err());
        assert!(ledger.pick_cell(player(2), CellIndex(25)).is_err());
        ledger.pick_cell(player(2), CellIndex(4)).unwrap();

        let occupancy = client.get_cell_occupancy(RoundId(1)).await.unwrap();
        assert_eq!(occupancy.len(), 25);
        assert_eq!(occupancy[4], 2);
        let members = client.get_cell_members(RoundId(1), CellIndex(4)).await.unwrap();
        assert_eq!(members, vec![player(1), player(2)]);

        end_round(&clock);
        assert!(ledger.pick_cell(player(3), CellIndex(1)).is_err());
    }

    #[tokio::test]
    async fn events_and_blocks_advance() {
        let (ledger, clock, client) = setup();
        let genesis_tip = client.latest_block().await.unwrap();
        ledger.pick_cell(player(1), CellIndex(2)).unwrap();
        end_round(&clock);
        client.resolve_round(output(0), RoundId(1)).await.unwrap();

        let tip = client.latest_block().await.unwrap();
        assert!(tip.number > genesis_tip.number);
        assert_ne!(tip.hash, genesis_tip.hash);

        let events = client.events_since(0).await.unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].event, LedgerEvent::RoundStarted { .. }));
        assert!(matches!(events[1].event, LedgerEvent::CellPicked { .. }));
        assert!(matches!(events[2].event, LedgerEvent::RoundResolved { .. }));
        assert!(matches!(
            events[3].event,
            LedgerEvent::RoundStarted {
                round_id: RoundId(2),
                ..
            }
        ));
        let later = client.events_since(events[2].block_number).await.unwrap();
        assert_eq!(later.len(), 2);
    }

    #[tokio::test]
    async fn old_events_fall_out_of_retention() {
        let (ledger, clock, client) = setup();
        ledger.set_event_retention(3).unwrap();
        for n in 1..=5 {
            ledger.pick_cell(player(n), CellIndex(u16::from(n))).unwrap();
        }
        let kept = client.events_since(0).await.unwrap();
        assert_eq!(kept.len(), 3);
        let picked: Vec<PlayerAddress> = kept
            .iter()
            .filter_map(|e| match e.event {
                LedgerEvent::CellPicked { player, .. } => Some(player),
                _ => None,
            })
            .collect();
        assert_eq!(picked, vec![player(3), player(4), player(5)]);

        // Empty blocks keep coming without growing the event log.
        for _ in 0..10 {
            clock.advance(chrono::Duration::seconds(2));
            client.latest_block().await.unwrap();
        }
        assert_eq!(client.events_since(0).await.unwrap().len(), 3);
        assert_eq!(client.latest_block().await.unwrap().number, 16);
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let (ledger, clock, client) = setup();
        ledger
            .set_faults(DevnetFaults {
                fail_reads: 1,
                fail_writes: 1,
                ..DevnetFaults::default()
            })
            .unwrap();
        assert!(client.current_round_id().await.unwrap_err().is_transient());
        assert_eq!(client.current_round_id().await.unwrap(), RoundId(1));

        end_round(&clock);
        assert!(client.skip_empty_round(RoundId(1)).await.unwrap_err().is_transient());
        client.skip_empty_round(RoundId(1)).await.unwrap();

        let calls = ledger.calls().unwrap();
        assert_eq!(calls.skip_attempts, 2);
        assert_eq!(calls.accepted_writes, 1);
    }

    #[tokio::test]
    async fn simulated_picks_fill_round() {
        let (ledger, _clock, _client) = setup();
        let mut rng = rand::thread_rng();
        ledger.simulate_picks(8, &mut rng).unwrap();
        let round = ledger.current_round().unwrap();
        assert_eq!(round.total_players, 8);
        assert!(!round.occupied_cells.is_empty());
    }
}
