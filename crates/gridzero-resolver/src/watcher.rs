//! Ledger event watcher.
//!
//! Polls the ledger's event log and republishes what it sees on the event
//! bus as `LedgerActivity`. Telemetry only: the watcher never writes round
//! state and the orchestrator never depends on it.

use std::sync::Arc;
use std::time::Duration;

use gridzero_ledger::LedgerEventSource;
use gridzero_types::{EventPublisher, LedgerEvent, PipelineEvent, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::PipelineState;

pub struct LedgerWatcher {
    source: Arc<dyn LedgerEventSource>,
    events: Arc<dyn EventPublisher>,
    state: Arc<PipelineState>,
    interval: Duration,
    /// First block not yet seen.
    next_block: u64,
}

impl LedgerWatcher {
    #[must_use]
    pub fn new(
        source: Arc<dyn LedgerEventSource>,
        events: Arc<dyn EventPublisher>,
        state: Arc<PipelineState>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            events,
            state,
            interval,
            next_block: 0,
        }
    }

    /// Start from `block` instead of genesis.
    #[must_use]
    pub fn starting_at(mut self, block: u64) -> Self {
        self.next_block = block;
        self
    }

    #[must_use]
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Fetch and republish everything since the last poll. Returns the
    /// number of events seen.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let observed = self.source.events_since(self.next_block).await?;
        let count = observed.len();
        for item in observed {
            match &item.event {
                LedgerEvent::RoundResolved {
                    round_id,
                    winning_cell,
                    is_bonus_round,
                    ..
                } => debug!(
                    round = round_id.0,
                    winner = winning_cell.0,
                    bonus = is_bonus_round,
                    block = item.block_number,
                    "ledger: round resolved"
                ),
                LedgerEvent::RoundStarted { round_id, end_time, .. } => {
                    debug!(round = round_id.0, end_time = %end_time, "ledger: round started");
                }
                LedgerEvent::CellPicked { .. } | LedgerEvent::EmptyRoundSkipped { .. } => {}
            }
            self.state.record_ledger_event(&item.event);
            self.state.observe_block(item.block_number);
            self.next_block = self.next_block.max(item.block_number + 1);
            self.events.publish(PipelineEvent::LedgerActivity {
                block_number: item.block_number,
                event: item.event,
            });
        }
        Ok(count)
    }

    /// Poll every `interval` until `shutdown` flips to `true`. Errors are
    /// logged and the next poll retries from the same block.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis(), "ledger watcher started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(from_block = self.next_block, error = %e, "ledger event poll failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(next_block = self.next_block, "ledger watcher stopped");
    }
}

impl std::fmt::Debug for LedgerWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerWatcher")
            .field("interval", &self.interval)
            .field("next_block", &self.next_block)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use chrono::Utc;
    use gridzero_ledger::{DevnetFaults, DevnetLedger, DevnetParams, ManualClock, ResolverCredentials};
    use gridzero_types::{CellIndex, EventKind, PlayerAddress};

    fn devnet() -> (DevnetLedger, Arc<dyn LedgerEventSource>) {
        let creds = ResolverCredentials::generate(5);
        let params = DevnetParams {
            chain_id: 5,
            grid_cells: 25,
            bonus_odds: 100,
            round_duration: chrono::Duration::seconds(30),
            block_time: chrono::Duration::seconds(1),
        };
        let ledger = DevnetLedger::new(
            params,
            creds.verifying_key(),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let source: Arc<dyn LedgerEventSource> = Arc::new(ledger.client(creds));
        (ledger, source)
    }

    #[tokio::test]
    async fn republishes_new_events_once() {
        let (ledger, source) = devnet();
        let bus = EventBus::new(32);
        let mut activity = bus.subscribe_kinds([EventKind::LedgerActivity]);
        let state = Arc::new(PipelineState::new());
        let mut watcher = LedgerWatcher::new(
            source,
            Arc::new(bus.clone()),
            state.clone(),
            Duration::from_secs(1),
        );

        // Block 1 carries RoundStarted for round 1.
        assert_eq!(watcher.poll_once().await.unwrap(), 1);
        ledger.pick_cell(PlayerAddress([1; 20]), CellIndex(2)).unwrap();
        ledger.pick_cell(PlayerAddress([2; 20]), CellIndex(3)).unwrap();
        assert_eq!(watcher.poll_once().await.unwrap(), 2);
        assert_eq!(watcher.poll_once().await.unwrap(), 0);

        let counters = state.ledger_activity();
        assert_eq!(counters.rounds_started, 1);
        assert_eq!(counters.cell_picks, 2);
        assert_eq!(state.last_block_observed(), Some(3));
        assert_eq!(watcher.next_block(), 4);

        let mut seen = 0;
        while activity.try_recv().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn failed_poll_keeps_position() {
        let (ledger, source) = devnet();
        let state = Arc::new(PipelineState::new());
        let mut watcher = LedgerWatcher::new(
            source,
            Arc::new(EventBus::new(8)),
            state,
            Duration::from_secs(1),
        )
        .starting_at(2);
        ledger
            .set_faults(DevnetFaults {
                fail_reads: 1,
                ..DevnetFaults::default()
            })
            .unwrap();
        ledger.pick_cell(PlayerAddress([1; 20]), CellIndex(2)).unwrap();
        assert!(watcher.poll_once().await.is_err());
        assert_eq!(watcher.next_block(), 2);
        assert_eq!(watcher.poll_once().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (_ledger, source) = devnet();
        let state = Arc::new(PipelineState::new());
        let watcher = LedgerWatcher::new(
            source,
            Arc::new(EventBus::new(8)),
            state.clone(),
            Duration::from_millis(500),
        );
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(watcher.run(rx));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(state.ledger_activity().rounds_started, 1);
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
