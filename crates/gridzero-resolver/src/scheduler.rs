//! Round scheduler: sleep until the current round can be resolved, wake,
//! hand the observed block to the orchestrator, repeat.
//!
//! The deadline is recomputed from a fresh ledger read every cycle, so a
//! restarted process, a manual resolution or a competing resolver never
//! leaves a stale timer behind. Failures back off exponentially from
//! `retry_delay` up to `max_backoff`; the loop itself never gives up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gridzero_ledger::{Clock, LedgerGateway};
use gridzero_types::{GridzeroError, Result, SchedulerConfig};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::orchestrator::{SettlementOrchestrator, SettlementOutcome};

pub struct RoundScheduler {
    ledger: Arc<dyn LedgerGateway>,
    orchestrator: Arc<SettlementOrchestrator>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

/// What the loop does before the next cycle.
enum Wait {
    Until(DateTime<Utc>),
    For(Duration),
}

impl RoundScheduler {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        orchestrator: Arc<SettlementOrchestrator>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ledger,
            orchestrator,
            clock,
            config,
        }
    }

    /// `end_time + resolve_buffer` of the ledger's current round.
    pub async fn next_deadline(&self) -> Result<DateTime<Utc>> {
        let round_id = self.ledger.current_round_id().await?;
        let round = self.ledger.get_round(round_id).await?;
        self.orchestrator.state().set_current_round(round_id);
        let buffer = chrono::Duration::from_std(self.config.resolve_buffer())
            .map_err(|e| GridzeroError::Configuration(format!("resolve buffer: {e}")))?;
        Ok(round.end_time + buffer)
    }

    /// Observe the latest block and run one settlement attempt.
    pub async fn tick(&self) -> Result<SettlementOutcome> {
        let block = self.ledger.latest_block().await?;
        debug!(block = block.number, hash = %block.short_hash(), "scheduler woke");
        self.orchestrator.settle(block).await
    }

    /// Delay after the `failures`-th consecutive failure.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let base = self.config.retry_delay();
        let factor = 2u32.saturating_pow(failures.saturating_sub(1).min(16));
        base.saturating_mul(factor).min(self.config.max_backoff())
    }

    /// Run until `shutdown` flips to `true`. An attempt that has started
    /// always completes; shutdown is only observed while sleeping.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            resolve_buffer_ms = self.config.resolve_buffer_ms,
            retry_delay_ms = self.config.retry_delay_ms,
            "round scheduler started"
        );
        let mut failures = 0u32;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.next_deadline().await {
                Ok(deadline) => Wait::Until(deadline),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.backoff(failures);
                    warn!(error = %e, failures, retry_in_ms = delay.as_millis(), "round read failed");
                    Wait::For(delay)
                }
            };
            let read_failed = matches!(wait, Wait::For(_));
            if !self.sleep(wait, &mut shutdown).await {
                break;
            }
            if read_failed {
                continue;
            }

            let wait = match self.tick().await {
                Ok(outcome) => {
                    failures = 0;
                    if outcome.advanced() {
                        continue;
                    }
                    // Block time lags the wall clock, or the read replica
                    // lags the chain: poll again shortly.
                    debug!(round = outcome.round_id().0, ?outcome, "nothing to settle yet");
                    Wait::For(self.config.retry_delay())
                }
                Err(GridzeroError::ResolutionInProgress) => Wait::For(self.config.retry_delay()),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self.backoff(failures);
                    debug!(error = %e, failures, retry_in_ms = delay.as_millis(), "settlement retry scheduled");
                    Wait::For(delay)
                }
            };
            if !self.sleep(wait, &mut shutdown).await {
                break;
            }
        }
        info!("round scheduler stopped");
    }

    /// Sleep, waking early on shutdown. Returns `false` on shutdown.
    async fn sleep(&self, wait: Wait, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = async {
            match wait {
                Wait::Until(deadline) => self.clock.sleep_until(deadline).await,
                Wait::For(delay) => tokio::time::sleep(delay).await,
            }
        };
        tokio::select! {
            () = sleep => true,
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }
}

impl std::fmt::Debug for RoundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::recorder::TracingRecorder;
    use crate::state::PipelineState;
    use gridzero_attestation::{InMemoryAttestationService, ProofAttestationClient};
    use gridzero_ledger::{DevnetFaults, DevnetLedger, DevnetParams, ResolverCredentials, TokioClock};
    use gridzero_prover::{DigestProver, RandomnessProofPipeline};
    use gridzero_types::{AttestationConfig, CellIndex, PlayerAddress, RandomnessSecret, RoundId};

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            resolve_buffer_ms: 500,
            retry_delay_ms: 1_000,
            max_backoff_ms: 8_000,
            watch_interval_ms: 1_000,
        }
    }

    fn scheduler(clock: TokioClock) -> (DevnetLedger, Arc<PipelineState>, RoundScheduler) {
        let creds = ResolverCredentials::generate(1);
        let params = DevnetParams {
            chain_id: 1,
            grid_cells: 25,
            bonus_odds: 10,
            round_duration: chrono::Duration::seconds(30),
            block_time: chrono::Duration::seconds(1),
        };
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let ledger = DevnetLedger::new(params, creds.verifying_key(), clock.clone());
        let gateway: Arc<dyn LedgerGateway> = Arc::new(ledger.client(creds));
        let bus = EventBus::new(64);
        let state = Arc::new(PipelineState::new());
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            gateway.clone(),
            Arc::new(RandomnessProofPipeline::new(
                Arc::new(DigestProver),
                DigestProver::verification_key(),
                RandomnessSecret::new(vec![1; 32]).unwrap(),
                Duration::from_secs(5),
            )),
            Arc::new(ProofAttestationClient::new(
                Arc::new(InMemoryAttestationService::new()),
                AttestationConfig::default(),
                Arc::new(bus.clone()),
            )),
            Arc::new(TracingRecorder),
            Arc::new(bus),
            state.clone(),
            params.bonus_odds,
        ));
        let scheduler = RoundScheduler::new(gateway, orchestrator, clock, config());
        (ledger, state, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_end_plus_buffer() {
        let clock = TokioClock::new();
        let (ledger, state, scheduler) = scheduler(clock);
        let round = ledger.current_round().unwrap();
        let deadline = scheduler.next_deadline().await.unwrap();
        assert_eq!(deadline, round.end_time + chrono::Duration::milliseconds(500));
        assert_eq!(state.current_round(), Some(RoundId(1)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let (_, _, scheduler) = scheduler(TokioClock::new());
        assert_eq!(scheduler.backoff(1), Duration::from_secs(1));
        assert_eq!(scheduler.backoff(2), Duration::from_secs(2));
        assert_eq!(scheduler.backoff(4), Duration::from_secs(8));
        assert_eq!(scheduler.backoff(10), Duration::from_secs(8));
        assert_eq!(scheduler.backoff(u32::MAX), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn run_settles_rounds_and_stops_on_shutdown() {
        let (ledger, state, scheduler) = scheduler(TokioClock::new());
        ledger
            .pick_cell(PlayerAddress([1; 20]), CellIndex(4))
            .unwrap();
        let (tx, rx) = watch::channel(false);
        let scheduler = Arc::new(scheduler);
        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(rx).await }
        });

        // Round 1 (one player) and round 2 (empty) both end within 65s.
        tokio::time::sleep(Duration::from_secs(65)).await;
        let snap = state.snapshot();
        assert_eq!(snap.rounds_resolved, 1);
        assert!(snap.rounds_skipped >= 1);
        assert!(ledger.current_round().unwrap().id >= RoundId(3));

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn read_failures_retry_until_ledger_recovers() {
        let (ledger, state, scheduler) = scheduler(TokioClock::new());
        ledger
            .set_faults(DevnetFaults {
                fail_reads: 3,
                ..DevnetFaults::default()
            })
            .unwrap();
        let (tx, rx) = watch::channel(false);
        let scheduler = Arc::new(scheduler);
        let task = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(state.snapshot().rounds_skipped, 1);
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
