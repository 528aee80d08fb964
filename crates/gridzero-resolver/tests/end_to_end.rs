//! Full-pipeline scenarios against the devnet ledger, on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use gridzero_attestation::{InMemoryAttestationService, ProofAttestationClient};
use gridzero_ledger::{
    DevnetFaults, DevnetLedger, DevnetParams, LedgerGateway, ResolverCredentials,
    TokioClock, compute_outcome,
};
use gridzero_prover::testing::{ProverScript, ScriptedProver};
use gridzero_prover::{DigestProver, RandomnessProofPipeline};
use gridzero_resolver::{
    AlertKind, EventBus, MemoryRecorder, PipelineState, RoundScheduler, SettlementOrchestrator,
    SettlementOutcome,
};
use gridzero_types::{
    AttestationConfig, CellIndex, EventKind, PipelineEvent, PlayerAddress, RandomnessSecret,
    RoundId, SchedulerConfig,
};
use tokio::sync::watch;

const CHAIN: u64 = 31337;

fn params() -> DevnetParams {
    DevnetParams {
        chain_id: CHAIN,
        grid_cells: 25,
        bonus_odds: 100,
        round_duration: chrono::Duration::seconds(30),
        block_time: chrono::Duration::seconds(1),
    }
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        resolve_buffer_ms: 500,
        retry_delay_ms: 1_000,
        max_backoff_ms: 8_000,
        watch_interval_ms: 1_000,
    }
}

/// One resolver process attached to a shared devnet ledger.
struct Node {
    gateway: Arc<dyn LedgerGateway>,
    prover: Arc<ScriptedProver>,
    attestation_service: Arc<InMemoryAttestationService>,
    recorder: Arc<MemoryRecorder>,
    bus: EventBus,
    state: Arc<PipelineState>,
    scheduler: Arc<RoundScheduler>,
}

impl Node {
    fn new(ledger: &DevnetLedger, credentials: ResolverCredentials, clock: TokioClock, script: ProverScript) -> Self {
        let gateway: Arc<dyn LedgerGateway> = Arc::new(ledger.client(credentials));
        let prover = Arc::new(ScriptedProver::new(script));
        let attestation_service = Arc::new(InMemoryAttestationService::new());
        let bus = EventBus::new(256);
        let recorder = Arc::new(MemoryRecorder::new());
        let state = Arc::new(PipelineState::new());
        let orchestrator = Arc::new(SettlementOrchestrator::new(
            gateway.clone(),
            Arc::new(RandomnessProofPipeline::new(
                prover.clone(),
                DigestProver::verification_key(),
                RandomnessSecret::new(vec![0x5a; 32]).unwrap(),
                Duration::from_secs(10),
            )),
            Arc::new(ProofAttestationClient::new(
                attestation_service.clone(),
                AttestationConfig::default(),
                Arc::new(bus.clone()),
            )),
            recorder.clone(),
            Arc::new(bus.clone()),
            state.clone(),
            params().bonus_odds,
        ));
        let scheduler = Arc::new(RoundScheduler::new(
            gateway.clone(),
            orchestrator,
            Arc::new(clock),
            scheduler_config(),
        ));
        Self {
            gateway,
            prover,
            attestation_service,
            recorder,
            bus,
            state,
            scheduler,
        }
    }

    fn spawn(&self) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let scheduler = self.scheduler.clone();
        let task = tokio::spawn(async move { scheduler.run(rx).await });
        (tx, task)
    }
}

fn single_node(script: ProverScript) -> (DevnetLedger, Node) {
    let clock = TokioClock::new();
    let credentials = ResolverCredentials::generate(CHAIN);
    let ledger = DevnetLedger::new(params(), credentials.verifying_key(), Arc::new(clock));
    let node = Node::new(&ledger, credentials, clock, script);
    (ledger, node)
}

fn pick(ledger: &DevnetLedger, player: u8, cell: u16) {
    ledger
        .pick_cell(PlayerAddress([player; 20]), CellIndex(cell))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn empty_round_is_skipped_without_a_proof() {
    let (ledger, node) = single_node(ProverScript::Honest);
    let mut skipped = node.bus.subscribe_kinds([EventKind::RoundSkipped]);
    let (tx, task) = node.spawn();

    tokio::time::sleep(Duration::from_secs(32)).await;

    let event = tokio::time::timeout(Duration::from_secs(1), skipped.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, PipelineEvent::RoundSkipped { round_id, .. } if round_id == RoundId(1)));
    assert_eq!(node.prover.prove_calls(), 0);

    let round = node.gateway.get_round(RoundId(1)).await.unwrap();
    assert!(round.resolved);
    assert_eq!(round.winning_cell, None);
    let calls = ledger.calls().unwrap();
    assert_eq!(calls.resolve_attempts, 0);
    assert_eq!(calls.skip_attempts, 1);
    assert_eq!(node.recorder.rounds().len(), 1);
    assert!(node.recorder.participation().is_empty());

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn occupied_round_resolves_to_the_selected_cell() {
    let (ledger, node) = single_node(ProverScript::Honest);
    for (player, cell) in [(1, 2), (2, 5), (3, 9), (4, 13), (5, 9)] {
        pick(&ledger, player, cell);
    }
    let mut resolved = node.bus.subscribe_kinds([EventKind::RoundResolved]);
    let (tx, task) = node.spawn();

    let event = tokio::time::timeout(Duration::from_secs(40), resolved.recv())
        .await
        .unwrap()
        .unwrap();
    let PipelineEvent::RoundResolved {
        round_id,
        winning_cell,
        is_bonus_round,
        random_output,
        ..
    } = event
    else {
        panic!("unexpected event {event:?}");
    };
    assert_eq!(round_id, RoundId(1));

    let cells = [2u16, 5, 9, 13].map(CellIndex);
    let expected = compute_outcome(&random_output, cells, 100).unwrap();
    assert_eq!(winning_cell, expected.winning_cell);
    assert_eq!(is_bonus_round, expected.is_bonus_round);

    let round = node.gateway.get_round(RoundId(1)).await.unwrap();
    assert_eq!(round.winning_cell, Some(winning_cell));
    assert_eq!(node.prover.prove_calls(), 1);

    let participation = node.recorder.participation();
    assert_eq!(participation.len(), 1);
    let picks = &participation[0].picks;
    assert_eq!(picks.len(), 5);
    let on_winner = picks.iter().filter(|p| p.cell == winning_cell).count();
    let expected_on_winner = if winning_cell == CellIndex(9) { 2 } else { 1 };
    assert_eq!(on_winner, expected_on_winner);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn repeated_wakes_resolve_each_round_once() {
    let (ledger, node) = single_node(ProverScript::Honest);
    pick(&ledger, 1, 4);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let first = node.scheduler.tick().await.unwrap();
    assert!(matches!(first, SettlementOutcome::Resolved { round_id, .. } if round_id == RoundId(1)));

    // Round 2 has just started: the second wake finds nothing due.
    let second = node.scheduler.tick().await.unwrap();
    assert!(matches!(second, SettlementOutcome::NotDue { round_id, .. } if round_id == RoundId(2)));

    let calls = ledger.calls().unwrap();
    assert_eq!(calls.resolve_attempts, 1);
    assert_eq!(calls.accepted_writes, 1);
    assert_eq!(node.prover.prove_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn racing_resolvers_settle_a_round_exactly_once() {
    let clock = TokioClock::new();
    let credentials = ResolverCredentials::generate(CHAIN);
    let ledger = DevnetLedger::new(params(), credentials.verifying_key(), Arc::new(clock));
    let shared_key = credentials.secret_hex();
    let slow = ProverScript::Delay(Duration::from_secs(2));
    let a = Node::new(&ledger, credentials, clock, slow);
    let b = Node::new(
        &ledger,
        ResolverCredentials::from_hex(&shared_key, CHAIN).unwrap(),
        clock,
        slow,
    );
    pick(&ledger, 7, 11);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let (ra, rb) = tokio::join!(a.scheduler.tick(), b.scheduler.tick());
    let outcomes = [ra.unwrap(), rb.unwrap()];

    let resolved = outcomes
        .iter()
        .filter(|o| matches!(o, SettlementOutcome::Resolved { .. }))
        .count();
    let elsewhere = outcomes
        .iter()
        .filter(|o| matches!(o, SettlementOutcome::SettledElsewhere { .. }))
        .count();
    assert_eq!((resolved, elsewhere), (1, 1));

    let calls = ledger.calls().unwrap();
    assert_eq!(calls.resolve_attempts, 2);
    assert_eq!(calls.accepted_writes, 1);
    for node in [&a, &b] {
        assert!(node.state.operator_alert().is_none());
        assert_eq!(node.state.consecutive_failures(), 0);
    }
    let snaps = [a.state.snapshot(), b.state.snapshot()];
    assert_eq!(snaps.iter().map(|s| s.rounds_settled_elsewhere).sum::<u64>(), 1);
    assert_eq!(snaps.iter().map(|s| s.rounds_resolved).sum::<u64>(), 1);
}

#[tokio::test(start_paused = true)]
async fn prover_failure_is_retried_by_the_scheduler() {
    let (ledger, node) = single_node(ProverScript::FailTimes(2));
    pick(&ledger, 1, 3);
    let mut failures = node.bus.subscribe_kinds([EventKind::ResolutionFailed]);
    let (tx, task) = node.spawn();

    // Deadline at 30.5s, then backoff 1s and 2s before the third attempt.
    tokio::time::sleep(Duration::from_secs(40)).await;

    assert!(failures.try_recv().is_some());
    assert!(failures.try_recv().is_some());
    let snap = node.state.snapshot();
    assert_eq!(snap.rounds_resolved, 1);
    assert_eq!(snap.failed_attempts, 2);
    assert_eq!(snap.consecutive_failures, 0);
    assert!(snap.operator_alert.is_none());
    assert_eq!(node.prover.prove_calls(), 3);
    assert_eq!(ledger.calls().unwrap().resolve_attempts, 1);

    tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn attestation_outage_does_not_block_resolution() {
    let (ledger, node) = single_node(ProverScript::Honest);
    node.attestation_service.set_unavailable(true).unwrap();
    pick(&ledger, 1, 8);
    let mut attestation = node.bus.subscribe_kinds([EventKind::AttestationFailed]);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let outcome = node.scheduler.tick().await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Resolved { .. }));
    assert!(node.gateway.get_round(RoundId(1)).await.unwrap().resolved);

    let event = tokio::time::timeout(Duration::from_secs(60), attestation.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        PipelineEvent::AttestationFailed { ref round_ids, .. } if round_ids == &[RoundId(1)]
    ));
    assert!(node.state.operator_alert().is_none());
}

#[tokio::test(start_paused = true)]
async fn misreported_winner_raises_integrity_alert() {
    let (ledger, node) = single_node(ProverScript::Honest);
    pick(&ledger, 1, 6);
    pick(&ledger, 2, 12);
    ledger
        .set_faults(DevnetFaults {
            misreport_winner: true,
            ..DevnetFaults::default()
        })
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let outcome = node.scheduler.tick().await.unwrap();
    assert!(matches!(outcome, SettlementOutcome::Resolved { .. }));

    let alert = node.state.operator_alert().unwrap();
    assert_eq!(alert.kind, AlertKind::Integrity);
    assert_eq!(alert.round_id, Some(RoundId(1)));
    assert!(alert.message.contains("GZ_ERR_"));
}

#[tokio::test(start_paused = true)]
async fn scheduler_keeps_pace_with_the_ledger_over_many_rounds() {
    let (ledger, node) = single_node(ProverScript::Honest);
    let (tx, task) = node.spawn();

    // Picks land in whichever round is open; every few rounds stays empty.
    for round in 0..6u8 {
        if round % 3 != 2 {
            pick(&ledger, round + 1, u16::from(round) * 3);
        }
        tokio::time::sleep(Duration::from_secs(31)).await;
    }

    let snap = node.state.snapshot();
    assert!(snap.rounds_resolved >= 4, "resolved {}", snap.rounds_resolved);
    assert!(snap.rounds_skipped >= 1, "skipped {}", snap.rounds_skipped);
    assert_eq!(snap.failed_attempts, 0);
    assert!(ledger.current_round().unwrap().id >= RoundId(6));

    tx.send(true).unwrap();
    task.await.unwrap();
}
