//! Process-local pipeline state.
//!
//! Owned by the resolver process and shared (behind an `Arc`) by the
//! scheduler, the orchestrator, the watcher and the ops endpoint. Nothing
//! here is persisted: after a restart the ledger is the only source of
//! truth, and duplicate settlements are rejected by the ledger itself.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use gridzero_types::{GridzeroError, LedgerEvent, RoundId, RoundOutcomeKind, constants};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// What kind of condition raised an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A settlement attempt failed in a way retrying will not fix.
    /// Cleared by the next successful settlement.
    AttemptFailure,
    /// Ledger state disagrees with what this process computed.
    /// Stays until the process restarts.
    Integrity,
}

/// Condition an operator must look at, surfaced on `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub kind: AlertKind,
    pub round_id: Option<RoundId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// The most recent round this process saw reach a final state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOutcome {
    pub round_id: RoundId,
    pub outcome: RoundOutcomeKind,
    pub at: DateTime<Utc>,
}

/// Counters fed by the ledger watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerActivity {
    pub cell_picks: u64,
    pub rounds_started: u64,
    pub rounds_resolved: u64,
    pub rounds_skipped: u64,
}

/// Serializable view of [`PipelineState`], returned by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub service: String,
    pub version: String,
    pub current_round: Option<RoundId>,
    pub last_block_observed: Option<u64>,
    pub resolving: bool,
    pub uptime_secs: u64,
    pub rounds_resolved: u64,
    pub rounds_skipped: u64,
    pub rounds_settled_elsewhere: u64,
    pub failed_attempts: u64,
    pub consecutive_failures: u64,
    pub ledger_activity: LedgerActivity,
    pub last_outcome: Option<LastOutcome>,
    pub operator_alert: Option<OperatorAlert>,
}

pub struct PipelineState {
    started: Instant,
    /// `0` until the first ledger read.
    current_round: AtomicU64,
    /// `u64::MAX` until the first block is observed.
    last_block: AtomicU64,
    resolving: AtomicBool,
    rounds_resolved: AtomicU64,
    rounds_skipped: AtomicU64,
    rounds_settled_elsewhere: AtomicU64,
    failed_attempts: AtomicU64,
    consecutive_failures: AtomicU64,
    activity: Mutex<LedgerActivity>,
    last_outcome: Mutex<Option<LastOutcome>>,
    operator_alert: Mutex<Option<OperatorAlert>>,
}

/// Clears the resolving flag when dropped.
#[derive(Debug)]
pub struct ResolvingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl PipelineState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            current_round: AtomicU64::new(0),
            last_block: AtomicU64::new(u64::MAX),
            resolving: AtomicBool::new(false),
            rounds_resolved: AtomicU64::new(0),
            rounds_skipped: AtomicU64::new(0),
            rounds_settled_elsewhere: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
            activity: Mutex::new(LedgerActivity::default()),
            last_outcome: Mutex::new(None),
            operator_alert: Mutex::new(None),
        }
    }

    /// Take the in-process resolving flag. `None` if another attempt holds it.
    pub fn try_begin_resolving(&self) -> Option<ResolvingGuard<'_>> {
        self.resolving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ResolvingGuard {
                flag: &self.resolving,
            })
    }

    pub fn is_resolving(&self) -> bool {
        self.resolving.load(Ordering::Acquire)
    }

    pub fn set_current_round(&self, round_id: RoundId) {
        self.current_round.store(round_id.0, Ordering::Release);
    }

    pub fn current_round(&self) -> Option<RoundId> {
        match self.current_round.load(Ordering::Acquire) {
            0 => None,
            id => Some(RoundId(id)),
        }
    }

    /// Record a block number; never moves backwards.
    pub fn observe_block(&self, number: u64) {
        let _ = self
            .last_block
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seen| {
                (seen == u64::MAX || number > seen).then_some(number)
            });
    }

    pub fn last_block_observed(&self) -> Option<u64> {
        match self.last_block.load(Ordering::Acquire) {
            u64::MAX => None,
            n => Some(n),
        }
    }

    /// A round reached a final state. Resets the failure streak.
    pub fn record_outcome(&self, round_id: RoundId, outcome: RoundOutcomeKind) {
        let counter = match outcome {
            RoundOutcomeKind::Resolved => &self.rounds_resolved,
            RoundOutcomeKind::Skipped => &self.rounds_skipped,
            RoundOutcomeKind::SettledElsewhere => &self.rounds_settled_elsewhere,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Release);
        if let Ok(mut last) = self.last_outcome.lock() {
            *last = Some(LastOutcome {
                round_id,
                outcome,
                at: Utc::now(),
            });
        }
        if let Ok(mut alert) = self.operator_alert.lock() {
            if alert.as_ref().is_some_and(|a| a.kind == AlertKind::AttemptFailure) {
                *alert = None;
            }
        }
    }

    /// A settlement attempt failed. Returns the new failure streak length.
    pub fn record_failure(&self, round_id: Option<RoundId>, error: &GridzeroError) -> u64 {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
        let streak = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if error.needs_operator() {
            let kind = match error {
                GridzeroError::WinnerMismatch { .. } | GridzeroError::LedgerInconsistent { .. } => {
                    AlertKind::Integrity
                }
                _ => AlertKind::AttemptFailure,
            };
            self.raise_alert(kind, round_id, error.to_string());
        }
        streak
    }

    pub fn raise_alert(&self, kind: AlertKind, round_id: Option<RoundId>, message: String) {
        if let Ok(mut alert) = self.operator_alert.lock() {
            // An integrity alert is never replaced by a lesser one.
            if alert.as_ref().is_some_and(|a| a.kind == AlertKind::Integrity)
                && kind != AlertKind::Integrity
            {
                return;
            }
            *alert = Some(OperatorAlert {
                kind,
                round_id,
                message,
                raised_at: Utc::now(),
            });
        }
    }

    pub fn operator_alert(&self) -> Option<OperatorAlert> {
        self.operator_alert.lock().ok().and_then(|a| a.clone())
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Count one observed ledger event.
    pub fn record_ledger_event(&self, event: &LedgerEvent) {
        if let Ok(mut activity) = self.activity.lock() {
            match event {
                LedgerEvent::CellPicked { .. } => activity.cell_picks += 1,
                LedgerEvent::RoundStarted { .. } => activity.rounds_started += 1,
                LedgerEvent::RoundResolved { .. } => activity.rounds_resolved += 1,
                LedgerEvent::EmptyRoundSkipped { .. } => activity.rounds_skipped += 1,
            }
        }
    }

    pub fn ledger_activity(&self) -> LedgerActivity {
        self.activity.lock().map(|a| *a).unwrap_or_default()
    }

    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            service: constants::SERVICE_NAME.to_string(),
            version: constants::VERSION.to_string(),
            current_round: self.current_round(),
            last_block_observed: self.last_block_observed(),
            resolving: self.is_resolving(),
            uptime_secs: self.started.elapsed().as_secs(),
            rounds_resolved: self.rounds_resolved.load(Ordering::Relaxed),
            rounds_skipped: self.rounds_skipped.load(Ordering::Relaxed),
            rounds_settled_elsewhere: self.rounds_settled_elsewhere.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
            ledger_activity: self.ledger_activity(),
            last_outcome: self.last_outcome.lock().ok().and_then(|l| l.clone()),
            operator_alert: self.operator_alert(),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineState")
            .field("current_round", &self.current_round())
            .field("resolving", &self.is_resolving())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish_non_exhaustive()
    }
}
