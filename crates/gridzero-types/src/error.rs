//! Error types for the GridZero settlement pipeline.
//!
//! All errors use the `GZ_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Ledger errors
//! - 2xx: Proof errors
//! - 3xx: Attestation errors
//! - 4xx: Scheduling / orchestration errors
//! - 9xx: General / internal errors

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AggregationId, CellIndex, DomainId, ProofCategory, RoundId};

/// Why the ledger rejected a resolve/skip transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RevertReason {
    /// The round was already resolved (or skipped).
    AlreadyResolved,
    /// The submitted round id is not the ledger's current round. `current`
    /// is `None` when the ledger only said so in free text.
    WrongRound {
        #[serde(default)]
        current: Option<RoundId>,
        submitted: RoundId,
    },
    /// The round's end time has not been reached on-chain yet.
    RoundNotEnded,
    /// A skip was submitted for a round that has players.
    RoundNotEmpty,
    /// A resolve was submitted for a round without players.
    RoundEmpty,
    /// The sender is not the authorized resolver.
    Unauthorized,
    /// The sender cannot pay for the transaction.
    InsufficientFunds,
    Other(String),
}

impl RevertReason {
    /// Another resolver instance already settled this round.
    #[must_use]
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Self::AlreadyResolved | Self::WrongRound { .. })
    }

    /// Whether the underlying condition could plausibly change by itself.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RoundNotEnded | Self::InsufficientFunds)
    }

    /// Best-effort classification of a raw revert message for a transaction
    /// that targeted `submitted`.
    #[must_use]
    pub fn from_message(message: &str, submitted: RoundId) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("already resolved") || lower.contains("already skipped") {
            Self::AlreadyResolved
        } else if lower.contains("wrong round") || lower.contains("round mismatch") {
            Self::WrongRound {
                current: None,
                submitted,
            }
        } else if lower.contains("not ended") || lower.contains("still active") {
            Self::RoundNotEnded
        } else if lower.contains("not empty") {
            Self::RoundNotEmpty
        } else if lower.contains("no players") || lower.contains("round empty") {
            Self::RoundEmpty
        } else if lower.contains("unauthorized") || lower.contains("not resolver") {
            Self::Unauthorized
        } else if lower.contains("insufficient funds") || lower.contains("gas") {
            Self::InsufficientFunds
        } else {
            Self::Other(message.to_string())
        }
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyResolved => write!(f, "round already resolved"),
            Self::WrongRound {
                current: Some(current),
                submitted,
            } => write!(f, "wrong round: current {current}, submitted {submitted}"),
            Self::WrongRound {
                current: None,
                submitted,
            } => write!(f, "wrong round: submitted {submitted}"),
            Self::RoundNotEnded => write!(f, "round not ended"),
            Self::RoundNotEmpty => write!(f, "round not empty"),
            Self::RoundEmpty => write!(f, "round has no players"),
            Self::Unauthorized => write!(f, "unauthorized resolver"),
            Self::InsufficientFunds => write!(f, "insufficient funds for gas"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// Central error enum for all GridZero pipeline operations.
#[derive(Debug, Error)]
pub enum GridzeroError {
    // =================================================================
    // Ledger Errors (1xx)
    // =================================================================
    /// RPC timeout, connection drop, or other transport failure.
    #[error("GZ_ERR_100: Ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    /// The ledger rejected a transaction.
    #[error("GZ_ERR_101: Ledger transaction reverted for {round_id}: {reason}")]
    LedgerReverted {
        round_id: RoundId,
        reason: RevertReason,
    },

    /// The requested round does not exist on the ledger.
    #[error("GZ_ERR_102: Round not found: {0}")]
    RoundNotFound(RoundId),

    /// Ledger state contradicts itself (e.g. players but no occupied cells).
    #[error("GZ_ERR_103: Inconsistent ledger state for {round_id}: {reason}")]
    LedgerInconsistent { round_id: RoundId, reason: String },

    // =================================================================
    // Proof Errors (2xx)
    // =================================================================
    /// The external prover failed or timed out.
    #[error("GZ_ERR_200: Proof generation failed for {round_id}: {reason}")]
    ProofGeneration { round_id: RoundId, reason: String },

    /// The produced proof did not verify against the known key.
    #[error("GZ_ERR_201: Local verification failed for {round_id}: {reason}")]
    LocalVerification { round_id: RoundId, reason: String },

    /// A leaderboard claim violates the scoring rules.
    #[error("GZ_ERR_202: Leaderboard claim rejected: {reason}")]
    LeaderboardRejected { reason: String },

    // =================================================================
    // Attestation Errors (3xx)
    // =================================================================
    /// The attestation service could not be reached.
    #[error("GZ_ERR_300: Attestation service unavailable: {reason}")]
    AttestationUnavailable { reason: String },

    /// The attestation service refused a request.
    #[error("GZ_ERR_301: Attestation rejected: {reason}")]
    AttestationRejected { reason: String },

    /// No receipt arrived within the configured bound.
    #[error("GZ_ERR_302: Receipt for {aggregation_id} in {domain_id} not available after {waited_ms}ms")]
    ReceiptTimeout {
        domain_id: DomainId,
        aggregation_id: AggregationId,
        waited_ms: u64,
    },

    /// A receipt's Merkle path does not lead to its root.
    #[error("GZ_ERR_303: Inclusion proof mismatch for {aggregation_id}")]
    InclusionMismatch { aggregation_id: AggregationId },

    /// No domain has been registered for this proof category.
    #[error("GZ_ERR_304: No aggregation domain registered for {0}")]
    DomainNotRegistered(ProofCategory),

    // =================================================================
    // Scheduling / Orchestration Errors (4xx)
    // =================================================================
    /// Another resolution attempt holds the in-process flag.
    #[error("GZ_ERR_400: Resolution already in progress")]
    ResolutionInProgress,

    /// The ledger recorded a different winner than computed locally.
    #[error("GZ_ERR_401: Winner mismatch for {round_id}: expected {expected}, ledger has {actual:?}")]
    WinnerMismatch {
        round_id: RoundId,
        expected: CellIndex,
        actual: Option<CellIndex>,
    },

    /// This process already committed a settlement for the round.
    #[error("GZ_ERR_402: Round already settled by this resolver: {0}")]
    RoundAlreadySettled(RoundId),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("GZ_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("GZ_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("GZ_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, process spawn).
    #[error("GZ_ERR_903: I/O error: {0}")]
    Io(String),
}

impl GridzeroError {
    /// Transient infrastructure faults: retry with delay, never fatal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::LedgerUnavailable { .. } | Self::AttestationUnavailable { .. } | Self::Io(_) => {
                true
            }
            Self::LedgerReverted { reason, .. } => reason.is_retryable(),
            _ => false,
        }
    }

    /// A ledger rejection meaning some resolver already settled the round.
    #[must_use]
    pub fn is_benign_race(&self) -> bool {
        matches!(self, Self::LedgerReverted { reason, .. } if reason.is_benign_race())
    }

    /// Conditions an operator has to look at: repeated occurrences stall the game.
    #[must_use]
    pub fn needs_operator(&self) -> bool {
        match self {
            Self::ProofGeneration { .. }
            | Self::LocalVerification { .. }
            | Self::LedgerInconsistent { .. }
            | Self::WinnerMismatch { .. }
            | Self::Configuration(_) => true,
            Self::LedgerReverted { reason, .. } => {
                !reason.is_benign_race() && !reason.is_retryable()
            }
            _ => false,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, GridzeroError>;

impl From<std::io::Error> for GridzeroError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GridzeroError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = GridzeroError::RoundNotFound(RoundId(3));
        let msg = format!("{err}");
        assert!(msg.starts_with("GZ_ERR_102"), "Got: {msg}");
    }

    #[test]
    fn already_resolved_is_benign() {
        let err = GridzeroError::LedgerReverted {
            round_id: RoundId(1),
            reason: RevertReason::AlreadyResolved,
        };
        assert!(err.is_benign_race());
        assert!(!err.is_transient());
        assert!(!err.needs_operator());
    }

    #[test]
    fn wrong_round_is_benign() {
        let err = GridzeroError::LedgerReverted {
            round_id: RoundId(1),
            reason: RevertReason::WrongRound {
                current: Some(RoundId(2)),
                submitted: RoundId(1),
            },
        };
        assert!(err.is_benign_race());
    }

    #[test]
    fn prover_failure_needs_operator_but_is_retried() {
        let err = GridzeroError::ProofGeneration {
            round_id: RoundId(4),
            reason: "prover exited with status 1".into(),
        };
        assert!(err.needs_operator());
        assert!(!err.is_benign_race());
    }

    #[test]
    fn unauthorized_needs_operator() {
        let err = GridzeroError::LedgerReverted {
            round_id: RoundId(1),
            reason: RevertReason::Unauthorized,
        };
        assert!(!err.is_benign_race());
        assert!(!err.is_transient());
        assert!(err.needs_operator());
    }

    #[test]
    fn gas_revert_is_transient() {
        let err = GridzeroError::LedgerReverted {
            round_id: RoundId(1),
            reason: RevertReason::InsufficientFunds,
        };
        assert!(err.is_transient());
        assert!(!err.needs_operator());
    }

    #[test]
    fn revert_message_classification() {
        let round = RoundId(5);
        assert_eq!(
            RevertReason::from_message("execution reverted: Round already resolved", round),
            RevertReason::AlreadyResolved
        );
        assert_eq!(
            RevertReason::from_message("Round not ended", round),
            RevertReason::RoundNotEnded
        );
        assert!(matches!(
            RevertReason::from_message("something odd", round),
            RevertReason::Other(_)
        ));
    }

    #[test]
    fn plain_text_wrong_round_is_benign() {
        for message in ["execution reverted: Wrong round", "round mismatch"] {
            let reason = RevertReason::from_message(message, RoundId(5));
            assert_eq!(
                reason,
                RevertReason::WrongRound {
                    current: None,
                    submitted: RoundId(5),
                }
            );
            let err = GridzeroError::LedgerReverted {
                round_id: RoundId(5),
                reason,
            };
            assert!(err.is_benign_race(), "{message}");
            assert!(!err.needs_operator(), "{message}");
            assert!(!err.is_transient(), "{message}");
        }
        assert_eq!(
            RevertReason::WrongRound {
                current: None,
                submitted: RoundId(5),
            }
            .to_string(),
            "wrong round: submitted round:5"
        );
    }

    #[test]
    fn all_errors_have_gz_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(GridzeroError::ResolutionInProgress),
            Box::new(GridzeroError::Internal("test".into())),
            Box::new(GridzeroError::ProofGeneration {
                round_id: RoundId(1),
                reason: "timeout".into(),
            }),
            Box::new(GridzeroError::DomainNotRegistered(ProofCategory::Randomness)),
            Box::new(GridzeroError::ReceiptTimeout {
                domain_id: DomainId(1),
                aggregation_id: AggregationId(2),
                waited_ms: 10,
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("GZ_ERR_"),
                "Error missing GZ_ERR_ prefix: {msg}"
            );
        }
    }
}
