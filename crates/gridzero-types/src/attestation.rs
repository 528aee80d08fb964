//! Aggregation / attestation model.
//!
//! Proofs are grouped under long-lived aggregation domains. Each proof
//! category gets its own domain so the batching policy can match its
//! frequency: randomness proofs arrive every round and batch well, while
//! leaderboard and difficulty proofs are rare and should not wait long.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AggregationId, DomainId, KeyHandle, ProofKind, RoundId, VerificationKey, constants};

/// Which flow a proof belongs to. Each category maps to one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofCategory {
    Randomness,
    Leaderboard,
    Difficulty,
}

impl ProofCategory {
    pub const ALL: [Self; 3] = [Self::Randomness, Self::Leaderboard, Self::Difficulty];

    /// Proof system used by this category's circuit/program.
    #[must_use]
    pub fn proof_kind(self) -> ProofKind {
        match self {
            Self::Randomness => ProofKind::Groth16,
            Self::Leaderboard => ProofKind::Risc0,
            Self::Difficulty => ProofKind::Ezkl,
        }
    }

    /// Default `(aggregation_size, queue_size)` for this category.
    #[must_use]
    pub fn default_policy(self) -> (u32, u32) {
        match self {
            Self::Randomness => (
                constants::RANDOMNESS_AGGREGATION_SIZE,
                constants::RANDOMNESS_QUEUE_SIZE,
            ),
            Self::Leaderboard | Self::Difficulty => (
                constants::LOW_FREQUENCY_AGGREGATION_SIZE,
                constants::LOW_FREQUENCY_QUEUE_SIZE,
            ),
        }
    }
}

impl fmt::Display for ProofCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Randomness => write!(f, "RANDOMNESS"),
            Self::Leaderboard => write!(f, "LEADERBOARD"),
            Self::Difficulty => write!(f, "DIFFICULTY"),
        }
    }
}

/// Who may publish aggregations for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRule {
    #[default]
    Untrusted,
    OnlyTrusted,
}

/// Registration options for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DomainOptions {
    pub security_rule: SecurityRule,
    /// Destination chain the aggregation root is relayed to, if any.
    pub destination: Option<String>,
}

/// A registered batching policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationDomain {
    pub domain_id: DomainId,
    pub aggregation_size: u32,
    pub queue_size: u32,
    pub security_rule: SecurityRule,
}

/// How a submission references its verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum KeyRef {
    /// Previously registered key.
    Handle(KeyHandle),
    /// Full key sent inline (before registration succeeded).
    Inline(VerificationKey),
}

/// One proof as sent to the attestation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub kind: ProofKind,
    pub key: KeyRef,
    pub proof: Vec<u8>,
    pub public_signals: Vec<crate::FieldElement>,
    /// Round this proof settles, when it is a randomness proof.
    pub round_id: Option<RoundId>,
}

impl ProofSubmission {
    #[must_use]
    pub fn statement(&self) -> [u8; 32] {
        crate::statement_hash(self.kind, &self.public_signals)
    }
}

/// Pending transaction handle returned by `submit` / `batch_submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    pub tx_id: String,
    pub domain_id: DomainId,
    /// Known once the service has assigned the proof(s) to an aggregation.
    pub aggregation_id: Option<AggregationId>,
    /// Statements included in this submission, in submission order.
    pub statements: Vec<[u8; 32]>,
}

/// Result of the non-binding optimistic pre-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticVerdict {
    pub success: bool,
    pub message: String,
}

/// Sibling hashes from leaf to root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MerklePath {
    pub siblings: Vec<[u8; 32]>,
}

/// Evidence that a statement was included in an attested aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReceipt {
    pub domain_id: DomainId,
    pub aggregation_id: AggregationId,
    pub root: [u8; 32],
    pub merkle_path: MerklePath,
    pub leaf_index: u64,
    pub leaf_count: u64,
    /// Block of the attestation chain that published the root.
    pub block_hash: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn randomness_batches_larger_than_low_frequency() {
        let (rand_agg, _) = ProofCategory::Randomness.default_policy();
        let (lb_agg, _) = ProofCategory::Leaderboard.default_policy();
        assert!(rand_agg > lb_agg);
    }

    #[test]
    fn category_kinds() {
        assert_eq!(ProofCategory::Randomness.proof_kind(), ProofKind::Groth16);
        assert_eq!(ProofCategory::Leaderboard.proof_kind(), ProofKind::Risc0);
        assert_eq!(ProofCategory::Difficulty.proof_kind(), ProofKind::Ezkl);
    }

    #[test]
    fn key_ref_serde_roundtrip() {
        let key = KeyRef::Handle(KeyHandle("vk-1".into()));
        let json = serde_json::to_string(&key).unwrap();
        let back: KeyRef = serde_json::from_str(&json).unwrap();
        assert_eq!(key, back);
    }
}
