//! Proof model shared by the prover pipeline and the attestation client.
//!
//! ```text
//!   secret ─┐
//!   block ──┼─▶ derived_seed ─▶ CircuitInputs ─▶ prover ─▶ RawProof
//!   round ──┘                                             │
//!                                   local verify (vk) ◀───┘
//!                                             │
//!                                             ▼
//!                                        ProofResult (random_output = signals[0])
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{FieldElement, GridzeroError, RandomOutput, Result, RoundId};

/// The proof system a proof (and its verification key) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    /// Circom/snarkjs Groth16 (randomness circuit).
    Groth16,
    /// RISC Zero receipt (leaderboard program).
    Risc0,
    /// EZKL Halo2 proof (difficulty model).
    Ezkl,
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Groth16 => write!(f, "groth16"),
            Self::Risc0 => write!(f, "risc0"),
            Self::Ezkl => write!(f, "ezkl"),
        }
    }
}

/// A verification key as loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub kind: ProofKind,
    pub bytes: Vec<u8>,
}

impl VerificationKey {
    #[must_use]
    pub fn new(kind: ProofKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// SHA-256 over kind tag and key bytes; used as the registration cache key.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"gridzero:vk:v1:");
        hasher.update(self.kind.to_string().as_bytes());
        hasher.update(&self.bytes);
        hasher.finalize().into()
    }
}

/// The resolver's randomness secret. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct RandomnessSecret(Vec<u8>);

impl RandomnessSecret {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 16 {
            return Err(GridzeroError::Configuration(
                "randomness secret must be at least 16 bytes".into(),
            ));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim().trim_start_matches("0x")).map_err(|e| {
            GridzeroError::Configuration(format!("randomness secret is not valid hex: {e}"))
        })?;
        Self::new(bytes)
    }

    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RandomnessSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomnessSecret(<redacted {} bytes>)", self.0.len())
    }
}

impl Serialize for RandomnessSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for RandomnessSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Inputs to the randomness circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitInputs {
    pub seed: FieldElement,
    pub x: u64,
    pub y: u64,
}

impl CircuitInputs {
    /// snarkjs-style input object: every signal as a decimal string.
    #[must_use]
    pub fn to_prover_json(&self) -> serde_json::Value {
        serde_json::json!({
            "seed": self.seed.to_decimal_string(),
            "x": self.x.to_string(),
            "y": self.y.to_string(),
        })
    }
}

/// Everything needed to prove one round. Constructed per round, never persisted.
#[derive(Debug, Clone)]
pub struct ProofRequest {
    pub secret_seed: RandomnessSecret,
    pub round_id: RoundId,
    pub block_hash: [u8; 32],
    pub derived_seed: FieldElement,
    pub circuit_inputs: CircuitInputs,
}

/// Untrusted prover output, before local verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProof {
    pub proof: Vec<u8>,
    pub public_signals: Vec<FieldElement>,
}

/// A locally verified proof of a round's random output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    pub round_id: RoundId,
    pub kind: ProofKind,
    pub proof: Vec<u8>,
    pub public_signals: Vec<FieldElement>,
    pub random_output: RandomOutput,
}

impl ProofResult {
    /// Statement committed to by aggregation: hash of kind and public signals.
    #[must_use]
    pub fn statement(&self) -> [u8; 32] {
        statement_hash(self.kind, &self.public_signals)
    }
}

/// Hash binding a proof kind to its public signals.
#[must_use]
pub fn statement_hash(kind: ProofKind, public_signals: &[FieldElement]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"gridzero:statement:v1:");
    hasher.update(kind.to_string().as_bytes());
    hasher.update((public_signals.len() as u64).to_be_bytes());
    for signal in public_signals {
        hasher.update(signal.as_bytes());
    }
    hasher.finalize().into()
}
