//! The prover seam and its two implementations.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use gridzero_types::{
    CircuitInputs, FieldElement, GridzeroError, ProofKind, RawProof, Result, VerificationKey,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A proof system that can prove the randomness circuit and check its proofs.
#[async_trait]
pub trait Prover: Send + Sync {
    fn kind(&self) -> ProofKind;

    /// Run witness generation and proving for `inputs`.
    async fn full_prove(&self, inputs: &CircuitInputs) -> Result<RawProof>;

    /// `Ok(false)` means the proof is well-formed but does not verify.
    async fn verify(
        &self,
        vk: &VerificationKey,
        public_signals: &[FieldElement],
        proof: &[u8],
    ) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// DigestProver
// ---------------------------------------------------------------------------

/// Hash-based stand-in for the randomness circuit.
///
/// Produces the same signal layout as the circuit, `[output, seed_commitment, x, y]`,
/// with `output = SHA-256(tag || seed || x || y)[..31]`. The "proof" is a
/// SHA-256 MAC over the verification key and the signals. It is
/// deterministic and unpredictable without the seed, but it is not zero
/// knowledge: anyone holding the key bytes can forge it. Devnet and tests only.
#[derive(Debug, Clone, Default)]
pub struct DigestProver;

impl DigestProver {
    const OUTPUT_TAG: &'static [u8] = b"gridzero:digest-prover:output:v1:";
    const COMMIT_TAG: &'static [u8] = b"gridzero:digest-prover:commit:v1:";
    const PROOF_TAG: &'static [u8] = b"gridzero:digest-prover:proof:v1:";

    /// The verification key matching proofs from this prover.
    #[must_use]
    pub fn verification_key() -> VerificationKey {
        VerificationKey::new(ProofKind::Groth16, b"gridzero-digest-prover-vk".to_vec())
    }

    fn output_for(inputs: &CircuitInputs) -> FieldElement {
        let mut hasher = Sha256::new();
        hasher.update(Self::OUTPUT_TAG);
        hasher.update(inputs.seed.as_bytes());
        hasher.update(inputs.x.to_be_bytes());
        hasher.update(inputs.y.to_be_bytes());
        FieldElement::truncated(hasher.finalize().into(), 31)
    }

    fn commitment_for(seed: &FieldElement) -> FieldElement {
        let mut hasher = Sha256::new();
        hasher.update(Self::COMMIT_TAG);
        hasher.update(seed.as_bytes());
        FieldElement::truncated(hasher.finalize().into(), 31)
    }

    fn proof_tag(vk: &VerificationKey, public_signals: &[FieldElement]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(Self::PROOF_TAG);
        hasher.update(vk.hash());
        for signal in public_signals {
            hasher.update(signal.as_bytes());
        }
        hasher.finalize().into()
    }
}

#[async_trait]
impl Prover for DigestProver {
    fn kind(&self) -> ProofKind {
        ProofKind::Groth16
    }

    async fn full_prove(&self, inputs: &CircuitInputs) -> Result<RawProof> {
        let public_signals = vec![
            Self::output_for(inputs),
            Self::commitment_for(&inputs.seed),
            FieldElement::from_u64(inputs.x),
            FieldElement::from_u64(inputs.y),
        ];
        let proof = Self::proof_tag(&Self::verification_key(), &public_signals).to_vec();
        Ok(RawProof {
            proof,
            public_signals,
        })
    }

    async fn verify(
        &self,
        vk: &VerificationKey,
        public_signals: &[FieldElement],
        proof: &[u8],
    ) -> Result<bool> {
        Ok(proof == Self::proof_tag(vk, public_signals).as_slice())
    }
}

// ---------------------------------------------------------------------------
// ExternalProver
// ---------------------------------------------------------------------------

/// Output of the external prove command.
#[derive(Debug, Deserialize)]
struct ProveOutput {
    proof: serde_json::Value,
    #[serde(rename = "publicSignals")]
    public_signals: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyOutput {
    valid: bool,
}

/// Drives an external proving toolchain through two commands.
///
/// - prove: reads `{"seed","x","y"}` (decimal strings) on stdin, writes
///   `{"proof": <json>, "publicSignals": ["<decimal>", ...]}` on stdout
/// - verify: reads `{"vk": <json>, "publicSignals": [...], "proof": <json>}`
///   on stdin, writes `{"valid": bool}` on stdout
///
/// Commands are killed if the caller's future is dropped (e.g. on timeout).
#[derive(Debug, Clone)]
pub struct ExternalProver {
    kind: ProofKind,
    prove_command: Vec<String>,
    verify_command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ExternalProver {
    pub fn new(kind: ProofKind, prove_command: Vec<String>, verify_command: Vec<String>) -> Result<Self> {
        if prove_command.is_empty() || verify_command.is_empty() {
            return Err(GridzeroError::Configuration(
                "external prover needs both prove_command and verify_command".into(),
            ));
        }
        Ok(Self {
            kind,
            prove_command,
            verify_command,
            working_dir: None,
        })
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run(&self, argv: &[String], stdin_json: &serde_json::Value) -> Result<Vec<u8>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GridzeroError::Configuration("empty prover command".into()))?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        debug!(program = %program, "spawning prover command");
        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&serde_json::to_vec(stdin_json)?).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GridzeroError::Internal(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Prover for ExternalProver {
    fn kind(&self) -> ProofKind {
        self.kind
    }

    async fn full_prove(&self, inputs: &CircuitInputs) -> Result<RawProof> {
        let stdout = self.run(&self.prove_command, &inputs.to_prover_json()).await?;
        let parsed: ProveOutput = serde_json::from_slice(&stdout)?;
        let public_signals = parsed
            .public_signals
            .iter()
            .map(|s| FieldElement::from_decimal_str(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(RawProof {
            proof: serde_json::to_vec(&parsed.proof)?,
            public_signals,
        })
    }

    async fn verify(
        &self,
        vk: &VerificationKey,
        public_signals: &[FieldElement],
        proof: &[u8],
    ) -> Result<bool> {
        let vk_json: serde_json::Value = serde_json::from_slice(&vk.bytes)?;
        let proof_json: serde_json::Value = serde_json::from_slice(proof)?;
        let signals: Vec<String> = public_signals
            .iter()
            .map(FieldElement::to_decimal_string)
            .collect();
        let request = serde_json::json!({
            "vk": vk_json,
            "publicSignals": signals,
            "proof": proof_json,
        });
        let stdout = self.run(&self.verify_command, &request).await?;
        let parsed: VerifyOutput = serde_json::from_slice(&stdout)?;
        Ok(parsed.valid)
    }
}
