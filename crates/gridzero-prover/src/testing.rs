//! Controllable prover for exercising failure paths. **Never use in production.**

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gridzero_types::{CircuitInputs, FieldElement, GridzeroError, ProofKind, RawProof, Result, VerificationKey};

use crate::prover::{DigestProver, Prover};

/// Behaviour of a [`ScriptedProver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProverScript {
    /// Behave like [`DigestProver`].
    Honest,
    /// Fail the first `n` prove calls, then behave honestly.
    FailTimes(u32),
    /// Sleep before proving.
    Delay(Duration),
    /// Return a proof that does not verify.
    CorruptProof,
    /// Return a verifying proof without public signals.
    EmptySignals,
}

/// A [`DigestProver`] wrapper with scripted faults and a call counter.
#[derive(Debug)]
pub struct ScriptedProver {
    script: ProverScript,
    calls: AtomicU32,
}

impl ScriptedProver {
    #[must_use]
    pub fn new(script: ProverScript) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of `full_prove` invocations so far.
    pub fn prove_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prover for ScriptedProver {
    fn kind(&self) -> ProofKind {
        ProofKind::Groth16
    }

    async fn full_prove(&self, inputs: &CircuitInputs) -> Result<RawProof> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ProverScript::FailTimes(n) if call < n => {
                return Err(GridzeroError::Internal("scripted prover failure".into()));
            }
            ProverScript::Delay(d) => tokio::time::sleep(d).await,
            _ => {}
        }
        let mut raw = DigestProver.full_prove(inputs).await?;
        match self.script {
            ProverScript::CorruptProof => raw.proof[0] ^= 0xFF,
            ProverScript::EmptySignals => raw.public_signals.clear(),
            _ => {}
        }
        Ok(raw)
    }

    async fn verify(
        &self,
        vk: &VerificationKey,
        public_signals: &[FieldElement],
        proof: &[u8],
    ) -> Result<bool> {
        if self.script == ProverScript::EmptySignals {
            return Ok(true);
        }
        DigestProver.verify(vk, public_signals, proof).await
    }
}
