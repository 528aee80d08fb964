//! Randomness proof pipeline: request, prove, verify, extract.
//!
//! Nothing produced by the prover is trusted until it has verified against
//! the pipeline's verification key. Only then is `public_signals[0]`
//! returned as the round's random output.

use std::sync::Arc;
use std::time::Duration;

use gridzero_types::{
    BlockRef, GridzeroError, ProofResult, RandomOutput, RandomnessSecret, Result, RoundId,
    VerificationKey,
};
use tracing::{debug, error, info, warn};

use crate::prover::Prover;
use crate::seed;

pub struct RandomnessProofPipeline {
    prover: Arc<dyn Prover>,
    verification_key: VerificationKey,
    secret: RandomnessSecret,
    timeout: Duration,
}

impl RandomnessProofPipeline {
    #[must_use]
    pub fn new(
        prover: Arc<dyn Prover>,
        verification_key: VerificationKey,
        secret: RandomnessSecret,
        timeout: Duration,
    ) -> Self {
        Self {
            prover,
            verification_key,
            secret,
            timeout,
        }
    }

    #[must_use]
    pub fn verification_key(&self) -> &VerificationKey {
        &self.verification_key
    }

    /// Prove the random output of `round_id` seeded by `block`.
    pub async fn prove_for_block(&self, round_id: RoundId, block: &BlockRef) -> Result<ProofResult> {
        self.prove(round_id, block.hash).await
    }

    /// Derive the seed, run the prover (bounded by the timeout), and verify
    /// the result locally.
    ///
    /// # Errors
    /// - [`GridzeroError::ProofGeneration`] if the prover fails or times out
    /// - [`GridzeroError::LocalVerification`] if the proof does not verify or
    ///   carries no public signals
    pub async fn prove(&self, round_id: RoundId, block_hash: [u8; 32]) -> Result<ProofResult> {
        let request = seed::build_request(&self.secret, round_id, block_hash);
        debug!(
            round = round_id.0,
            block_hash = %hex::encode(&block_hash[..4]),
            x = request.circuit_inputs.x,
            y = request.circuit_inputs.y,
            "proof request built"
        );

        let raw = match tokio::time::timeout(
            self.timeout,
            self.prover.full_prove(&request.circuit_inputs),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(round = round_id.0, error = %e, "prover failed");
                return Err(GridzeroError::ProofGeneration {
                    round_id,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(round = round_id.0, timeout_ms = self.timeout.as_millis(), "prover timed out");
                return Err(GridzeroError::ProofGeneration {
                    round_id,
                    reason: format!("timed out after {}ms", self.timeout.as_millis()),
                });
            }
        };

        let Some(first) = raw.public_signals.first().copied() else {
            error!(round = round_id.0, "prover returned no public signals");
            return Err(GridzeroError::LocalVerification {
                round_id,
                reason: "empty public signals".into(),
            });
        };

        let verified = self
            .prover
            .verify(&self.verification_key, &raw.public_signals, &raw.proof)
            .await
            .map_err(|e| GridzeroError::LocalVerification {
                round_id,
                reason: e.to_string(),
            })?;
        if !verified {
            error!(round = round_id.0, "proof failed local verification");
            return Err(GridzeroError::LocalVerification {
                round_id,
                reason: "proof rejected by verification key".into(),
            });
        }

        let random_output = RandomOutput(first);
        info!(round = round_id.0, output = %random_output, "randomness proof verified");
        Ok(ProofResult {
            round_id,
            kind: self.prover.kind(),
            proof: raw.proof,
            public_signals: raw.public_signals,
            random_output,
        })
    }
}

impl std::fmt::Debug for RandomnessProofPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomnessProofPipeline")
            .field("kind", &self.prover.kind())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
