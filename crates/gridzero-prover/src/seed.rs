//! Seed derivation and circuit input mapping.
//!
//! ```text
//! derived_seed = SHA-256("gridzero:seed:v1:" || secret || block_hash || round_id_be)[..31]
//! (x, y)       = (round_id mod 2^32, round_id >> 32)
//! ```
//!
//! The seed is truncated to 31 bytes so it always fits the BN254 scalar
//! field. The coordinate mapping is injective over all `u64` round ids.

use gridzero_types::{
    CircuitInputs, FieldElement, ProofRequest, RandomnessSecret, RoundId, constants,
};
use sha2::{Digest, Sha256};

/// Deterministic, secret-keyed seed for one round.
#[must_use]
pub fn derive_seed(secret: &RandomnessSecret, block_hash: &[u8; 32], round_id: RoundId) -> FieldElement {
    let mut hasher = Sha256::new();
    hasher.update(constants::SEED_DOMAIN);
    hasher.update(secret.expose());
    hasher.update(block_hash);
    hasher.update(round_id.to_be_bytes());
    FieldElement::truncated(hasher.finalize().into(), constants::SEED_FIELD_BYTES)
}

/// Circuit coordinates of a round.
#[must_use]
pub fn round_coordinates(round_id: RoundId) -> (u64, u64) {
    (round_id.0 & 0xFFFF_FFFF, round_id.0 >> 32)
}

/// Assemble the per-round proof request.
#[must_use]
pub fn build_request(
    secret: &RandomnessSecret,
    round_id: RoundId,
    block_hash: [u8; 32],
) -> ProofRequest {
    let derived_seed = derive_seed(secret, &block_hash, round_id);
    let (x, y) = round_coordinates(round_id);
    ProofRequest {
        secret_seed: secret.clone(),
        round_id,
        block_hash,
        derived_seed,
        circuit_inputs: CircuitInputs {
            seed: derived_seed,
            x,
            y,
        },
    }
}
