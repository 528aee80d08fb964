//! Resolver credentials and signed ledger transactions.
//!
//! Only the configured resolver account may resolve or skip rounds. Every
//! write is an ed25519-signed [`SignedLedgerTx`] bound to the chain id, so
//! a transaction for one ledger instance cannot be replayed on another.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use gridzero_types::{GridzeroError, RandomOutput, Result, RevertReason, RoundId};
use serde::{Deserialize, Serialize};

/// The two write operations the pipeline performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedgerAction {
    Resolve {
        round_id: RoundId,
        random_output: RandomOutput,
    },
    Skip {
        round_id: RoundId,
    },
}

impl LedgerAction {
    #[must_use]
    pub fn round_id(&self) -> RoundId {
        match self {
            Self::Resolve { round_id, .. } | Self::Skip { round_id } => *round_id,
        }
    }
}

/// A write transaction signed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLedgerTx {
    pub chain_id: u64,
    pub action: LedgerAction,
    pub resolver: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedLedgerTx {
    /// Canonical signing payload.
    ///
    /// Format: `"gridzero:tx:v1:" || chain_id || action_tag || round_id || random_output?`
    #[must_use]
    pub fn signing_payload(chain_id: u64, action: &LedgerAction) -> Vec<u8> {
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(b"gridzero:tx:v1:");
        payload.extend_from_slice(&chain_id.to_be_bytes());
        match action {
            LedgerAction::Resolve {
                round_id,
                random_output,
            } => {
                payload.push(0);
                payload.extend_from_slice(&round_id.to_be_bytes());
                payload.extend_from_slice(random_output.as_bytes());
            }
            LedgerAction::Skip { round_id } => {
                payload.push(1);
                payload.extend_from_slice(&round_id.to_be_bytes());
            }
        }
        payload
    }

    /// Check the signature and that the signer is `authorized`.
    ///
    /// # Errors
    /// Returns a `LedgerReverted` with [`RevertReason::Unauthorized`] on any failure.
    pub fn verify(&self, expected_chain_id: u64, authorized: &VerifyingKey) -> Result<()> {
        let unauthorized = || GridzeroError::LedgerReverted {
            round_id: self.action.round_id(),
            reason: RevertReason::Unauthorized,
        };
        if self.chain_id != expected_chain_id || self.resolver != authorized.to_bytes() {
            return Err(unauthorized());
        }
        let sig_bytes: [u8; 64] = self
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| unauthorized())?;
        let signature = Signature::from_bytes(&sig_bytes);
        authorized
            .verify(&Self::signing_payload(self.chain_id, &self.action), &signature)
            .map_err(|_| unauthorized())
    }

    /// Transaction hash: SHA-256 over payload and signature.
    #[must_use]
    pub fn tx_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(Self::signing_payload(self.chain_id, &self.action));
        hasher.update(&self.signature);
        hasher.finalize().into()
    }
}

/// The resolver's signing identity.
pub struct ResolverCredentials {
    signing_key: SigningKey,
    chain_id: u64,
}

impl ResolverCredentials {
    #[must_use]
    pub fn new(signing_key: SigningKey, chain_id: u64) -> Self {
        Self {
            signing_key,
            chain_id,
        }
    }

    /// Load from a hex-encoded 32-byte secret key.
    pub fn from_hex(secret_hex: &str, chain_id: u64) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim().trim_start_matches("0x")).map_err(|e| {
            GridzeroError::Configuration(format!("resolver key is not valid hex: {e}"))
        })?;
        let secret: [u8; 32] = bytes.try_into().map_err(|_| {
            GridzeroError::Configuration("resolver key must be 32 bytes".into())
        })?;
        Ok(Self::new(SigningKey::from_bytes(&secret), chain_id))
    }

    /// Fresh random identity (devnet, keygen).
    #[must_use]
    pub fn generate(chain_id: u64) -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng), chain_id)
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Hex of the secret key, for `keygen` output only.
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    #[must_use]
    pub fn sign(&self, action: LedgerAction) -> SignedLedgerTx {
        let payload = SignedLedgerTx::signing_payload(self.chain_id, &action);
        let signature = self.signing_key.sign(&payload);
        SignedLedgerTx {
            chain_id: self.chain_id,
            action,
            resolver: self.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn sign_resolve(&self, round_id: RoundId, random_output: RandomOutput) -> SignedLedgerTx {
        self.sign(LedgerAction::Resolve {
            round_id,
            random_output,
        })
    }

    #[must_use]
    pub fn sign_skip(&self, round_id: RoundId) -> SignedLedgerTx {
        self.sign(LedgerAction::Skip { round_id })
    }
}

impl std::fmt::Debug for ResolverCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverCredentials")
            .field("resolver", &hex::encode(&self.verifying_key().to_bytes()[..8]))
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}
