//! Batch accumulator: groups proofs per category before submission.
//!
//! A category's pending batch becomes due when it holds `batch_max` proofs
//! or when its oldest proof has waited `batch_window`. Draining sorts the
//! batch by round id so the same set of proofs always produces the same
//! submission order and batch digest.
//!
//! Each category holds at most `cap` proofs. Pushing past the cap evicts
//! the oldest, so an attestation outage cannot grow the queue without bound.
//! A requeued batch is held back for one window before it is due again.

use std::collections::BTreeMap;
use std::time::Duration;

use gridzero_types::{ProofCategory, ProofResult, VerificationKey};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

/// A proof waiting for its batch to be flushed.
#[derive(Debug, Clone)]
pub struct PendingProof {
    pub proof: ProofResult,
    pub verification_key: VerificationKey,
    pub enqueued_at: Instant,
}

/// What [`BatchAccumulator::push`] did with a proof.
#[derive(Debug)]
pub enum PushOutcome {
    Queued,
    /// The same statement is already pending.
    Duplicate,
    /// Queued, and these older proofs were evicted to stay within the cap.
    QueuedEvicting(Vec<PendingProof>),
}

#[derive(Debug)]
pub struct BatchAccumulator {
    pending: BTreeMap<ProofCategory, Vec<PendingProof>>,
    caps: BTreeMap<ProofCategory, usize>,
    held_until: BTreeMap<ProofCategory, Instant>,
    batch_max: usize,
    batch_window: Duration,
}

impl BatchAccumulator {
    /// # Panics
    /// Panics if `batch_max` is zero.
    #[must_use]
    pub fn new(batch_max: usize, batch_window: Duration) -> Self {
        assert!(batch_max > 0, "BatchAccumulator batch_max must be > 0");
        Self {
            pending: BTreeMap::new(),
            caps: BTreeMap::new(),
            held_until: BTreeMap::new(),
            batch_max,
            batch_window,
        }
    }

    /// Limit `category` to `cap` pending proofs (at least one batch).
    #[must_use]
    pub fn with_cap(mut self, category: ProofCategory, cap: usize) -> Self {
        self.caps.insert(category, cap.max(self.batch_max));
        self
    }

    #[must_use]
    pub fn cap(&self, category: ProofCategory) -> usize {
        self.caps.get(&category).copied().unwrap_or(usize::MAX)
    }

    /// Queue a proof, evicting the oldest pending proofs if over the cap.
    pub fn push(&mut self, category: ProofCategory, proof: ProofResult, vk: VerificationKey) -> PushOutcome {
        let statement = proof.statement();
        let queue = self.pending.entry(category).or_default();
        if queue.iter().any(|p| p.proof.statement() == statement) {
            return PushOutcome::Duplicate;
        }
        queue.push(PendingProof {
            proof,
            verification_key: vk,
            enqueued_at: Instant::now(),
        });
        let evicted = self.enforce_cap(category);
        if evicted.is_empty() {
            PushOutcome::Queued
        } else {
            PushOutcome::QueuedEvicting(evicted)
        }
    }

    fn enforce_cap(&mut self, category: ProofCategory) -> Vec<PendingProof> {
        let cap = self.cap(category);
        let Some(queue) = self.pending.get_mut(&category) else {
            return Vec::new();
        };
        if queue.len() <= cap {
            return Vec::new();
        }
        queue.sort_by_key(|p| p.enqueued_at);
        let excess = queue.len() - cap;
        queue.drain(..excess).collect()
    }

    /// Categories whose batch is full or whose oldest proof has waited long
    /// enough, skipping categories held back after a failed submission.
    #[must_use]
    pub fn due(&self, now: Instant) -> Vec<ProofCategory> {
        self.pending
            .iter()
            .filter(|(category, _)| self.held_until.get(category).is_none_or(|until| now >= *until))
            .filter(|(_, queue)| {
                queue.len() >= self.batch_max
                    || queue
                        .first()
                        .is_some_and(|p| now.duration_since(p.enqueued_at) >= self.batch_window)
            })
            .map(|(category, _)| *category)
            .collect()
    }

    /// Remove and return one category's pending proofs, sorted by round.
    pub fn take(&mut self, category: ProofCategory) -> Vec<PendingProof> {
        let mut batch = self.pending.remove(&category).unwrap_or_default();
        batch.sort_by_key(|p| (p.proof.round_id, p.proof.statement()));
        batch
    }

    /// Drain everything, e.g. on shutdown.
    pub fn take_all(&mut self) -> Vec<(ProofCategory, Vec<PendingProof>)> {
        let categories: Vec<_> = self.pending.keys().copied().collect();
        categories
            .into_iter()
            .map(|category| (category, self.take(category)))
            .filter(|(_, batch)| !batch.is_empty())
            .collect()
    }

    /// Put proofs back after a failed submission, keeping enqueue times.
    ///
    /// The category is not due again for one batch window. Returns the
    /// proofs evicted to stay within the cap.
    pub fn requeue(&mut self, category: ProofCategory, batch: Vec<PendingProof>) -> Vec<PendingProof> {
        let queue = self.pending.entry(category).or_default();
        for proof in batch {
            let statement = proof.proof.statement();
            if !queue.iter().any(|p| p.proof.statement() == statement) {
                queue.push(proof);
            }
        }
        queue.sort_by_key(|p| p.enqueued_at);
        self.held_until
            .insert(category, Instant::now() + self.batch_window);
        self.enforce_cap(category)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn batch_max(&self) -> usize {
        self.batch_max
    }
}

/// SHA-256 commitment to a drained batch, for log correlation.
#[must_use]
pub fn batch_digest(category: ProofCategory, batch: &[PendingProof]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"gridzero:attestation-batch:v1:");
    hasher.update(category.to_string().as_bytes());
    hasher.update((batch.len() as u64).to_be_bytes());
    for pending in batch {
        hasher.update(pending.proof.statement());
    }
    hasher.finalize().into()
}
