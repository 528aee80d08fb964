//! In-process attestation service.
//!
//! Aggregates statements per domain and publishes a Merkle root once an
//! aggregation reaches its domain's `aggregation_size`. Used by the devnet
//! wiring and by tests, which can also force-publish partial aggregations,
//! toggle outages and slow down the optimistic check.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use gridzero_types::{
    AggregationDomain, AggregationId, AggregationReceipt, DomainId, DomainOptions, GridzeroError,
    KeyHandle, KeyRef, OptimisticVerdict, ProofSubmission, Result, SubmissionHandle,
    VerificationKey,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::merkle;
use crate::service::AttestationService;

#[derive(Debug)]
struct PublishedAggregation {
    statements: Vec<[u8; 32]>,
    root: [u8; 32],
    block_hash: [u8; 32],
}

#[derive(Debug)]
struct DomainState {
    domain: AggregationDomain,
    open_id: AggregationId,
    open: Vec<[u8; 32]>,
    published: BTreeMap<AggregationId, PublishedAggregation>,
}

impl DomainState {
    fn capacity(&self) -> usize {
        usize::try_from(self.domain.aggregation_size).unwrap_or(usize::MAX)
    }

    fn publish_open(&mut self) -> Option<AggregationId> {
        if self.open.is_empty() {
            return None;
        }
        let id = self.open_id;
        let statements = std::mem::take(&mut self.open);
        let root = merkle::merkle_root(&statements);
        let mut hasher = Sha256::new();
        hasher.update(b"gridzero:attestation-block:");
        hasher.update(self.domain.domain_id.0.to_be_bytes());
        hasher.update(id.0.to_be_bytes());
        hasher.update(root);
        let block_hash = hasher.finalize().into();
        info!(
            domain = self.domain.domain_id.0,
            aggregation = id.0,
            leaves = statements.len(),
            root = %hex::encode(&root[..8]),
            "aggregation published"
        );
        self.published.insert(
            id,
            PublishedAggregation {
                statements,
                root,
                block_hash,
            },
        );
        self.open_id = AggregationId(id.0 + 1);
        Some(id)
    }
}

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryServiceStats {
    pub submissions: u64,
    pub optimistic_checks: u64,
    pub key_registrations: u64,
    pub domain_registrations: u64,
}

#[derive(Debug, Default)]
struct State {
    domains: BTreeMap<DomainId, DomainState>,
    keys: HashMap<[u8; 32], KeyHandle>,
    next_domain: u32,
    next_tx: u64,
    unavailable: bool,
    /// Submission calls still accepted before the service goes offline.
    calls_before_outage: Option<u64>,
    precheck_delay: Duration,
    stats: MemoryServiceStats,
}

impl State {
    fn check_up(&self) -> Result<()> {
        if self.unavailable {
            return Err(GridzeroError::AttestationUnavailable {
                reason: "attestation service offline".into(),
            });
        }
        Ok(())
    }

    fn validate(&self, proof: &ProofSubmission) -> std::result::Result<(), String> {
        if let KeyRef::Handle(handle) = &proof.key {
            if !self.keys.values().any(|h| h == handle) {
                return Err(format!("unknown verification key handle {handle}"));
            }
        }
        if proof.proof.is_empty() {
            return Err("empty proof".into());
        }
        if proof.public_signals.is_empty() {
            return Err("no public signals".into());
        }
        Ok(())
    }

    fn accept(&mut self, domain_id: DomainId, proofs: &[ProofSubmission]) -> Result<SubmissionHandle> {
        match self.calls_before_outage {
            Some(0) => {
                self.unavailable = true;
                self.calls_before_outage = None;
            }
            Some(n) => self.calls_before_outage = Some(n - 1),
            None => {}
        }
        self.check_up()?;
        for proof in proofs {
            self.validate(proof)
                .map_err(|reason| GridzeroError::AttestationRejected { reason })?;
        }
        let domain = self
            .domains
            .get_mut(&domain_id)
            .ok_or_else(|| GridzeroError::AttestationRejected {
                reason: format!("unknown {domain_id}"),
            })?;
        let queue_limit = domain
            .capacity()
            .saturating_mul(usize::try_from(domain.domain.queue_size).unwrap_or(usize::MAX));
        if domain.open.len() + proofs.len() > queue_limit {
            return Err(GridzeroError::AttestationRejected {
                reason: format!("{domain_id} queue full"),
            });
        }

        // Keep a batch within one aggregation whenever it fits in one.
        if domain.open.len() + proofs.len() > domain.capacity() {
            domain.publish_open();
        }
        let first_aggregation = domain.open_id;
        let statements: Vec<[u8; 32]> = proofs.iter().map(ProofSubmission::statement).collect();
        for statement in &statements {
            domain.open.push(*statement);
            if domain.open.len() >= domain.capacity() {
                domain.publish_open();
            }
        }

        self.next_tx += 1;
        self.stats.submissions += proofs.len() as u64;
        let tx_id = format!(
            "0x{}",
            hex::encode(Sha256::digest(self.next_tx.to_be_bytes()))
        );
        debug!(domain = domain_id.0, proofs = proofs.len(), tx = %tx_id, "proofs accepted");
        Ok(SubmissionHandle {
            tx_id,
            domain_id,
            aggregation_id: Some(first_aggregation),
            statements,
        })
    }
}

/// Attestation service living in this process.
#[derive(Debug, Default)]
pub struct InMemoryAttestationService {
    state: Mutex<State>,
}

impl InMemoryAttestationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| GridzeroError::Internal("attestation state lock poisoned".into()))
    }

    /// Simulate an outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) -> Result<()> {
        self.lock()?.unavailable = unavailable;
        Ok(())
    }

    /// Accept `calls` more submit/batch-submit calls, then go offline.
    pub fn set_outage_after(&self, calls: u64) -> Result<()> {
        self.lock()?.calls_before_outage = Some(calls);
        Ok(())
    }

    /// Make every optimistic check take `delay`.
    pub fn set_precheck_delay(&self, delay: Duration) -> Result<()> {
        self.lock()?.precheck_delay = delay;
        Ok(())
    }

    /// Publish the open aggregation of `domain_id` even if it is not full.
    pub fn publish_now(&self, domain_id: DomainId) -> Result<Option<AggregationId>> {
        let mut state = self.lock()?;
        let domain = state
            .domains
            .get_mut(&domain_id)
            .ok_or_else(|| GridzeroError::AttestationRejected {
                reason: format!("unknown {domain_id}"),
            })?;
        Ok(domain.publish_open())
    }

    pub fn stats(&self) -> Result<MemoryServiceStats> {
        Ok(self.lock()?.stats)
    }
}

#[async_trait]
impl AttestationService for InMemoryAttestationService {
    async fn register_domain(
        &self,
        aggregation_size: u32,
        queue_size: u32,
        options: &DomainOptions,
    ) -> Result<AggregationDomain> {
        let mut state = self.lock()?;
        state.check_up()?;
        if aggregation_size == 0 || queue_size == 0 {
            return Err(GridzeroError::AttestationRejected {
                reason: "aggregation and queue size must be > 0".into(),
            });
        }
        state.next_domain += 1;
        state.stats.domain_registrations += 1;
        let domain = AggregationDomain {
            domain_id: DomainId(state.next_domain),
            aggregation_size,
            queue_size,
            security_rule: options.security_rule,
        };
        state.domains.insert(
            domain.domain_id,
            DomainState {
                domain: domain.clone(),
                open_id: AggregationId(1),
                open: Vec::new(),
                published: BTreeMap::new(),
            },
        );
        Ok(domain)
    }

    async fn register_verification_key(&self, vk: &VerificationKey) -> Result<KeyHandle> {
        let mut state = self.lock()?;
        state.check_up()?;
        state.stats.key_registrations += 1;
        let hash = vk.hash();
        let handle = state
            .keys
            .entry(hash)
            .or_insert_with(|| KeyHandle(format!("0x{}", hex::encode(hash))))
            .clone();
        Ok(handle)
    }

    async fn submit(&self, domain_id: DomainId, proof: &ProofSubmission) -> Result<SubmissionHandle> {
        self.lock()?.accept(domain_id, std::slice::from_ref(proof))
    }

    async fn batch_submit(
        &self,
        domain_id: DomainId,
        proofs: &[ProofSubmission],
    ) -> Result<SubmissionHandle> {
        if proofs.is_empty() {
            return Err(GridzeroError::AttestationRejected {
                reason: "empty batch".into(),
            });
        }
        self.lock()?.accept(domain_id, proofs)
    }

    async fn optimistic_submit(&self, proof: &ProofSubmission) -> Result<OptimisticVerdict> {
        let delay = self.lock()?.precheck_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock()?;
        state.check_up()?;
        state.stats.optimistic_checks += 1;
        Ok(match state.validate(proof) {
            Ok(()) => OptimisticVerdict {
                success: true,
                message: "proof accepted".into(),
            },
            Err(message) => OptimisticVerdict {
                success: false,
                message,
            },
        })
    }

    async fn poll_receipt(
        &self,
        domain_id: DomainId,
        aggregation_id: AggregationId,
    ) -> Result<Option<AggregationReceipt>> {
        let state = self.lock()?;
        state.check_up()?;
        let Some(domain) = state.domains.get(&domain_id) else {
            return Ok(None);
        };
        Ok(domain.published.get(&aggregation_id).map(|agg| AggregationReceipt {
            domain_id,
            aggregation_id,
            root: agg.root,
            merkle_path: gridzero_types::MerklePath::default(),
            leaf_index: 0,
            leaf_count: agg.statements.len() as u64,
            block_hash: agg.block_hash,
        }))
    }

    async fn get_inclusion_path(
        &self,
        block_hash: [u8; 32],
        domain_id: DomainId,
        aggregation_id: AggregationId,
        statement: [u8; 32],
    ) -> Result<AggregationReceipt> {
        let state = self.lock()?;
        state.check_up()?;
        let reject = |reason: String| GridzeroError::AttestationRejected { reason };
        let agg = state
            .domains
            .get(&domain_id)
            .and_then(|d| d.published.get(&aggregation_id))
            .ok_or_else(|| reject(format!("{aggregation_id} not published in {domain_id}")))?;
        if agg.block_hash != block_hash {
            return Err(reject(format!("{aggregation_id} not published in given block")));
        }
        let index = agg
            .statements
            .iter()
            .position(|s| *s == statement)
            .ok_or_else(|| reject(format!("statement not in {aggregation_id}")))?;
        let merkle_path = merkle::merkle_path(&agg.statements, index)
            .ok_or_else(|| GridzeroError::Internal("leaf index out of range".into()))?;
        Ok(AggregationReceipt {
            domain_id,
            aggregation_id,
            root: agg.root,
            merkle_path,
            leaf_index: index as u64,
            leaf_count: agg.statements.len() as u64,
            block_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridzero_types::{FieldElement, ProofKind};

    fn proof(n: u64, key: KeyRef) -> ProofSubmission {
        ProofSubmission {
            kind: ProofKind::Groth16,
            key,
            proof: vec![1, 2, 3],
            public_signals: vec![FieldElement::from_u64(n)],
            round_id: None,
        }
    }

    fn vk() -> VerificationKey {
        VerificationKey::new(ProofKind::Groth16, b"vk".to_vec())
    }

    #[tokio::test]
    async fn aggregation_publishes_when_full() {
        let svc = InMemoryAttestationService::new();
        let domain = svc.register_domain(2, 4, &DomainOptions::default()).await.unwrap();
        let handle = svc.register_verification_key(&vk()).await.unwrap();

        let first = svc
            .submit(domain.domain_id, &proof(1, KeyRef::Handle(handle.clone())))
            .await
            .unwrap();
        let agg = first.aggregation_id.unwrap();
        assert!(svc.poll_receipt(domain.domain_id, agg).await.unwrap().is_none());

        svc.submit(domain.domain_id, &proof(2, KeyRef::Handle(handle)))
            .await
            .unwrap();
        let receipt = svc.poll_receipt(domain.domain_id, agg).await.unwrap().unwrap();
        assert_eq!(receipt.leaf_count, 2);

        let path = svc
            .get_inclusion_path(receipt.block_hash, domain.domain_id, agg, first.statements[0])
            .await
            .unwrap();
        assert!(merkle::verify_inclusion(&first.statements[0], &path));
    }

    #[tokio::test]
    async fn key_registration_is_stable() {
        let svc = InMemoryAttestationService::new();
        let a = svc.register_verification_key(&vk()).await.unwrap();
        let b = svc.register_verification_key(&vk()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn unknown_handle_rejected() {
        let svc = InMemoryAttestationService::new();
        let domain = svc.register_domain(2, 4, &DomainOptions::default()).await.unwrap();
        let bad = proof(1, KeyRef::Handle(KeyHandle("nope".into())));
        let verdict = svc.optimistic_submit(&bad).await.unwrap();
        assert!(!verdict.success);
        let err = svc.submit(domain.domain_id, &bad).await.unwrap_err();
        assert!(matches!(err, GridzeroError::AttestationRejected { .. }));
    }

    #[tokio::test]
    async fn queue_limit_enforced() {
        let svc = InMemoryAttestationService::new();
        let domain = svc.register_domain(4, 1, &DomainOptions::default()).await.unwrap();
        let batch: Vec<_> = (0..5).map(|n| proof(n, KeyRef::Inline(vk()))).collect();
        assert!(svc.batch_submit(domain.domain_id, &batch).await.is_err());
        svc.batch_submit(domain.domain_id, &batch[..4]).await.unwrap();
    }

    #[tokio::test]
    async fn outage_is_unavailable() {
        let svc = InMemoryAttestationService::new();
        svc.set_unavailable(true).unwrap();
        let err = svc.register_verification_key(&vk()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn outage_after_counted_calls() {
        let svc = InMemoryAttestationService::new();
        let domain = svc.register_domain(4, 4, &DomainOptions::default()).await.unwrap();
        svc.set_outage_after(1).unwrap();
        svc.submit(domain.domain_id, &proof(1, KeyRef::Inline(vk())))
            .await
            .unwrap();
        let err = svc
            .submit(domain.domain_id, &proof(2, KeyRef::Inline(vk())))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(svc.stats().unwrap().submissions, 1);

        svc.set_unavailable(false).unwrap();
        svc.submit(domain.domain_id, &proof(2, KeyRef::Inline(vk())))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn partial_aggregation_can_be_forced() {
        let svc = InMemoryAttestationService::new();
        let domain = svc.register_domain(16, 8, &DomainOptions::default()).await.unwrap();
        let handle = svc
            .submit(domain.domain_id, &proof(1, KeyRef::Inline(vk())))
            .await
            .unwrap();
        let agg = svc.publish_now(domain.domain_id).unwrap().unwrap();
        assert_eq!(Some(agg), handle.aggregation_id);
        assert!(svc.poll_receipt(domain.domain_id, agg).await.unwrap().is_some());
        assert!(svc.publish_now(domain.domain_id).unwrap().is_none());
    }
}
