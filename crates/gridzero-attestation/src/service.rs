//! The seam to the external proof-attestation service.

use async_trait::async_trait;
use gridzero_types::{
    AggregationDomain, AggregationId, AggregationReceipt, DomainId, DomainOptions, KeyHandle,
    OptimisticVerdict, ProofSubmission, Result, SubmissionHandle, VerificationKey,
};

/// Remote aggregation and attestation of proofs.
///
/// Errors follow the shared taxonomy: unreachable service is
/// `AttestationUnavailable`, a refused request is `AttestationRejected`.
#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn register_domain(
        &self,
        aggregation_size: u32,
        queue_size: u32,
        options: &DomainOptions,
    ) -> Result<AggregationDomain>;

    async fn register_verification_key(&self, vk: &VerificationKey) -> Result<KeyHandle>;

    async fn submit(&self, domain_id: DomainId, proof: &ProofSubmission) -> Result<SubmissionHandle>;

    async fn batch_submit(
        &self,
        domain_id: DomainId,
        proofs: &[ProofSubmission],
    ) -> Result<SubmissionHandle>;

    /// Non-binding validity check, without queuing the proof.
    async fn optimistic_submit(&self, proof: &ProofSubmission) -> Result<OptimisticVerdict>;

    /// The published receipt of an aggregation, or `None` while it is still open.
    async fn poll_receipt(
        &self,
        domain_id: DomainId,
        aggregation_id: AggregationId,
    ) -> Result<Option<AggregationReceipt>>;

    /// Merkle path of `statement` within an aggregation published in `block_hash`.
    async fn get_inclusion_path(
        &self,
        block_hash: [u8; 32],
        domain_id: DomainId,
        aggregation_id: AggregationId,
        statement: [u8; 32],
    ) -> Result<AggregationReceipt>;
}
