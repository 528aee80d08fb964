//! Attestation client used by the settlement pipeline.
//!
//! Everything here is best-effort from the pipeline's point of view: the
//! orchestrator hands a verified proof to [`ProofAttestationClient::spawn_attestation`]
//! and moves on to the ledger write. Failures are logged and published as
//! [`PipelineEvent::AttestationFailed`], never returned to the resolution path.
//!
//! Per process the client registers each category's aggregation domain once
//! and each verification key once, and reuses the results.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use gridzero_types::{
    AggregationDomain, AggregationId, AggregationReceipt, AttestationConfig, DomainId,
    DomainOptions, EventPublisher, GridzeroError, KeyHandle, KeyRef, OptimisticVerdict,
    PipelineEvent, ProofCategory, ProofResult, ProofSubmission, Result, RoundId,
    SubmissionHandle, SubmissionMode, VerificationKey,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::{BatchAccumulator, PendingProof, PushOutcome, batch_digest};
use crate::merkle;
use crate::service::AttestationService;

pub struct ProofAttestationClient {
    service: Arc<dyn AttestationService>,
    config: AttestationConfig,
    events: Arc<dyn EventPublisher>,
    domains: tokio::sync::Mutex<HashMap<ProofCategory, AggregationDomain>>,
    keys: tokio::sync::Mutex<HashMap<[u8; 32], KeyHandle>>,
    batch: Mutex<BatchAccumulator>,
    tasks: Mutex<JoinSet<()>>,
}

impl ProofAttestationClient {
    #[must_use]
    pub fn new(
        service: Arc<dyn AttestationService>,
        config: AttestationConfig,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let batch = ProofCategory::ALL.into_iter().fold(
            BatchAccumulator::new(config.batch_max.max(1), config.batch_window()),
            |acc, category| acc.with_cap(category, config.pending_cap(category)),
        );
        Self {
            service,
            config,
            events,
            domains: tokio::sync::Mutex::new(HashMap::new()),
            keys: tokio::sync::Mutex::new(HashMap::new()),
            batch: Mutex::new(batch),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AttestationConfig {
        &self.config
    }

    fn batch(&self) -> Result<MutexGuard<'_, BatchAccumulator>> {
        self.batch
            .lock()
            .map_err(|_| GridzeroError::Internal("batch accumulator lock poisoned".into()))
    }

    // -----------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------

    /// The domain for `category`, registering it on first use.
    pub async fn ensure_domain(&self, category: ProofCategory) -> Result<AggregationDomain> {
        let mut domains = self.domains.lock().await;
        if let Some(domain) = domains.get(&category) {
            return Ok(domain.clone());
        }
        let (aggregation_size, queue_size) = self.config.policy_for(category);
        let options = DomainOptions {
            security_rule: self.config.security_rule,
            destination: None,
        };
        let domain = self
            .service
            .register_domain(aggregation_size, queue_size, &options)
            .await?;
        info!(
            category = %category,
            domain = domain.domain_id.0,
            aggregation_size,
            queue_size,
            "aggregation domain registered"
        );
        domains.insert(category, domain.clone());
        Ok(domain)
    }

    /// Domain already registered for `category`, if any.
    pub async fn registered_domain(&self, category: ProofCategory) -> Option<AggregationDomain> {
        self.domains.lock().await.get(&category).cloned()
    }

    /// The handle for `vk`, registering it on first use.
    pub async fn key_handle(&self, vk: &VerificationKey) -> Result<KeyHandle> {
        let hash = vk.hash();
        let mut keys = self.keys.lock().await;
        if let Some(handle) = keys.get(&hash) {
            return Ok(handle.clone());
        }
        let handle = self.service.register_verification_key(vk).await?;
        debug!(handle = %handle, kind = %vk.kind, "verification key registered");
        keys.insert(hash, handle.clone());
        Ok(handle)
    }

    async fn submission(&self, proof: &ProofResult, vk: &VerificationKey) -> Result<ProofSubmission> {
        Ok(ProofSubmission {
            kind: proof.kind,
            key: KeyRef::Handle(self.key_handle(vk).await?),
            proof: proof.proof.clone(),
            public_signals: proof.public_signals.clone(),
            round_id: Some(proof.round_id),
        })
    }

    // -----------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------

    /// Submit one proof to its category's domain.
    pub async fn submit(
        &self,
        proof: &ProofResult,
        vk: &VerificationKey,
        category: ProofCategory,
    ) -> Result<SubmissionHandle> {
        let domain = self.ensure_domain(category).await?;
        let submission = self.submission(proof, vk).await?;
        let handle = self.service.submit(domain.domain_id, &submission).await?;
        self.published_submission(category, &[proof.round_id], &handle);
        Ok(handle)
    }

    /// Submit several proofs sharing one key, split to fit the domain's aggregation size.
    ///
    /// # Errors
    /// The error of the first chunk the service refused. Chunks before it
    /// were accepted and announced as [`PipelineEvent::AttestationSubmitted`].
    pub async fn batch_submit(
        &self,
        proofs: &[ProofResult],
        vk: &VerificationKey,
        category: ProofCategory,
    ) -> Result<Vec<SubmissionHandle>> {
        let mut submissions = Vec::with_capacity(proofs.len());
        for proof in proofs {
            submissions.push(self.submission(proof, vk).await?);
        }
        let chunked = self.submit_chunks(category, &submissions).await;
        match chunked.error {
            Some(e) => Err(e),
            None => Ok(chunked.handles),
        }
    }

    async fn submit_chunks(
        &self,
        category: ProofCategory,
        submissions: &[ProofSubmission],
    ) -> ChunkedSubmission {
        let mut chunked = ChunkedSubmission::default();
        if submissions.is_empty() {
            return chunked;
        }
        let domain = match self.ensure_domain(category).await {
            Ok(domain) => domain,
            Err(e) => {
                chunked.error = Some(e);
                return chunked;
            }
        };
        let chunk_size = usize::try_from(domain.aggregation_size.max(1)).unwrap_or(usize::MAX);
        for chunk in submissions.chunks(chunk_size) {
            match self.service.batch_submit(domain.domain_id, chunk).await {
                Ok(handle) => {
                    let rounds: Vec<RoundId> = chunk.iter().filter_map(|s| s.round_id).collect();
                    self.published_submission(category, &rounds, &handle);
                    chunked.accepted += chunk.len();
                    chunked.handles.push(handle);
                }
                Err(e) => {
                    chunked.error = Some(e);
                    break;
                }
            }
        }
        chunked
    }

    fn published_submission(&self, category: ProofCategory, rounds: &[RoundId], handle: &SubmissionHandle) {
        info!(
            category = %category,
            domain = handle.domain_id.0,
            tx = %handle.tx_id,
            proofs = handle.statements.len(),
            "proofs submitted for attestation"
        );
        self.events.publish(PipelineEvent::AttestationSubmitted {
            category,
            round_ids: rounds.to_vec(),
            tx_id: handle.tx_id.clone(),
            domain_id: handle.domain_id,
            timestamp: Utc::now(),
        });
    }

    /// Non-binding validity check before committing to a submission.
    pub async fn optimistic_submit(
        &self,
        proof: &ProofResult,
        vk: &VerificationKey,
    ) -> Result<OptimisticVerdict> {
        let submission = self.submission(proof, vk).await?;
        self.service.optimistic_submit(&submission).await
    }

    // -----------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------

    /// Queue a proof for the next batch. Returns whether its category is now full.
    pub fn enqueue(&self, category: ProofCategory, proof: ProofResult, vk: VerificationKey) -> Result<bool> {
        let mut batch = self.batch()?;
        let round = proof.round_id;
        let evicted = match batch.push(category, proof, vk) {
            PushOutcome::Queued => Vec::new(),
            PushOutcome::Duplicate => {
                debug!(round = round.0, "proof already queued");
                Vec::new()
            }
            PushOutcome::QueuedEvicting(evicted) => evicted,
        };
        let due = batch.due(Instant::now()).contains(&category);
        drop(batch);
        self.evicted(category, &evicted);
        Ok(due)
    }

    /// Number of proofs waiting in the accumulator.
    pub fn pending(&self) -> usize {
        self.batch().map_or(0, |b| b.len())
    }

    /// Submit every batch that is full or past its window.
    pub async fn flush_due(&self) -> Vec<SubmissionHandle> {
        let due = match self.batch() {
            Ok(mut batch) => {
                let categories = batch.due(Instant::now());
                categories
                    .into_iter()
                    .map(|c| (c, batch.take(c)))
                    .collect::<Vec<_>>()
            }
            Err(e) => {
                warn!(error = %e, "cannot drain batch accumulator");
                return Vec::new();
            }
        };
        self.submit_batches(due).await
    }

    /// Submit everything pending, regardless of window.
    pub async fn flush(&self) -> Vec<SubmissionHandle> {
        let all = match self.batch() {
            Ok(mut batch) => batch.take_all(),
            Err(e) => {
                warn!(error = %e, "cannot drain batch accumulator");
                return Vec::new();
            }
        };
        self.submit_batches(all).await
    }

    async fn submit_batches(&self, batches: Vec<(ProofCategory, Vec<PendingProof>)>) -> Vec<SubmissionHandle> {
        let mut handles = Vec::new();
        for (category, mut batch) in batches {
            if batch.is_empty() {
                continue;
            }
            let digest = batch_digest(category, &batch);
            debug!(category = %category, proofs = batch.len(), digest = %hex::encode(&digest[..8]), "flushing batch");
            let mut chunked = self.submit_pending(category, &batch).await;
            handles.append(&mut chunked.handles);
            let Some(e) = chunked.error else {
                continue;
            };
            // Only the proofs the service never accepted are retried.
            let unsubmitted = batch.split_off(chunked.accepted.min(batch.len()));
            let rounds: Vec<RoundId> = unsubmitted.iter().map(|p| p.proof.round_id).collect();
            self.failed(category, rounds, &e);
            if e.is_transient() {
                let evicted = match self.batch() {
                    Ok(mut acc) => acc.requeue(category, unsubmitted),
                    Err(_) => Vec::new(),
                };
                self.evicted(category, &evicted);
            }
        }
        handles
    }

    async fn submit_pending(&self, category: ProofCategory, batch: &[PendingProof]) -> ChunkedSubmission {
        let mut submissions = Vec::with_capacity(batch.len());
        for pending in batch {
            match self.submission(&pending.proof, &pending.verification_key).await {
                Ok(submission) => submissions.push(submission),
                Err(e) => {
                    return ChunkedSubmission {
                        error: Some(e),
                        ..ChunkedSubmission::default()
                    };
                }
            }
        }
        self.submit_chunks(category, &submissions).await
    }

    /// Report proofs dropped from a full queue.
    fn evicted(&self, category: ProofCategory, evicted: &[PendingProof]) {
        if evicted.is_empty() {
            return;
        }
        let rounds: Vec<RoundId> = evicted.iter().map(|p| p.proof.round_id).collect();
        let cap = self.batch().map_or(0, |b| b.cap(category));
        self.failed(
            category,
            rounds,
            &GridzeroError::AttestationUnavailable {
                reason: format!("pending queue full ({cap} proofs); oldest proofs dropped"),
            },
        );
    }

    /// Periodically flush due batches until `shutdown` flips to `true`.
    pub async fn run_flusher(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = (self.config.batch_window() / 2).max(Duration::from_millis(100));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for handle in self.flush_due().await {
                        if self.config.follow_receipts {
                            self.spawn_follow(handle);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("batch flusher stopped");
    }

    // -----------------------------------------------------------------
    // Receipts
    // -----------------------------------------------------------------

    /// Poll until the aggregation is published, bounded by `receipt_timeout_ms`.
    pub async fn wait_for_receipt(
        &self,
        domain_id: DomainId,
        aggregation_id: AggregationId,
    ) -> Result<AggregationReceipt> {
        let started = Instant::now();
        let deadline = started + self.config.receipt_timeout();
        loop {
            match self.service.poll_receipt(domain_id, aggregation_id).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) if e.is_transient() => {
                    debug!(domain = domain_id.0, aggregation = aggregation_id.0, error = %e, "receipt poll failed");
                }
                Err(e) => return Err(e),
            }
            if Instant::now() + self.config.receipt_poll() > deadline {
                return Err(GridzeroError::ReceiptTimeout {
                    domain_id,
                    aggregation_id,
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(self.config.receipt_poll()).await;
        }
    }

    /// Fetch the inclusion path of `statement` and check it against the root.
    pub async fn inclusion_path(
        &self,
        block_hash: [u8; 32],
        domain_id: DomainId,
        aggregation_id: AggregationId,
        statement: [u8; 32],
    ) -> Result<AggregationReceipt> {
        let receipt = self
            .service
            .get_inclusion_path(block_hash, domain_id, aggregation_id, statement)
            .await?;
        if !Self::verify_inclusion(&statement, &receipt) {
            return Err(GridzeroError::InclusionMismatch { aggregation_id });
        }
        Ok(receipt)
    }

    /// Recompute the receipt's Merkle root from `statement` and compare.
    #[must_use]
    pub fn verify_inclusion(statement: &[u8; 32], receipt: &AggregationReceipt) -> bool {
        merkle::verify_inclusion(statement, receipt)
    }

    /// Wait for a submission's aggregation and verify each of its statements.
    pub async fn follow_receipt(&self, handle: &SubmissionHandle) -> Result<Vec<AggregationReceipt>> {
        let Some(aggregation_id) = handle.aggregation_id else {
            return Ok(Vec::new());
        };
        let published = self.wait_for_receipt(handle.domain_id, aggregation_id).await?;
        let mut receipts = Vec::with_capacity(handle.statements.len());
        for statement in &handle.statements {
            let receipt = self
                .inclusion_path(published.block_hash, handle.domain_id, aggregation_id, *statement)
                .await?;
            self.events.publish(PipelineEvent::AggregationReceived {
                domain_id: handle.domain_id,
                aggregation_id,
                root: receipt.root,
                statement: *statement,
                timestamp: Utc::now(),
            });
            receipts.push(receipt);
        }
        info!(
            domain = handle.domain_id.0,
            aggregation = aggregation_id.0,
            statements = receipts.len(),
            "aggregation receipt verified"
        );
        Ok(receipts)
    }

    // -----------------------------------------------------------------
    // Best-effort path
    // -----------------------------------------------------------------

    /// Full attestation flow for one randomness proof: optional pre-check,
    /// then submit (or queue), then optionally follow the receipt.
    pub async fn attest_randomness(&self, proof: ProofResult, vk: VerificationKey) -> Result<()> {
        let category = ProofCategory::Randomness;
        if self.config.optimistic_precheck {
            let verdict = self.optimistic_submit(&proof, &vk).await?;
            if !verdict.success {
                return Err(GridzeroError::AttestationRejected {
                    reason: format!("optimistic check failed: {}", verdict.message),
                });
            }
        }
        match self.config.mode {
            SubmissionMode::Single => {
                let handle = self.submit(&proof, &vk, category).await?;
                if self.config.follow_receipts {
                    self.follow_receipt(&handle).await?;
                }
            }
            SubmissionMode::Batched => {
                if self.enqueue(category, proof, vk)? {
                    for handle in self.flush_due().await {
                        if self.config.follow_receipts {
                            self.follow_receipt(&handle).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Run [`Self::attest_randomness`] in the background.
    pub fn spawn_attestation(self: &Arc<Self>, proof: ProofResult, vk: VerificationKey) {
        if !self.config.enabled {
            return;
        }
        let this = Arc::clone(self);
        self.spawn(async move {
            let round = proof.round_id;
            if let Err(e) = this.attest_randomness(proof, vk).await {
                this.failed(ProofCategory::Randomness, vec![round], &e);
            }
        });
    }

    fn spawn_follow(self: &Arc<Self>, handle: SubmissionHandle) {
        let this = Arc::clone(self);
        self.spawn(async move {
            if let Err(e) = this.follow_receipt(&handle).await {
                warn!(tx = %handle.tx_id, error = %e, "receipt follow-up failed");
            }
        });
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self.tasks.lock() {
            Ok(mut tasks) => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn(task);
            }
            Err(_) => warn!("attestation task set lock poisoned; task dropped"),
        }
    }

    fn failed(&self, category: ProofCategory, round_ids: Vec<RoundId>, error: &GridzeroError) {
        warn!(category = %category, rounds = ?round_ids, error = %error, "attestation failed");
        self.events.publish(PipelineEvent::AttestationFailed {
            category,
            round_ids,
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Background attestation tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.lock().map_or(0, |t| t.len())
    }

    /// Wait up to `grace` for background tasks, then flush pending batches.
    /// A task still in its pre-check enqueues its proof when it finishes.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => JoinSet::new(),
        };
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = tasks.len(), "attestation tasks aborted at shutdown");
            tasks.abort_all();
        }
        let flushed = self.flush().await;
        if !flushed.is_empty() {
            info!(submissions = flushed.len(), "pending attestation batches flushed");
        }
    }
}

/// Progress of a chunked batch submission.
#[derive(Debug, Default)]
struct ChunkedSubmission {
    handles: Vec<SubmissionHandle>,
    /// Submissions covered by `handles`, counted from the front.
    accepted: usize,
    /// Why the remaining submissions were not sent.
    error: Option<GridzeroError>,
}

impl std::fmt::Debug for ProofAttestationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofAttestationClient")
            .field("mode", &self.config.mode)
            .field("pending", &self.pending())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
