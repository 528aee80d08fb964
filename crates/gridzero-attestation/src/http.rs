//! Attestation service reached over HTTP.
//!
//! Requests are authenticated with an `x-api-key` header. Transport
//! failures and `5xx` map to `AttestationUnavailable`; other non-success
//! statuses map to `AttestationRejected`.

use std::time::Duration;

use async_trait::async_trait;
use gridzero_types::{
    AggregationDomain, AggregationId, AggregationReceipt, DomainId, DomainOptions, GridzeroError,
    KeyHandle, OptimisticVerdict, ProofSubmission, Result, SubmissionHandle, VerificationKey,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::AttestationService;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
struct RegisterDomainRequest<'a> {
    aggregation_size: u32,
    queue_size: u32,
    #[serde(flatten)]
    options: &'a DomainOptions,
}

#[derive(Debug, Deserialize)]
struct RegisterKeyResponse {
    handle: KeyHandle,
}

#[derive(Debug)]
pub struct HttpAttestationService {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAttestationService {
    pub fn new(endpoint: &str, api_key: Option<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GridzeroError::Configuration(format!("attestation http client: {e}")))?;
        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder.send().await.map_err(|e| GridzeroError::AttestationUnavailable {
            reason: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GridzeroError::Serialization(format!("attestation response: {e}")))
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        debug!(path, "attestation POST");
        self.send(self.request(reqwest::Method::POST, path).json(body))
            .await
    }
}

fn classify(status: StatusCode, body: String) -> GridzeroError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GridzeroError::AttestationUnavailable {
            reason: format!("HTTP {status}: {body}"),
        }
    } else {
        GridzeroError::AttestationRejected {
            reason: format!("HTTP {status}: {body}"),
        }
    }
}

#[async_trait]
impl AttestationService for HttpAttestationService {
    async fn register_domain(
        &self,
        aggregation_size: u32,
        queue_size: u32,
        options: &DomainOptions,
    ) -> Result<AggregationDomain> {
        self.post(
            "/domains",
            &RegisterDomainRequest {
                aggregation_size,
                queue_size,
                options,
            },
        )
        .await
    }

    async fn register_verification_key(&self, vk: &VerificationKey) -> Result<KeyHandle> {
        let response: RegisterKeyResponse = self.post("/vkeys", vk).await?;
        Ok(response.handle)
    }

    async fn submit(&self, domain_id: DomainId, proof: &ProofSubmission) -> Result<SubmissionHandle> {
        self.post(&format!("/domains/{}/proofs", domain_id.0), proof)
            .await
    }

    async fn batch_submit(
        &self,
        domain_id: DomainId,
        proofs: &[ProofSubmission],
    ) -> Result<SubmissionHandle> {
        self.post(&format!("/domains/{}/batches", domain_id.0), proofs)
            .await
    }

    async fn optimistic_submit(&self, proof: &ProofSubmission) -> Result<OptimisticVerdict> {
        self.post("/optimistic", proof).await
    }

    async fn poll_receipt(
        &self,
        domain_id: DomainId,
        aggregation_id: AggregationId,
    ) -> Result<Option<AggregationReceipt>> {
        let path = format!(
            "/domains/{}/aggregations/{}/receipt",
            domain_id.0, aggregation_id.0
        );
        match self.send(self.request(reqwest::Method::GET, &path)).await {
            Ok(receipt) => Ok(Some(receipt)),
            Err(GridzeroError::AttestationRejected { reason }) if reason.starts_with("HTTP 404") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_inclusion_path(
        &self,
        block_hash: [u8; 32],
        domain_id: DomainId,
        aggregation_id: AggregationId,
        statement: [u8; 32],
    ) -> Result<AggregationReceipt> {
        let path = format!(
            "/domains/{}/aggregations/{}/path?block_hash=0x{}&statement=0x{}",
            domain_id.0,
            aggregation_id.0,
            hex::encode(block_hash),
            hex::encode(statement)
        );
        self.send(self.request(reqwest::Method::GET, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        let rejected = classify(StatusCode::BAD_REQUEST, "bad proof".into());
        assert!(matches!(rejected, GridzeroError::AttestationRejected { .. }));
        assert!(rejected.to_string().contains("bad proof"));
    }

    #[test]
    fn not_found_renders_as_404_prefix() {
        let err = classify(StatusCode::NOT_FOUND, String::new());
        match err {
            GridzeroError::AttestationRejected { reason } => assert!(reason.starts_with("HTTP 404")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let svc = HttpAttestationService::new("http://127.0.0.1:9", Some("k".into()), Duration::from_millis(500))
            .unwrap();
        let err = svc
            .register_verification_key(&VerificationKey::new(gridzero_types::ProofKind::Groth16, vec![1]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
