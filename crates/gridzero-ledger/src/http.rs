//! Ledger gateway reached over HTTP.
//!
//! Talks to a ledger gateway service (the chain RPC adapter runs there, not
//! in this process). Writes carry a [`SignedLedgerTx`]; the service relays
//! it and reports reverts as `409`/`422` with a JSON body
//! `{"reason": <RevertReason>}` or a free-form `{"message": "..."}`.
//!
//! | Operation | Request |
//! |---|---|
//! | `current_round_id` | `GET /rounds/current` |
//! | `get_round` | `GET /rounds/{id}` |
//! | `get_cell_occupancy` | `GET /rounds/{id}/occupancy` |
//! | `get_cell_members` | `GET /rounds/{id}/cells/{cell}/members` |
//! | `latest_block` | `GET /blocks/latest` |
//! | `events_since` | `GET /events?from_block={n}` |
//! | `resolve_round` | `POST /rounds/{id}/resolve` |
//! | `skip_empty_round` | `POST /rounds/{id}/skip` |

use std::time::Duration;

use async_trait::async_trait;
use gridzero_types::{
    BlockRef, CellIndex, GridzeroError, ObservedLedgerEvent, PlayerAddress, RandomOutput, Result,
    RevertReason, Round, RoundId, TxReceipt,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::{ResolverCredentials, SignedLedgerTx};
use crate::gateway::{LedgerEventSource, LedgerGateway};

#[derive(Debug, Deserialize)]
struct CurrentRound {
    round_id: RoundId,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    reason: Option<RevertReason>,
    message: Option<String>,
}

/// HTTP client for a ledger gateway service.
#[derive(Debug)]
pub struct HttpLedgerGateway {
    base_url: String,
    client: reqwest::Client,
    credentials: ResolverCredentials,
}

impl HttpLedgerGateway {
    pub fn new(
        endpoint: &str,
        credentials: ResolverCredentials,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GridzeroError::Configuration(format!("ledger http client: {e}")))?;
        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, round_id: Option<RoundId>) -> Result<T> {
        debug!(path, "ledger GET");
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(unavailable)?;
        decode(response, round_id).await
    }

    async fn post_tx(&self, tx: &SignedLedgerTx) -> Result<TxReceipt> {
        let round_id = tx.action.round_id();
        let verb = match tx.action {
            crate::credentials::LedgerAction::Resolve { .. } => "resolve",
            crate::credentials::LedgerAction::Skip { .. } => "skip",
        };
        let path = format!("/rounds/{}/{verb}", round_id.0);
        debug!(path, "ledger POST");
        let response = self
            .client
            .post(self.url(&path))
            .json(tx)
            .send()
            .await
            .map_err(unavailable)?;
        decode(response, Some(round_id)).await
    }
}

fn unavailable(err: reqwest::Error) -> GridzeroError {
    GridzeroError::LedgerUnavailable {
        reason: err.to_string(),
    }
}

async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    round_id: Option<RoundId>,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| GridzeroError::Serialization(format!("ledger response: {e}")));
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body, round_id))
}

/// Map a non-success response onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str, round_id: Option<RoundId>) -> GridzeroError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.clone().unwrap_or_else(|| body.to_string());
    match (status, round_id) {
        (StatusCode::NOT_FOUND, Some(round_id)) => GridzeroError::RoundNotFound(round_id),
        (StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY, Some(round_id)) => {
            let reason = parsed
                .reason
                .unwrap_or_else(|| RevertReason::from_message(&message, round_id));
            GridzeroError::LedgerReverted { round_id, reason }
        }
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Some(round_id)) => {
            GridzeroError::LedgerReverted {
                round_id,
                reason: RevertReason::Unauthorized,
            }
        }
        _ => {
            warn!(status = status.as_u16(), message = %message, "ledger request failed");
            GridzeroError::LedgerUnavailable {
                reason: format!("HTTP {status}: {message}"),
            }
        }
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn current_round_id(&self) -> Result<RoundId> {
        let current: CurrentRound = self.get("/rounds/current", None).await?;
        Ok(current.round_id)
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Round> {
        self.get(&format!("/rounds/{}", round_id.0), Some(round_id))
            .await
    }

    async fn get_cell_occupancy(&self, round_id: RoundId) -> Result<Vec<u32>> {
        self.get(&format!("/rounds/{}/occupancy", round_id.0), Some(round_id))
            .await
    }

    async fn get_cell_members(
        &self,
        round_id: RoundId,
        cell: CellIndex,
    ) -> Result<Vec<PlayerAddress>> {
        self.get(
            &format!("/rounds/{}/cells/{}/members", round_id.0, cell.0),
            Some(round_id),
        )
        .await
    }

    async fn latest_block(&self) -> Result<BlockRef> {
        self.get("/blocks/latest", None).await
    }

    async fn resolve_round(
        &self,
        random_output: RandomOutput,
        round_id: RoundId,
    ) -> Result<TxReceipt> {
        self.post_tx(&self.credentials.sign_resolve(round_id, random_output))
            .await
    }

    async fn skip_empty_round(&self, round_id: RoundId) -> Result<TxReceipt> {
        self.post_tx(&self.credentials.sign_skip(round_id)).await
    }
}

#[async_trait]
impl LedgerEventSource for HttpLedgerGateway {
    async fn events_since(&self, from_block: u64) -> Result<Vec<ObservedLedgerEvent>> {
        self.get(&format!("/events?from_block={from_block}"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_revert_reason() {
        let body = r#"{"reason":{"reason":"already_resolved"}}"#;
        let err = classify_failure(StatusCode::CONFLICT, body, Some(RoundId(4)));
        assert!(err.is_benign_race());
    }

    #[test]
    fn free_form_revert_message() {
        let body = r#"{"message":"execution reverted: round not ended"}"#;
        let err = classify_failure(StatusCode::UNPROCESSABLE_ENTITY, body, Some(RoundId(4)));
        assert!(matches!(
            err,
            GridzeroError::LedgerReverted {
                reason: RevertReason::RoundNotEnded,
                ..
            }
        ));
    }

    #[test]
    fn plain_text_revert() {
        let err = classify_failure(StatusCode::CONFLICT, "Round already resolved", Some(RoundId(1)));
        assert!(err.is_benign_race());
    }

    #[test]
    fn plain_text_wrong_round_is_a_race() {
        let err = classify_failure(StatusCode::CONFLICT, "execution reverted: wrong round", Some(RoundId(3)));
        assert!(matches!(
            err,
            GridzeroError::LedgerReverted {
                round_id: RoundId(3),
                reason: RevertReason::WrongRound {
                    current: None,
                    submitted: RoundId(3),
                },
            }
        ));
        assert!(err.is_benign_race());
        assert!(!err.needs_operator());
    }

    #[test]
    fn structured_wrong_round_without_current() {
        let body = r#"{"reason":{"reason":"wrong_round","detail":{"submitted":3}}}"#;
        let err = classify_failure(StatusCode::CONFLICT, body, Some(RoundId(3)));
        assert!(err.is_benign_race());
    }

    #[test]
    fn missing_round() {
        let err = classify_failure(StatusCode::NOT_FOUND, "", Some(RoundId(9)));
        assert!(matches!(err, GridzeroError::RoundNotFound(RoundId(9))));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "upstream down", Some(RoundId(1)));
        assert!(err.is_transient());
        let err = classify_failure(StatusCode::NOT_FOUND, "", None);
        assert!(err.is_transient());
    }

    #[test]
    fn trailing_slash_trimmed() {
        let gw = HttpLedgerGateway::new(
            "http://localhost:9000/",
            ResolverCredentials::generate(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(gw.url("/blocks/latest"), "http://localhost:9000/blocks/latest");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let gw = HttpLedgerGateway::new(
            "http://127.0.0.1:9",
            ResolverCredentials::generate(1),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = gw.current_round_id().await.unwrap_err();
        assert!(matches!(err, GridzeroError::LedgerUnavailable { .. }));
    }
}
