//! HTTP client for the request status API

use super::{OverallStatus, StatusSnapshot, WritePayloadStatus};
use crate::error::{OrchestratorError, OrchestratorResult};

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Source of status snapshots for submitted hub transactions
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Every failure is reported as [`OrchestratorError::TransientPoll`]
    async fn details_by_tx_hash(&self, tx_hash: &str) -> OrchestratorResult<StatusSnapshot>;
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    status: String,
    #[serde(default)]
    response: Option<Vec<RequestDetails>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestDetails {
    #[serde(default)]
    status: Option<String>,
    write_payloads: Vec<WritePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WritePayload {
    chain_slug: u64,
    #[serde(default)]
    execute_details: Option<ExecuteDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteDetails {
    #[serde(default)]
    is_executed: bool,
    #[serde(default)]
    execute_tx_hash: Option<String>,
}

impl From<StatusEnvelope> for StatusSnapshot {
    fn from(envelope: StatusEnvelope) -> Self {
        let details = match envelope.response {
            Some(response) if envelope.status == "SUCCESS" => response.into_iter().next(),
            _ => None,
        };

        let Some(details) = details else {
            return StatusSnapshot::pending();
        };

        let overall = match details.status.as_deref() {
            Some("COMPLETED") => OverallStatus::Completed,
            Some("FAILED") => OverallStatus::Failed,
            _ => OverallStatus::Success,
        };

        let payloads = details
            .write_payloads
            .into_iter()
            .map(|payload| {
                let (executed, execution_tx_hash) = payload
                    .execute_details
                    .map(|d| (d.is_executed, d.execute_tx_hash))
                    .unwrap_or((false, None));
                WritePayloadStatus {
                    chain_id: payload.chain_slug,
                    executed,
                    execution_tx_hash: execution_tx_hash.filter(|h| !h.is_empty()),
                }
            })
            .collect();

        StatusSnapshot { overall, payloads }
    }
}

/// `GET {base}/getDetailsByTxHash?txHash=...`
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OrchestratorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn details_by_tx_hash(&self, tx_hash: &str) -> OrchestratorResult<StatusSnapshot> {
        let url = format!("{}/getDetailsByTxHash", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("txHash", tx_hash)])
            .send()
            .await
            .map_err(|e| OrchestratorError::TransientPoll(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::TransientPoll(format!(
                "status API returned {}",
                status
            )));
        }

        let envelope: StatusEnvelope = response
            .json()
            .await
            .map_err(|e| OrchestratorError::TransientPoll(format!("malformed response: {}", e)))?;

        debug!(
            "Status for {}: {} ({} details)",
            tx_hash,
            envelope.status,
            envelope.response.as_ref().map_or(0, Vec::len)
        );
        Ok(envelope.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const TX: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn client(server: &MockServer) -> HttpStatusClient {
        HttpStatusClient::new(&server.base_url(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_executed_payload_is_parsed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/getDetailsByTxHash")
                .query_param("txHash", TX);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "SUCCESS",
                    "response": [{
                        "status": "IN_PROGRESS",
                        "writePayloads": [
                            { "chainSlug": 421614, "executeDetails": { "isExecuted": true, "executeTxHash": "0xabc" } },
                            { "chainSlug": 11155420, "executeDetails": { "isExecuted": false, "executeTxHash": "" } }
                        ]
                    }]
                }));
        });

        let snapshot = client(&server).details_by_tx_hash(TX).await.unwrap();
        mock.assert();

        assert_eq!(snapshot.overall, OverallStatus::Success);
        assert!(snapshot.first_payload_executed());
        assert_eq!(snapshot.payloads[0].execution_tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(snapshot.payloads[1].chain_id, 11_155_420);
        assert_eq!(snapshot.payloads[1].execution_tx_hash, None);
    }

    #[tokio::test]
    async fn test_unknown_request_is_pending() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/getDetailsByTxHash");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "status": "SUCCESS", "response": [] }));
        });

        let snapshot = client(&server).details_by_tx_hash(TX).await.unwrap();
        assert_eq!(snapshot, StatusSnapshot::pending());
    }

    #[tokio::test]
    async fn test_completed_request() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/getDetailsByTxHash");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "status": "SUCCESS",
                    "response": [{ "status": "COMPLETED", "writePayloads": [
                        { "chainSlug": 421614, "executeDetails": { "isExecuted": true } }
                    ]}]
                }));
        });

        let snapshot = client(&server).details_by_tx_hash(TX).await.unwrap();
        assert_eq!(snapshot.overall, OverallStatus::Completed);
    }

    #[tokio::test]
    async fn test_malformed_body_is_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/getDetailsByTxHash");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "status": "SUCCESS", "response": [{ "writePayloads": "nope" }] }));
        });

        let err = client(&server).details_by_tx_hash(TX).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransientPoll(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/getDetailsByTxHash");
            then.status(502);
        });

        let err = client(&server).details_by_tx_hash(TX).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransientPoll(_)));
    }
}
