use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{NodeClient, NodeError, OutputWithMetadata};
use crate::ledger::{Address, OutputId, TransactionId, TransactionPayload};

/// Response of the address output index
#[derive(Debug, Serialize, Deserialize)]
pub struct OutputIdsResponse {
    pub items: Vec<OutputId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub transaction_id: TransactionId,
}

/// JSON-over-HTTP node client
///
/// Endpoints, relative to the base URL:
/// - `GET /api/indexer/v1/outputs?address=0x..`
/// - `GET /api/core/v1/outputs/{output_id}`
/// - `POST /api/core/v1/transactions`
#[derive(Clone)]
pub struct RestNodeClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestNodeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport_error(err: reqwest::Error) -> NodeError {
    if err.is_timeout() {
        NodeError::Timeout(err.to_string())
    } else if err.is_decode() {
        NodeError::Malformed(err.to_string())
    } else {
        NodeError::Unreachable(err.to_string())
    }
}

async fn error_text(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}

#[async_trait]
impl NodeClient for RestNodeClient {
    async fn get_outputs_for_address(&self, address: &Address) -> Result<Vec<OutputId>, NodeError> {
        let url = format!("{}/api/indexer/v1/outputs", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("address", address.to_string())])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(NodeError::Unreachable(format!(
                "output query for {} failed ({}): {}",
                address,
                status,
                error_text(response).await
            )));
        }

        let body: OutputIdsResponse = response.json().await.map_err(transport_error)?;
        Ok(body.items)
    }

    async fn get_output(&self, output_id: &OutputId) -> Result<Option<OutputWithMetadata>, NodeError> {
        let url = format!("{}/api/core/v1/outputs/{}", self.base_url, output_id);

        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(NodeError::Unreachable(format!(
                "output {} lookup failed ({}): {}",
                output_id,
                status,
                error_text(response).await
            )));
        }

        let output: OutputWithMetadata = response.json().await.map_err(transport_error)?;
        if output.output_id != *output_id {
            return Err(NodeError::Malformed(format!(
                "asked for output {} but got {}",
                output_id, output.output_id
            )));
        }
        Ok(Some(output))
    }

    async fn submit_transaction(&self, payload: &TransactionPayload) -> Result<TransactionId, NodeError> {
        let url = format!("{}/api/core/v1/transactions", self.base_url);

        log::debug!("Submitting transaction to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_client_error() {
            return Err(NodeError::InvalidTransaction(error_text(response).await));
        }
        if !status.is_success() {
            return Err(NodeError::Unreachable(format!(
                "submission failed ({}): {}",
                status,
                error_text(response).await
            )));
        }

        let body: SubmitResponse = response.json().await.map_err(transport_error)?;
        Ok(body.transaction_id)
    }
}
