//! Node access
//!
//! The wallet talks to the ledger only through [`NodeClient`]. Every call goes
//! through [`with_retry`], which bounds it with a timeout and retries
//! transient failures with exponential backoff.

pub mod mock;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::config::NodeConfig;
use crate::ledger::{Address, Output, OutputId, TransactionId, TransactionPayload};

pub use mock::{MockNode, SubmitMode};
pub use rest::RestNodeClient;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("node unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transaction rejected: {0}")]
    InvalidTransaction(String),

    #[error("malformed node response: {0}")]
    Malformed(String),
}

impl NodeError {
    /// Worth retrying: the node may answer differently next time
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Unreachable(_) | NodeError::Timeout(_))
    }
}

/// An output as the node reports it, with its spent state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputWithMetadata {
    pub output_id: OutputId,
    pub output: Output,
    pub is_spent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spent_by: Option<TransactionId>,
}

#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Ids of the unspent outputs held by `address` through their address
    /// unlock condition or their expiration return address
    async fn get_outputs_for_address(&self, address: &Address) -> Result<Vec<OutputId>, NodeError>;

    /// `None` when the node has never seen (or has pruned) the output
    async fn get_output(&self, output_id: &OutputId) -> Result<Option<OutputWithMetadata>, NodeError>;

    async fn submit_transaction(&self, payload: &TransactionPayload) -> Result<TransactionId, NodeError>;
}

/// Run a node call with a timeout, retrying transient failures
///
/// Once an attempt has timed out, any failure that follows is reported as
/// a `Timeout`: the timed-out request may have reached the node, so a later
/// rejection (such as a double spend of its own inputs) proves nothing.
pub async fn with_retry<T, F, Fut>(config: &NodeConfig, operation: &str, mut call: F) -> Result<T, NodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NodeError>>,
{
    let mut delay = config.retry_backoff();
    let mut timed_out = false;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = match tokio::time::timeout(config.request_timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout(format!(
                "{} after {}ms",
                operation, config.request_timeout_ms
            ))),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if matches!(err, NodeError::Timeout(_)) {
            timed_out = true;
        }

        if !err.is_transient() || attempt > config.max_retries {
            if timed_out {
                return Err(NodeError::Timeout(format!(
                    "{} gave no definite answer after {} attempts: {}",
                    operation, attempt, err
                )));
            }
            return Err(err);
        }

        log::warn!(
            "{} failed (attempt {}/{}): {}, retrying in {:?}",
            operation,
            attempt,
            config.max_retries + 1,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        delay = delay.saturating_mul(2);
    }
}
