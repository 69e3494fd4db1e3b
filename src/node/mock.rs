//! In-memory ledger node
//!
//! Validates and applies transactions the way a real node would, and can be
//! told to misbehave: go unreachable, fail queries for chosen addresses,
//! reject submissions, hold them unconfirmed or stall without answering.
//! [`router`] serves the same ledger over the REST endpoints that
//! [`RestNodeClient`](super::RestNodeClient) speaks.

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::rest::{OutputIdsResponse, SubmitResponse};
use super::{NodeClient, NodeError, OutputWithMetadata};
use crate::ledger::{
    blake2b_256, unix_time_now, Address, BasicOutput, Output, OutputId, ProtocolParameters,
    TransactionBuilder, TransactionId, TransactionPayload,
};

/// How the node answers `submit_transaction`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmitMode {
    /// Validate and apply immediately
    #[default]
    Apply,
    /// Validate and accept, but apply only on [`MockNode::confirm_held`]
    Hold,
    /// Reject every submission with the given reason
    Reject(String),
    /// Validate and apply, then never answer
    ApplyThenStall,
    /// As `ApplyThenStall` for the next submission only, then `Apply`
    ApplyThenStallOnce,
    /// Never answer and never apply
    Stall,
}

/// Number of calls served, per endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub address_queries: usize,
    pub output_queries: usize,
    pub submissions: usize,
}

struct LedgerEntry {
    output: Output,
    spent_by: Option<TransactionId>,
}

#[derive(Default)]
struct LedgerState {
    outputs: HashMap<OutputId, LedgerEntry>,
    applied: HashMap<TransactionId, TransactionPayload>,
    held: Vec<TransactionPayload>,
    nonce: u64,
    unreachable: bool,
    failing_addresses: HashSet<Address>,
    malformed_queries: bool,
    submit_mode: SubmitMode,
    stats: CallStats,
}

impl LedgerState {
    fn next_synthetic_id(&mut self, domain: &[u8]) -> TransactionId {
        self.nonce += 1;
        let mut seed = domain.to_vec();
        seed.extend_from_slice(&self.nonce.to_le_bytes());
        TransactionId::new(blake2b_256(&seed))
    }

    fn check_reachable(&self) -> Result<(), NodeError> {
        if self.unreachable {
            return Err(NodeError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }

    fn apply(&mut self, payload: TransactionPayload) -> TransactionId {
        let transaction_id = payload.id();
        for input in &payload.essence.inputs {
            if let Some(entry) = self.outputs.get_mut(input) {
                entry.spent_by = Some(transaction_id);
            }
        }
        for (index, output) in payload.essence.outputs.iter().enumerate() {
            self.outputs.insert(
                OutputId::new(transaction_id, index as u16),
                LedgerEntry {
                    output: output.clone(),
                    spent_by: None,
                },
            );
        }
        self.applied.insert(transaction_id, payload);
        transaction_id
    }
}

pub struct MockNode {
    builder: TransactionBuilder,
    state: Mutex<LedgerState>,
}

impl MockNode {
    pub fn new(params: ProtocolParameters) -> Self {
        Self {
            builder: TransactionBuilder::new(params),
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an unspent basic output out of thin air
    pub fn fund(&self, address: Address, amount: u64) -> OutputId {
        self.fund_output(BasicOutput::new(amount, address).into())
    }

    /// Create any output out of thin air; no deposit checks apply
    pub fn fund_output(&self, output: Output) -> OutputId {
        let mut state = self.lock();
        let output_id = OutputId::new(state.next_synthetic_id(b"genesis"), 0);
        state.outputs.insert(
            output_id,
            LedgerEntry {
                output,
                spent_by: None,
            },
        );
        output_id
    }

    /// Mark an output spent by a transaction this wallet never saw
    pub fn spend_externally(&self, output_id: &OutputId) -> Option<TransactionId> {
        let mut state = self.lock();
        let spender = state.next_synthetic_id(b"external");
        let entry = state.outputs.get_mut(output_id)?;
        entry.spent_by = Some(spender);
        Some(spender)
    }

    /// Forget an output, as a pruning node does
    pub fn prune(&self, output_id: &OutputId) {
        self.lock().outputs.remove(output_id);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Make output queries for `address` fail as if the node were down
    pub fn fail_address(&self, address: Address) {
        self.lock().failing_addresses.insert(address);
    }

    pub fn clear_failing_addresses(&self) {
        self.lock().failing_addresses.clear();
    }

    /// Answer every address query with an unparseable response
    pub fn set_malformed_queries(&self, malformed: bool) {
        self.lock().malformed_queries = malformed;
    }

    pub fn set_submit_mode(&self, mode: SubmitMode) {
        self.lock().submit_mode = mode;
    }

    /// Apply held transactions that are still valid; returns how many landed
    pub fn confirm_held(&self) -> usize {
        let mut state = self.lock();
        let held = std::mem::take(&mut state.held);
        let mut landed = 0;
        for payload in held {
            let inputs_free = payload.essence.inputs.iter().all(|input| {
                state
                    .outputs
                    .get(input)
                    .map_or(false, |entry| entry.spent_by.is_none())
            });
            if inputs_free {
                state.apply(payload);
                landed += 1;
            }
        }
        landed
    }

    /// Drop held transactions without applying them
    pub fn drop_held(&self) -> usize {
        std::mem::take(&mut self.lock().held).len()
    }

    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<TransactionPayload> {
        self.lock().applied.get(transaction_id).cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.lock().applied.len()
    }

    pub fn output(&self, output_id: &OutputId) -> Option<OutputWithMetadata> {
        self.lock().outputs.get(output_id).map(|entry| OutputWithMetadata {
            output_id: *output_id,
            output: entry.output.clone(),
            is_spent: entry.spent_by.is_some(),
            spent_by: entry.spent_by,
        })
    }

    /// Sum of unspent base coin held by `address`
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.lock()
            .outputs
            .values()
            .filter(|entry| entry.spent_by.is_none() && entry.output.address() == address)
            .map(|entry| entry.output.amount())
            .sum()
    }

    pub fn stats(&self) -> CallStats {
        self.lock().stats
    }

    fn validate(&self, state: &LedgerState, payload: &TransactionPayload) -> Result<(), NodeError> {
        let now = unix_time_now();
        let mut consumed = Vec::with_capacity(payload.essence.inputs.len());
        let mut owners = Vec::with_capacity(payload.essence.inputs.len());
        let mut owed: HashMap<Address, u64> = HashMap::new();

        for input in &payload.essence.inputs {
            let entry = state
                .outputs
                .get(input)
                .ok_or_else(|| NodeError::InvalidTransaction(format!("input {} is unknown", input)))?;

            if let Some(spender) = entry.spent_by {
                return Err(NodeError::InvalidTransaction(format!(
                    "input {} already spent by {}",
                    input, spender
                )));
            }
            if state
                .held
                .iter()
                .any(|held| held.essence.inputs.contains(input))
            {
                return Err(NodeError::InvalidTransaction(format!(
                    "input {} is spent by a pending transaction",
                    input
                )));
            }

            owners.push(entry.output.owner_at(now));
            if let Some(sdr) = entry.output.storage_deposit_owed_at(now) {
                *owed.entry(sdr.return_address).or_insert(0) += sdr.amount;
            }
            consumed.push(entry.output.clone());
        }

        self.builder
            .validate(&payload.essence, &consumed)
            .map_err(|e| NodeError::InvalidTransaction(e.to_string()))?;

        for (return_address, amount) in owed {
            let returned: u64 = payload
                .essence
                .outputs
                .iter()
                .filter(|output| {
                    matches!(output, Output::Basic(_))
                        && output.has_only_address_condition()
                        && *output.address() == return_address
                })
                .map(|output| output.amount())
                .sum();
            if returned < amount {
                return Err(NodeError::InvalidTransaction(format!(
                    "storage deposit of {} owed to {} is not returned",
                    amount, return_address
                )));
            }
        }

        payload
            .verify_unlocks(&owners)
            .map_err(|e| NodeError::InvalidTransaction(e.to_string()))
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_outputs_for_address(&self, address: &Address) -> Result<Vec<OutputId>, NodeError> {
        let mut state = self.lock();
        state.check_reachable()?;
        state.stats.address_queries += 1;

        if state.failing_addresses.contains(address) {
            return Err(NodeError::Unreachable(format!("query for {} failed", address)));
        }
        if state.malformed_queries {
            return Err(NodeError::Malformed(format!("unexpected body for {}", address)));
        }

        let mut ids: Vec<OutputId> = state
            .outputs
            .iter()
            .filter(|(_, entry)| {
                let conditions = entry.output.unlock_conditions();
                entry.spent_by.is_none()
                    && (conditions.address == *address
                        || conditions
                            .expiration
                            .map_or(false, |expiration| expiration.return_address == *address))
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_output(&self, output_id: &OutputId) -> Result<Option<OutputWithMetadata>, NodeError> {
        {
            let mut state = self.lock();
            state.check_reachable()?;
            state.stats.output_queries += 1;
        }
        Ok(self.output(output_id))
    }

    async fn submit_transaction(&self, payload: &TransactionPayload) -> Result<TransactionId, NodeError> {
        let transaction_id = payload.id();

        let stall = {
            let mut state = self.lock();
            state.check_reachable()?;
            state.stats.submissions += 1;

            match state.submit_mode.clone() {
                SubmitMode::Reject(reason) => return Err(NodeError::InvalidTransaction(reason)),
                SubmitMode::Stall => true,
                mode => {
                    // A resubmitted transaction fails like any double spend
                    self.validate(&state, payload)?;
                    if mode == SubmitMode::Hold {
                        state.held.push(payload.clone());
                    } else {
                        state.apply(payload.clone());
                    }
                    log::debug!("Accepted transaction {}", transaction_id);
                    if mode == SubmitMode::ApplyThenStallOnce {
                        state.submit_mode = SubmitMode::Apply;
                    }
                    matches!(mode, SubmitMode::ApplyThenStall | SubmitMode::ApplyThenStallOnce)
                }
            }
        };

        if stall {
            std::future::pending::<()>().await;
        }

        Ok(transaction_id)
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match self {
            NodeError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            NodeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            NodeError::InvalidTransaction(_) => StatusCode::BAD_REQUEST,
            NodeError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: String,
}

/// Serve `node` over the node REST API
pub fn router(node: Arc<MockNode>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/indexer/v1/outputs", get(list_outputs))
        .route("/api/core/v1/outputs/:output_id", get(get_output))
        .route("/api/core/v1/transactions", post(submit_transaction))
        .with_state(node)
}

/// GET /api/indexer/v1/outputs?address=0x..
async fn list_outputs(
    State(node): State<Arc<MockNode>>,
    Query(query): Query<AddressQuery>,
) -> Result<Json<OutputIdsResponse>, Response> {
    let address: Address = query
        .address
        .parse()
        .map_err(|e: crate::error::WalletError| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
    let items = node
        .get_outputs_for_address(&address)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(OutputIdsResponse { items }))
}

/// GET /api/core/v1/outputs/{output_id}
async fn get_output(
    State(node): State<Arc<MockNode>>,
    Path(output_id): Path<String>,
) -> Result<Json<OutputWithMetadata>, Response> {
    let output_id: OutputId = output_id
        .parse()
        .map_err(|e: crate::error::WalletError| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
    match node.get_output(&output_id).await {
        Ok(Some(output)) => Ok(Json(output)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("Output not found: {}", output_id)).into_response()),
        Err(e) => Err(e.into_response()),
    }
}

/// POST /api/core/v1/transactions
async fn submit_transaction(
    State(node): State<Arc<MockNode>>,
    Json(payload): Json<TransactionPayload>,
) -> Result<(StatusCode, Json<SubmitResponse>), NodeError> {
    let transaction_id = node.submit_transaction(&payload).await?;
    Ok((StatusCode::CREATED, Json(SubmitResponse { transaction_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Unlock;

    #[tokio::test]
    async fn test_funded_output_is_listed_until_spent() {
        let node = MockNode::new(ProtocolParameters::testnet());
        let address = Address::new([1; 32]);
        let output_id = node.fund(address, 1_000_000);

        assert_eq!(node.get_outputs_for_address(&address).await.unwrap(), vec![output_id]);
        assert_eq!(node.balance_of(&address), 1_000_000);

        node.spend_externally(&output_id).unwrap();
        assert!(node.get_outputs_for_address(&address).await.unwrap().is_empty());
        assert!(node.get_output(&output_id).await.unwrap().unwrap().is_spent);
    }

    #[tokio::test]
    async fn test_unsigned_transaction_is_rejected() {
        let params = ProtocolParameters::testnet();
        let node = MockNode::new(params.clone());
        let address = Address::new([1; 32]);
        let output_id = node.fund(address, 1_000_000);

        let essence = TransactionBuilder::new(params)
            .build(
                &[(output_id, BasicOutput::new(1_000_000, address).into())],
                vec![BasicOutput::new(1_000_000, Address::new([2; 32])).into()],
                None,
            )
            .unwrap();
        let payload = TransactionPayload {
            essence,
            unlocks: vec![Unlock::Reference { index: 0 }],
        };

        let err = node.submit_transaction(&payload).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidTransaction(_)));
        assert_eq!(node.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_node_refuses_queries() {
        let node = MockNode::new(ProtocolParameters::testnet());
        node.set_unreachable(true);
        let err = node
            .get_outputs_for_address(&Address::new([1; 32]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
