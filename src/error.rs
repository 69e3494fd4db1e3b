use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::TransactionId;
use crate::node::NodeError;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Remainder of {amount} is below the minimum storage deposit of {minimum}")]
    DustThresholdViolation { amount: u64, minimum: u64 },

    #[error("Essence too large: {0}")]
    EssenceTooLarge(String),

    #[error("Unbalanced essence: {0}")]
    UnbalancedEssence(String),

    #[error("Unknown owner for output {0}")]
    UnknownOutputOwner(String),

    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("Transaction rejected by node: {0}")]
    SubmissionRejected(String),

    #[error("Submission of transaction {transaction_id} timed out, outcome unknown until next sync")]
    SubmissionOutcomeUnknown { transaction_id: TransactionId },

    #[error("Inputs already spent: {0}")]
    ConflictingInputs(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account alias already exists: {0}")]
    AliasExists(String),

    #[error("NFT not found in account: {0}")]
    NftNotFound(String),

    #[error("Output not found: {0}")]
    OutputNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl WalletError {
    /// Stable name of the error kind, used as `type` in structured errors
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::InvalidDerivationPath(_) => "InvalidDerivationPath",
            WalletError::InsufficientFunds { .. } => "InsufficientFunds",
            WalletError::DustThresholdViolation { .. } => "DustThresholdViolation",
            WalletError::EssenceTooLarge(_) => "EssenceTooLarge",
            WalletError::UnbalancedEssence(_) => "UnbalancedEssence",
            WalletError::UnknownOutputOwner(_) => "UnknownOutputOwner",
            WalletError::NodeUnreachable(_) => "NodeUnreachable",
            WalletError::SubmissionRejected(_) => "SubmissionRejected",
            WalletError::SubmissionOutcomeUnknown { .. } => "SubmissionOutcomeUnknown",
            WalletError::ConflictingInputs(_) => "ConflictingInputs",
            WalletError::AccountNotFound(_) => "AccountNotFound",
            WalletError::AliasExists(_) => "AliasExists",
            WalletError::NftNotFound(_) => "NftNotFound",
            WalletError::OutputNotFound(_) => "OutputNotFound",
            WalletError::TransactionNotFound(_) => "TransactionNotFound",
            WalletError::InvalidAddress(_) => "InvalidAddress",
            WalletError::InvalidMnemonic(_) => "InvalidMnemonic",
            WalletError::InvalidInput(_) => "InvalidInput",
            WalletError::Storage(_) => "Storage",
            WalletError::Internal(_) => "Internal",
        }
    }

    /// Structured `{type, message}` form of this error
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<NodeError> for WalletError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::InvalidTransaction(reason) => WalletError::SubmissionRejected(reason),
            other => WalletError::NodeUnreachable(other.to_string()),
        }
    }
}

/// Error shape returned across the call surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl WalletError {
    /// HTTP status used when the error crosses the API
    pub fn status_code(&self) -> StatusCode {
        match self {
            WalletError::AccountNotFound(_)
            | WalletError::OutputNotFound(_)
            | WalletError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::AliasExists(_) | WalletError::ConflictingInputs(_) => StatusCode::CONFLICT,
            WalletError::InvalidDerivationPath(_)
            | WalletError::InsufficientFunds { .. }
            | WalletError::DustThresholdViolation { .. }
            | WalletError::NftNotFound(_)
            | WalletError::InvalidAddress(_)
            | WalletError::InvalidMnemonic(_)
            | WalletError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WalletError::SubmissionRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WalletError::NodeUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WalletError::SubmissionOutcomeUnknown { .. } => StatusCode::ACCEPTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WalletError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_kind_and_message() {
        let err = WalletError::DustThresholdViolation {
            amount: 30,
            minimum: 42_600,
        };
        let payload = err.to_payload();
        assert_eq!(payload.kind, "DustThresholdViolation");
        assert!(payload.message.contains("42600"));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "DustThresholdViolation");
    }

    #[test]
    fn test_node_rejection_maps_to_submission_rejected() {
        let err: WalletError = NodeError::InvalidTransaction("input spent".into()).into();
        assert!(matches!(err, WalletError::SubmissionRejected(_)));

        let err: WalletError = NodeError::Unreachable("connection refused".into()).into();
        assert!(matches!(err, WalletError::NodeUnreachable(_)));
    }
}
