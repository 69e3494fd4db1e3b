use serde::{Deserialize, Serialize};

use crate::error::ErrorPayload;
use crate::ledger::{Output, OutputId, TransactionId};
use crate::wallet::{
    AccountAddress, AddressNativeTokens, AddressNftId, AddressWithAmount, AddressWithMicroAmount,
    AddressWithUnspentOutputs, Balance, GenerateAddressOptions, NftOptions, OutputData, OutputsToCollect,
    PreparedTransactionData, SignedTransactionData, SyncOptions, SyncReport, Transaction,
    TransactionOptions,
};

/// Every operation callable on one account
///
/// Serialized as `{"name": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum AccountMethod {
    SyncAccount {
        #[serde(default)]
        options: Option<SyncOptions>,
    },
    GenerateAddresses {
        amount: u32,
        #[serde(default)]
        options: Option<GenerateAddressOptions>,
    },
    ListAddresses,
    ListAddressesWithUnspentOutputs,
    GetBalance,
    GetOutput {
        output_id: OutputId,
    },
    ListOutputs,
    ListUnspentOutputs,
    GetTransaction {
        transaction_id: TransactionId,
    },
    ListTransactions,
    ListPendingTransactions,
    SetAlias {
        alias: String,
    },
    PrepareTransaction {
        outputs: Vec<Output>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    PrepareSendAmount {
        address_with_amount: Vec<AddressWithAmount>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    PrepareSendMicroTransaction {
        address_with_micro_amounts: Vec<AddressWithMicroAmount>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    PrepareSendNativeToken {
        address_native_tokens: Vec<AddressNativeTokens>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    PrepareSendNft {
        address_nft_ids: Vec<AddressNftId>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    PrepareMintNfts {
        nft_options: Vec<NftOptions>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    SignTransactionEssence {
        prepared_transaction_data: Box<PreparedTransactionData>,
    },
    SubmitAndStoreTransaction {
        signed_transaction_data: Box<SignedTransactionData>,
    },
    SendTransaction {
        outputs: Vec<Output>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    SendAmount {
        address_with_amount: Vec<AddressWithAmount>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    SendMicroTransaction {
        address_with_micro_amounts: Vec<AddressWithMicroAmount>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    SendNativeTokens {
        address_native_tokens: Vec<AddressNativeTokens>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    SendNft {
        address_nft_ids: Vec<AddressNftId>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    MintNfts {
        nft_options: Vec<NftOptions>,
        #[serde(default)]
        options: Option<TransactionOptions>,
    },
    GetOutputsWithAdditionalUnlockConditions {
        outputs_to_collect: OutputsToCollect,
    },
    CollectOutputs {
        output_ids_to_collect: Vec<OutputId>,
    },
    TryCollectOutputs {
        outputs_to_collect: OutputsToCollect,
    },
}

/// Result of an [`AccountMethod`], serialized as `{"type": "...", "payload": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    SyncReport(Box<SyncReport>),
    GeneratedAddresses(Vec<AccountAddress>),
    Addresses(Vec<AccountAddress>),
    AddressesWithUnspentOutputs(Vec<AddressWithUnspentOutputs>),
    Balance(Balance),
    Output(Box<OutputData>),
    Outputs(Vec<OutputData>),
    Transaction(Box<Transaction>),
    Transactions(Vec<Transaction>),
    PreparedTransaction(Box<PreparedTransactionData>),
    SignedTransactionData(Box<SignedTransactionData>),
    SentTransaction(Box<Transaction>),
    SentTransactions(Vec<Transaction>),
    OutputIds(Vec<OutputId>),
    Ok,
    Error(ErrorPayload),
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateAccountRequest {
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub index: u32,
    pub alias: String,
    pub public_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub network: String,
    pub accounts: usize,
}
