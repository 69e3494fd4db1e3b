use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::types::{AccountInfo, AccountMethod, CreateAccountRequest, HealthResponse, Response};
use crate::error::WalletError;
use crate::wallet::{
    AccountHandle, AccountIdentifier, PreparedTransactionData, Transaction, WalletManager,
};

/// Dispatch one method call; failures come back as [`Response::Error`]
pub async fn call_account_method(
    manager: &WalletManager,
    id: &AccountIdentifier,
    method: AccountMethod,
) -> Response {
    match dispatch(manager, id, method).await {
        Ok(response) => response,
        Err(err) => {
            log::warn!("Account {} call failed: {}", id, err);
            Response::Error(err.to_payload())
        }
    }
}

async fn dispatch(
    manager: &WalletManager,
    id: &AccountIdentifier,
    method: AccountMethod,
) -> Result<Response, WalletError> {
    let account = manager.get_account(id).await?;

    let response = match method {
        AccountMethod::SyncAccount { options } => {
            Response::SyncReport(Box::new(account.sync(options.unwrap_or_default()).await?))
        }
        AccountMethod::GenerateAddresses { amount, options } => Response::GeneratedAddresses(
            account
                .generate_addresses(amount, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::ListAddresses => Response::Addresses(account.list_addresses().await),
        AccountMethod::ListAddressesWithUnspentOutputs => {
            Response::AddressesWithUnspentOutputs(account.list_addresses_with_unspent_outputs().await)
        }
        AccountMethod::GetBalance => Response::Balance(account.get_balance().await?),
        AccountMethod::GetOutput { output_id } => {
            Response::Output(Box::new(account.get_output(&output_id).await?))
        }
        AccountMethod::ListOutputs => Response::Outputs(account.list_outputs().await),
        AccountMethod::ListUnspentOutputs => Response::Outputs(account.list_unspent_outputs().await),
        AccountMethod::GetTransaction { transaction_id } => {
            Response::Transaction(Box::new(account.get_transaction(&transaction_id).await?))
        }
        AccountMethod::ListTransactions => Response::Transactions(account.list_transactions().await),
        AccountMethod::ListPendingTransactions => {
            Response::Transactions(account.list_pending_transactions().await)
        }
        AccountMethod::SetAlias { alias } => {
            manager
                .set_alias(&AccountIdentifier::Index(account.index()), &alias)
                .await?;
            Response::Ok
        }
        AccountMethod::PrepareTransaction { outputs, options } => prepared(
            account
                .prepare_transaction(outputs, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::PrepareSendAmount {
            address_with_amount,
            options,
        } => prepared(
            account
                .prepare_send_amount(address_with_amount, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::PrepareSendMicroTransaction {
            address_with_micro_amounts,
            options,
        } => prepared(
            account
                .prepare_send_micro_transaction(address_with_micro_amounts, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::PrepareSendNativeToken {
            address_native_tokens,
            options,
        } => prepared(
            account
                .prepare_send_native_tokens(address_native_tokens, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::PrepareSendNft {
            address_nft_ids,
            options,
        } => prepared(
            account
                .prepare_send_nft(address_nft_ids, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::PrepareMintNfts { nft_options, options } => prepared(
            account
                .prepare_mint_nfts(nft_options, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::SignTransactionEssence {
            prepared_transaction_data,
        } => Response::SignedTransactionData(Box::new(
            account
                .sign_transaction_essence(&prepared_transaction_data)
                .await?,
        )),
        AccountMethod::SubmitAndStoreTransaction {
            signed_transaction_data,
        } => sent(
            account
                .submit_and_store_transaction(*signed_transaction_data)
                .await?,
        ),
        AccountMethod::SendTransaction { outputs, options } => sent(
            account
                .send_transaction(outputs, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::SendAmount {
            address_with_amount,
            options,
        } => sent(
            account
                .send_amount(address_with_amount, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::SendMicroTransaction {
            address_with_micro_amounts,
            options,
        } => sent(
            account
                .send_micro_transaction(address_with_micro_amounts, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::SendNativeTokens {
            address_native_tokens,
            options,
        } => sent(
            account
                .send_native_tokens(address_native_tokens, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::SendNft {
            address_nft_ids,
            options,
        } => sent(
            account
                .send_nft(address_nft_ids, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::MintNfts { nft_options, options } => sent(
            account
                .mint_nfts(nft_options, options.unwrap_or_default())
                .await?,
        ),
        AccountMethod::GetOutputsWithAdditionalUnlockConditions { outputs_to_collect } => Response::OutputIds(
            account
                .get_outputs_with_additional_unlock_conditions(outputs_to_collect)
                .await,
        ),
        AccountMethod::CollectOutputs { output_ids_to_collect } => {
            Response::SentTransactions(account.collect_outputs(output_ids_to_collect).await?)
        }
        AccountMethod::TryCollectOutputs { outputs_to_collect } => {
            Response::SentTransactions(account.try_collect_outputs(outputs_to_collect).await?)
        }
    };

    Ok(response)
}

fn prepared(data: PreparedTransactionData) -> Response {
    Response::PreparedTransaction(Box::new(data))
}

fn sent(transaction: Transaction) -> Response {
    Response::SentTransaction(Box::new(transaction))
}

async fn account_info(account: &AccountHandle) -> AccountInfo {
    let data = account.data().await;
    AccountInfo {
        index: data.index,
        alias: data.alias,
        public_addresses: data.public_addresses.into_iter().map(|a| a.bech32).collect(),
    }
}

pub async fn health_handler(State(manager): State<Arc<WalletManager>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        network: manager.config().protocol.network_name.clone(),
        accounts: manager.accounts().await.len(),
    })
}

pub async fn list_accounts_handler(
    State(manager): State<Arc<WalletManager>>,
) -> Json<Vec<AccountInfo>> {
    let mut accounts = Vec::new();
    for account in manager.accounts().await {
        accounts.push(account_info(&account).await);
    }
    Json(accounts)
}

pub async fn create_account_handler(
    State(manager): State<Arc<WalletManager>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountInfo>), WalletError> {
    let account = manager.create_account(req.alias).await?;
    Ok((StatusCode::CREATED, Json(account_info(&account).await)))
}

/// `POST /api/accounts/:id/call` where `id` is an index or an alias
pub async fn call_account_method_handler(
    State(manager): State<Arc<WalletManager>>,
    Path(id): Path<String>,
    Json(method): Json<AccountMethod>,
) -> (StatusCode, Json<Response>) {
    let id = AccountIdentifier::parse(&id);
    match dispatch(&manager, &id, method).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => {
            log::warn!("Account {} call failed: {}", id, err);
            (err.status_code(), Json(Response::Error(err.to_payload())))
        }
    }
}
