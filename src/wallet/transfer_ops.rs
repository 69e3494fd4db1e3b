/// Transfer operations
///
/// Prepare (select and build), sign and submit transactions for one account.
/// The `send_*` operations run all three steps under a single acquisition of
/// the account lock, so no other caller can select the same inputs between
/// selection and marking them spent.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::account::{AccountData, AccountHandle, Transaction, TransactionStatus};
use super::address_manager::Chain;
use super::events::{TransactionProgress, WalletEvent};
use super::output_store::OutputData;
use super::selection::{OutputSelector, SelectionTarget, StrategyKind};
use super::signer;
use crate::error::WalletError;
use crate::ledger::{
    unix_time_now, Address, BasicOutput, NativeTokens, NftId, NftOutput, Output, OutputId, TaggedData,
    TransactionBuilder, TransactionEssence, TransactionPayload, UnlockConditions,
};
use crate::node::{with_retry, NodeClient, NodeError};

/// Default time after which an unclaimed micro-transaction returns to the sender
pub const DEFAULT_EXPIRATION_SECS: u32 = 24 * 60 * 60;

/// Where the remainder of a transaction goes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value")]
pub enum RemainderStrategy {
    /// A freshly derived internal address
    #[default]
    ChangeAddress,
    /// The owner of the first input
    ReuseAddress,
    /// A bech32 address chosen by the caller
    CustomAddress(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    pub remainder_value_strategy: RemainderStrategy,
    pub tagged_data_payload: Option<TaggedData>,
    pub custom_inputs: Option<Vec<OutputId>>,
    pub mandatory_inputs: Option<Vec<OutputId>>,
    pub selection_strategy: StrategyKind,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressWithAmount {
    pub address: String,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressWithMicroAmount {
    pub address: String,
    pub amount: u64,
    /// Receives the storage deposit back; defaults to the account's first address
    #[serde(default)]
    pub return_address: Option<String>,
    /// Seconds until the output returns to the sender
    #[serde(default)]
    pub expiration: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressNativeTokens {
    pub address: String,
    pub native_tokens: NativeTokens,
    #[serde(default)]
    pub storage_deposit_return_address: Option<String>,
    #[serde(default)]
    pub expiration: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressNftId {
    pub address: String,
    pub nft_id: NftId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NftOptions {
    /// Owner of the new NFT; defaults to the account's first address
    pub address: Option<String>,
    #[serde(with = "crate::ledger::serde_hex::option", skip_serializing_if = "Option::is_none")]
    pub immutable_metadata: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSigningData {
    pub output_data: OutputData,
    pub chain: Chain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainderData {
    pub output: Output,
    pub address: Address,
    /// Set when the remainder goes to one of this account's addresses
    pub chain: Option<Chain>,
}

/// An unsigned essence plus what is needed to sign it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransactionData {
    pub essence: TransactionEssence,
    pub inputs_data: Vec<InputSigningData>,
    pub remainder: Option<RemainderData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransactionData {
    pub payload: TransactionPayload,
    pub inputs_data: Vec<InputSigningData>,
}

fn expiry(expiration: Option<u32>) -> u32 {
    unix_time_now().saturating_add(expiration.unwrap_or(DEFAULT_EXPIRATION_SECS))
}

impl AccountHandle {
    fn parse_address(&self, bech32: &str) -> Result<Address, WalletError> {
        Address::try_from_bech32_with_hrp(bech32, self.deriver().bech32_hrp())
    }

    /// Explicit return address, or the account's first public address
    fn return_address(&self, data: &AccountData, explicit: Option<&String>) -> Result<Address, WalletError> {
        match explicit {
            Some(bech32) => self.parse_address(bech32),
            None => data
                .first_public_address()
                .map(|a| a.address)
                .ok_or_else(|| WalletError::InvalidInput("account has no public address".to_string())),
        }
    }

    fn emit_progress(&self, progress: TransactionProgress) {
        self.context()
            .events
            .emit(self.index(), WalletEvent::TransactionProgress(progress));
    }

    fn amount_outputs(&self, params: &[AddressWithAmount]) -> Result<Vec<Output>, WalletError> {
        params
            .iter()
            .map(|p| Ok(BasicOutput::new(p.amount, self.parse_address(&p.address)?).into()))
            .collect()
    }

    /// Amounts below the minimum deposit are topped up; the difference is
    /// owed back to the sender and reclaimed at expiration if unclaimed
    fn micro_outputs(&self, data: &AccountData, params: &[AddressWithMicroAmount]) -> Result<Vec<Output>, WalletError> {
        let rent = &self.context().config.protocol.rent_structure;
        let mut outputs = Vec::with_capacity(params.len());

        for p in params {
            if p.amount == 0 {
                return Err(WalletError::InvalidInput("micro amount must be positive".to_string()));
            }
            let recipient = self.parse_address(&p.address)?;
            let plain: Output = BasicOutput::new(p.amount, recipient).into();
            let minimum = plain.min_storage_deposit(rent);
            if p.amount >= minimum {
                outputs.push(plain);
                continue;
            }

            let return_address = self.return_address(data, p.return_address.as_ref())?;
            let mut shaped = BasicOutput::new(0, recipient)
                .with_storage_deposit_return(return_address, 1)
                .with_expiration(return_address, expiry(p.expiration));
            let minimum = Output::from(shaped.clone()).min_storage_deposit(rent);
            shaped.amount = minimum;
            shaped = shaped.with_storage_deposit_return(return_address, minimum - p.amount);
            outputs.push(shaped.into());
        }

        Ok(outputs)
    }

    /// Tokens travel with exactly the minimum deposit, which is owed back
    fn native_token_outputs(&self, data: &AccountData, params: &[AddressNativeTokens]) -> Result<Vec<Output>, WalletError> {
        let rent = &self.context().config.protocol.rent_structure;
        let mut outputs = Vec::with_capacity(params.len());

        for p in params {
            if p.native_tokens.is_empty() {
                return Err(WalletError::InvalidInput("no native tokens to send".to_string()));
            }
            let recipient = self.parse_address(&p.address)?;
            let return_address = self.return_address(data, p.storage_deposit_return_address.as_ref())?;

            let mut shaped = BasicOutput::new(0, recipient)
                .with_native_tokens(p.native_tokens.clone())
                .with_storage_deposit_return(return_address, 1)
                .with_expiration(return_address, expiry(p.expiration));
            let minimum = Output::from(shaped.clone()).min_storage_deposit(rent);
            shaped.amount = minimum;
            shaped = shaped.with_storage_deposit_return(return_address, minimum);
            outputs.push(shaped.into());
        }

        Ok(outputs)
    }

    fn nft_outputs(&self, data: &AccountData, params: &[AddressNftId]) -> Result<Vec<Output>, WalletError> {
        params
            .iter()
            .map(|p| {
                let recipient = self.parse_address(&p.address)?;
                let current = data
                    .outputs
                    .unspent_nft(&p.nft_id)
                    .ok_or_else(|| WalletError::NftNotFound(p.nft_id.to_string()))?;
                match &current.output {
                    Output::Nft(nft) => {
                        let mut moved = nft.clone();
                        moved.nft_id = p.nft_id;
                        moved.unlock_conditions = UnlockConditions::address(recipient);
                        Ok(moved.into())
                    }
                    Output::Basic(_) => Err(WalletError::NftNotFound(p.nft_id.to_string())),
                }
            })
            .collect()
    }

    fn mint_outputs(&self, data: &AccountData, params: &[NftOptions]) -> Result<Vec<Output>, WalletError> {
        let rent = &self.context().config.protocol.rent_structure;
        params
            .iter()
            .map(|p| {
                let owner = self.return_address(data, p.address.as_ref())?;
                let mut nft = NftOutput::mint(0, owner, p.immutable_metadata.clone());
                nft.amount = Output::from(nft.clone()).min_storage_deposit(rent);
                Ok(nft.into())
            })
            .collect()
    }

    fn remainder_target(
        &self,
        data: &mut AccountData,
        strategy: &RemainderStrategy,
        inputs: &[OutputData],
    ) -> Result<(Address, Option<Chain>), WalletError> {
        match strategy {
            RemainderStrategy::ChangeAddress => {
                let generated = data.generate_addresses(self.deriver(), 1, true)?;
                let address = generated
                    .first()
                    .ok_or_else(|| WalletError::Internal("no remainder address derived".to_string()))?;
                self.emit_progress(TransactionProgress::GeneratingRemainderDepositAddress {
                    address: address.bech32.clone(),
                });
                Ok((
                    address.address,
                    Some(Chain::new(self.index(), true, address.key_index)),
                ))
            }
            RemainderStrategy::ReuseAddress => {
                let first = inputs
                    .first()
                    .ok_or_else(|| WalletError::Internal("remainder without inputs".to_string()))?;
                Ok((first.address, data.chain_of(&first.address)))
            }
            RemainderStrategy::CustomAddress(bech32) => {
                let address = self.parse_address(bech32)?;
                Ok((address, data.chain_of(&address)))
            }
        }
    }

    /// Select inputs and build the essence; the caller holds the account lock
    ///
    /// A change address derived for a prepare that then fails is dropped again.
    fn prepare_locked(
        &self,
        data: &mut AccountData,
        outputs: Vec<Output>,
        options: &TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let frontier = data.chain_addresses(true).len();
        let prepared = self.select_and_build(data, outputs, options);
        if prepared.is_err() {
            data.chain_addresses_mut(true).truncate(frontier);
        }
        prepared
    }

    fn select_and_build(
        &self,
        data: &mut AccountData,
        outputs: Vec<Output>,
        options: &TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let params = &self.context().config.protocol;
        self.emit_progress(TransactionProgress::SelectingInputs);

        let has_mandatory = options
            .mandatory_inputs
            .as_ref()
            .map_or(false, |inputs| !inputs.is_empty());
        if outputs.is_empty() && !has_mandatory {
            return Err(WalletError::InvalidInput("no outputs to send".to_string()));
        }
        for output in &outputs {
            output.verify(params)?;
        }

        let selection = OutputSelector::new(params, options.selection_strategy.strategy()).select(
            &data.outputs,
            &SelectionTarget {
                outputs: &outputs,
                custom_inputs: options.custom_inputs.as_deref(),
                mandatory_inputs: options.mandatory_inputs.as_deref().unwrap_or(&[]),
            },
        )?;

        let mut all_outputs = outputs;
        all_outputs.extend(selection.returns.iter().cloned());
        let remainder = match selection.remainder {
            Some(remainder) => {
                let (address, chain) =
                    self.remainder_target(data, &options.remainder_value_strategy, &selection.inputs)?;
                let output: Output = BasicOutput::new(remainder.amount, address)
                    .with_native_tokens(remainder.native_tokens)
                    .into();
                all_outputs.push(output.clone());
                Some(RemainderData {
                    output,
                    address,
                    chain,
                })
            }
            None => None,
        };

        let consumed: Vec<(OutputId, Output)> = selection
            .inputs
            .iter()
            .map(|input| (input.output_id, input.output.clone()))
            .collect();
        let essence = TransactionBuilder::new(params.clone()).build(
            &consumed,
            all_outputs,
            options.tagged_data_payload.clone(),
        )?;

        let inputs_data = essence
            .inputs
            .iter()
            .filter_map(|id| selection.inputs.iter().find(|input| input.output_id == *id))
            .map(|input| InputSigningData {
                output_data: input.clone(),
                chain: input.chain,
            })
            .collect();

        self.emit_progress(TransactionProgress::PreparedTransaction {
            inputs: essence.inputs.len(),
            outputs: essence.outputs.len(),
        });

        Ok(PreparedTransactionData {
            essence,
            inputs_data,
            remainder,
        })
    }

    fn sign_locked(
        &self,
        data: &AccountData,
        prepared: &PreparedTransactionData,
    ) -> Result<SignedTransactionData, WalletError> {
        self.emit_progress(TransactionProgress::SigningTransaction);
        signer::sign_transaction_essence(self.context().keys.as_ref(), data, prepared)
    }

    /// Submit and record; the caller holds the account lock
    ///
    /// Inputs are marked spent as soon as the node accepts the transaction,
    /// or when the node gave no definite answer. A rejection or an
    /// unreachable node leaves the account unchanged.
    async fn submit_locked(
        &self,
        data: &mut AccountData,
        signed: SignedTransactionData,
        note: Option<String>,
    ) -> Result<Transaction, WalletError> {
        let payload = signed.payload;

        for input in &payload.essence.inputs {
            match data.outputs.get(input) {
                Some(output) if !output.is_spent => {}
                _ => return Err(WalletError::ConflictingInputs(input.to_string())),
            }
        }

        let transaction_id = payload.id();
        self.emit_progress(TransactionProgress::Broadcasting);

        let ctx = self.context();
        let node: &dyn NodeClient = ctx.node.as_ref();
        let payload_ref = &payload;
        let result = with_retry(&ctx.config.node, "submit transaction", move || {
            node.submit_transaction(payload_ref)
        })
        .await;

        let outcome_unknown = match result {
            Ok(accepted) => {
                if accepted != transaction_id {
                    log::warn!(
                        "Node reported transaction id {} for {}",
                        accepted,
                        transaction_id
                    );
                }
                false
            }
            Err(NodeError::Timeout(reason)) | Err(NodeError::Malformed(reason)) => {
                log::warn!(
                    "Outcome of transaction {} is unknown ({}), keeping it pending",
                    transaction_id,
                    reason
                );
                true
            }
            Err(err) => {
                log::error!("Submission of transaction {} failed: {}", transaction_id, err);
                return Err(err.into());
            }
        };

        for input in &payload.essence.inputs {
            data.outputs.mark_spent(input)?;
        }
        let inputs: Vec<OutputData> = payload
            .essence
            .inputs
            .iter()
            .filter_map(|id| data.outputs.get(id).cloned())
            .collect();

        let transaction = Transaction {
            transaction_id,
            payload,
            inputs,
            status: TransactionStatus::Pending,
            outcome_unknown,
            timestamp: Utc::now(),
            note,
        };
        data.transactions.insert(transaction_id, transaction.clone());
        data.pending_transactions.insert(transaction_id);
        data.refresh_address_cache();
        self.save(data)?;

        if outcome_unknown {
            return Err(WalletError::SubmissionOutcomeUnknown { transaction_id });
        }

        log::info!(
            "Account {} submitted transaction {} ({} inputs, {} outputs)",
            self.index(),
            transaction_id,
            transaction.payload.essence.inputs.len(),
            transaction.payload.essence.outputs.len()
        );
        Ok(transaction)
    }

    pub(super) async fn send_locked(
        &self,
        data: &mut AccountData,
        outputs: Vec<Output>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let prepared = self.prepare_locked(data, outputs, &options)?;
        // A remainder address may have been derived
        self.save(data)?;
        let signed = self.sign_locked(data, &prepared)?;
        self.submit_locked(data, signed, options.note).await
    }

    pub async fn prepare_transaction(
        &self,
        outputs: Vec<Output>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let mut data = self.lock().await;
        let prepared = self.prepare_locked(&mut data, outputs, &options)?;
        self.save(&data)?;
        Ok(prepared)
    }

    pub async fn prepare_send_amount(
        &self,
        params: Vec<AddressWithAmount>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let outputs = self.amount_outputs(&params)?;
        self.prepare_transaction(outputs, options).await
    }

    pub async fn prepare_send_micro_transaction(
        &self,
        params: Vec<AddressWithMicroAmount>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.micro_outputs(&data, &params)?;
        let prepared = self.prepare_locked(&mut data, outputs, &options)?;
        self.save(&data)?;
        Ok(prepared)
    }

    pub async fn prepare_send_native_tokens(
        &self,
        params: Vec<AddressNativeTokens>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.native_token_outputs(&data, &params)?;
        let prepared = self.prepare_locked(&mut data, outputs, &options)?;
        self.save(&data)?;
        Ok(prepared)
    }

    pub async fn prepare_send_nft(
        &self,
        params: Vec<AddressNftId>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.nft_outputs(&data, &params)?;
        let prepared = self.prepare_locked(&mut data, outputs, &options)?;
        self.save(&data)?;
        Ok(prepared)
    }

    pub async fn prepare_mint_nfts(
        &self,
        params: Vec<NftOptions>,
        options: TransactionOptions,
    ) -> Result<PreparedTransactionData, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.mint_outputs(&data, &params)?;
        let prepared = self.prepare_locked(&mut data, outputs, &options)?;
        self.save(&data)?;
        Ok(prepared)
    }

    pub async fn sign_transaction_essence(
        &self,
        prepared: &PreparedTransactionData,
    ) -> Result<SignedTransactionData, WalletError> {
        let data = self.lock().await;
        self.sign_locked(&data, prepared)
    }

    pub async fn submit_and_store_transaction(
        &self,
        signed: SignedTransactionData,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        self.submit_locked(&mut data, signed, None).await
    }

    pub async fn send_transaction(
        &self,
        outputs: Vec<Output>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        self.send_locked(&mut data, outputs, options).await
    }

    pub async fn send_amount(
        &self,
        params: Vec<AddressWithAmount>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let outputs = self.amount_outputs(&params)?;
        self.send_transaction(outputs, options).await
    }

    pub async fn send_micro_transaction(
        &self,
        params: Vec<AddressWithMicroAmount>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.micro_outputs(&data, &params)?;
        self.send_locked(&mut data, outputs, options).await
    }

    pub async fn send_native_tokens(
        &self,
        params: Vec<AddressNativeTokens>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.native_token_outputs(&data, &params)?;
        self.send_locked(&mut data, outputs, options).await
    }

    pub async fn send_nft(
        &self,
        params: Vec<AddressNftId>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.nft_outputs(&data, &params)?;
        self.send_locked(&mut data, outputs, options).await
    }

    pub async fn mint_nfts(
        &self,
        params: Vec<NftOptions>,
        options: TransactionOptions,
    ) -> Result<Transaction, WalletError> {
        let mut data = self.lock().await;
        let outputs = self.mint_outputs(&data, &params)?;
        self.send_locked(&mut data, outputs, options).await
    }
}
