/// Output collection
///
/// Claims outputs that carry more than an address unlock condition. Owed
/// storage deposits are paid back and what is left lands on a plain output
/// of this account. Outputs that expired back to the sender are reclaimed
/// the same way.

use serde::{Deserialize, Serialize};

use super::account::{AccountData, AccountHandle, Transaction};
use super::transfer_ops::{RemainderStrategy, TransactionOptions};
use crate::error::WalletError;
use crate::ledger::{unix_time_now, Output, OutputId, UnlockConditions};

/// Which kind of output to collect
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputsToCollect {
    #[default]
    None,
    /// Basic outputs without native tokens
    MicroTransactions,
    /// Basic outputs carrying native tokens
    NativeTokens,
    Nfts,
    All,
}

impl OutputsToCollect {
    fn matches(&self, output: &Output) -> bool {
        match (self, output) {
            (OutputsToCollect::None, _) => false,
            (OutputsToCollect::MicroTransactions, Output::Basic(basic)) => basic.native_tokens.is_empty(),
            (OutputsToCollect::NativeTokens, Output::Basic(basic)) => !basic.native_tokens.is_empty(),
            (OutputsToCollect::Nfts, Output::Nft(_)) => true,
            (OutputsToCollect::All, _) => true,
            _ => false,
        }
    }
}

fn collectable(data: &AccountData, outputs_to_collect: OutputsToCollect, now: u32) -> Vec<OutputId> {
    data.outputs
        .unspent()
        .filter(|output| {
            !output.output.has_only_address_condition()
                && output.is_unlockable_at(now)
                && outputs_to_collect.matches(&output.output)
        })
        .map(|output| output.output_id)
        .collect()
}

impl AccountHandle {
    /// Unspent outputs this account can claim right now
    pub async fn get_outputs_with_additional_unlock_conditions(
        &self,
        outputs_to_collect: OutputsToCollect,
    ) -> Vec<OutputId> {
        let data = self.lock().await;
        collectable(&data, outputs_to_collect, unix_time_now())
    }

    /// Claim the given outputs, in as many transactions as the input limit needs
    pub async fn collect_outputs(&self, output_ids: Vec<OutputId>) -> Result<Vec<Transaction>, WalletError> {
        if output_ids.is_empty() {
            return Err(WalletError::InvalidInput("no outputs to collect".to_string()));
        }
        let mut data = self.lock().await;
        self.collect_locked(&mut data, &output_ids).await
    }

    /// Claim every collectable output of one kind; nothing to claim is not an error
    pub async fn try_collect_outputs(
        &self,
        outputs_to_collect: OutputsToCollect,
    ) -> Result<Vec<Transaction>, WalletError> {
        let mut data = self.lock().await;
        let output_ids = collectable(&data, outputs_to_collect, unix_time_now());
        if output_ids.is_empty() {
            log::debug!("Account {} has no {:?} outputs to collect", self.index(), outputs_to_collect);
            return Ok(Vec::new());
        }
        self.collect_locked(&mut data, &output_ids).await
    }

    async fn collect_locked(
        &self,
        data: &mut AccountData,
        output_ids: &[OutputId],
    ) -> Result<Vec<Transaction>, WalletError> {
        // Leave room for the inputs that fund the deposit returns
        let chunk_size = (self.context().config.protocol.max_inputs / 2).max(1);
        let mut transactions = Vec::new();

        for chunk in output_ids.chunks(chunk_size) {
            let outputs = self.carried_nfts(data, chunk)?;
            let options = TransactionOptions {
                remainder_value_strategy: RemainderStrategy::ReuseAddress,
                mandatory_inputs: Some(chunk.to_vec()),
                ..TransactionOptions::default()
            };
            let transaction = self.send_locked(data, outputs, options).await?;
            log::info!(
                "Account {} collected {} outputs in transaction {}",
                self.index(),
                chunk.len(),
                transaction.transaction_id
            );
            transactions.push(transaction);
        }

        Ok(transactions)
    }

    /// Collected NFTs are recreated on their account address with only an
    /// address condition and the minimum deposit
    fn carried_nfts(&self, data: &AccountData, output_ids: &[OutputId]) -> Result<Vec<Output>, WalletError> {
        let rent = &self.context().config.protocol.rent_structure;
        let mut outputs = Vec::new();

        for output_id in output_ids {
            let current = data
                .outputs
                .get(output_id)
                .ok_or_else(|| WalletError::OutputNotFound(output_id.to_string()))?;
            if let (Output::Nft(nft), Some(nft_id)) = (&current.output, current.nft_id()) {
                let mut carried = nft.clone();
                carried.nft_id = nft_id;
                carried.unlock_conditions = UnlockConditions::address(current.address);
                carried.amount = Output::from(carried.clone()).min_storage_deposit(rent);
                outputs.push(carried.into());
            }
        }

        Ok(outputs)
    }
}
