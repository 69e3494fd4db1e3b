/// Local cache of the outputs an account owns
///
/// Each output is stored once, keyed by its id, together with the single
/// address that owns it. The store is only reached through the account's
/// lock, so readers always see a consistent snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::address_manager::Chain;
use crate::error::WalletError;
use crate::ledger::{Address, NativeTokens, NftId, Output, OutputId, RentStructure};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputData {
    pub output_id: OutputId,
    pub output: Output,
    /// The account address the output belongs to: its address condition,
    /// or the expiration return address when that one is ours
    pub address: Address,
    pub chain: Chain,
    pub is_spent: bool,
}

impl OutputData {
    pub fn nft_id(&self) -> Option<NftId> {
        self.output.nft_id(&self.output_id)
    }

    /// True when the account's address may unlock the output at `now`
    pub fn is_unlockable_at(&self, now: u32) -> bool {
        self.output.owner_at(now) == self.address
    }

    /// Base coin this account can move at `now` without returning anything
    pub fn available_amount_at(&self, now: u32) -> u64 {
        if !self.is_unlockable_at(now) {
            return 0;
        }
        let returned = self
            .output
            .storage_deposit_owed_at(now)
            .map_or(0, |sdr| sdr.amount);
        self.output.amount().saturating_sub(returned)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: u64,
    pub native_tokens: NativeTokens,
    pub nfts: Vec<NftId>,
    /// Sum of the minimum storage deposits locked by the counted outputs
    pub required_storage_deposit: u64,
    /// Outputs sent with an expiration back to this account that the
    /// recipient can still claim
    #[serde(default)]
    pub potentially_locked_outputs: Vec<OutputId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputStore {
    outputs: BTreeMap<OutputId, OutputData>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn contains(&self, output_id: &OutputId) -> bool {
        self.outputs.contains_key(output_id)
    }

    /// Insert or overwrite by output id; returns true when the id was new
    pub fn upsert(&mut self, output: OutputData) -> bool {
        self.outputs.insert(output.output_id, output).is_none()
    }

    /// Returns true when the output went from unspent to spent
    pub fn mark_spent(&mut self, output_id: &OutputId) -> Result<bool, WalletError> {
        let output = self
            .outputs
            .get_mut(output_id)
            .ok_or_else(|| WalletError::OutputNotFound(output_id.to_string()))?;
        let changed = !output.is_spent;
        output.is_spent = true;
        Ok(changed)
    }

    /// Undo a speculative spend; only rejected submissions call this
    pub fn mark_unspent(&mut self, output_id: &OutputId) -> Result<bool, WalletError> {
        let output = self
            .outputs
            .get_mut(output_id)
            .ok_or_else(|| WalletError::OutputNotFound(output_id.to_string()))?;
        let changed = output.is_spent;
        output.is_spent = false;
        Ok(changed)
    }

    pub fn get(&self, output_id: &OutputId) -> Option<&OutputData> {
        self.outputs.get(output_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &OutputData> {
        self.outputs.values()
    }

    pub fn unspent(&self) -> impl Iterator<Item = &OutputData> {
        self.outputs.values().filter(|output| !output.is_spent)
    }

    pub fn unspent_for<'a>(&'a self, address: &'a Address) -> impl Iterator<Item = &'a OutputData> + 'a {
        self.unspent().filter(move |output| output.address == *address)
    }

    /// Point an output at another account address, as when it expires back to us
    pub fn rebind(&mut self, output_id: &OutputId, address: Address, chain: Chain) -> Result<(), WalletError> {
        let output = self
            .outputs
            .get_mut(output_id)
            .ok_or_else(|| WalletError::OutputNotFound(output_id.to_string()))?;
        output.address = address;
        output.chain = chain;
        Ok(())
    }

    /// Find the unspent output carrying `nft_id`
    pub fn unspent_nft(&self, nft_id: &NftId) -> Option<&OutputData> {
        self.unspent().find(|output| output.nft_id().as_ref() == Some(nft_id))
    }

    /// Totals over the unspent outputs `addresses` can unlock at `now`
    pub fn balance(
        &self,
        addresses: &HashSet<Address>,
        rent: &RentStructure,
        now: u32,
    ) -> Result<Balance, WalletError> {
        let mut balance = Balance::default();

        for output in self.unspent().filter(|output| addresses.contains(&output.address)) {
            if !output.is_unlockable_at(now) {
                if !output.output.is_expired_at(now) {
                    balance.potentially_locked_outputs.push(output.output_id);
                }
                continue;
            }

            balance.amount = balance
                .amount
                .checked_add(output.available_amount_at(now))
                .ok_or_else(|| WalletError::Internal("balance overflow".to_string()))?;
            balance.native_tokens.add_all(output.output.native_tokens())?;
            balance.required_storage_deposit = balance
                .required_storage_deposit
                .checked_add(output.output.min_storage_deposit(rent))
                .ok_or_else(|| WalletError::Internal("storage deposit overflow".to_string()))?;
            if let Some(nft_id) = output.nft_id() {
                balance.nfts.push(nft_id);
            }
        }

        Ok(balance)
    }
}
