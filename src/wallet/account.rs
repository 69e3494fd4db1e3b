use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};

use super::address_manager::{AccountAddress, AddressDeriver, Chain};
use super::manager::WalletContext;
use super::output_store::{Balance, OutputData, OutputStore};
use crate::error::WalletError;
use crate::ledger::{unix_time_now, Address, OutputId, TransactionId, TransactionPayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// A transaction this account submitted; kept for history once settled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub payload: TransactionPayload,
    pub inputs: Vec<OutputData>,
    pub status: TransactionStatus,
    /// Submission timed out; the node may or may not have the transaction
    #[serde(default)]
    pub outcome_unknown: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateAddressOptions {
    pub internal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressWithUnspentOutputs {
    pub address: AccountAddress,
    pub output_ids: Vec<OutputId>,
}

/// Persistent state of one account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub index: u32,
    pub alias: String,
    pub public_addresses: Vec<AccountAddress>,
    pub internal_addresses: Vec<AccountAddress>,
    pub outputs: OutputStore,
    pub transactions: BTreeMap<TransactionId, Transaction>,
    pub pending_transactions: BTreeSet<TransactionId>,
}

impl AccountData {
    pub fn new(index: u32, alias: String) -> Self {
        Self {
            index,
            alias,
            public_addresses: Vec::new(),
            internal_addresses: Vec::new(),
            outputs: OutputStore::new(),
            transactions: BTreeMap::new(),
            pending_transactions: BTreeSet::new(),
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AccountAddress> {
        self.public_addresses.iter().chain(self.internal_addresses.iter())
    }

    pub fn address_set(&self) -> HashSet<Address> {
        self.addresses().map(|a| a.address).collect()
    }

    pub fn find_address(&self, address: &Address) -> Option<&AccountAddress> {
        self.addresses().find(|a| a.address == *address)
    }

    pub fn chain_of(&self, address: &Address) -> Option<Chain> {
        self.find_address(address)
            .map(|a| Chain::new(self.index, a.internal, a.key_index))
    }

    pub fn first_public_address(&self) -> Option<&AccountAddress> {
        self.public_addresses.first()
    }

    pub(crate) fn chain_addresses(&self, internal: bool) -> &Vec<AccountAddress> {
        if internal {
            &self.internal_addresses
        } else {
            &self.public_addresses
        }
    }

    pub(crate) fn chain_addresses_mut(&mut self, internal: bool) -> &mut Vec<AccountAddress> {
        if internal {
            &mut self.internal_addresses
        } else {
            &mut self.public_addresses
        }
    }

    /// Append `count` addresses after the last one of the chain
    pub fn generate_addresses(
        &mut self,
        deriver: &AddressDeriver,
        count: u32,
        internal: bool,
    ) -> Result<Vec<AccountAddress>, WalletError> {
        let start = self.chain_addresses(internal).len() as u32;
        let addresses = deriver.derive_range(start, count, internal)?;
        self.chain_addresses_mut(internal).extend(addresses.iter().cloned());
        Ok(addresses)
    }

    /// Recompute cached per-address balances and the sticky `used` flag
    pub(crate) fn refresh_address_cache(&mut self) {
        let outputs = &self.outputs;
        let now = unix_time_now();
        for address in self
            .public_addresses
            .iter_mut()
            .chain(self.internal_addresses.iter_mut())
        {
            address.balance = outputs
                .unspent_for(&address.address)
                .map(|o| o.available_amount_at(now))
                .sum();
            address.used |= outputs.all().any(|o| o.address == address.address);
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &Transaction> {
        self.pending_transactions
            .iter()
            .filter_map(|id| self.transactions.get(id))
    }
}

/// Shared handle to one account
///
/// All state lives behind one async mutex. Operations that select, submit
/// or sync hold it for their whole duration; operations on other accounts
/// never wait on it.
#[derive(Clone)]
pub struct AccountHandle {
    index: u32,
    alias: Arc<RwLock<String>>,
    data: Arc<Mutex<AccountData>>,
    deriver: AddressDeriver,
    context: Arc<WalletContext>,
}

impl AccountHandle {
    pub(crate) fn new(data: AccountData, deriver: AddressDeriver, context: Arc<WalletContext>) -> Self {
        Self {
            index: data.index,
            alias: Arc::new(RwLock::new(data.alias.clone())),
            data: Arc::new(Mutex::new(data)),
            deriver,
            context,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn alias(&self) -> String {
        self.alias
            .read()
            .map(|alias| alias.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub(crate) fn context(&self) -> &WalletContext {
        &self.context
    }

    pub(crate) fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.data.lock().await
    }

    /// Snapshot of the account state
    pub async fn data(&self) -> AccountData {
        self.lock().await.clone()
    }

    /// Persist the account if storage is configured
    pub(crate) fn save(&self, data: &AccountData) -> Result<(), WalletError> {
        if let Some(storage) = &self.context.storage {
            storage.save_account(data)?;
        }
        Ok(())
    }

    pub(crate) async fn set_alias(&self, alias: &str) -> Result<(), WalletError> {
        let mut data = self.lock().await;
        data.alias = alias.to_string();
        self.save(&data)?;
        match self.alias.write() {
            Ok(mut cached) => *cached = alias.to_string(),
            Err(poisoned) => *poisoned.into_inner() = alias.to_string(),
        }
        log::info!("Account {} alias set to '{}'", self.index, alias);
        Ok(())
    }

    pub async fn generate_addresses(
        &self,
        count: u32,
        options: GenerateAddressOptions,
    ) -> Result<Vec<AccountAddress>, WalletError> {
        let mut data = self.lock().await;
        let addresses = data.generate_addresses(&self.deriver, count, options.internal)?;
        if !addresses.is_empty() {
            self.save(&data)?;
        }
        log::debug!(
            "Account {} generated {} {} addresses",
            self.index,
            addresses.len(),
            if options.internal { "internal" } else { "public" }
        );
        Ok(addresses)
    }

    pub async fn list_addresses(&self) -> Vec<AccountAddress> {
        self.lock().await.addresses().cloned().collect()
    }

    pub async fn list_addresses_with_unspent_outputs(&self) -> Vec<AddressWithUnspentOutputs> {
        let data = self.lock().await;
        data.addresses()
            .filter_map(|address| {
                let output_ids: Vec<OutputId> = data
                    .outputs
                    .unspent_for(&address.address)
                    .map(|o| o.output_id)
                    .collect();
                (!output_ids.is_empty()).then(|| AddressWithUnspentOutputs {
                    address: address.clone(),
                    output_ids,
                })
            })
            .collect()
    }

    pub async fn get_balance(&self) -> Result<Balance, WalletError> {
        let data = self.lock().await;
        data.outputs.balance(
            &data.address_set(),
            &self.context.config.protocol.rent_structure,
            unix_time_now(),
        )
    }

    pub async fn get_output(&self, output_id: &OutputId) -> Result<OutputData, WalletError> {
        self.lock()
            .await
            .outputs
            .get(output_id)
            .cloned()
            .ok_or_else(|| WalletError::OutputNotFound(output_id.to_string()))
    }

    pub async fn list_outputs(&self) -> Vec<OutputData> {
        self.lock().await.outputs.all().cloned().collect()
    }

    pub async fn list_unspent_outputs(&self) -> Vec<OutputData> {
        self.lock().await.outputs.unspent().cloned().collect()
    }

    pub async fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Transaction, WalletError> {
        self.lock()
            .await
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| WalletError::TransactionNotFound(transaction_id.to_string()))
    }

    pub async fn list_transactions(&self) -> Vec<Transaction> {
        self.lock().await.transactions.values().cloned().collect()
    }

    pub async fn list_pending_transactions(&self) -> Vec<Transaction> {
        self.lock().await.pending().cloned().collect()
    }
}
