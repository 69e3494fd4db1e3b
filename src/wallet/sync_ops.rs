/// Account synchronization
///
/// A sync brings the local output store in line with the node:
///
/// 1. List the outputs of every known address, then scan ahead on each
///    chain until `gap_limit` consecutive fresh addresses come back empty.
/// 2. Fetch outputs the store has never seen.
/// 3. Re-check unspent outputs the node no longer lists.
/// 4. Settle pending transactions as confirmed or rejected.
///
/// The account lock is held for the whole sync, so a sync never interleaves
/// with a send on the same account. Nothing is modified until the address
/// scan has produced at least one answer from the node.
///
/// Outputs are also found through their expiration return address. Each one
/// is bound to whichever account address can unlock it, and rebound when it
/// expires back to the sender.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use super::account::{AccountData, AccountHandle, TransactionStatus};
use super::address_manager::{AccountAddress, Chain};
use super::events::WalletEvent;
use super::output_store::{Balance, OutputData};
use crate::error::WalletError;
use crate::ledger::{unix_time_now, Address, Output, OutputId, TransactionId};
use crate::node::{with_retry, NodeClient, NodeError, OutputWithMetadata};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Overrides the configured gap limit for this sync
    pub gap_limit: Option<u32>,
    pub sync_spent_outputs: bool,
    pub sync_pending_transactions: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            gap_limit: None,
            sync_spent_outputs: true,
            sync_pending_transactions: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub new_outputs: usize,
    pub spent_outputs: usize,
    pub new_addresses: usize,
    /// Address queries made, including lookahead addresses
    pub addresses_scanned: usize,
    pub confirmed_transactions: Vec<TransactionId>,
    pub rejected_transactions: Vec<TransactionId>,
    /// Addresses whose outputs could not be listed
    pub failed_addresses: usize,
    pub balance: Balance,
}

/// Outcome of the address scan, before anything is applied
#[derive(Default)]
struct AddressScan {
    /// Successfully listed addresses with the ids the node returned
    listed: Vec<(AccountAddress, Vec<OutputId>)>,
    /// Lookahead addresses to append, in chain order
    discovered: Vec<AccountAddress>,
    succeeded: usize,
    failed: usize,
    last_error: Option<NodeError>,
}

impl AddressScan {
    fn record(&mut self, address: AccountAddress, result: Result<Vec<OutputId>, NodeError>) -> Option<bool> {
        match result {
            Ok(ids) => {
                self.succeeded += 1;
                let used = !ids.is_empty();
                self.listed.push((address, ids));
                Some(used)
            }
            Err(err) => {
                log::warn!("Could not list outputs of {}: {}", address.bech32, err);
                self.failed += 1;
                self.last_error = Some(err);
                None
            }
        }
    }
}

/// The account address an output belongs to: whoever can unlock it at
/// `now` if that is us, else the address condition or the return address
fn bound_address(data: &AccountData, output: &Output, now: u32) -> Option<(Address, Chain)> {
    let conditions = output.unlock_conditions();
    [
        Some(output.owner_at(now)),
        Some(conditions.address),
        conditions.expiration.map(|expiration| expiration.return_address),
    ]
    .into_iter()
    .flatten()
    .find_map(|address| data.chain_of(&address).map(|chain| (address, chain)))
}

/// Move outputs that expired back to one of our addresses onto that address
fn rebind_expired(data: &mut AccountData, now: u32) -> Result<usize, WalletError> {
    let moved: Vec<(OutputId, Address, Chain)> = data
        .outputs
        .unspent()
        .filter(|output| output.output.is_expired_at(now) && !output.is_unlockable_at(now))
        .filter_map(|output| {
            let owner = output.output.owner_at(now);
            data.chain_of(&owner)
                .map(|chain| (output.output_id, owner, chain))
        })
        .collect();

    for (output_id, address, chain) in &moved {
        log::debug!("Output {} expired back to {}", output_id, address);
        data.outputs.rebind(output_id, *address, *chain)?;
    }
    Ok(moved.len())
}

enum PendingOutcome {
    Confirmed,
    Rejected,
    Pending,
}

impl AccountHandle {
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncReport, WalletError> {
        let started = Instant::now();
        let gap_limit = options
            .gap_limit
            .unwrap_or(self.context().config.sync.gap_limit);

        let mut data = self.lock().await;
        let mut report = SyncReport::default();

        let mut scan = AddressScan::default();
        for internal in [false, true] {
            self.scan_chain(&data, internal, gap_limit, &mut scan).await?;
        }

        if scan.succeeded == 0 {
            if let Some(err) = scan.last_error.take() {
                log::error!(
                    "Sync of account {} failed, no address could be listed: {}",
                    self.index(),
                    err
                );
                return Err(WalletError::NodeUnreachable(err.to_string()));
            }
        }
        report.addresses_scanned = scan.succeeded + scan.failed;
        report.failed_addresses = scan.failed;

        report.new_addresses = scan.discovered.len();
        for address in std::mem::take(&mut scan.discovered) {
            data.chain_addresses_mut(address.internal).push(address);
        }

        let now = unix_time_now();
        report.new_outputs = self.fetch_new_outputs(&mut data, &scan.listed, now).await?;
        rebind_expired(&mut data, now)?;

        if options.sync_spent_outputs {
            let listed: HashSet<OutputId> = scan
                .listed
                .iter()
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            report.spent_outputs = self.detect_spent_outputs(&mut data, &listed).await?;
        }

        if options.sync_pending_transactions {
            self.reconcile_pending(&mut data, &mut report).await?;
        }

        data.refresh_address_cache();
        self.save(&data)?;

        report.balance = data.outputs.balance(
            &data.address_set(),
            &self.context().config.protocol.rent_structure,
            now,
        )?;

        log::info!(
            "Synced account {} in {:?}: {} new outputs, {} spent, {} new addresses, balance {}",
            self.index(),
            started.elapsed(),
            report.new_outputs,
            report.spent_outputs,
            report.new_addresses,
            report.balance.amount
        );
        Ok(report)
    }

    async fn list_outputs_of(
        &self,
        addresses: Vec<AccountAddress>,
    ) -> Vec<(AccountAddress, Result<Vec<OutputId>, NodeError>)> {
        let ctx = self.context();
        let node: &dyn NodeClient = ctx.node.as_ref();
        let config = &ctx.config.node;

        let lookups: Vec<_> = addresses
            .into_iter()
            .map(|address| async move {
                let target = &address.address;
                let result = with_retry(config, "list address outputs", move || {
                    node.get_outputs_for_address(target)
                })
                .await;
                (address, result)
            })
            .collect();

        stream::iter(lookups)
            .buffered(ctx.config.sync.parallel_requests.max(1))
            .collect()
            .await
    }

    /// Known addresses first, then fresh ones until the gap is reached
    async fn scan_chain(
        &self,
        data: &AccountData,
        internal: bool,
        gap_limit: u32,
        scan: &mut AddressScan,
    ) -> Result<(), WalletError> {
        let known = data.chain_addresses(internal).clone();
        let mut next = known.len() as u32;
        for (address, result) in self.list_outputs_of(known).await {
            scan.record(address, result);
        }

        let mut lookahead = Vec::new();
        let mut last_used = None;
        let mut unused_run = 0u32;
        while unused_run < gap_limit {
            let batch = self
                .deriver()
                .derive_range(next, gap_limit - unused_run, internal)?;
            next += batch.len() as u32;

            for (address, result) in self.list_outputs_of(batch).await {
                if scan.record(address.clone(), result) == Some(true) {
                    unused_run = 0;
                    last_used = Some(lookahead.len());
                } else {
                    unused_run += 1;
                }
                lookahead.push(address);
            }
        }

        if let Some(last) = last_used {
            lookahead.truncate(last + 1);
            log::debug!(
                "Account {} discovered {} {} addresses",
                self.index(),
                lookahead.len(),
                if internal { "internal" } else { "public" }
            );
            scan.discovered.extend(lookahead);
        }
        Ok(())
    }

    async fn fetch_outputs(&self, ids: Vec<OutputId>) -> Vec<(OutputId, Result<Option<OutputWithMetadata>, NodeError>)> {
        let ctx = self.context();
        let node: &dyn NodeClient = ctx.node.as_ref();
        let config = &ctx.config.node;

        let lookups: Vec<_> = ids
            .into_iter()
            .map(|output_id| async move {
                let target = &output_id;
                let result = with_retry(config, "get output", move || node.get_output(target)).await;
                (output_id, result)
            })
            .collect();

        stream::iter(lookups)
            .buffer_unordered(ctx.config.sync.parallel_requests.max(1))
            .collect()
            .await
    }

    async fn fetch_new_outputs(
        &self,
        data: &mut AccountData,
        listed: &[(AccountAddress, Vec<OutputId>)],
        now: u32,
    ) -> Result<usize, WalletError> {
        let unknown: Vec<OutputId> = listed
            .iter()
            .flat_map(|(_, ids)| ids.iter())
            .filter(|id| !data.outputs.contains(id))
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut added = 0;
        for (output_id, result) in self.fetch_outputs(unknown).await {
            let fetched = match result {
                Ok(Some(fetched)) if !fetched.is_spent => fetched,
                // Spent or pruned between listing and fetching
                Ok(_) => continue,
                Err(err) => {
                    log::warn!("Could not fetch output {}: {}", output_id, err);
                    continue;
                }
            };

            let (owner, chain) = match bound_address(data, &fetched.output, now) {
                Some(bound) => bound,
                None => {
                    log::warn!("Output {} is not owned by account {}", output_id, self.index());
                    continue;
                }
            };

            let output = OutputData {
                output_id,
                output: fetched.output,
                address: owner,
                chain,
                is_spent: false,
            };
            if data.outputs.upsert(output.clone()) {
                added += 1;
                self.context()
                    .events
                    .emit(self.index(), WalletEvent::NewOutput(Box::new(output)));
            }
        }
        Ok(added)
    }

    /// Unspent outputs the node stopped listing are spent unless the node says otherwise
    async fn detect_spent_outputs(
        &self,
        data: &mut AccountData,
        listed: &HashSet<OutputId>,
    ) -> Result<usize, WalletError> {
        let candidates: Vec<OutputId> = data
            .outputs
            .unspent()
            .map(|output| output.output_id)
            .filter(|id| !listed.contains(id))
            .collect();

        let mut spent = 0;
        for (output_id, result) in self.fetch_outputs(candidates).await {
            match result {
                Ok(Some(metadata)) if !metadata.is_spent => continue,
                Ok(_) => {}
                Err(err) => {
                    log::warn!("Could not check output {}: {}", output_id, err);
                    continue;
                }
            }

            if data.outputs.mark_spent(&output_id)? {
                spent += 1;
                if let Some(output) = data.outputs.get(&output_id) {
                    self.context()
                        .events
                        .emit(self.index(), WalletEvent::SpentOutput(Box::new(output.clone())));
                }
            }
        }
        Ok(spent)
    }

    async fn pending_outcome(&self, transaction_id: &TransactionId, inputs: &[OutputId], expired: bool) -> Result<PendingOutcome, NodeError> {
        let ctx = self.context();
        let node: &dyn NodeClient = ctx.node.as_ref();
        let config = &ctx.config.node;

        let first_output = OutputId::new(*transaction_id, 0);
        let target = &first_output;
        if with_retry(config, "get output", move || node.get_output(target))
            .await?
            .is_some()
        {
            return Ok(PendingOutcome::Confirmed);
        }

        let mut all_unspent = true;
        for (_, result) in self.fetch_outputs(inputs.to_vec()).await {
            match result? {
                Some(metadata) if metadata.is_spent => {
                    all_unspent = false;
                    match metadata.spent_by {
                        Some(spender) if spender == *transaction_id => {
                            return Ok(PendingOutcome::Confirmed)
                        }
                        Some(_) => return Ok(PendingOutcome::Rejected),
                        None => {}
                    }
                }
                Some(_) => {}
                None => all_unspent = false,
            }
        }

        if all_unspent && expired {
            Ok(PendingOutcome::Rejected)
        } else {
            Ok(PendingOutcome::Pending)
        }
    }

    async fn reconcile_pending(&self, data: &mut AccountData, report: &mut SyncReport) -> Result<(), WalletError> {
        let expiry_secs = self.context().config.node.pending_expiry_secs;
        let now = Utc::now();
        let pending: Vec<(TransactionId, Vec<OutputId>, bool)> = data
            .pending()
            .map(|tx| {
                let age = now.signed_duration_since(tx.timestamp).num_seconds().max(0) as u64;
                (tx.transaction_id, tx.payload.essence.inputs.clone(), age >= expiry_secs)
            })
            .collect();

        for (transaction_id, inputs, expired) in pending {
            let status = match self.pending_outcome(&transaction_id, &inputs, expired).await {
                Ok(PendingOutcome::Confirmed) => TransactionStatus::Confirmed,
                Ok(PendingOutcome::Rejected) => TransactionStatus::Rejected,
                Ok(PendingOutcome::Pending) => continue,
                Err(err) => {
                    log::warn!("Could not check pending transaction {}: {}", transaction_id, err);
                    continue;
                }
            };

            if status == TransactionStatus::Rejected {
                // Inputs the node still reports unspent go back to the spendable set
                for (output_id, result) in self.fetch_outputs(inputs).await {
                    if let Ok(Some(metadata)) = result {
                        if !metadata.is_spent && data.outputs.contains(&output_id) {
                            data.outputs.mark_unspent(&output_id)?;
                        }
                    }
                }
                report.rejected_transactions.push(transaction_id);
                log::warn!("Transaction {} was rejected", transaction_id);
            } else {
                report.confirmed_transactions.push(transaction_id);
                log::info!("Transaction {} confirmed", transaction_id);
            }

            data.pending_transactions.remove(&transaction_id);
            if let Some(tx) = data.transactions.get_mut(&transaction_id) {
                tx.status = status;
                tx.outcome_unknown = false;
            }
            self.context().events.emit(
                self.index(),
                WalletEvent::TransactionInclusion {
                    transaction_id,
                    status,
                },
            );
        }
        Ok(())
    }
}
