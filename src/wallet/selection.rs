/// Input selection
///
/// Picks unspent outputs covering the base coin, native tokens and NFTs a
/// set of outputs needs, and sizes the remainder so it never falls below
/// its minimum storage deposit.
///
/// Outputs that owe a storage deposit back are only spent when named as
/// custom or mandatory inputs; the selection then carries the return
/// outputs they require.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use super::output_store::{OutputData, OutputStore};
use crate::error::WalletError;
use crate::ledger::{
    unix_time_now, Address, BasicOutput, NativeTokens, NftId, Output, OutputId, ProtocolParameters,
};

/// Order in which amount candidates are tried
pub trait SelectionStrategy: Send + Sync {
    /// Sort `candidates` so the most preferred comes first
    fn order(&self, candidates: &mut Vec<&OutputData>);
}

/// Fewest inputs: biggest outputs first
pub struct LargestFirst;

impl SelectionStrategy for LargestFirst {
    fn order(&self, candidates: &mut Vec<&OutputData>) {
        candidates.sort_by_key(|o| (Reverse(o.output.amount()), o.output_id));
    }
}

/// Consolidation: smallest outputs first
pub struct SmallestFirst;

impl SelectionStrategy for SmallestFirst {
    fn order(&self, candidates: &mut Vec<&OutputData>) {
        candidates.sort_by_key(|o| (o.output.amount(), o.output_id));
    }
}

/// Built-in strategies, selectable from serialized options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    #[default]
    LargestFirst,
    SmallestFirst,
}

impl StrategyKind {
    pub fn strategy(&self) -> &'static dyn SelectionStrategy {
        match self {
            StrategyKind::LargestFirst => &LargestFirst,
            StrategyKind::SmallestFirst => &SmallestFirst,
        }
    }
}

pub struct SelectionTarget<'a> {
    pub outputs: &'a [Output],
    /// Use exactly these inputs
    pub custom_inputs: Option<&'a [OutputId]>,
    /// Always include these inputs, then select more as needed
    pub mandatory_inputs: &'a [OutputId],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remainder {
    pub amount: u64,
    pub native_tokens: NativeTokens,
}

#[derive(Clone, Debug)]
pub struct Selection {
    pub inputs: Vec<OutputData>,
    /// Storage deposit returns owed by the inputs, one per return address
    pub returns: Vec<Output>,
    pub remainder: Option<Remainder>,
}

struct Requirement {
    amount: u64,
    tokens: NativeTokens,
    nfts: Vec<NftId>,
}

enum Coverage {
    Covered(Option<Remainder>),
    Dust { amount: u64, minimum: u64 },
    Short,
}

pub struct OutputSelector<'a> {
    params: &'a ProtocolParameters,
    strategy: &'a dyn SelectionStrategy,
    /// Unix time unlock conditions are evaluated at
    now: u32,
}

impl<'a> OutputSelector<'a> {
    pub fn new(params: &'a ProtocolParameters, strategy: &'a dyn SelectionStrategy) -> Self {
        Self {
            params,
            strategy,
            now: unix_time_now(),
        }
    }

    /// Evaluate expirations at `now` instead of the current time
    pub fn at(mut self, now: u32) -> Self {
        self.now = now;
        self
    }

    pub fn select(&self, store: &OutputStore, target: &SelectionTarget<'_>) -> Result<Selection, WalletError> {
        let mut requirement = requirement(target.outputs)?;

        if let Some(custom) = target.custom_inputs {
            let inputs = self.resolve(store, custom)?;
            let returns = self.storage_deposit_returns(&inputs)?;
            requirement.add_returns(&returns)?;
            return match self.coverage(&inputs, &requirement)? {
                Coverage::Covered(remainder) => Ok(finish(inputs, returns, remainder)),
                Coverage::Dust { amount, minimum } => {
                    Err(WalletError::DustThresholdViolation { amount, minimum })
                }
                Coverage::Short => Err(insufficient(&requirement, &inputs)),
            };
        }

        let mut selected = self.resolve(store, target.mandatory_inputs)?;

        for nft_id in &requirement.nfts {
            if selected.iter().any(|o| o.nft_id().as_ref() == Some(nft_id)) {
                continue;
            }
            let output = store
                .unspent_nft(nft_id)
                .filter(|o| o.is_unlockable_at(self.now))
                .ok_or_else(|| WalletError::NftNotFound(nft_id.to_string()))?;
            selected.push(output);
        }

        // Automatic candidates never owe a deposit, so the returns are fixed here
        let returns = self.storage_deposit_returns(&selected)?;
        requirement.add_returns(&returns)?;

        let chosen: HashSet<OutputId> = selected.iter().map(|o| o.output_id).collect();
        let mut candidates: Vec<&OutputData> = store
            .unspent()
            .filter(|o| {
                matches!(o.output, Output::Basic(_))
                    && o.is_unlockable_at(self.now)
                    && o.output.storage_deposit_owed_at(self.now).is_none()
                    && !chosen.contains(&o.output_id)
            })
            .collect();

        // Token holders first, largest holding of each missing token
        for (token_id, needed) in requirement.tokens.iter() {
            loop {
                let have: u64 = selected.iter().map(|o| o.output.native_tokens().get(token_id)).sum();
                if have >= *needed {
                    break;
                }
                let best = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.output.native_tokens().get(token_id) > 0)
                    .max_by_key(|(_, o)| (o.output.native_tokens().get(token_id), Reverse(o.output_id)))
                    .map(|(position, _)| position);

                match best {
                    Some(position) => selected.push(candidates.remove(position)),
                    None => {
                        return Err(WalletError::InsufficientFunds {
                            required: format!("{} of token {}", needed, token_id),
                            available: format!("{} of token {}", have, token_id),
                        })
                    }
                }
            }
        }

        self.strategy.order(&mut candidates);
        let mut remaining = candidates.into_iter();

        loop {
            match self.coverage(&selected, &requirement)? {
                Coverage::Covered(remainder) => {
                    log::debug!(
                        "Selected {} inputs, remainder {:?}",
                        selected.len(),
                        remainder.as_ref().map(|r| r.amount)
                    );
                    return Ok(finish(selected, returns, remainder));
                }
                coverage => match remaining.next() {
                    Some(next) => selected.push(next),
                    None => {
                        return Err(match coverage {
                            Coverage::Dust { amount, minimum } => {
                                WalletError::DustThresholdViolation { amount, minimum }
                            }
                            _ => insufficient(&requirement, &selected),
                        })
                    }
                },
            }
        }
    }

    fn coverage(&self, inputs: &[&OutputData], requirement: &Requirement) -> Result<Coverage, WalletError> {
        let mut amount: u64 = 0;
        let mut tokens = NativeTokens::new();
        for input in inputs {
            amount = amount
                .checked_add(input.output.amount())
                .ok_or_else(|| WalletError::InvalidInput("input amount overflow".to_string()))?;
            tokens.add_all(input.output.native_tokens())?;
        }

        if amount < requirement.amount {
            return Ok(Coverage::Short);
        }
        let remainder_tokens = match tokens.checked_sub(&requirement.tokens) {
            Some(left) => left,
            None => return Ok(Coverage::Short),
        };
        let remainder_amount = amount - requirement.amount;

        if remainder_amount == 0 && remainder_tokens.is_empty() {
            return Ok(Coverage::Covered(None));
        }

        let minimum = self.remainder_min_deposit(&remainder_tokens);
        if remainder_amount < minimum {
            return Ok(Coverage::Dust {
                amount: remainder_amount,
                minimum,
            });
        }

        Ok(Coverage::Covered(Some(Remainder {
            amount: remainder_amount,
            native_tokens: remainder_tokens,
        })))
    }

    /// Inputs this account may spend now, in the order given
    fn resolve<'s>(&self, store: &'s OutputStore, ids: &[OutputId]) -> Result<Vec<&'s OutputData>, WalletError> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let output = store
                .get(id)
                .ok_or_else(|| WalletError::OutputNotFound(id.to_string()))?;
            if output.is_spent {
                return Err(WalletError::InvalidInput(format!("input {} is already spent", id)));
            }
            if !output.is_unlockable_at(self.now) {
                return Err(WalletError::InvalidInput(format!(
                    "input {} cannot be unlocked by this account at {}",
                    id, self.now
                )));
            }
            resolved.push(output);
        }
        Ok(resolved)
    }

    /// One plain output per return address, never below its own minimum deposit
    fn storage_deposit_returns(&self, inputs: &[&OutputData]) -> Result<Vec<Output>, WalletError> {
        let mut owed: BTreeMap<Address, u64> = BTreeMap::new();
        for input in inputs {
            if let Some(sdr) = input.output.storage_deposit_owed_at(self.now) {
                let total = owed.entry(sdr.return_address).or_insert(0);
                *total = total
                    .checked_add(sdr.amount)
                    .ok_or_else(|| WalletError::InvalidInput("storage deposit return overflow".to_string()))?;
            }
        }

        let minimum = self.remainder_min_deposit(&NativeTokens::new());
        Ok(owed
            .into_iter()
            .map(|(address, amount)| BasicOutput::new(amount.max(minimum), address).into())
            .collect())
    }

    /// Remainders are plain basic outputs; the address does not change their size
    pub fn remainder_min_deposit(&self, native_tokens: &NativeTokens) -> u64 {
        Output::from(BasicOutput::new(0, Address::new([0; 32])).with_native_tokens(native_tokens.clone()))
            .min_storage_deposit(&self.params.rent_structure)
    }
}

impl Requirement {
    fn add_returns(&mut self, returns: &[Output]) -> Result<(), WalletError> {
        for output in returns {
            self.amount = self
                .amount
                .checked_add(output.amount())
                .ok_or_else(|| WalletError::InvalidInput("output amount overflow".to_string()))?;
        }
        Ok(())
    }
}

fn requirement(outputs: &[Output]) -> Result<Requirement, WalletError> {
    let mut requirement = Requirement {
        amount: 0,
        tokens: NativeTokens::new(),
        nfts: Vec::new(),
    };
    for output in outputs {
        requirement.amount = requirement
            .amount
            .checked_add(output.amount())
            .ok_or_else(|| WalletError::InvalidInput("output amount overflow".to_string()))?;
        requirement.tokens.add_all(output.native_tokens())?;
        if let Output::Nft(nft) = output {
            if !nft.nft_id.is_null() {
                requirement.nfts.push(nft.nft_id);
            }
        }
    }
    Ok(requirement)
}

fn insufficient(requirement: &Requirement, inputs: &[&OutputData]) -> WalletError {
    let available: u64 = inputs.iter().map(|o| o.output.amount()).sum();
    WalletError::InsufficientFunds {
        required: requirement.amount.to_string(),
        available: available.to_string(),
    }
}

fn finish(inputs: Vec<&OutputData>, returns: Vec<Output>, remainder: Option<Remainder>) -> Selection {
    Selection {
        inputs: inputs.into_iter().cloned().collect(),
        returns,
        remainder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{RentStructure, TokenId, TransactionId};
    use crate::wallet::address_manager::Chain;

    fn owner() -> Address {
        Address::new([1; 32])
    }

    fn free_params() -> ProtocolParameters {
        let mut params = ProtocolParameters::testnet();
        params.rent_structure = RentStructure {
            v_byte_cost: 0,
            ..RentStructure::default()
        };
        params
    }

    fn add(store: &mut OutputStore, byte: u8, output: Output) -> OutputId {
        let output_id = OutputId::new(TransactionId::new([byte; 32]), 0);
        store.upsert(OutputData {
            output_id,
            address: *output.address(),
            output,
            chain: Chain::new(0, false, 0),
            is_spent: false,
        });
        output_id
    }

    fn basic(amount: u64) -> Output {
        BasicOutput::new(amount, owner()).into()
    }

    fn send(amount: u64) -> Vec<Output> {
        vec![BasicOutput::new(amount, Address::new([9; 32])).into()]
    }

    fn target(outputs: &[Output]) -> SelectionTarget<'_> {
        SelectionTarget {
            outputs,
            custom_inputs: None,
            mandatory_inputs: &[],
        }
    }

    #[test]
    fn test_largest_first_with_remainder() {
        let params = free_params();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(100));
        add(&mut store, 2, basic(50));
        add(&mut store, 3, basic(10));

        let outputs = send(120);
        let selection = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap();

        let amounts: Vec<u64> = selection.inputs.iter().map(|o| o.output.amount()).collect();
        assert_eq!(amounts, vec![100, 50]);
        assert_eq!(selection.remainder.unwrap().amount, 30);
    }

    #[test]
    fn test_smallest_first_consolidates() {
        let params = free_params();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(100));
        add(&mut store, 2, basic(5));
        add(&mut store, 3, basic(10));

        let outputs = send(12);
        let selection = OutputSelector::new(&params, &SmallestFirst)
            .select(&store, &target(&outputs))
            .unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.remainder.unwrap().amount, 3);
    }

    #[test]
    fn test_insufficient_funds_reports_amounts() {
        let params = free_params();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(400));
        add(&mut store, 2, basic(200));

        let outputs = send(1000);
        let err = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap_err();
        match err {
            WalletError::InsufficientFunds { required, available } => {
                assert_eq!(required, "1000");
                assert_eq!(available, "600");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_dust_remainder_widens_selection() {
        let params = ProtocolParameters::testnet();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(100_000));
        add(&mut store, 2, basic(50_000));

        let outputs = send(80_000);
        let selection = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.remainder.unwrap().amount, 70_000);
    }

    #[test]
    fn test_dust_remainder_without_alternatives_fails() {
        let params = ProtocolParameters::testnet();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(100_000));

        let outputs = send(80_000);
        let err = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::DustThresholdViolation {
                amount: 20_000,
                minimum: 42_600
            }
        ));
    }

    #[test]
    fn test_custom_inputs_are_used_exactly() {
        let params = free_params();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(1_000));
        let small = add(&mut store, 2, basic(50));

        let outputs = send(120);
        let custom = [small];
        let err = OutputSelector::new(&params, &LargestFirst)
            .select(
                &store,
                &SelectionTarget {
                    outputs: &outputs,
                    custom_inputs: Some(&custom),
                    mandatory_inputs: &[],
                },
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_token_holders_are_selected_first() {
        let params = ProtocolParameters::testnet();
        let token = TokenId::new([7; 32]);
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(5_000_000));
        let holder = add(
            &mut store,
            2,
            BasicOutput::new(100_000, owner())
                .with_native_tokens([(token, 50)].into_iter().collect())
                .into(),
        );

        let outputs = vec![Output::from(
            BasicOutput::new(60_000, Address::new([9; 32]))
                .with_native_tokens([(token, 20)].into_iter().collect()),
        )];
        let selection = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap();

        assert_eq!(selection.inputs[0].output_id, holder);
        let remainder = selection.remainder.unwrap();
        assert_eq!(remainder.native_tokens.get(&token), 30);
        // 40_000 left over cannot hold a token remainder, so the big output joins
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(remainder.amount, 5_040_000);
    }

    fn micro(recipient: Address, sender: Address) -> Output {
        BasicOutput::new(50_000, recipient)
            .with_storage_deposit_return(sender, 49_000)
            .with_expiration(sender, 1_000)
            .into()
    }

    #[test]
    fn test_deposit_owing_output_needs_its_return() {
        let params = free_params();
        let sender = Address::new([2; 32]);
        let mut store = OutputStore::new();
        let claim = add(&mut store, 1, micro(owner(), sender));
        add(&mut store, 2, basic(100_000));

        let outputs = send(20_000);
        let selection = OutputSelector::new(&params, &LargestFirst)
            .at(500)
            .select(&store, &target(&outputs))
            .unwrap();
        assert_eq!(selection.inputs.len(), 1);
        assert_ne!(selection.inputs[0].output_id, claim);
        assert!(selection.returns.is_empty());

        let mandatory = [claim];
        let selection = OutputSelector::new(&params, &LargestFirst)
            .at(500)
            .select(
                &store,
                &SelectionTarget {
                    outputs: &outputs,
                    custom_inputs: None,
                    mandatory_inputs: &mandatory,
                },
            )
            .unwrap();
        assert_eq!(selection.inputs.len(), 2);
        assert_eq!(selection.returns.len(), 1);
        assert_eq!(*selection.returns[0].address(), sender);
        assert_eq!(selection.returns[0].amount(), 49_000);
        // 150_000 in, 20_000 sent and 49_000 returned
        assert_eq!(selection.remainder.unwrap().amount, 81_000);
    }

    #[test]
    fn test_expired_output_belongs_to_the_return_address() {
        let params = free_params();
        let sender = Address::new([2; 32]);

        // Recipient side: no longer spendable once expired
        let mut store = OutputStore::new();
        let claim = add(&mut store, 1, micro(owner(), sender));
        let outputs = send(10_000);
        let mandatory = [claim];
        let err = OutputSelector::new(&params, &LargestFirst)
            .at(1_000)
            .select(
                &store,
                &SelectionTarget {
                    outputs: &outputs,
                    custom_inputs: None,
                    mandatory_inputs: &mandatory,
                },
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidInput(_)));

        // Sender side: an ordinary candidate with nothing to return
        let mut store = OutputStore::new();
        let output_id = OutputId::new(TransactionId::new([1; 32]), 0);
        store.upsert(OutputData {
            output_id,
            output: micro(owner(), sender),
            address: sender,
            chain: Chain::new(0, false, 0),
            is_spent: false,
        });
        let selection = OutputSelector::new(&params, &LargestFirst)
            .at(1_000)
            .select(&store, &target(&outputs))
            .unwrap();
        assert_eq!(selection.inputs[0].output_id, output_id);
        assert!(selection.returns.is_empty());
        assert_eq!(selection.remainder.unwrap().amount, 40_000);

        let err = OutputSelector::new(&params, &LargestFirst)
            .at(999)
            .select(&store, &target(&outputs))
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_missing_token_is_insufficient() {
        let params = ProtocolParameters::testnet();
        let mut store = OutputStore::new();
        add(&mut store, 1, basic(5_000_000));

        let outputs = vec![Output::from(
            BasicOutput::new(60_000, Address::new([9; 32]))
                .with_native_tokens([(TokenId::new([7; 32]), 1)].into_iter().collect()),
        )];
        let err = OutputSelector::new(&params, &LargestFirst)
            .select(&store, &target(&outputs))
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }
}
