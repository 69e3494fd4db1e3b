use std::collections::HashSet;

use super::essence::{TaggedData, TransactionEssence, MAX_TAG_LENGTH};
use super::ids::{NftId, OutputId};
use super::output::{NativeTokens, Output};
use super::pack::Pack;
use super::params::ProtocolParameters;
use crate::error::WalletError;

pub struct TransactionBuilder {
    params: ProtocolParameters,
}

impl TransactionBuilder {
    /// Create a new transaction builder for the given network parameters
    pub fn new(params: ProtocolParameters) -> Self {
        Self { params }
    }

    /// Build an essence spending `inputs` into `outputs`
    ///
    /// Inputs are put in ascending output id order; outputs keep the order
    /// given (callers append the remainder last).
    pub fn build(
        &self,
        inputs: &[(OutputId, Output)],
        outputs: Vec<Output>,
        payload: Option<TaggedData>,
    ) -> Result<TransactionEssence, WalletError> {
        let mut sorted: Vec<&(OutputId, Output)> = inputs.iter().collect();
        sorted.sort_by_key(|(id, _)| *id);

        let essence = TransactionEssence {
            network_id: self.params.network_id(),
            inputs: sorted.iter().map(|(id, _)| *id).collect(),
            outputs,
            payload,
        };

        let consumed: Vec<Output> = sorted.iter().map(|(_, output)| output.clone()).collect();
        self.validate(&essence, &consumed)?;

        log::debug!(
            "Built essence with {} inputs, {} outputs, {} bytes",
            essence.inputs.len(),
            essence.outputs.len(),
            essence.packed_len()
        );

        Ok(essence)
    }

    /// Check an essence against the outputs it consumes (given in essence input order)
    pub fn validate(
        &self,
        essence: &TransactionEssence,
        consumed: &[Output],
    ) -> Result<(), WalletError> {
        if essence.network_id != self.params.network_id() {
            return Err(WalletError::InvalidInput(format!(
                "essence network id {} does not match {}",
                essence.network_id,
                self.params.network_id()
            )));
        }

        self.validate_limits(essence)?;

        if consumed.len() != essence.inputs.len() {
            return Err(WalletError::Internal(format!(
                "{} inputs but {} consumed outputs",
                essence.inputs.len(),
                consumed.len()
            )));
        }

        let mut seen = HashSet::new();
        for input in &essence.inputs {
            if !seen.insert(*input) {
                return Err(WalletError::UnbalancedEssence(format!(
                    "input {} is spent twice",
                    input
                )));
            }
        }

        for output in &essence.outputs {
            output.verify(&self.params)?;
        }

        self.validate_balance(essence, consumed)?;
        self.validate_nfts(essence, consumed)
    }

    fn validate_limits(&self, essence: &TransactionEssence) -> Result<(), WalletError> {
        let inputs = essence.inputs.len();
        if inputs == 0 || inputs > self.params.max_inputs {
            return Err(WalletError::EssenceTooLarge(format!(
                "{} inputs, allowed 1..={}",
                inputs, self.params.max_inputs
            )));
        }

        let outputs = essence.outputs.len();
        if outputs == 0 || outputs > self.params.max_outputs {
            return Err(WalletError::EssenceTooLarge(format!(
                "{} outputs, allowed 1..={}",
                outputs, self.params.max_outputs
            )));
        }

        if let Some(payload) = &essence.payload {
            if payload.tag.len() > MAX_TAG_LENGTH {
                return Err(WalletError::InvalidInput(format!(
                    "tag of {} bytes exceeds {}",
                    payload.tag.len(),
                    MAX_TAG_LENGTH
                )));
            }
        }

        let size = essence.packed_len();
        if size > self.params.max_essence_bytes {
            return Err(WalletError::EssenceTooLarge(format!(
                "{} bytes, maximum is {}",
                size, self.params.max_essence_bytes
            )));
        }

        Ok(())
    }

    fn validate_balance(
        &self,
        essence: &TransactionEssence,
        consumed: &[Output],
    ) -> Result<(), WalletError> {
        let input_amount: u128 = consumed.iter().map(|o| o.amount() as u128).sum();
        let output_amount: u128 = essence.outputs.iter().map(|o| o.amount() as u128).sum();

        if input_amount != output_amount {
            return Err(WalletError::UnbalancedEssence(format!(
                "inputs hold {} but outputs hold {}",
                input_amount, output_amount
            )));
        }

        if output_amount > self.params.token_supply as u128 {
            return Err(WalletError::UnbalancedEssence(format!(
                "total {} exceeds token supply",
                output_amount
            )));
        }

        let mut input_tokens = NativeTokens::new();
        for output in consumed {
            input_tokens.add_all(output.native_tokens())?;
        }
        let mut output_tokens = NativeTokens::new();
        for output in &essence.outputs {
            output_tokens.add_all(output.native_tokens())?;
        }

        if input_tokens != output_tokens {
            let differing: Vec<String> = input_tokens
                .iter()
                .map(|(id, _)| *id)
                .chain(output_tokens.iter().map(|(id, _)| *id))
                .filter(|id| input_tokens.get(id) != output_tokens.get(id))
                .map(|id| format!("{} ({} in, {} out)", id, input_tokens.get(&id), output_tokens.get(&id)))
                .collect();
            return Err(WalletError::UnbalancedEssence(format!(
                "native tokens do not balance: {}",
                differing.join(", ")
            )));
        }

        Ok(())
    }

    fn validate_nfts(
        &self,
        essence: &TransactionEssence,
        consumed: &[Output],
    ) -> Result<(), WalletError> {
        let input_nfts: HashSet<NftId> = essence
            .inputs
            .iter()
            .zip(consumed)
            .filter_map(|(id, output)| output.nft_id(id))
            .collect();

        let mut output_nfts = HashSet::new();
        for output in &essence.outputs {
            if let Output::Nft(nft) = output {
                if nft.nft_id.is_null() {
                    continue;
                }
                if !input_nfts.contains(&nft.nft_id) {
                    return Err(WalletError::UnbalancedEssence(format!(
                        "output carries NFT {} that is not an input",
                        nft.nft_id
                    )));
                }
                if !output_nfts.insert(nft.nft_id) {
                    return Err(WalletError::UnbalancedEssence(format!(
                        "NFT {} appears in more than one output",
                        nft.nft_id
                    )));
                }
            }
        }

        if let Some(burned) = input_nfts.iter().find(|id| !output_nfts.contains(*id)) {
            return Err(WalletError::UnbalancedEssence(format!(
                "NFT {} is consumed but not carried to an output",
                burned
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Address, BasicOutput, NftOutput, TokenId, TransactionId};

    const AMOUNT: u64 = 1_000_000;

    fn params() -> ProtocolParameters {
        ProtocolParameters::testnet()
    }

    fn input(byte: u8, amount: u64) -> (OutputId, Output) {
        (
            OutputId::new(TransactionId::new([byte; 32]), 0),
            BasicOutput::new(amount, Address::new([1; 32])).into(),
        )
    }

    fn to(amount: u64) -> Output {
        BasicOutput::new(amount, Address::new([2; 32])).into()
    }

    #[test]
    fn test_inputs_are_sorted_by_output_id() {
        let builder = TransactionBuilder::new(params());
        let essence = builder
            .build(&[input(9, AMOUNT), input(3, AMOUNT)], vec![to(2 * AMOUNT)], None)
            .unwrap();
        assert!(essence.inputs[0] < essence.inputs[1]);
        assert_eq!(essence.inputs[0].transaction_id(), &TransactionId::new([3; 32]));
    }

    #[test]
    fn test_unbalanced_amount_is_rejected() {
        let builder = TransactionBuilder::new(params());
        let err = builder
            .build(&[input(1, AMOUNT)], vec![to(AMOUNT - 1)], None)
            .unwrap_err();
        assert!(matches!(err, WalletError::UnbalancedEssence(_)));
    }

    #[test]
    fn test_native_tokens_must_balance() {
        let token = TokenId::new([4; 32]);
        let (id, _) = input(1, AMOUNT);
        let with_tokens: Output = BasicOutput::new(AMOUNT, Address::new([1; 32]))
            .with_native_tokens([(token, 10)].into_iter().collect())
            .into();

        let builder = TransactionBuilder::new(params());
        let err = builder
            .build(&[(id, with_tokens)], vec![to(AMOUNT)], None)
            .unwrap_err();
        assert!(matches!(err, WalletError::UnbalancedEssence(_)));
    }

    #[test]
    fn test_too_many_outputs() {
        let mut p = params();
        p.max_outputs = 2;
        let builder = TransactionBuilder::new(p);
        let err = builder
            .build(&[input(1, 3 * AMOUNT)], vec![to(AMOUNT), to(AMOUNT), to(AMOUNT)], None)
            .unwrap_err();
        assert!(matches!(err, WalletError::EssenceTooLarge(_)));
    }

    #[test]
    fn test_essence_byte_limit() {
        let mut p = params();
        p.max_essence_bytes = 50;
        let builder = TransactionBuilder::new(p);
        let err = builder
            .build(&[input(1, AMOUNT)], vec![to(AMOUNT)], None)
            .unwrap_err();
        assert!(matches!(err, WalletError::EssenceTooLarge(_)));
    }

    #[test]
    fn test_nft_must_be_carried_over() {
        let nft_id = NftId::new([8; 32]);
        let id = OutputId::new(TransactionId::new([1; 32]), 0);
        let mut nft = NftOutput::mint(AMOUNT, Address::new([1; 32]), None);
        nft.nft_id = nft_id;

        let builder = TransactionBuilder::new(params());
        let burn = builder.build(&[(id, nft.clone().into())], vec![to(AMOUNT)], None);
        assert!(matches!(burn, Err(WalletError::UnbalancedEssence(_))));

        let mut moved = nft.clone();
        moved.unlock_conditions.address = Address::new([2; 32]);
        assert!(builder.build(&[(id, nft.into())], vec![moved.into()], None).is_ok());
    }
}
