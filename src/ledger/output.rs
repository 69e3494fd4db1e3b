//! Outputs: the spendable units of the ledger
//!
//! Two kinds exist. Basic outputs carry base coins and native tokens; NFT
//! outputs additionally carry a unique [`NftId`] that moves with the output
//! from transaction to transaction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::address::Address;
use super::ids::{NftId, OutputId, TokenId};
use super::pack::{pack_bytes_u16, pack_u32, pack_u64, pack_u8, Pack};
use super::params::{ProtocolParameters, RentStructure};
use crate::error::WalletError;

pub const BASIC_OUTPUT_KIND: u8 = 3;
pub const NFT_OUTPUT_KIND: u8 = 6;

const ADDRESS_UNLOCK_CONDITION_KIND: u8 = 0;
const STORAGE_DEPOSIT_RETURN_UNLOCK_CONDITION_KIND: u8 = 1;
const EXPIRATION_UNLOCK_CONDITION_KIND: u8 = 3;
const METADATA_FEATURE_KIND: u8 = 2;

pub const MAX_METADATA_LENGTH: usize = 8192;

/// Native token balances keyed by token id; zero entries are never stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeTokens(BTreeMap<TokenId, u64>);

impl NativeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, token_id: &TokenId) -> u64 {
        self.0.get(token_id).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &u64)> {
        self.0.iter()
    }

    pub fn add(&mut self, token_id: TokenId, amount: u64) -> Result<(), WalletError> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.0.entry(token_id).or_insert(0);
        *entry = entry.checked_add(amount).ok_or_else(|| {
            WalletError::InvalidInput(format!("native token amount overflow for {}", token_id))
        })?;
        Ok(())
    }

    pub fn add_all(&mut self, other: &NativeTokens) -> Result<(), WalletError> {
        for (token_id, amount) in other.iter() {
            self.add(*token_id, *amount)?;
        }
        Ok(())
    }

    /// `self - other`, or `None` if `other` holds more of any token
    pub fn checked_sub(&self, other: &NativeTokens) -> Option<NativeTokens> {
        let mut result = self.clone();
        for (token_id, amount) in other.iter() {
            let have = result.get(token_id);
            let left = have.checked_sub(*amount)?;
            if left == 0 {
                result.0.remove(token_id);
            } else {
                result.0.insert(*token_id, left);
            }
        }
        Some(result)
    }

    /// True when every token in `other` is held in at least the same quantity
    pub fn covers(&self, other: &NativeTokens) -> bool {
        other.iter().all(|(id, amount)| self.get(id) >= *amount)
    }
}

impl FromIterator<(TokenId, u64)> for NativeTokens {
    fn from_iter<I: IntoIterator<Item = (TokenId, u64)>>(iter: I) -> Self {
        let mut tokens = NativeTokens::new();
        for (token_id, amount) in iter {
            // Saturating: only used for literal construction
            let current = tokens.get(&token_id);
            if amount > 0 {
                tokens.0.insert(token_id, current.saturating_add(amount));
            }
        }
        tokens
    }
}

impl Pack for NativeTokens {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8(buf, self.0.len() as u8);
        for (token_id, amount) in &self.0 {
            token_id.pack(buf);
            pack_u64(buf, *amount);
        }
    }
}

/// Seconds since the Unix epoch, the clock expiration conditions use
pub fn unix_time_now() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Returns part of an output's deposit to the sender when it is claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDepositReturn {
    pub return_address: Address,
    pub amount: u64,
}

/// After `unix_time` the output becomes spendable by `return_address` instead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiration {
    pub return_address: Address,
    pub unix_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditions {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_deposit_return: Option<StorageDepositReturn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
}

impl UnlockConditions {
    pub fn address(address: Address) -> Self {
        Self {
            address,
            storage_deposit_return: None,
            expiration: None,
        }
    }
}

impl Pack for UnlockConditions {
    fn pack(&self, buf: &mut Vec<u8>) {
        let count = 1
            + self.storage_deposit_return.is_some() as u8
            + self.expiration.is_some() as u8;
        pack_u8(buf, count);

        pack_u8(buf, ADDRESS_UNLOCK_CONDITION_KIND);
        self.address.pack(buf);

        if let Some(sdr) = &self.storage_deposit_return {
            pack_u8(buf, STORAGE_DEPOSIT_RETURN_UNLOCK_CONDITION_KIND);
            sdr.return_address.pack(buf);
            pack_u64(buf, sdr.amount);
        }

        if let Some(expiration) = &self.expiration {
            pack_u8(buf, EXPIRATION_UNLOCK_CONDITION_KIND);
            expiration.return_address.pack(buf);
            pack_u32(buf, expiration.unix_time);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicOutput {
    pub amount: u64,
    #[serde(default, skip_serializing_if = "NativeTokens::is_empty")]
    pub native_tokens: NativeTokens,
    pub unlock_conditions: UnlockConditions,
}

impl BasicOutput {
    pub fn new(amount: u64, address: Address) -> Self {
        Self {
            amount,
            native_tokens: NativeTokens::new(),
            unlock_conditions: UnlockConditions::address(address),
        }
    }

    pub fn with_native_tokens(mut self, native_tokens: NativeTokens) -> Self {
        self.native_tokens = native_tokens;
        self
    }

    pub fn with_storage_deposit_return(mut self, return_address: Address, amount: u64) -> Self {
        self.unlock_conditions.storage_deposit_return = Some(StorageDepositReturn {
            return_address,
            amount,
        });
        self
    }

    pub fn with_expiration(mut self, return_address: Address, unix_time: u32) -> Self {
        self.unlock_conditions.expiration = Some(Expiration {
            return_address,
            unix_time,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftOutput {
    pub amount: u64,
    #[serde(default, skip_serializing_if = "NativeTokens::is_empty")]
    pub native_tokens: NativeTokens,
    /// Null when the output mints a new NFT
    pub nft_id: NftId,
    pub unlock_conditions: UnlockConditions,
    /// Immutable metadata, fixed at mint time
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "super::serde_hex::option"
    )]
    pub metadata: Option<Vec<u8>>,
}

impl NftOutput {
    /// A new NFT; its id is assigned from the output id once it lands on the ledger
    pub fn mint(amount: u64, address: Address, metadata: Option<Vec<u8>>) -> Self {
        Self {
            amount,
            native_tokens: NativeTokens::new(),
            nft_id: NftId::null(),
            unlock_conditions: UnlockConditions::address(address),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    Basic(BasicOutput),
    Nft(NftOutput),
}

impl Output {
    pub fn amount(&self) -> u64 {
        match self {
            Output::Basic(o) => o.amount,
            Output::Nft(o) => o.amount,
        }
    }

    pub fn set_amount(&mut self, amount: u64) {
        match self {
            Output::Basic(o) => o.amount = amount,
            Output::Nft(o) => o.amount = amount,
        }
    }

    pub fn native_tokens(&self) -> &NativeTokens {
        match self {
            Output::Basic(o) => &o.native_tokens,
            Output::Nft(o) => &o.native_tokens,
        }
    }

    pub fn unlock_conditions(&self) -> &UnlockConditions {
        match self {
            Output::Basic(o) => &o.unlock_conditions,
            Output::Nft(o) => &o.unlock_conditions,
        }
    }

    /// The address that can unlock this output
    pub fn address(&self) -> &Address {
        &self.unlock_conditions().address
    }

    pub fn kind(&self) -> u8 {
        match self {
            Output::Basic(_) => BASIC_OUTPUT_KIND,
            Output::Nft(_) => NFT_OUTPUT_KIND,
        }
    }

    /// The NFT id carried by this output, resolving a null id against its own output id
    pub fn nft_id(&self, output_id: &OutputId) -> Option<NftId> {
        match self {
            Output::Nft(o) if o.nft_id.is_null() => Some(NftId::from_output_id(output_id)),
            Output::Nft(o) => Some(o.nft_id),
            Output::Basic(_) => None,
        }
    }

    pub fn is_expired_at(&self, unix_time: u32) -> bool {
        self.unlock_conditions()
            .expiration
            .map_or(false, |expiration| unix_time >= expiration.unix_time)
    }

    /// The address allowed to unlock this output at `unix_time`
    pub fn owner_at(&self, unix_time: u32) -> Address {
        let conditions = self.unlock_conditions();
        match conditions.expiration {
            Some(expiration) if unix_time >= expiration.unix_time => expiration.return_address,
            _ => conditions.address,
        }
    }

    /// Deposit that must go back when the output is spent at `unix_time`
    ///
    /// Nothing is owed once the output has expired to its return address.
    pub fn storage_deposit_owed_at(&self, unix_time: u32) -> Option<StorageDepositReturn> {
        if self.is_expired_at(unix_time) {
            None
        } else {
            self.unlock_conditions().storage_deposit_return
        }
    }

    /// True when only the address unlock condition is present
    pub fn has_only_address_condition(&self) -> bool {
        let conditions = self.unlock_conditions();
        conditions.storage_deposit_return.is_none() && conditions.expiration.is_none()
    }

    pub fn min_storage_deposit(&self, rent: &RentStructure) -> u64 {
        rent.min_deposit(self.packed_len())
    }

    /// Syntactic and storage deposit checks against the network parameters
    pub fn verify(&self, params: &ProtocolParameters) -> Result<(), WalletError> {
        if self.native_tokens().len() > params.max_native_tokens {
            return Err(WalletError::InvalidInput(format!(
                "output holds {} native tokens, maximum is {}",
                self.native_tokens().len(),
                params.max_native_tokens
            )));
        }

        if self.amount() > params.token_supply {
            return Err(WalletError::InvalidInput(format!(
                "output amount {} exceeds token supply",
                self.amount()
            )));
        }

        let minimum = self.min_storage_deposit(&params.rent_structure);
        if self.amount() < minimum {
            return Err(WalletError::DustThresholdViolation {
                amount: self.amount(),
                minimum,
            });
        }

        if let Some(sdr) = &self.unlock_conditions().storage_deposit_return {
            if sdr.amount == 0 || sdr.amount > self.amount() {
                return Err(WalletError::InvalidInput(format!(
                    "storage deposit return of {} invalid for output amount {}",
                    sdr.amount,
                    self.amount()
                )));
            }
        }

        if let Output::Nft(nft) = self {
            if nft.metadata.as_ref().map_or(0, |m| m.len()) > MAX_METADATA_LENGTH {
                return Err(WalletError::InvalidInput(format!(
                    "NFT metadata exceeds {} bytes",
                    MAX_METADATA_LENGTH
                )));
            }
        }

        Ok(())
    }
}

impl From<BasicOutput> for Output {
    fn from(output: BasicOutput) -> Self {
        Output::Basic(output)
    }
}

impl From<NftOutput> for Output {
    fn from(output: NftOutput) -> Self {
        Output::Nft(output)
    }
}

impl Pack for Output {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8(buf, self.kind());
        match self {
            Output::Basic(o) => {
                pack_u64(buf, o.amount);
                o.native_tokens.pack(buf);
                o.unlock_conditions.pack(buf);
                // features
                pack_u8(buf, 0);
            }
            Output::Nft(o) => {
                pack_u64(buf, o.amount);
                o.native_tokens.pack(buf);
                o.nft_id.pack(buf);
                o.unlock_conditions.pack(buf);
                // features
                pack_u8(buf, 0);
                match &o.metadata {
                    Some(metadata) => {
                        pack_u8(buf, 1);
                        pack_u8(buf, METADATA_FEATURE_KIND);
                        pack_bytes_u16(buf, metadata);
                    }
                    None => pack_u8(buf, 0),
                }
            }
        }
    }
}
