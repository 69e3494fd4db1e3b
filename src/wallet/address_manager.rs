use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::Secp256k1;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::ledger::Address;

/// BIP44 purpose level
pub const PURPOSE: u32 = 44;

/// Position of a key below the account level of the derivation tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Chain {
    pub account: u32,
    pub internal: bool,
    pub key_index: u32,
}

impl Chain {
    pub fn new(account: u32, internal: bool, key_index: u32) -> Self {
        Self {
            account,
            internal,
            key_index,
        }
    }

    /// `m/44'/coin'/account'/{0|1}/index`
    pub fn path(&self, coin_type: u32) -> String {
        format!(
            "m/{}'/{}'/{}'/{}/{}",
            PURPOSE, coin_type, self.account, self.internal as u8, self.key_index
        )
    }

    /// Child numbers below the account key
    pub fn child_numbers(&self) -> Result<[ChildNumber; 2], WalletError> {
        Ok([
            ChildNumber::from_normal_idx(self.internal as u32).map_err(path_error)?,
            ChildNumber::from_normal_idx(self.key_index).map_err(|_| {
                WalletError::InvalidDerivationPath(format!(
                    "address index {} is out of range",
                    self.key_index
                ))
            })?,
        ])
    }
}

fn path_error(err: bitcoin::bip32::Error) -> WalletError {
    WalletError::InvalidDerivationPath(err.to_string())
}

/// A derived address of an account
///
/// Everything but `used` and `balance` is fixed at derivation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAddress {
    pub address: Address,
    pub bech32: String,
    pub path: String,
    pub key_index: u32,
    pub internal: bool,
    pub used: bool,
    pub balance: u64,
}

/// Derives the addresses of one account from its extended public key
#[derive(Clone, Debug)]
pub struct AddressDeriver {
    account_xpub: Xpub,
    account_index: u32,
    coin_type: u32,
    bech32_hrp: String,
}

impl AddressDeriver {
    pub fn new(
        account_xpub: Xpub,
        account_index: u32,
        coin_type: u32,
        bech32_hrp: &str,
    ) -> Result<Self, WalletError> {
        // Account level is hardened, so its index shares the normal range
        ChildNumber::from_normal_idx(account_index).map_err(|_| {
            WalletError::InvalidDerivationPath(format!("account index {} is out of range", account_index))
        })?;

        Ok(Self {
            account_xpub,
            account_index,
            coin_type,
            bech32_hrp: bech32_hrp.to_string(),
        })
    }

    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    pub fn bech32_hrp(&self) -> &str {
        &self.bech32_hrp
    }

    /// Derive the address at `address_index` on the external or internal chain
    pub fn derive(&self, address_index: u32, internal: bool) -> Result<AccountAddress, WalletError> {
        let chain = Chain::new(self.account_index, internal, address_index);
        let secp = Secp256k1::verification_only();

        let derived = self
            .account_xpub
            .derive_pub(&secp, &chain.child_numbers()?)
            .map_err(path_error)?;

        let address = Address::from_public_key(&derived.public_key.serialize());

        Ok(AccountAddress {
            address,
            bech32: address.to_bech32(&self.bech32_hrp)?,
            path: chain.path(self.coin_type),
            key_index: address_index,
            internal,
            used: false,
            balance: 0,
        })
    }

    /// Derive `count` consecutive addresses starting at `start`
    pub fn derive_range(
        &self,
        start: u32,
        count: u32,
        internal: bool,
    ) -> Result<Vec<AccountAddress>, WalletError> {
        let end = start.checked_add(count).ok_or_else(|| {
            WalletError::InvalidDerivationPath(format!("{} addresses from index {} overflow", count, start))
        })?;
        (start..end).map(|index| self.derive(index, internal)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::signer::{KeyProvider, MnemonicKeyProvider};

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn deriver(account: u32) -> AddressDeriver {
        let keys = MnemonicKeyProvider::from_phrase(MNEMONIC, 1, bitcoin::Network::Testnet).unwrap();
        AddressDeriver::new(keys.account_xpub(account).unwrap(), account, 1, "rms").unwrap()
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = deriver(0).derive(3, false).unwrap();
        let b = deriver(0).derive(3, false).unwrap();
        assert_eq!(a, b);
        assert!(a.bech32.starts_with("rms1"));
        assert_eq!(a.path, "m/44'/1'/0'/0/3");
    }

    #[test]
    fn test_chains_and_accounts_differ() {
        let external = deriver(0).derive(0, false).unwrap();
        let internal = deriver(0).derive(0, true).unwrap();
        let other_account = deriver(1).derive(0, false).unwrap();

        assert_ne!(external.address, internal.address);
        assert_ne!(external.address, other_account.address);
        assert_eq!(internal.path, "m/44'/1'/0'/1/0");
    }

    #[test]
    fn test_out_of_range_index() {
        let err = deriver(0).derive(1 << 31, false).unwrap_err();
        assert!(matches!(err, WalletError::InvalidDerivationPath(_)));

        let keys = MnemonicKeyProvider::from_phrase(MNEMONIC, 1, bitcoin::Network::Testnet).unwrap();
        assert!(matches!(
            keys.account_xpub(1 << 31),
            Err(WalletError::InvalidDerivationPath(_))
        ));
    }

    #[test]
    fn test_range_matches_single_derivation() {
        let d = deriver(0);
        let range = d.derive_range(5, 3, true).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[2], d.derive(7, true).unwrap());
        assert!(d.derive_range(0, 0, false).unwrap().is_empty());
    }
}
