use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::Network;
use std::collections::HashMap;

use super::account::AccountData;
use super::address_manager::{Chain, PURPOSE};
use super::transfer_ops::{PreparedTransactionData, SignedTransactionData};
use crate::error::WalletError;
use crate::ledger::{unix_time_now, Address, SignatureUnlock, TransactionPayload, Unlock};

/// Source of key material for a wallet
///
/// Private keys stay behind this boundary; callers only see extended public
/// keys and finished signatures.
pub trait KeyProvider: Send + Sync {
    /// Extended public key at `m/44'/coin'/account'`
    fn account_xpub(&self, account_index: u32) -> Result<Xpub, WalletError>;

    /// Sign a 32-byte digest with the key at `chain`
    fn sign(&self, chain: &Chain, digest: &[u8; 32]) -> Result<SignatureUnlock, WalletError>;
}

/// Key provider backed by a BIP39 mnemonic
///
/// Derives keys along `m/44'/coin'/account'/{0|1}/index` and signs ECDSA over secp256k1.
pub struct MnemonicKeyProvider {
    master: Xpriv,
    coin_type: u32,
}

impl MnemonicKeyProvider {
    pub fn new(mnemonic: &Mnemonic, coin_type: u32, network: Network) -> Result<Self, WalletError> {
        let seed = mnemonic.to_seed("");
        let master = Xpriv::new_master(network, &seed)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        Ok(Self { master, coin_type })
    }

    pub fn from_phrase(words: &str, coin_type: u32, network: Network) -> Result<Self, WalletError> {
        let mnemonic = crate::storage::KeyManager::from_phrase(words)?;
        Self::new(&mnemonic, coin_type, network)
    }

    fn account_key(&self, account_index: u32) -> Result<Xpriv, WalletError> {
        let secp = Secp256k1::signing_only();
        let path = [
            ChildNumber::from_hardened_idx(PURPOSE),
            ChildNumber::from_hardened_idx(self.coin_type),
            ChildNumber::from_hardened_idx(account_index),
        ]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| WalletError::InvalidDerivationPath(e.to_string()))?;

        self.master
            .derive_priv(&secp, &path)
            .map_err(|e| WalletError::InvalidDerivationPath(e.to_string()))
    }
}

impl KeyProvider for MnemonicKeyProvider {
    fn account_xpub(&self, account_index: u32) -> Result<Xpub, WalletError> {
        let secp = Secp256k1::signing_only();
        Ok(Xpub::from_priv(&secp, &self.account_key(account_index)?))
    }

    fn sign(&self, chain: &Chain, digest: &[u8; 32]) -> Result<SignatureUnlock, WalletError> {
        let secp = Secp256k1::new();
        let key = self
            .account_key(chain.account)?
            .derive_priv(&secp, &chain.child_numbers()?)
            .map_err(|e| WalletError::InvalidDerivationPath(e.to_string()))?;

        let secret_key = key.private_key;
        let message = Message::from_digest(*digest);
        let signature = secp.sign_ecdsa(&message, &secret_key);

        Ok(SignatureUnlock {
            public_key: secret_key.public_key(&secp).serialize().to_vec(),
            signature: signature.serialize_compact().to_vec(),
        })
    }
}

/// Produce one unlock per input, in essence order
///
/// Owners are resolved through the account's outputs and addresses, never
/// through the caller-supplied signing data alone. An expired output is
/// owned by its expiration return address. The first input of each
/// owner gets a signature; later inputs of the same owner reference it.
pub fn sign_transaction_essence(
    keys: &dyn KeyProvider,
    account: &AccountData,
    prepared: &PreparedTransactionData,
) -> Result<SignedTransactionData, WalletError> {
    let digest = prepared.essence.signing_hash();
    let now = unix_time_now();
    let mut unlocks = Vec::with_capacity(prepared.essence.inputs.len());
    let mut signed: HashMap<Address, u16> = HashMap::new();

    for (position, input) in prepared.essence.inputs.iter().enumerate() {
        let owner = account
            .outputs
            .get(input)
            .map(|output| &output.output)
            .or_else(|| {
                prepared
                    .inputs_data
                    .iter()
                    .find(|data| data.output_data.output_id == *input)
                    .map(|data| &data.output_data.output)
            })
            .map(|output| output.owner_at(now))
            .ok_or_else(|| WalletError::UnknownOutputOwner(input.to_string()))?;

        if let Some(index) = signed.get(&owner) {
            unlocks.push(Unlock::Reference { index: *index });
            continue;
        }

        let address = account
            .find_address(&owner)
            .ok_or_else(|| WalletError::UnknownOutputOwner(format!("{} (owner {})", input, owner)))?;
        let chain = Chain::new(account.index, address.internal, address.key_index);

        let unlock = keys.sign(&chain, &digest)?;
        if unlock.signer_address()? != owner {
            return Err(WalletError::UnknownOutputOwner(format!(
                "key at {} does not control {}",
                address.path, owner
            )));
        }

        signed.insert(owner, position as u16);
        unlocks.push(Unlock::Signature(unlock));
    }

    log::debug!(
        "Signed essence with {} inputs using {} signatures",
        unlocks.len(),
        signed.len()
    );

    Ok(SignedTransactionData {
        payload: TransactionPayload {
            essence: prepared.essence.clone(),
            unlocks,
        },
        inputs_data: prepared.inputs_data.clone(),
    })
}
