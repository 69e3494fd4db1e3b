use bitcoin::secp256k1::{ecdsa, Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::address::Address;
use super::essence::TransactionEssence;
use super::ids::{blake2b_256, TransactionId};
use super::pack::{pack_u16, pack_u8, Pack};
use crate::error::WalletError;

pub const SIGNATURE_UNLOCK_KIND: u8 = 0;
pub const REFERENCE_UNLOCK_KIND: u8 = 1;
pub const SECP256K1_ECDSA_SIGNATURE_KIND: u8 = 1;
pub const TRANSACTION_PAYLOAD_KIND: u8 = 6;

pub const PUBLIC_KEY_LENGTH: usize = 33;
pub const SIGNATURE_LENGTH: usize = 64;

/// Compressed public key and compact ECDSA signature over the essence hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureUnlock {
    #[serde(with = "super::serde_hex")]
    pub public_key: Vec<u8>,
    #[serde(with = "super::serde_hex")]
    pub signature: Vec<u8>,
}

impl SignatureUnlock {
    /// The address the public key hashes to
    pub fn signer_address(&self) -> Result<Address, WalletError> {
        let key: [u8; PUBLIC_KEY_LENGTH] = self.public_key.as_slice().try_into().map_err(|_| {
            WalletError::InvalidInput(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                self.public_key.len()
            ))
        })?;
        Ok(Address::from_public_key(&key))
    }

    pub fn verify(&self, digest: &[u8; 32]) -> Result<(), WalletError> {
        let secp = Secp256k1::verification_only();
        let public_key = PublicKey::from_slice(&self.public_key)
            .map_err(|e| WalletError::InvalidInput(format!("invalid public key: {}", e)))?;
        let signature = ecdsa::Signature::from_compact(&self.signature)
            .map_err(|e| WalletError::InvalidInput(format!("invalid signature: {}", e)))?;
        let message = Message::from_digest(*digest);

        secp.verify_ecdsa(&message, &signature, &public_key)
            .map_err(|e| WalletError::InvalidInput(format!("signature verification failed: {}", e)))
    }
}

/// Authorizes consumption of the input at the same position in the essence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Unlock {
    Signature(SignatureUnlock),
    /// Reuses the signature unlock at `index` for an input owned by the same address
    Reference { index: u16 },
}

impl Pack for Unlock {
    fn pack(&self, buf: &mut Vec<u8>) {
        match self {
            Unlock::Signature(sig) => {
                pack_u8(buf, SIGNATURE_UNLOCK_KIND);
                pack_u8(buf, SECP256K1_ECDSA_SIGNATURE_KIND);
                buf.extend_from_slice(&sig.public_key);
                buf.extend_from_slice(&sig.signature);
            }
            Unlock::Reference { index } => {
                pack_u8(buf, REFERENCE_UNLOCK_KIND);
                pack_u16(buf, *index);
            }
        }
    }
}

/// A signed essence: the unit submitted to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub essence: TransactionEssence,
    pub unlocks: Vec<Unlock>,
}

impl TransactionPayload {
    pub fn id(&self) -> TransactionId {
        TransactionId::new(blake2b_256(&self.to_packed_bytes()))
    }

    /// Check unlocks against the owner address of each input, in essence order
    ///
    /// Every owner must be unlocked by exactly one signature unlock; later
    /// inputs with the same owner must reference it.
    pub fn verify_unlocks(&self, owners: &[Address]) -> Result<(), WalletError> {
        if owners.len() != self.essence.inputs.len() || self.unlocks.len() != owners.len() {
            return Err(WalletError::InvalidInput(format!(
                "{} inputs, {} owners, {} unlocks",
                self.essence.inputs.len(),
                owners.len(),
                self.unlocks.len()
            )));
        }

        let digest = self.essence.signing_hash();
        let mut signed: HashMap<Address, usize> = HashMap::new();

        for (position, (unlock, owner)) in self.unlocks.iter().zip(owners).enumerate() {
            match unlock {
                Unlock::Signature(sig) => {
                    if signed.contains_key(owner) {
                        return Err(WalletError::InvalidInput(format!(
                            "unlock {} re-signs for an address that must be referenced",
                            position
                        )));
                    }
                    if sig.signer_address()? != *owner {
                        return Err(WalletError::InvalidInput(format!(
                            "unlock {} signed by a key that does not own the input",
                            position
                        )));
                    }
                    sig.verify(&digest)?;
                    signed.insert(*owner, position);
                }
                Unlock::Reference { index } => {
                    let referenced = *index as usize;
                    if referenced >= position
                        || !matches!(self.unlocks[referenced], Unlock::Signature(_))
                        || signed.get(owner) != Some(&referenced)
                    {
                        return Err(WalletError::InvalidInput(format!(
                            "unlock {} has an invalid reference to {}",
                            position, index
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Pack for TransactionPayload {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8(buf, TRANSACTION_PAYLOAD_KIND);
        self.essence.pack(buf);
        pack_u16(buf, self.unlocks.len() as u16);
        for unlock in &self.unlocks {
            unlock.pack(buf);
        }
    }
}
