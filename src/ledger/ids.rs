//! Fixed-size identifiers used by the ledger
//!
//! All ids print as `0x`-prefixed lowercase hex and serialize as strings,
//! so they can be used directly as JSON map keys.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::pack::Pack;
use crate::error::WalletError;

/// Blake2b-256 digest of `data`
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Decode a `0x`-prefixed hex string into exactly `N` bytes
pub(crate) fn decode_prefixed_hex<const N: usize>(s: &str) -> Result<[u8; N], WalletError> {
    let stripped = s
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidInput(format!("missing 0x prefix: {}", s)))?;
    let bytes = hex::decode(stripped)
        .map_err(|e| WalletError::InvalidInput(format!("invalid hex '{}': {}", s, e)))?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
        WalletError::InvalidInput(format!("expected {} bytes, got {}", N, bytes.len()))
    })
}

macro_rules! impl_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const LENGTH: usize = 32;

            pub fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// The all-zero id
            pub fn null() -> Self {
                Self([0u8; 32])
            }

            pub fn is_null(&self) -> bool {
                self.0.iter().all(|&b| b == 0)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = WalletError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_prefixed_hex::<32>(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl Pack for $name {
            fn pack(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0);
            }
        }
    };
}

impl_id!(TransactionId, "Blake2b-256 hash of a packed transaction payload.");
impl_id!(NftId, "Identifier of an NFT, fixed when the NFT output is first created.");
impl_id!(TokenId, "Identifier of a native token.");

impl NftId {
    /// Id taken by an NFT minted (null id) in the output `output_id`
    pub fn from_output_id(output_id: &OutputId) -> Self {
        let mut buf = Vec::with_capacity(OutputId::LENGTH);
        output_id.pack(&mut buf);
        Self(blake2b_256(&buf))
    }
}

/// Reference to an output: the creating transaction and the output's position in it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId {
    transaction_id: TransactionId,
    index: u16,
}

impl OutputId {
    pub const LENGTH: usize = TransactionId::LENGTH + 2;

    pub fn new(transaction_id: TransactionId, index: u16) -> Self {
        Self {
            transaction_id,
            index,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn index(&self) -> u16 {
        self.index
    }
}

impl Pack for OutputId {
    fn pack(&self, buf: &mut Vec<u8>) {
        self.transaction_id.pack(buf);
        buf.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl FromStr for OutputId {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed_hex::<34>(s)?;
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&bytes[..32]);
        let index = u16::from_le_bytes([bytes[32], bytes[33]]);
        Ok(Self::new(TransactionId::new(txid), index))
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.transaction_id,
            hex::encode(self.index.to_le_bytes())
        )
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self)
    }
}

impl Serialize for OutputId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OutputId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_id_text_form() {
        let txid = TransactionId::new([0xab; 32]);
        let id = OutputId::new(txid, 258);
        let text = id.to_string();

        assert_eq!(text.len(), 2 + 68);
        assert!(text.ends_with("0201"));
        assert_eq!(text.parse::<OutputId>().unwrap(), id);
    }

    #[test]
    fn test_output_id_order_is_by_transaction_then_index() {
        let a = OutputId::new(TransactionId::new([1; 32]), 7);
        let b = OutputId::new(TransactionId::new([2; 32]), 0);
        let c = OutputId::new(TransactionId::new([2; 32]), 1);
        let mut ids = vec![c, a, b];
        ids.sort();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn test_id_rejects_wrong_length() {
        assert!("0x1234".parse::<TokenId>().is_err());
        assert!("1234".parse::<NftId>().is_err());
    }

    #[test]
    fn test_ids_as_json_map_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(TokenId::new([3; 32]), 10u64);
        let json = serde_json::to_string(&map).unwrap();
        let back: std::collections::BTreeMap<TokenId, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
