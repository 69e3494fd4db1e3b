use bitcoin::bech32::{self, Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::ids::{blake2b_256, decode_prefixed_hex};
use super::pack::{pack_u8, Pack};
use crate::error::WalletError;

/// Kind byte of a key-hash address in the wire format and in bech32 data
pub const KEY_HASH_ADDRESS_KIND: u8 = 0;

/// Key-hash address: Blake2b-256 of a 33-byte compressed secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn from_public_key(public_key: &[u8; 33]) -> Self {
        Self(blake2b_256(public_key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as bech32 with the given human-readable part
    pub fn to_bech32(&self, hrp: &str) -> Result<String, WalletError> {
        let hrp = Hrp::parse(hrp).map_err(|e| WalletError::InvalidAddress(e.to_string()))?;
        let mut data = Vec::with_capacity(33);
        data.push(KEY_HASH_ADDRESS_KIND);
        data.extend_from_slice(&self.0);
        bech32::encode::<Bech32>(hrp, &data).map_err(|e| WalletError::InvalidAddress(e.to_string()))
    }

    /// Decode a bech32 address, returning it with its human-readable part
    pub fn try_from_bech32(s: &str) -> Result<(Self, String), WalletError> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| WalletError::InvalidAddress(format!("{}: {}", s, e)))?;

        if data.len() != 33 || data[0] != KEY_HASH_ADDRESS_KIND {
            return Err(WalletError::InvalidAddress(format!(
                "{}: unsupported address kind or length",
                s
            )));
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&data[1..]);
        Ok((Self(hash), hrp.to_string().to_lowercase()))
    }

    /// Decode a bech32 address and require the expected human-readable part
    pub fn try_from_bech32_with_hrp(s: &str, expected_hrp: &str) -> Result<Self, WalletError> {
        let (address, hrp) = Self::try_from_bech32(s)?;
        if hrp != expected_hrp.to_lowercase() {
            return Err(WalletError::InvalidAddress(format!(
                "{}: expected network prefix '{}', got '{}'",
                s, expected_hrp, hrp
            )));
        }
        Ok(address)
    }
}

impl Pack for Address {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8(buf, KEY_HASH_ADDRESS_KIND);
        buf.extend_from_slice(&self.0);
    }
}

impl FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed_hex::<32>(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bech32_round_trip_keeps_hrp() {
        let address = Address::new([7u8; 32]);
        let bech32 = address.to_bech32("rms").unwrap();
        assert!(bech32.starts_with("rms1"));

        let (decoded, hrp) = Address::try_from_bech32(&bech32).unwrap();
        assert_eq!(decoded, address);
        assert_eq!(hrp, "rms");
    }

    #[test]
    fn test_wrong_network_prefix_is_rejected() {
        let bech32 = Address::new([1u8; 32]).to_bech32("smr").unwrap();
        let err = Address::try_from_bech32_with_hrp(&bech32, "rms").unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[test]
    fn test_corrupted_checksum_is_rejected() {
        let mut bech32 = Address::new([9u8; 32]).to_bech32("rms").unwrap();
        let last = bech32.pop().unwrap();
        bech32.push(if last == 'q' { 'p' } else { 'q' });
        assert!(Address::try_from_bech32(&bech32).is_err());
    }
}
