use serde::{Deserialize, Serialize};

use super::ids::{blake2b_256, OutputId};

/// Byte-cost model for the minimum storage deposit an output must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentStructure {
    pub v_byte_cost: u32,
    pub v_byte_factor_key: u8,
    pub v_byte_factor_data: u8,
}

impl RentStructure {
    /// Metadata the node keeps per output: block id, milestone index and timestamp
    const OUTPUT_METADATA_BYTES: u64 = 32 + 4 + 4;

    /// Minimum deposit for an output whose packed form is `packed_len` bytes
    pub fn min_deposit(&self, packed_len: usize) -> u64 {
        let key = self.v_byte_factor_key as u64 * OutputId::LENGTH as u64;
        let data = self.v_byte_factor_data as u64 * (Self::OUTPUT_METADATA_BYTES + packed_len as u64);
        self.v_byte_cost as u64 * (key + data)
    }
}

impl Default for RentStructure {
    fn default() -> Self {
        Self {
            v_byte_cost: 100,
            v_byte_factor_key: 10,
            v_byte_factor_data: 1,
        }
    }
}

/// Network-defined limits the builder and the node both enforce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub network_name: String,
    pub bech32_hrp: String,
    pub rent_structure: RentStructure,
    pub token_supply: u64,
    pub max_inputs: usize,
    pub max_outputs: usize,
    pub max_native_tokens: usize,
    pub max_essence_bytes: usize,
}

impl ProtocolParameters {
    pub fn testnet() -> Self {
        Self {
            network_name: "testnet".to_string(),
            bech32_hrp: "rms".to_string(),
            rent_structure: RentStructure::default(),
            token_supply: 1_813_620_509_061_365,
            max_inputs: 128,
            max_outputs: 128,
            max_native_tokens: 64,
            max_essence_bytes: 32_000,
        }
    }

    pub fn mainnet() -> Self {
        Self {
            network_name: "mainnet".to_string(),
            bech32_hrp: "smr".to_string(),
            ..Self::testnet()
        }
    }

    /// First 8 bytes (little-endian) of the Blake2b-256 hash of the network name
    pub fn network_id(&self) -> u64 {
        let hash = blake2b_256(self.network_name.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self::testnet()
    }
}
