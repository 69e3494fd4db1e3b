use serde::{Deserialize, Serialize};

use super::ids::{blake2b_256, OutputId};
use super::output::Output;
use super::pack::{pack_bytes_u32, pack_u16, pack_u32, pack_u64, pack_u8, Pack};

pub const TRANSACTION_ESSENCE_KIND: u8 = 1;
pub const UTXO_INPUT_KIND: u8 = 0;
pub const TAGGED_DATA_PAYLOAD_KIND: u8 = 5;
pub const MAX_TAG_LENGTH: usize = 64;

/// Arbitrary tagged data embedded in a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedData {
    #[serde(with = "super::serde_hex")]
    pub tag: Vec<u8>,
    #[serde(with = "super::serde_hex")]
    pub data: Vec<u8>,
}

impl Pack for TaggedData {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u32(buf, TAGGED_DATA_PAYLOAD_KIND as u32);
        pack_u8(buf, self.tag.len() as u8);
        buf.extend_from_slice(&self.tag);
        pack_bytes_u32(buf, &self.data);
    }
}

/// The unsigned body of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEssence {
    pub network_id: u64,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<Output>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TaggedData>,
}

impl TransactionEssence {
    /// Digest every input's signature commits to
    pub fn signing_hash(&self) -> [u8; 32] {
        blake2b_256(&self.to_packed_bytes())
    }
}

impl Pack for TransactionEssence {
    fn pack(&self, buf: &mut Vec<u8>) {
        pack_u8(buf, TRANSACTION_ESSENCE_KIND);
        pack_u64(buf, self.network_id);

        pack_u16(buf, self.inputs.len() as u16);
        for input in &self.inputs {
            pack_u8(buf, UTXO_INPUT_KIND);
            input.pack(buf);
        }

        pack_u16(buf, self.outputs.len() as u16);
        for output in &self.outputs {
            output.pack(buf);
        }

        match &self.payload {
            Some(payload) => {
                let bytes = payload.to_packed_bytes();
                pack_bytes_u32(buf, &bytes);
            }
            None => pack_u32(buf, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Address, BasicOutput, TransactionId};

    fn essence(inputs: Vec<OutputId>) -> TransactionEssence {
        TransactionEssence {
            network_id: 7,
            inputs,
            outputs: vec![BasicOutput::new(50_000, Address::new([2; 32])).into()],
            payload: None,
        }
    }

    #[test]
    fn test_signing_hash_depends_on_input_order() {
        let a = OutputId::new(TransactionId::new([1; 32]), 0);
        let b = OutputId::new(TransactionId::new([2; 32]), 0);
        assert_ne!(
            essence(vec![a, b]).signing_hash(),
            essence(vec![b, a]).signing_hash()
        );
        assert_eq!(
            essence(vec![a, b]).signing_hash(),
            essence(vec![a, b]).signing_hash()
        );
    }

    #[test]
    fn test_payload_is_length_prefixed() {
        let mut with_payload = essence(vec![OutputId::new(TransactionId::new([1; 32]), 0)]);
        let without_len = with_payload.packed_len();
        with_payload.payload = Some(TaggedData {
            tag: b"tag".to_vec(),
            data: b"hello".to_vec(),
        });
        // kind (4) + tag length (1) + tag (3) + data length (4) + data (5)
        assert_eq!(with_payload.packed_len(), without_len + 4 + 1 + 3 + 4 + 5);
    }
}
