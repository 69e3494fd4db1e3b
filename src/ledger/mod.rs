//! Ledger primitives
//!
//! - Identifiers and addresses
//! - Outputs, native tokens and storage deposits
//! - Transaction essences, unlocks and payloads
//! - Binary packing and essence building

pub mod address;
pub mod essence;
pub mod ids;
pub mod output;
pub mod pack;
pub mod params;
pub mod serde_hex;
pub mod transaction;
pub mod unlock;

// Re-export main types
pub use address::Address;
pub use essence::{TaggedData, TransactionEssence};
pub use ids::{blake2b_256, NftId, OutputId, TokenId, TransactionId};
pub use output::{
    unix_time_now, BasicOutput, Expiration, NativeTokens, NftOutput, Output,
    StorageDepositReturn, UnlockConditions,
};
pub use pack::Pack;
pub use params::{ProtocolParameters, RentStructure};
pub use transaction::TransactionBuilder;
pub use unlock::{SignatureUnlock, TransactionPayload, Unlock};
