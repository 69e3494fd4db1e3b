/// Accounts and their operations
///
/// - `address_manager`: key derivation and address generation
/// - `output_store`: the local set of owned outputs
/// - `selection`: input selection and remainder computation
/// - `signer`: key providers and unlock production
/// - `sync_ops` / `transfer_ops`: node-facing account operations
/// - `collect_ops`: claiming outputs with extra unlock conditions
/// - `manager`: account creation, lookup and persistence

pub mod account;
pub mod address_manager;
pub mod collect_ops;
pub mod events;
pub mod manager;
pub mod output_store;
pub mod selection;
pub mod signer;
pub mod sync_ops;
pub mod transfer_ops;

pub use account::{
    AccountData, AccountHandle, AddressWithUnspentOutputs, GenerateAddressOptions, Transaction,
    TransactionStatus,
};
pub use address_manager::{AccountAddress, AddressDeriver, Chain};
pub use collect_ops::OutputsToCollect;
pub use events::{Event, EventEmitter, TransactionProgress, WalletEvent};
pub use manager::{AccountIdentifier, WalletContext, WalletManager};
pub use output_store::{Balance, OutputData, OutputStore};
pub use selection::{OutputSelector, SelectionStrategy, StrategyKind};
pub use signer::{KeyProvider, MnemonicKeyProvider};
pub use sync_ops::{SyncOptions, SyncReport};
pub use transfer_ops::{
    AddressNativeTokens, AddressNftId, AddressWithAmount, AddressWithMicroAmount, InputSigningData,
    NftOptions, PreparedTransactionData, RemainderData, RemainderStrategy, SignedTransactionData,
    TransactionOptions,
};
