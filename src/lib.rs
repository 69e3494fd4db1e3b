//! Ledger Wallet: account and transaction engine for UTXO ledgers
//!
//! Accounts derive BIP-44 addresses, track the outputs they own, and build,
//! sign and submit transactions that carry base coin, native tokens and NFTs.
//!
//! # Architecture
//!
//! - **Ledger**: ids, addresses, outputs, essences, unlocks and their binary packing
//! - **Node**: the [`node::NodeClient`] seam with a REST client and an in-memory node
//! - **Wallet**: address derivation, output store, sync, selection, signing
//! - **API**: the typed [`api::AccountMethod`] call surface and its HTTP server
//!
//! # Example
//!
//! ```ignore
//! use ledger_wallet::{MnemonicKeyProvider, MockNode, WalletConfig, WalletManager};
//! use std::sync::Arc;
//!
//! let config = WalletConfig::default();
//! let node = Arc::new(MockNode::new(config.protocol.clone()));
//! let keys = Arc::new(MnemonicKeyProvider::from_phrase(
//!     words,
//!     config.coin_type(),
//!     config.bitcoin_network(),
//! )?);
//!
//! let manager = WalletManager::new(config, node, keys, None)?;
//! let account = manager.create_account(Some("main".into())).await?;
//! account.sync(Default::default()).await?;
//! let balance = account.get_balance().await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod node;
pub mod storage;
pub mod wallet;

pub use config::{Network, NodeConfig, SyncConfig, WalletConfig};
pub use error::{ErrorPayload, StorageError, WalletError};
pub use node::{MockNode, NodeClient, NodeError, RestNodeClient};
pub use wallet::{
    AccountHandle, AccountIdentifier, KeyProvider, MnemonicKeyProvider, WalletManager,
};

pub type Result<T> = std::result::Result<T, WalletError>;
