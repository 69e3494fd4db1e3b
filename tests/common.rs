/// Common test utilities for wallet integration tests
///
/// Provides a wallet manager backed by an in-memory node and a temporary
/// storage directory, plus small helpers for funding and addressing.
use std::sync::Arc;
use tempfile::TempDir;

use ledger_wallet::ledger::{Address, OutputId};
use ledger_wallet::node::MockNode;
use ledger_wallet::storage::Storage;
use ledger_wallet::wallet::{AccountHandle, MnemonicKeyProvider, WalletManager};
use ledger_wallet::WalletConfig;

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Testnet parameters with a fast-failing node policy
pub fn test_config() -> WalletConfig {
    let mut config = WalletConfig::default();
    config.node.request_timeout_ms = 100;
    config.node.max_retries = 1;
    config.node.retry_backoff_ms = 1;
    config
}

/// Same as [`test_config`] but without storage deposits, so small amounts are spendable
pub fn free_rent_config() -> WalletConfig {
    let mut config = test_config();
    config.protocol.rent_structure.v_byte_cost = 0;
    config
}

/// Test environment with automatic cleanup
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub node: Arc<MockNode>,
    pub config: WalletConfig,
    pub manager: WalletManager,
}

impl TestEnvironment {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(test_config())
    }

    pub fn free_rent() -> anyhow::Result<Self> {
        Self::with_config(free_rent_config())
    }

    pub fn with_config(config: WalletConfig) -> anyhow::Result<Self> {
        init_logging();

        let temp_dir = TempDir::new()?;
        log::info!("📁 Test directory: {:?}", temp_dir.path());

        let node = Arc::new(MockNode::new(config.protocol.clone()));
        let manager = open_manager(&config, &node, &temp_dir)?;

        Ok(Self {
            temp_dir,
            node,
            config,
            manager,
        })
    }

    /// A second manager over the same storage and node, as after a restart
    pub fn reopen(&self) -> anyhow::Result<WalletManager> {
        open_manager(&self.config, &self.node, &self.temp_dir)
    }

    pub fn hrp(&self) -> &str {
        self.config.bech32_hrp()
    }

    /// Bech32 form of an address outside the wallet
    pub fn external_address(&self, byte: u8) -> (Address, String) {
        let address = Address::new([byte; 32]);
        let bech32 = address.to_bech32(self.hrp()).expect("valid hrp");
        (address, bech32)
    }
}

fn open_manager(config: &WalletConfig, node: &Arc<MockNode>, temp_dir: &TempDir) -> anyhow::Result<WalletManager> {
    let keys = Arc::new(MnemonicKeyProvider::from_phrase(
        MNEMONIC,
        config.coin_type(),
        config.bitcoin_network(),
    )?);
    let storage = Storage::new_with_base_dir(temp_dir.path().to_path_buf());
    Ok(WalletManager::new(
        config.clone(),
        node.clone(),
        keys,
        Some(storage),
    )?)
}

pub async fn first_address(account: &AccountHandle) -> Address {
    account.list_addresses().await[0].address
}

/// Fund the account's first public address with one output per amount
pub async fn fund_first_address(env: &TestEnvironment, account: &AccountHandle, amounts: &[u64]) -> Vec<OutputId> {
    let address = first_address(account).await;
    amounts
        .iter()
        .map(|amount| env.node.fund(address, *amount))
        .collect()
}
