use ledger_wallet::api::server;
use ledger_wallet::node::{MockNode, NodeClient, RestNodeClient};
use ledger_wallet::storage::{KeyManager, Storage};
use ledger_wallet::wallet::{MnemonicKeyProvider, WalletManager};
use ledger_wallet::WalletConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = WalletConfig::from_env();
    let storage = match &config.storage_dir {
        Some(dir) => Storage::new_with_base_dir(dir.clone()),
        None => Storage::new(),
    };

    let mnemonic = if storage.wallet_exists() {
        storage.load_mnemonic()?
    } else {
        let mnemonic = KeyManager::generate()?;
        storage.save_mnemonic(&mnemonic)?;
        log::info!("Generated a new mnemonic in {}", storage.base_dir().display());
        mnemonic
    };
    let keys = Arc::new(MnemonicKeyProvider::new(
        &mnemonic,
        config.coin_type(),
        config.bitcoin_network(),
    )?);

    let node: Arc<dyn NodeClient> = match &config.node.url {
        Some(url) => Arc::new(RestNodeClient::new(url)),
        None => {
            log::warn!("Running against an in-memory node; nothing is broadcast");
            Arc::new(MockNode::new(config.protocol.clone()))
        }
    };

    let addr = config.bind_address.clone();
    let manager = Arc::new(WalletManager::new(config, node, keys, Some(storage))?);
    if manager.accounts().await.is_empty() {
        manager.create_account(None).await?;
    }

    log::info!("Starting ledger wallet server on {}", addr);
    server::run_server(manager, &addr).await?;
    Ok(())
}
