/// The REST node client against the in-memory node served over HTTP
mod common;

use common::{free_rent_config, init_logging, MNEMONIC};
use ledger_wallet::ledger::Address;
use ledger_wallet::node::{mock, MockNode, NodeClient, RestNodeClient, SubmitMode};
use ledger_wallet::wallet::{
    AddressWithAmount, MnemonicKeyProvider, SyncOptions, TransactionOptions, TransactionStatus,
    WalletManager,
};
use ledger_wallet::WalletError;
use std::sync::Arc;

async fn serve(node: Arc<MockNode>) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, mock::router(node)).await.ok();
    });
    Ok(format!("http://{}", addr))
}

fn manager_for(url: &str) -> anyhow::Result<WalletManager> {
    let config = free_rent_config();
    let keys = Arc::new(MnemonicKeyProvider::from_phrase(
        MNEMONIC,
        config.coin_type(),
        config.bitcoin_network(),
    )?);
    Ok(WalletManager::new(
        config,
        Arc::new(RestNodeClient::new(url)),
        keys,
        None,
    )?)
}

#[tokio::test]
async fn test_sync_and_send_over_http() -> anyhow::Result<()> {
    init_logging();
    let node = Arc::new(MockNode::new(free_rent_config().protocol));
    let url = serve(node.clone()).await?;
    let manager = manager_for(&url)?;

    let account = manager.create_account(None).await?;
    let owner = account.list_addresses().await[0].address;
    node.fund(owner, 100);
    node.fund(owner, 50);

    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.balance.amount, 150);

    let recipient = Address::new([9; 32]);
    let recipient_bech32 = recipient.to_bech32("rms")?;
    let transaction = account
        .send_amount(
            vec![AddressWithAmount {
                address: recipient_bech32,
                amount: 120,
            }],
            TransactionOptions::default(),
        )
        .await?;
    assert!(node.transaction(&transaction.transaction_id).is_some());
    assert_eq!(node.balance_of(&recipient), 120);

    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.balance.amount, 30);
    assert_eq!(
        account.get_transaction(&transaction.transaction_id).await?.status,
        TransactionStatus::Confirmed
    );
    Ok(())
}

#[tokio::test]
async fn test_http_errors_map_to_node_errors() -> anyhow::Result<()> {
    init_logging();
    let node = Arc::new(MockNode::new(free_rent_config().protocol));
    let url = serve(node.clone()).await?;
    let manager = manager_for(&url)?;
    let account = manager.create_account(None).await?;
    let owner = account.list_addresses().await[0].address;
    let funded = node.fund(owner, 100);
    account.sync(SyncOptions::default()).await?;

    // Unknown output is a 404, which is not an error
    let client = RestNodeClient::new(&url);
    node.prune(&funded);
    assert_eq!(client.get_output(&funded).await?, None);

    node.fund(owner, 80);
    account.sync(SyncOptions::default()).await?;
    node.set_submit_mode(SubmitMode::Reject("conflict".into()));
    let recipient = Address::new([9; 32]).to_bech32("rms")?;
    let result = account
        .send_amount(
            vec![AddressWithAmount {
                address: recipient,
                amount: 80,
            }],
            TransactionOptions::default(),
        )
        .await;
    assert!(matches!(result, Err(WalletError::SubmissionRejected(_))));
    assert_eq!(account.get_balance().await?.amount, 80);
    Ok(())
}

#[tokio::test]
async fn test_closed_port_is_unreachable() -> anyhow::Result<()> {
    init_logging();
    // Bind and drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let manager = manager_for(&url)?;
    let account = manager.create_account(None).await?;
    let result = account.sync(SyncOptions::default()).await;
    assert!(matches!(result, Err(WalletError::NodeUnreachable(_))));
    Ok(())
}
