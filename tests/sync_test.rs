/// Synchronization against the in-memory node
mod common;

use common::{first_address, fund_first_address, TestEnvironment, MNEMONIC};
use ledger_wallet::wallet::{
    AddressDeriver, GenerateAddressOptions, KeyProvider, MnemonicKeyProvider, SyncOptions,
    WalletEvent,
};
use ledger_wallet::WalletError;

#[tokio::test]
async fn test_sync_tracks_new_and_spent_outputs() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    let mut events = env.manager.subscribe();

    let funded = fund_first_address(&env, &account, &[500, 200]).await;

    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.new_outputs, 2);
    assert_eq!(report.balance.amount, 700);

    let mut new_outputs = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event.event, WalletEvent::NewOutput(_)) {
            assert_eq!(event.account_index, 0);
            new_outputs += 1;
        }
    }
    assert_eq!(new_outputs, 2);

    env.node.spend_externally(&funded[1]).expect("funded output exists");

    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.spent_outputs, 1);
    assert_eq!(report.balance.amount, 500);
    assert_eq!(account.get_balance().await?.amount, 500);
    assert!(account.get_output(&funded[1]).await?.is_spent);

    let addresses = account.list_addresses().await;
    assert!(addresses[0].used);
    assert_eq!(addresses[0].balance, 500);

    log::info!("✓ Balance after external spend: {}", report.balance.amount);
    Ok(())
}

#[tokio::test]
async fn test_sync_is_idempotent() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[300, 400]).await;

    let first = account.sync(SyncOptions::default()).await?;
    let outputs_after_first = account.list_outputs().await;

    let second = account.sync(SyncOptions::default()).await?;
    assert_eq!(second.new_outputs, 0);
    assert_eq!(second.spent_outputs, 0);
    assert_eq!(second.new_addresses, 0);
    assert_eq!(second.balance, first.balance);
    assert_eq!(account.list_outputs().await, outputs_after_first);
    Ok(())
}

#[tokio::test]
async fn test_sync_discovers_addresses_within_gap_limit() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let keys = MnemonicKeyProvider::from_phrase(MNEMONIC, env.config.coin_type(), env.config.bitcoin_network())?;
    let deriver = AddressDeriver::new(keys.account_xpub(0)?, 0, env.config.coin_type(), env.hrp())?;
    let fourth = deriver.derive(3, false)?;
    env.node.fund(fourth.address, 900);

    let account = env.manager.create_account(None).await?;

    // Indices 1 and 2 are empty, so a gap of two stops before index 3
    let narrow = account
        .sync(SyncOptions {
            gap_limit: Some(2),
            ..SyncOptions::default()
        })
        .await?;
    assert_eq!(narrow.new_addresses, 0);
    assert_eq!(narrow.balance.amount, 0);
    assert_eq!(account.list_addresses().await.len(), 1);

    let wide = account
        .sync(SyncOptions {
            gap_limit: Some(5),
            ..SyncOptions::default()
        })
        .await?;
    assert_eq!(wide.new_addresses, 3);
    assert_eq!(wide.balance.amount, 900);

    let addresses = account.list_addresses().await;
    assert_eq!(addresses.len(), 4);
    assert_eq!(addresses[3].address, fourth.address);
    assert!(addresses[3].used);

    // Generation continues after the discovered addresses
    let next = account
        .generate_addresses(1, GenerateAddressOptions::default())
        .await?;
    assert_eq!(next[0].key_index, 4);
    Ok(())
}

#[tokio::test]
async fn test_failing_address_does_not_abort_sync() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    let second = account
        .generate_addresses(1, GenerateAddressOptions::default())
        .await?[0]
        .address;

    fund_first_address(&env, &account, &[100]).await;
    env.node.fund(second, 250);
    env.node.fail_address(second);

    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.failed_addresses, 1);
    assert_eq!(report.balance.amount, 100);

    env.node.clear_failing_addresses();
    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.failed_addresses, 0);
    assert_eq!(report.balance.amount, 350);

    // Outputs of an address that cannot be listed are not taken as spent
    env.node.fail_address(second);
    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.spent_outputs, 0);
    assert_eq!(report.balance.amount, 350);
    Ok(())
}

#[tokio::test]
async fn test_sync_with_unreachable_node_changes_nothing() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[100]).await;
    account.sync(SyncOptions::default()).await?;
    let before = account.data().await;

    env.node.set_unreachable(true);
    let result = account.sync(SyncOptions::default()).await;
    assert!(matches!(result, Err(WalletError::NodeUnreachable(_))));
    assert_eq!(account.data().await, before);

    env.node.set_unreachable(false);
    assert_eq!(account.sync(SyncOptions::default()).await?.balance.amount, 100);
    Ok(())
}

#[tokio::test]
async fn test_sync_fails_when_no_address_can_be_listed() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[100]).await;
    account.sync(SyncOptions::default()).await?;
    let before = account.data().await;

    // Every address query answers with a body that cannot be decoded
    env.node.set_malformed_queries(true);
    let result = account.sync(SyncOptions::default()).await;
    assert!(matches!(result, Err(WalletError::NodeUnreachable(_))));
    assert_eq!(account.data().await, before);

    env.node.set_malformed_queries(false);
    assert_eq!(account.sync(SyncOptions::default()).await?.balance.amount, 100);
    log::info!("✓ Sync with undecodable answers reported an error");
    Ok(())
}

#[tokio::test]
async fn test_pruned_output_is_treated_as_spent() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    let funded = fund_first_address(&env, &account, &[100, 40]).await;
    account.sync(SyncOptions::default()).await?;

    env.node.prune(&funded[0]);
    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.spent_outputs, 1);
    assert_eq!(report.balance.amount, 40);

    let unspent = account.list_unspent_outputs().await;
    assert_eq!(unspent.len(), 1);
    assert_eq!(unspent[0].address, first_address(&account).await);
    Ok(())
}

#[tokio::test]
async fn test_synced_state_is_persisted() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[100, 200]).await;
    account.sync(SyncOptions::default()).await?;

    let reopened = env.reopen()?;
    let restored = reopened.accounts().await.remove(0);
    assert_eq!(restored.get_balance().await?.amount, 300);
    assert_eq!(restored.list_outputs().await, account.list_outputs().await);
    Ok(())
}
