/// Concurrent operations on one and on several accounts
mod common;

use common::{fund_first_address, TestEnvironment};
use ledger_wallet::ledger::OutputId;
use ledger_wallet::wallet::{AddressWithAmount, SyncOptions, TransactionOptions};
use ledger_wallet::WalletError;
use std::collections::HashSet;

fn to(address: &str, amount: u64) -> Vec<AddressWithAmount> {
    vec![AddressWithAmount {
        address: address.to_string(),
        amount,
    }]
}

#[tokio::test]
async fn test_concurrent_sends_never_share_inputs() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[100, 100, 100, 100]).await;
    account.sync(SyncOptions::default()).await?;
    let (_, recipient) = env.external_address(9);

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let account = account.clone();
        let recipient = recipient.clone();
        tasks.push(tokio::spawn(async move {
            account
                .send_amount(to(&recipient, 150), TransactionOptions::default())
                .await
        }));
    }

    let mut sent = Vec::new();
    for task in tasks {
        match task.await? {
            Ok(transaction) => sent.push(transaction),
            Err(WalletError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    // Four outputs of 100 cover two sends of 150
    assert_eq!(sent.len(), 2);

    let mut used: HashSet<OutputId> = HashSet::new();
    for transaction in &sent {
        for input in &transaction.payload.essence.inputs {
            assert!(used.insert(*input), "input {} spent twice", input);
        }
    }
    assert_eq!(env.node.transaction_count(), 2);

    log::info!("✓ {} sends, {} distinct inputs", sent.len(), used.len());
    Ok(())
}

#[tokio::test]
async fn test_accounts_operate_independently() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let first = env.manager.create_account(None).await?;
    let second = env.manager.create_account(None).await?;
    fund_first_address(&env, &first, &[500]).await;
    fund_first_address(&env, &second, &[700]).await;

    let (a, b) = tokio::join!(
        first.sync(SyncOptions::default()),
        second.sync(SyncOptions::default())
    );
    assert_eq!(a?.balance.amount, 500);
    assert_eq!(b?.balance.amount, 700);

    let (_, recipient) = env.external_address(9);
    let (a, b) = tokio::join!(
        first.send_amount(to(&recipient, 200), TransactionOptions::default()),
        second.send_amount(to(&recipient, 300), TransactionOptions::default())
    );
    a?;
    b?;

    first.sync(SyncOptions::default()).await?;
    second.sync(SyncOptions::default()).await?;
    assert_eq!(first.get_balance().await?.amount, 300);
    assert_eq!(second.get_balance().await?.amount, 400);
    assert_eq!(env.node.balance_of(&env.external_address(9).0), 500);
    Ok(())
}

#[tokio::test]
async fn test_sync_and_send_serialize_on_one_account() -> anyhow::Result<()> {
    let env = TestEnvironment::free_rent()?;
    let account = env.manager.create_account(None).await?;
    fund_first_address(&env, &account, &[100, 200]).await;
    account.sync(SyncOptions::default()).await?;
    let (_, recipient) = env.external_address(9);

    let syncing = account.clone();
    let sync = tokio::spawn(async move { syncing.sync(SyncOptions::default()).await });
    let sending = account.clone();
    let send = tokio::spawn(async move {
        sending
            .send_amount(to(&recipient, 250), TransactionOptions::default())
            .await
    });

    sync.await??;
    send.await??;

    // Whatever the order, one more sync settles on the same state
    let report = account.sync(SyncOptions::default()).await?;
    assert_eq!(report.balance.amount, 50);
    assert!(account.list_pending_transactions().await.is_empty());
    Ok(())
}
