/// Account creation and address derivation
mod common;

use common::TestEnvironment;
use ledger_wallet::wallet::{AccountIdentifier, GenerateAddressOptions};
use ledger_wallet::WalletError;
use std::collections::HashSet;

#[tokio::test]
async fn test_create_account_derives_first_public_address() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;

    let account = env.manager.create_account(None).await?;
    assert_eq!(account.index(), 0);
    assert_eq!(account.alias(), "Account 0");

    let addresses = account.list_addresses().await;
    assert_eq!(addresses.len(), 1);
    assert_eq!(addresses[0].path, "m/44'/1'/0'/0/0");
    assert!(addresses[0].bech32.starts_with("rms1"));
    assert!(!addresses[0].internal);
    assert!(!addresses[0].used);

    log::info!("✓ First address: {}", addresses[0].bech32);
    Ok(())
}

#[tokio::test]
async fn test_addresses_are_deterministic_per_mnemonic() -> anyhow::Result<()> {
    let first = TestEnvironment::new()?;
    let second = TestEnvironment::new()?;

    let a = first.manager.create_account(None).await?;
    let b = second.manager.create_account(None).await?;
    a.generate_addresses(4, GenerateAddressOptions::default()).await?;
    b.generate_addresses(4, GenerateAddressOptions::default()).await?;

    let a_addresses: Vec<String> = a.list_addresses().await.into_iter().map(|x| x.bech32).collect();
    let b_addresses: Vec<String> = b.list_addresses().await.into_iter().map(|x| x.bech32).collect();
    assert_eq!(a_addresses, b_addresses);
    assert_eq!(a_addresses.len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_generated_addresses_are_unique_across_chains_and_accounts() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;

    let first = env.manager.create_account(None).await?;
    let second = env.manager.create_account(None).await?;

    let public = first
        .generate_addresses(3, GenerateAddressOptions::default())
        .await?;
    let internal = first
        .generate_addresses(2, GenerateAddressOptions { internal: true })
        .await?;
    second
        .generate_addresses(3, GenerateAddressOptions::default())
        .await?;

    assert_eq!(public.iter().map(|a| a.key_index).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(internal[0].path, "m/44'/1'/0'/1/0");
    assert!(internal.iter().all(|a| a.internal));

    let mut seen = HashSet::new();
    for address in first
        .list_addresses()
        .await
        .into_iter()
        .chain(second.list_addresses().await)
    {
        assert!(seen.insert(address.address), "address {} derived twice", address.bech32);
    }
    assert_eq!(seen.len(), 10);
    Ok(())
}

#[tokio::test]
async fn test_alias_must_be_unique() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;

    let main = env.manager.create_account(Some("main".into())).await?;
    let savings = env.manager.create_account(Some("savings".into())).await?;

    let duplicate = env.manager.create_account(Some("main".into())).await;
    assert!(matches!(duplicate, Err(WalletError::AliasExists(_))));

    let rename = env
        .manager
        .set_alias(&AccountIdentifier::Index(savings.index()), "main")
        .await;
    assert!(matches!(rename, Err(WalletError::AliasExists(_))));

    // Renaming to its own alias is not a conflict
    env.manager
        .set_alias(&AccountIdentifier::Index(main.index()), "main")
        .await?;

    env.manager
        .set_alias(&AccountIdentifier::Alias("savings".into()), "rainy day")
        .await?;
    let found = env.manager.get_account(&AccountIdentifier::parse("rainy day")).await?;
    assert_eq!(found.index(), 1);

    let missing = env.manager.get_account(&AccountIdentifier::parse("7")).await;
    assert!(matches!(missing, Err(WalletError::AccountNotFound(_))));

    let numeric = env
        .manager
        .set_alias(&AccountIdentifier::Index(main.index()), "7")
        .await;
    assert!(matches!(numeric, Err(WalletError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn test_accounts_survive_restart() -> anyhow::Result<()> {
    let env = TestEnvironment::new()?;

    let account = env.manager.create_account(Some("main".into())).await?;
    account
        .generate_addresses(2, GenerateAddressOptions::default())
        .await?;
    let before = account.list_addresses().await;

    let reopened = env.reopen()?;
    let accounts = reopened.accounts().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].alias(), "main");
    assert_eq!(accounts[0].list_addresses().await, before);

    // Next account continues after the stored ones
    let next = reopened.create_account(None).await?;
    assert_eq!(next.index(), 1);
    Ok(())
}
