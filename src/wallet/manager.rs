/// Account manager
///
/// Owns the shared wallet context and the set of account handles. Each
/// account carries its own lock; the manager's list lock only guards account
/// creation and alias changes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::account::{AccountData, AccountHandle};
use super::address_manager::AddressDeriver;
use super::events::{Event, EventEmitter};
use super::signer::KeyProvider;
use super::sync_ops::{SyncOptions, SyncReport};
use crate::config::WalletConfig;
use crate::error::{StorageError, WalletError};
use crate::node::NodeClient;
use crate::storage::{Metadata, Storage};

/// Everything an account needs besides its own state
pub struct WalletContext {
    pub config: WalletConfig,
    pub node: Arc<dyn NodeClient>,
    pub keys: Arc<dyn KeyProvider>,
    pub storage: Option<Storage>,
    pub events: EventEmitter,
}

/// Accounts are addressed by index or by alias
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountIdentifier {
    Index(u32),
    Alias(String),
}

impl AccountIdentifier {
    /// Numeric strings name an index, anything else an alias
    pub fn parse(s: &str) -> Self {
        match s.parse::<u32>() {
            Ok(index) => AccountIdentifier::Index(index),
            Err(_) => AccountIdentifier::Alias(s.to_string()),
        }
    }
}

impl FromStr for AccountIdentifier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountIdentifier::Index(index) => write!(f, "{}", index),
            AccountIdentifier::Alias(alias) => write!(f, "{}", alias),
        }
    }
}

impl From<u32> for AccountIdentifier {
    fn from(index: u32) -> Self {
        AccountIdentifier::Index(index)
    }
}

impl From<&str> for AccountIdentifier {
    fn from(alias: &str) -> Self {
        AccountIdentifier::Alias(alias.to_string())
    }
}

pub struct WalletManager {
    context: Arc<WalletContext>,
    accounts: RwLock<Vec<AccountHandle>>,
}

impl WalletManager {
    /// Build a manager, loading any accounts already in storage
    pub fn new(
        config: WalletConfig,
        node: Arc<dyn NodeClient>,
        keys: Arc<dyn KeyProvider>,
        storage: Option<Storage>,
    ) -> Result<Self, WalletError> {
        let mut stored = Vec::new();
        if let Some(storage) = &storage {
            check_metadata(storage, &config)?;
            stored = storage.load_accounts()?;
            log::info!(
                "Loaded {} accounts from {}",
                stored.len(),
                storage.base_dir().display()
            );
        }

        let context = Arc::new(WalletContext {
            config,
            node,
            keys,
            storage,
            events: EventEmitter::new(),
        });

        let accounts = stored
            .into_iter()
            .map(|data| {
                let deriver = deriver_for(&context, data.index)?;
                Ok(AccountHandle::new(data, deriver, context.clone()))
            })
            .collect::<Result<Vec<_>, WalletError>>()?;

        Ok(Self {
            context,
            accounts: RwLock::new(accounts),
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.context.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.context.events.subscribe()
    }

    /// Create the next account with one public address
    pub async fn create_account(&self, alias: Option<String>) -> Result<AccountHandle, WalletError> {
        let mut accounts = self.accounts.write().await;

        let index = accounts
            .iter()
            .map(|account| account.index() + 1)
            .max()
            .unwrap_or(0);
        let alias = match alias {
            Some(alias) => validate_alias(&alias)?,
            None => format!("Account {}", index),
        };
        if accounts.iter().any(|account| account.alias() == alias) {
            return Err(WalletError::AliasExists(alias));
        }

        let deriver = deriver_for(&self.context, index)?;
        let mut data = AccountData::new(index, alias);
        data.generate_addresses(&deriver, 1, false)?;

        let handle = AccountHandle::new(data, deriver, self.context.clone());
        handle.save(&*handle.lock().await)?;
        accounts.push(handle.clone());

        log::info!("Created account {} '{}'", index, handle.alias());
        Ok(handle)
    }

    pub async fn get_account(&self, id: &AccountIdentifier) -> Result<AccountHandle, WalletError> {
        let accounts = self.accounts.read().await;
        find_account(&accounts, id)
            .cloned()
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))
    }

    pub async fn accounts(&self) -> Vec<AccountHandle> {
        self.accounts.read().await.clone()
    }

    pub async fn set_alias(&self, id: &AccountIdentifier, alias: &str) -> Result<(), WalletError> {
        let alias = validate_alias(alias)?;
        let accounts = self.accounts.write().await;

        let account = find_account(&accounts, id)
            .ok_or_else(|| WalletError::AccountNotFound(id.to_string()))?;
        if accounts
            .iter()
            .any(|other| other.index() != account.index() && other.alias() == alias)
        {
            return Err(WalletError::AliasExists(alias));
        }

        account.set_alias(&alias).await
    }

    /// Sync every account in turn; accounts sync independently of each other
    pub async fn sync_accounts(&self, options: SyncOptions) -> Result<Vec<SyncReport>, WalletError> {
        let mut reports = Vec::new();
        for account in self.accounts().await {
            reports.push(account.sync(options.clone()).await?);
        }
        Ok(reports)
    }
}

fn find_account<'a>(accounts: &'a [AccountHandle], id: &AccountIdentifier) -> Option<&'a AccountHandle> {
    accounts.iter().find(|account| match id {
        AccountIdentifier::Index(index) => account.index() == *index,
        AccountIdentifier::Alias(alias) => account.alias() == *alias,
    })
}

fn validate_alias(alias: &str) -> Result<String, WalletError> {
    let alias = alias.trim();
    if alias.is_empty() {
        return Err(WalletError::InvalidInput("alias must not be empty".to_string()));
    }
    // A numeric alias would be read back as an index
    if alias.parse::<u32>().is_ok() {
        return Err(WalletError::InvalidInput(format!("alias {} is numeric", alias)));
    }
    Ok(alias.to_string())
}

fn deriver_for(context: &WalletContext, index: u32) -> Result<AddressDeriver, WalletError> {
    let xpub = context.keys.account_xpub(index)?;
    AddressDeriver::new(
        xpub,
        index,
        context.config.coin_type(),
        context.config.bech32_hrp(),
    )
}

/// Refuse to open a wallet directory created for another network
fn check_metadata(storage: &Storage, config: &WalletConfig) -> Result<(), WalletError> {
    match storage.load_metadata() {
        Ok(meta) => {
            if meta.network != config.protocol.network_name || meta.coin_type != config.coin_type() {
                return Err(WalletError::InvalidInput(format!(
                    "wallet directory belongs to network '{}' (coin type {})",
                    meta.network, meta.coin_type
                )));
            }
            Ok(())
        }
        Err(StorageError::FileNotFound(_)) => {
            storage.save_metadata(&Metadata {
                created_at: Utc::now(),
                network: config.protocol.network_name.clone(),
                coin_type: config.coin_type(),
            })?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
