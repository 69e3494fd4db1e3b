use bip39::Mnemonic;
use std::fs;
use std::path::{Path, PathBuf};

use super::models::Metadata;
use crate::error::StorageError;
use crate::wallet::AccountData;

#[derive(Clone, Debug)]
pub struct Storage {
    base_path: PathBuf,
}

impl Storage {
    /// Create a new storage instance with the default base directory ("./wallet-data")
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("./wallet-data"),
        }
    }

    /// Create storage with custom base directory (for testing)
    pub fn new_with_base_dir(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the base directory path for wallet storage
    pub fn base_dir(&self) -> &Path {
        &self.base_path
    }

    fn accounts_dir(&self) -> PathBuf {
        self.base_path.join("accounts")
    }

    fn account_path(&self, index: u32) -> PathBuf {
        self.accounts_dir().join(format!("{}.json", index))
    }

    /// True once a mnemonic has been stored
    pub fn wallet_exists(&self) -> bool {
        self.base_path.join("mnemonic.txt").exists()
    }

    /// Write one account, replacing the previous file atomically
    pub fn save_account(&self, account: &AccountData) -> Result<(), StorageError> {
        fs::create_dir_all(self.accounts_dir())?;
        let path = self.account_path(account.index);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(account)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        log::debug!("Saved account {} to {:?}", account.index, path);
        Ok(())
    }

    /// Load one account by index
    pub fn load_account(&self, index: u32) -> Result<AccountData, StorageError> {
        let path = self.account_path(index);
        if !path.exists() {
            return Err(StorageError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load every stored account, ordered by index
    pub fn load_accounts(&self) -> Result<Vec<AccountData>, StorageError> {
        let dir = self.accounts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut accounts = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            let account: AccountData = serde_json::from_str(&contents)?;
            accounts.push(account);
        }
        accounts.sort_by_key(|account| account.index);
        Ok(accounts)
    }

    /// Save wallet metadata to disk
    pub fn save_metadata(&self, meta: &Metadata) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.base_path.join("metadata.json");
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallet metadata from disk
    pub fn load_metadata(&self) -> Result<Metadata, StorageError> {
        let path = self.base_path.join("metadata.json");
        if !path.exists() {
            return Err(StorageError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save wallet mnemonic phrase to disk
    pub fn save_mnemonic(&self, mnemonic: &Mnemonic) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        let path = self.base_path.join("mnemonic.txt");
        fs::write(path, mnemonic.to_string())?;
        Ok(())
    }

    /// Load wallet mnemonic phrase from disk
    pub fn load_mnemonic(&self) -> Result<Mnemonic, StorageError> {
        let path = self.base_path.join("mnemonic.txt");
        if !path.exists() {
            return Err(StorageError::FileNotFound(path.display().to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Mnemonic::parse(contents.trim()).map_err(|e| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Invalid mnemonic: {}", e),
            ))
        })
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_accounts_round_trip_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new_with_base_dir(dir.path().to_path_buf());

        assert!(storage.load_accounts().unwrap().is_empty());

        storage.save_account(&AccountData::new(1, "savings".into())).unwrap();
        storage.save_account(&AccountData::new(0, "main".into())).unwrap();

        let accounts = storage.load_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].index, 0);
        assert_eq!(accounts[1].alias, "savings");

        let mut renamed = accounts[0].clone();
        renamed.alias = "primary".into();
        storage.save_account(&renamed).unwrap();
        assert_eq!(storage.load_account(0).unwrap().alias, "primary");
    }

    #[test]
    fn test_missing_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new_with_base_dir(dir.path().to_path_buf());

        assert!(!storage.wallet_exists());
        assert!(matches!(storage.load_mnemonic(), Err(StorageError::FileNotFound(_))));
        assert!(matches!(storage.load_account(3), Err(StorageError::FileNotFound(_))));

        let meta = Metadata {
            created_at: Utc::now(),
            network: "testnet".into(),
            coin_type: 1,
        };
        storage.save_metadata(&meta).unwrap();
        assert_eq!(storage.load_metadata().unwrap(), meta);
    }
}
