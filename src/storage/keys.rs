use bip39::Mnemonic;
use bitcoin::key::rand;

use crate::error::WalletError;

pub struct KeyManager;

impl KeyManager {
    /// Generate a new random 24-word mnemonic
    pub fn generate() -> Result<Mnemonic, WalletError> {
        let entropy = rand::random::<[u8; 32]>();
        Mnemonic::from_entropy(&entropy).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
    }

    /// Parse an existing mnemonic phrase
    pub fn from_phrase(words: &str) -> Result<Mnemonic, WalletError> {
        Mnemonic::parse(words.trim()).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_mnemonic_parses_back() {
        let mnemonic = KeyManager::generate().unwrap();
        assert_eq!(mnemonic.word_count(), 24);
        let parsed = KeyManager::from_phrase(&mnemonic.to_string()).unwrap();
        assert_eq!(parsed, mnemonic);
    }

    #[test]
    fn test_bad_phrase_is_rejected() {
        assert!(matches!(
            KeyManager::from_phrase("not a real mnemonic"),
            Err(WalletError::InvalidMnemonic(_))
        ));
    }
}
