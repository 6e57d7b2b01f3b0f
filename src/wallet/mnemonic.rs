use bip39::{Language, Mnemonic};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, WalletError};
use crate::wallet::keypair::{derive_at, WalletKeypair};

/// Represents a mnemonic phrase for wallet generation.
///
/// Not `Clone`: the words are wiped when the single owner drops it.
#[derive(Debug, PartialEq, ZeroizeOnDrop)]
pub struct MnemonicPhrase {
    mnemonic: Mnemonic,
}

impl MnemonicPhrase {
    /// Create from an existing mnemonic string
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(phrase)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        Ok(Self { mnemonic })
    }

    /// Get the mnemonic phrase as a string
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.mnemonic.to_string())
    }

    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }

    /// BIP-39 seed (empty passphrase)
    pub fn to_seed(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.mnemonic.to_seed(""))
    }

    /// Derive the keypair for a wallet slot
    pub fn derive_keypair(&self, index: u32) -> Result<WalletKeypair> {
        let seed = self.to_seed();
        derive_at(&seed[..], index)
    }
}

/// Generate a new mnemonic phrase with the specified word count
pub fn generate_mnemonic(word_count: usize) -> Result<MnemonicPhrase> {
    use rand::thread_rng;

    match word_count {
        12 | 15 | 18 | 21 | 24 => {}
        _ => {
            return Err(WalletError::InvalidInput(
                "Invalid word count. Must be 12, 15, 18, 21, or 24".to_string(),
            ))
        }
    }

    let mut rng = thread_rng();
    let mnemonic = Mnemonic::generate_in_with(&mut rng, Language::English, word_count)
        .map_err(|e| WalletError::Crypto(format!("Failed to generate mnemonic: {}", e)))?;

    Ok(MnemonicPhrase { mnemonic })
}

/// Validate a mnemonic phrase
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_normalized(phrase).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_wiped_on_drop<T: ZeroizeOnDrop>() {}

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_mnemonic() {
        let mnemonic = generate_mnemonic(12).unwrap();
        assert_eq!(mnemonic.word_count(), 12);
        assert!(validate_mnemonic(&mnemonic.phrase()));
    }

    #[test]
    fn test_invalid_word_count() {
        assert!(generate_mnemonic(13).is_err());
    }

    #[test]
    fn test_invalid_phrase_rejected() {
        let result = MnemonicPhrase::from_phrase("not a real phrase");
        assert!(matches!(result, Err(WalletError::InvalidMnemonic(_))));
    }

    #[test]
    fn test_derive_keypair() {
        let mnemonic = MnemonicPhrase::from_phrase(PHRASE).unwrap();
        let first = mnemonic.derive_keypair(0).unwrap();
        let again = MnemonicPhrase::from_phrase(PHRASE).unwrap().derive_keypair(0).unwrap();
        let second = mnemonic.derive_keypair(1).unwrap();

        assert_eq!(first.pubkey(), again.pubkey());
        assert_ne!(first.pubkey(), second.pubkey());
    }

    #[test]
    fn test_phrase_is_wiped_on_drop() {
        assert_wiped_on_drop::<MnemonicPhrase>();
    }
}
