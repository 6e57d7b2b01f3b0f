use solana_sdk::{
    derivation_path::DerivationPath,
    pubkey::Pubkey,
    signature::{Keypair, SeedDerivable, Signature},
    signer::Signer,
};

use crate::error::{Result, WalletError};

/// Maximum number of wallets derivable from one seed
pub const MAX_WALLETS: u32 = 10;

/// Solana BIP44 coin type
pub const SOLANA_COIN_TYPE: u32 = 501;

/// Signing keypair for one wallet slot.
///
/// The secret never leaves this type except through [`Signer`]; dropping it
/// wipes the underlying ed25519 key.
#[derive(Debug)]
pub struct WalletKeypair {
    keypair: Keypair,
}

impl WalletKeypair {
    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign a message
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }

    /// Borrow as a Solana signer for transaction signing
    pub fn signer(&self) -> &Keypair {
        &self.keypair
    }
}

/// Derivation path for a wallet slot: `m/44'/501'/{index}'/0'`
pub fn derivation_path(index: u32) -> String {
    format!("m/44'/{}'/{}'/0'", SOLANA_COIN_TYPE, index)
}

/// Derive the keypair at `index` from a BIP-39 seed (the 64-byte PBKDF2 output).
///
/// SLIP-0010 ed25519 along `m/44'/501'/{index}'/0'`, the path Phantom and
/// `solana-keygen` use.
pub fn derive_at(seed: &[u8], index: u32) -> Result<WalletKeypair> {
    if index >= MAX_WALLETS {
        return Err(WalletError::CapacityExceeded { max: MAX_WALLETS });
    }
    if seed.len() < 16 {
        return Err(WalletError::Crypto("Seed too short for derivation".to_string()));
    }

    let path = DerivationPath::new_bip44(Some(index), Some(0));
    let keypair = Keypair::from_seed_and_derivation_path(seed, Some(path))
        .map_err(|e| WalletError::Crypto(format!("Key derivation failed: {}", e)))?;
    Ok(WalletKeypair { keypair })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = [7u8; 64];
        let a = derive_at(&seed, 3).unwrap();
        let b = derive_at(&seed, 3).unwrap();
        assert_eq!(a.pubkey(), b.pubkey());
        assert_eq!(a.sign_message(b"hello"), b.sign_message(b"hello"));
    }

    #[test]
    fn test_indices_yield_distinct_keys() {
        let seed = [42u8; 64];
        let keys: Vec<Pubkey> = (0..MAX_WALLETS)
            .map(|i| derive_at(&seed, i).unwrap().pubkey())
            .collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn test_index_out_of_range() {
        let result = derive_at(&[1u8; 64], MAX_WALLETS);
        assert!(matches!(result, Err(WalletError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_signature_verifies() {
        let keypair = derive_at(&[9u8; 64], 0).unwrap();
        let signature = keypair.sign_message(b"message");
        assert!(signature.verify(keypair.pubkey().as_ref(), b"message"));
    }

    #[test]
    fn test_known_mnemonic_vector() {
        let mnemonic = bip39::Mnemonic::parse_normalized(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap();
        let keypair = derive_at(&mnemonic.to_seed(""), 0).unwrap();
        assert_eq!(
            keypair.pubkey().to_string(),
            "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk"
        );
    }

    #[test]
    fn test_derivation_path_format() {
        assert_eq!(derivation_path(0), "m/44'/501'/0'/0'");
        assert_eq!(derivation_path(7), "m/44'/501'/7'/0'");
    }
}
