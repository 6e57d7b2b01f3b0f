pub mod account;
pub mod keypair;
pub mod mnemonic;
pub mod service;
pub mod vault;

pub use account::{next_free_index, WalletCollection, WalletRef};
pub use keypair::{derive_at, derivation_path, WalletKeypair, MAX_WALLETS};
pub use mnemonic::{generate_mnemonic, validate_mnemonic, MnemonicPhrase};
pub use service::{Portfolio, WalletService};
pub use vault::{EncryptedSeedBlob, FileSecureStore, KeyVault, MemorySecureStore, SecureStore};
