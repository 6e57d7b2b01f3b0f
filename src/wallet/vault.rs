//! Encrypted-at-rest seed storage.
//!
//! The mnemonic is encrypted with AES-256-GCM under a key stretched by Argon2id
//! from a session passphrase. The passphrase itself is derived from a stable
//! session identifier and a random salt that is generated once and persisted in
//! the [`SecureStore`]. Losing that salt makes every stored blob unrecoverable;
//! the only recovery path is re-importing the mnemonic.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use async_trait::async_trait;
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, WalletError};
use crate::wallet::mnemonic::MnemonicPhrase;

const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;
const SESSION_SALT_SIZE: usize = 32;
const BLOB_VERSION: u32 = 1;

pub const SEED_KEY: &str = "wallet.seed";
pub const SESSION_SALT_KEY: &str = "wallet.session_salt";

/// Owner read/write only
#[cfg(unix)]
const SECURE_FILE_MODE: u32 = 0o600;

/// Encrypted mnemonic plus the parameters needed to decrypt it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSeedBlob {
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub version: u32,
}

/// Encrypt a seed phrase under a passphrase
pub fn encrypt(seed: &[u8], passphrase: &str) -> Result<EncryptedSeedBlob> {
    if seed.is_empty() {
        return Err(WalletError::InvalidInput("Seed must not be empty".to_string()));
    }
    if passphrase.is_empty() {
        return Err(WalletError::InvalidInput("Passphrase must not be empty".to_string()));
    }

    let mut salt = vec![0u8; SALT_SIZE];
    thread_rng().fill_bytes(&mut salt);

    let key_bytes = derive_key(passphrase, &salt)?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes[..]);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(key);
    let ciphertext = cipher
        .encrypt(nonce, seed)
        .map_err(|e| WalletError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedSeedBlob {
        salt,
        nonce: nonce_bytes.to_vec(),
        ciphertext,
        version: BLOB_VERSION,
    })
}

/// Decrypt a blob; a wrong passphrase fails authentication
pub fn decrypt(blob: &EncryptedSeedBlob, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    if blob.version != BLOB_VERSION {
        return Err(WalletError::Crypto(format!(
            "Unsupported blob version {}",
            blob.version
        )));
    }
    if blob.nonce.len() != NONCE_SIZE {
        return Err(WalletError::Crypto("Malformed nonce".to_string()));
    }

    let key_bytes = derive_key(passphrase, &blob.salt)?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes[..]);

    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(&blob.nonce);
    let plaintext = cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| WalletError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut key_bytes = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key_bytes[..])
        .map_err(|e| WalletError::Crypto(format!("Failed to derive key: {:?}", e)))?;
    Ok(key_bytes)
}

/// Passphrase for a session: hex(SHA-256(session_id || salt))
pub fn session_passphrase(session_id: &str, salt: &[u8]) -> Zeroizing<String> {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(salt);
    let mut digest = hasher.finalize();
    let passphrase = Zeroizing::new(hex::encode(&digest));
    digest.as_mut_slice().zeroize();
    passphrase
}

/// Scoped key-value storage for opaque strings (keychain, keystore, file)
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory store, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(mut old) = self.entries.write().await.remove(key) {
            old.zeroize();
        }
        Ok(())
    }
}

/// File-per-key store under a directory. On Unix every file is `0600`.
pub struct FileSecureStore {
    storage_path: PathBuf,
}

impl FileSecureStore {
    /// Create new store, creating the directory if it doesn't exist
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_path = storage_dir.as_ref().to_path_buf();

        if !storage_path.exists() {
            std::fs::create_dir_all(&storage_path)?;
        }

        Ok(Self { storage_path })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(WalletError::Storage(format!("Invalid storage key: {}", key)));
        }
        Ok(self.storage_path.join(format!("{}.secure", key)))
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(SECURE_FILE_MODE);

        let mut file = options.open(&path).await?;
        file.write_all(value.as_bytes()).await?;
        file.flush().await?;

        // `mode` only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(SECURE_FILE_MODE)).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds the encrypted seed and hands out the decrypted mnemonic only for the
/// duration of a closure.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn SecureStore>,
}

impl KeyVault {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// Load the session salt, generating and persisting it on first use
    async fn session_salt(&self) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(encoded) = self.store.get(SESSION_SALT_KEY).await? {
            let salt = hex::decode(encoded.trim())
                .map_err(|e| WalletError::Storage(format!("Corrupted session salt: {}", e)))?;
            return Ok(Zeroizing::new(salt));
        }

        let mut salt = vec![0u8; SESSION_SALT_SIZE];
        thread_rng().fill_bytes(&mut salt);
        self.store.set(SESSION_SALT_KEY, &hex::encode(&salt)).await?;
        info!("generated new session salt");
        Ok(Zeroizing::new(salt))
    }

    async fn passphrase(&self, session_id: &str) -> Result<Zeroizing<String>> {
        if session_id.is_empty() {
            return Err(WalletError::InvalidInput("Session identifier must not be empty".to_string()));
        }
        let salt = self.session_salt().await?;
        Ok(session_passphrase(session_id, &salt))
    }

    /// Whether a seed has been stored
    pub async fn has_seed(&self) -> Result<bool> {
        Ok(self.store.get(SEED_KEY).await?.is_some())
    }

    /// Encrypt and persist the mnemonic, replacing any previous seed
    pub async fn store_seed(&self, mnemonic: &MnemonicPhrase, session_id: &str) -> Result<()> {
        let passphrase = self.passphrase(session_id).await?;
        let phrase = mnemonic.phrase();
        let blob = encrypt(phrase.as_bytes(), &passphrase)?;
        let serialized = serde_json::to_string(&blob)?;
        self.store.set(SEED_KEY, &serialized).await?;
        debug!("stored encrypted seed");
        Ok(())
    }

    /// Decrypt the seed, run `f`, and drop the plaintext before returning
    pub async fn with_seed<T, F>(&self, session_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&MnemonicPhrase) -> Result<T> + Send,
        T: Send,
    {
        let serialized = self
            .store
            .get(SEED_KEY)
            .await?
            .ok_or(WalletError::NotInitialized)?;
        let blob: EncryptedSeedBlob = serde_json::from_str(&serialized)?;
        let passphrase = self.passphrase(session_id).await?;

        let plaintext = decrypt(&blob, &passphrase)?;
        let phrase = std::str::from_utf8(&plaintext)
            .map_err(|_| WalletError::Crypto("Decrypted seed is not valid UTF-8".to_string()))?;
        let mnemonic = MnemonicPhrase::from_phrase(phrase)?;

        f(&mnemonic)
    }

    /// Remove the seed and the session salt
    pub async fn destroy(&self) -> Result<()> {
        self.store.delete(SEED_KEY).await?;
        self.store.delete(SESSION_SALT_KEY).await?;
        info!("destroyed stored seed");
        Ok(())
    }
}
