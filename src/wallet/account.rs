use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Result, WalletError};
use crate::wallet::keypair::{derivation_path, MAX_WALLETS};

/// One wallet slot derived from the shared seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRef {
    /// Derivation index; stable for the wallet's lifetime
    pub index: u32,
    pub name: String,
    pub public_key: Pubkey,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl WalletRef {
    pub fn new(index: u32, name: String, public_key: Pubkey) -> Self {
        Self {
            index,
            name,
            public_key,
            hidden: false,
            created_at: Utc::now(),
        }
    }

    pub fn derivation_path(&self) -> String {
        derivation_path(self.index)
    }
}

/// Lowest index in `[0, MAX_WALLETS)` not present in `existing`
pub fn next_free_index(existing: &[u32]) -> Result<u32> {
    (0..MAX_WALLETS)
        .find(|i| !existing.contains(i))
        .ok_or(WalletError::CapacityExceeded { max: MAX_WALLETS })
}

/// Ordered wallet list plus the active selection.
///
/// Vector order is display order. The active index is only a hint: every
/// read goes through [`active`](Self::active), which falls back to the first
/// visible wallet when the hint is stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCollection {
    wallets: Vec<WalletRef>,
    active: Option<u32>,
}

impl WalletCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletRef> {
        self.wallets.iter()
    }

    pub fn visible(&self) -> impl Iterator<Item = &WalletRef> {
        self.wallets.iter().filter(|w| !w.hidden)
    }

    pub fn get(&self, index: u32) -> Option<&WalletRef> {
        self.wallets.iter().find(|w| w.index == index)
    }

    fn get_mut(&mut self, index: u32) -> Result<&mut WalletRef> {
        self.wallets
            .iter_mut()
            .find(|w| w.index == index)
            .ok_or(WalletError::WalletNotFound(index))
    }

    fn position(&self, index: u32) -> Result<usize> {
        self.wallets
            .iter()
            .position(|w| w.index == index)
            .ok_or(WalletError::WalletNotFound(index))
    }

    pub fn indices(&self) -> Vec<u32> {
        self.wallets.iter().map(|w| w.index).collect()
    }

    pub fn next_free_index(&self) -> Result<u32> {
        next_free_index(&self.indices())
    }

    /// Default name for a new slot, unique among visible wallets
    pub fn default_name(&self, index: u32) -> String {
        let base = format!("Wallet {}", index + 1);
        if self.name_taken(&base, None) {
            format!("{} ({})", base, index)
        } else {
            base
        }
    }

    fn name_taken(&self, name: &str, except: Option<u32>) -> bool {
        self.visible()
            .any(|w| Some(w.index) != except && w.name.eq_ignore_ascii_case(name))
    }

    fn validate_name(&self, name: &str, except: Option<u32>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::InvalidInput("Wallet name cannot be empty".to_string()));
        }
        if self.name_taken(name, except) {
            return Err(WalletError::InvalidInput(format!("A wallet named '{}' already exists", name)));
        }
        Ok(name.to_string())
    }

    /// Add a wallet; the first one becomes active
    pub fn insert(&mut self, mut wallet: WalletRef) -> Result<()> {
        if wallet.index >= MAX_WALLETS {
            return Err(WalletError::CapacityExceeded { max: MAX_WALLETS });
        }
        if self.get(wallet.index).is_some() {
            return Err(WalletError::InvalidInput(format!("Wallet slot {} is already in use", wallet.index)));
        }
        wallet.name = self.validate_name(&wallet.name, None)?;
        if self.active().is_none() {
            self.active = Some(wallet.index);
        }
        self.wallets.push(wallet);
        Ok(())
    }

    pub fn rename(&mut self, index: u32, name: &str) -> Result<()> {
        let name = self.validate_name(name, Some(index))?;
        self.get_mut(index)?.name = name;
        Ok(())
    }

    /// Hide or unhide a wallet. At least one wallet stays visible.
    pub fn set_hidden(&mut self, index: u32, hidden: bool) -> Result<()> {
        let wallet = self.get(index).ok_or(WalletError::WalletNotFound(index))?;
        if wallet.hidden == hidden {
            return Ok(());
        }
        if hidden && self.visible().count() <= 1 {
            return Err(WalletError::LastWallet);
        }
        if !hidden && self.name_taken(&wallet.name, Some(index)) {
            return Err(WalletError::InvalidInput(format!(
                "Rename the wallet before unhiding: '{}' is in use",
                wallet.name
            )));
        }
        self.get_mut(index)?.hidden = hidden;
        Ok(())
    }

    /// Move a wallet to display position `to` (clamped to the end)
    pub fn move_to(&mut self, index: u32, to: usize) -> Result<()> {
        let from = self.position(index)?;
        let wallet = self.wallets.remove(from);
        let to = to.min(self.wallets.len());
        self.wallets.insert(to, wallet);
        Ok(())
    }

    /// Remove a wallet; the collection never becomes empty
    pub fn remove(&mut self, index: u32) -> Result<WalletRef> {
        let position = self.position(index)?;
        if self.wallets.len() <= 1 {
            return Err(WalletError::LastWallet);
        }
        if !self.wallets[position].hidden && self.visible().count() <= 1 {
            return Err(WalletError::LastWallet);
        }
        let removed = self.wallets.remove(position);
        if self.active == Some(index) {
            self.active = None;
        }
        Ok(removed)
    }

    pub fn set_active(&mut self, index: u32) -> Result<()> {
        match self.get(index) {
            Some(wallet) if !wallet.hidden => {
                self.active = Some(index);
                Ok(())
            }
            Some(_) => Err(WalletError::InvalidInput("Cannot select a hidden wallet".to_string())),
            None => Err(WalletError::WalletNotFound(index)),
        }
    }

    /// Active wallet, re-validated: a missing or hidden selection falls back to
    /// the first visible wallet
    pub fn active(&self) -> Option<&WalletRef> {
        self.active
            .and_then(|index| self.get(index))
            .filter(|w| !w.hidden)
            .or_else(|| self.visible().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(index: u32) -> WalletRef {
        WalletRef::new(index, format!("Wallet {}", index + 1), Pubkey::new_unique())
    }

    fn collection(n: u32) -> WalletCollection {
        let mut wallets = WalletCollection::new();
        for i in 0..n {
            wallets.insert(wallet(i)).unwrap();
        }
        wallets
    }

    #[test]
    fn test_next_free_index() {
        assert_eq!(next_free_index(&[]).unwrap(), 0);
        assert_eq!(next_free_index(&[0, 1, 3]).unwrap(), 2);
        let full: Vec<u32> = (0..MAX_WALLETS).collect();
        assert!(matches!(
            next_free_index(&full),
            Err(WalletError::CapacityExceeded { max: MAX_WALLETS })
        ));
    }

    #[test]
    fn test_capacity() {
        let mut wallets = collection(MAX_WALLETS);
        assert!(matches!(wallets.next_free_index(), Err(WalletError::CapacityExceeded { .. })));

        wallets.remove(4).unwrap();
        assert_eq!(wallets.next_free_index().unwrap(), 4);
    }

    #[test]
    fn test_last_wallet_cannot_be_removed() {
        let mut wallets = collection(2);
        wallets.remove(0).unwrap();
        assert!(matches!(wallets.remove(1), Err(WalletError::LastWallet)));
        assert_eq!(wallets.len(), 1);
    }

    #[test]
    fn test_names_unique_among_visible() {
        let mut wallets = collection(2);
        assert!(wallets.rename(1, "wallet 1").is_err());
        assert!(wallets.rename(1, "   ").is_err());
        wallets.rename(1, " Savings ").unwrap();
        assert_eq!(wallets.get(1).unwrap().name, "Savings");

        wallets.set_hidden(1, true).unwrap();
        wallets.rename(0, "Savings").unwrap();
        assert!(wallets.set_hidden(1, false).is_err());
    }

    #[test]
    fn test_active_revalidated() {
        let mut wallets = collection(3);
        assert_eq!(wallets.active().unwrap().index, 0);

        wallets.set_active(2).unwrap();
        assert_eq!(wallets.active().unwrap().index, 2);

        wallets.set_hidden(2, true).unwrap();
        assert_eq!(wallets.active().unwrap().index, 0);
        assert!(wallets.set_active(2).is_err());

        wallets.set_active(1).unwrap();
        wallets.remove(1).unwrap();
        assert_eq!(wallets.active().unwrap().index, 0);
    }

    #[test]
    fn test_move_and_hide() {
        let mut wallets = collection(3);
        wallets.move_to(2, 0).unwrap();
        assert_eq!(wallets.indices(), vec![2, 0, 1]);
        wallets.move_to(2, 99).unwrap();
        assert_eq!(wallets.indices(), vec![0, 1, 2]);

        wallets.set_hidden(0, true).unwrap();
        wallets.set_hidden(1, true).unwrap();
        assert!(matches!(wallets.set_hidden(2, true), Err(WalletError::LastWallet)));
        assert!(matches!(wallets.remove(2), Err(WalletError::LastWallet)));
        assert_eq!(wallets.visible().count(), 1);
    }

    #[test]
    fn test_serde_round_trip_keeps_order() {
        let mut wallets = collection(3);
        wallets.move_to(1, 0).unwrap();
        wallets.set_active(2).unwrap();
        let json = serde_json::to_string(&wallets).unwrap();
        let restored: WalletCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, wallets);
        assert_eq!(restored.default_name(5), "Wallet 6");
    }
}
