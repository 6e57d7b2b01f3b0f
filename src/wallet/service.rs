//! Wallet service: the operations a front-end calls.
//!
//! Owns the wallet collection behind a single-writer lock and persists it
//! through the injected [`SecureStore`]. The decrypted seed is only alive
//! inside [`KeyVault::with_seed`] while deriving or signing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::{clock::MAX_PROCESSING_AGE, pubkey::Pubkey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::cancel::CancelSignal;
use crate::config::{ConfirmationConfig, WalletConfig};
use crate::error::{Result, WalletError};
use crate::events::{EventBus, WalletEvent};
use crate::rpc::{spawn_health_check, HealthReport, RpcGateway, TokenBalance, TransactionContext, VoteAccounts};
use crate::stake::{fetch_stake_overview, StakeOverview};
use crate::swap::{SwapProviderRegistry, SwapQuote, SwapRequest};
use crate::transaction::{
    ConfirmationOutcome, RiskLevel, SignedTx, TransactionPipeline, TransactionRecord, TransactionReview,
    TransferKind, TransferParams, UnsignedTx,
};
use crate::wallet::account::{WalletCollection, WalletRef};
use crate::wallet::mnemonic::{generate_mnemonic, MnemonicPhrase};
use crate::wallet::vault::{KeyVault, SecureStore};

/// Storage key for the wallet collection metadata
pub const COLLECTION_KEY: &str = "wallet.collection";

/// Balances for one wallet, fetched together
#[derive(Debug, Clone, Serialize)]
pub struct Portfolio {
    pub wallet: WalletRef,
    pub lamports: u64,
    pub tokens: Vec<TokenBalance>,
    pub stake: StakeOverview,
    pub refreshed_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn sol_balance(&self) -> f64 {
        self.lamports as f64 / 1_000_000_000.0
    }
}

pub struct WalletService {
    vault: KeyVault,
    store: Arc<dyn SecureStore>,
    session_id: Zeroizing<String>,
    wallets: RwLock<WalletCollection>,
    gateway: Arc<RpcGateway>,
    pipeline: TransactionPipeline,
    swaps: SwapProviderRegistry,
    events: EventBus,
    health_cancel: CancelSignal,
}

impl WalletService {
    /// Build every collaborator from configuration and restore persisted wallets
    pub async fn open(
        config: &WalletConfig,
        store: Arc<dyn SecureStore>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let gateway = Arc::new(RpcGateway::new(&config.rpc)?);
        let swaps = SwapProviderRegistry::from_config(gateway.endpoint(), &config.swap)?;
        let service = Self::from_parts(
            gateway,
            config.confirmation.clone(),
            swaps,
            store,
            session_id,
        );
        service.load().await?;
        service.start_health_monitor(config.rpc.health_interval());
        Ok(service)
    }

    pub fn from_parts(
        gateway: Arc<RpcGateway>,
        confirmation: ConfirmationConfig,
        swaps: SwapProviderRegistry,
        store: Arc<dyn SecureStore>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            vault: KeyVault::new(store.clone()),
            store,
            session_id: Zeroizing::new(session_id.into()),
            wallets: RwLock::new(WalletCollection::new()),
            pipeline: TransactionPipeline::new(gateway.clone(), confirmation),
            gateway,
            swaps,
            events: EventBus::new(),
            health_cancel: CancelSignal::new(),
        }
    }

    /// Restore the persisted collection; returns the number of wallets
    pub async fn load(&self) -> Result<usize> {
        let loaded = match self.store.get(COLLECTION_KEY).await? {
            Some(json) => serde_json::from_str::<WalletCollection>(&json)?,
            None => WalletCollection::new(),
        };
        let count = loaded.len();
        *self.wallets.write().await = loaded;
        debug!(count, "wallet collection loaded");
        Ok(count)
    }

    async fn persist(&self, wallets: &WalletCollection) -> Result<()> {
        let json = serde_json::to_string(wallets)?;
        self.store.set(COLLECTION_KEY, &json).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    pub fn gateway(&self) -> &Arc<RpcGateway> {
        &self.gateway
    }

    pub fn pipeline(&self) -> &TransactionPipeline {
        &self.pipeline
    }

    pub async fn health(&self) -> HealthReport {
        self.gateway.get_health().await
    }

    /// Check the primary endpoint every `interval` and emit
    /// [`WalletEvent::HealthChanged`] whenever its status flips.
    ///
    /// Runs until the service is dropped.
    pub fn start_health_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let (checker, mut reports) = spawn_health_check(self.gateway.clone(), interval, self.health_cancel.clone());
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut last_status = None;
            while reports.changed().await.is_ok() {
                let Some(report) = reports.borrow_and_update().clone() else {
                    continue;
                };
                if last_status != Some(report.status) {
                    last_status = Some(report.status);
                    events.emit(WalletEvent::HealthChanged {
                        endpoint: report.endpoint,
                        status: report.status,
                    });
                }
            }
            if let Err(e) = checker.await {
                warn!("health check task ended abnormally: {}", e);
            }
        })
    }

    /// Generate a mnemonic and derive the first account
    ///
    /// The phrase is returned once for backup and is not retrievable later.
    pub async fn create_wallet(&self, word_count: usize, name: Option<String>) -> Result<(WalletRef, Zeroizing<String>)> {
        let mnemonic = generate_mnemonic(word_count)?;
        let wallet = self.initialize(&mnemonic, name).await?;
        Ok((wallet, mnemonic.phrase()))
    }

    pub async fn import_wallet(&self, phrase: &str, name: Option<String>) -> Result<WalletRef> {
        let mnemonic = MnemonicPhrase::from_phrase(phrase)?;
        self.initialize(&mnemonic, name).await
    }

    async fn initialize(&self, mnemonic: &MnemonicPhrase, name: Option<String>) -> Result<WalletRef> {
        let mut wallets = self.wallets.write().await;
        if self.vault.has_seed().await? || !wallets.is_empty() {
            return Err(WalletError::InvalidInput(
                "A wallet already exists. Log out before creating or importing another.".to_string(),
            ));
        }

        let keypair = mnemonic.derive_keypair(0)?;
        self.vault.store_seed(mnemonic, &self.session_id).await?;

        let mut collection = WalletCollection::new();
        let name = name.unwrap_or_else(|| collection.default_name(0));
        let wallet = WalletRef::new(0, name, keypair.pubkey());
        collection.insert(wallet.clone())?;
        self.persist(&collection).await?;
        *wallets = collection;

        info!(pubkey = %wallet.public_key, "wallet initialized");
        self.events.emit(WalletEvent::WalletAdded {
            index: wallet.index,
            pubkey: wallet.public_key,
        });
        Ok(wallet)
    }

    /// All wallets in display order, hidden ones included
    pub async fn list_wallets(&self) -> Vec<WalletRef> {
        self.wallets.read().await.iter().cloned().collect()
    }

    /// Derive a wallet at the lowest free slot
    pub async fn add_wallet(&self, name: Option<String>) -> Result<WalletRef> {
        let mut wallets = self.wallets.write().await;
        if wallets.is_empty() {
            return Err(WalletError::NotInitialized);
        }
        let index = wallets.next_free_index()?;

        let pubkey = self
            .vault
            .with_seed(&self.session_id, |mnemonic| Ok(mnemonic.derive_keypair(index)?.pubkey()))
            .await?;

        let name = name.unwrap_or_else(|| wallets.default_name(index));
        let wallet = WalletRef::new(index, name, pubkey);
        let mut updated = wallets.clone();
        updated.insert(wallet.clone())?;
        self.persist(&updated).await?;
        *wallets = updated;

        info!(index, pubkey = %pubkey, "wallet added");
        self.events.emit(WalletEvent::WalletAdded { index, pubkey });
        Ok(wallet)
    }

    /// Apply `change` to a copy, persist it, then swap it in
    async fn update<T>(&self, change: impl FnOnce(&mut WalletCollection) -> Result<T>) -> Result<T> {
        let mut wallets = self.wallets.write().await;
        let mut updated = wallets.clone();
        let out = change(&mut updated)?;
        self.persist(&updated).await?;
        *wallets = updated;
        Ok(out)
    }

    pub async fn rename_wallet(&self, index: u32, name: &str) -> Result<()> {
        let name = self
            .update(|wallets| {
                wallets.rename(index, name)?;
                Ok(wallets.get(index).map(|w| w.name.clone()).unwrap_or_default())
            })
            .await?;
        self.events.emit(WalletEvent::WalletRenamed { index, name });
        Ok(())
    }

    pub async fn hide_wallet(&self, index: u32, hidden: bool) -> Result<()> {
        self.update(|wallets| wallets.set_hidden(index, hidden)).await?;
        self.events.emit(WalletEvent::WalletHidden { index, hidden });
        Ok(())
    }

    /// Reorder: move wallet `index` to display position `position`
    pub async fn move_wallet(&self, index: u32, position: usize) -> Result<()> {
        self.update(|wallets| wallets.move_to(index, position)).await
    }

    pub async fn remove_wallet(&self, index: u32) -> Result<WalletRef> {
        let removed = self.update(|wallets| wallets.remove(index)).await?;
        info!(index, "wallet removed");
        self.events.emit(WalletEvent::WalletRemoved { index });
        Ok(removed)
    }

    pub async fn set_active(&self, index: u32) -> Result<()> {
        self.update(|wallets| wallets.set_active(index)).await?;
        self.events.emit(WalletEvent::ActiveChanged { index });
        Ok(())
    }

    /// Currently active wallet, re-validated on every call
    pub async fn active_wallet(&self) -> Result<WalletRef> {
        self.wallets
            .read()
            .await
            .active()
            .cloned()
            .ok_or(WalletError::NotInitialized)
    }

    /// Delete seed, salt and wallet list
    pub async fn logout(&self) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        self.vault.destroy().await?;
        self.store.delete(COLLECTION_KEY).await?;
        *wallets = WalletCollection::new();
        info!("logged out, wallet data removed");
        self.events.emit(WalletEvent::LoggedOut);
        Ok(())
    }

    /// SOL, token and stake balances, fetched concurrently
    pub async fn refresh_portfolio(&self, index: u32, cancel: &CancelSignal) -> Result<Portfolio> {
        let wallet = self
            .wallets
            .read()
            .await
            .get(index)
            .cloned()
            .ok_or(WalletError::WalletNotFound(index))?;
        let owner = wallet.public_key;

        let (lamports, tokens, stake) = cancel
            .run(async {
                tokio::try_join!(
                    self.gateway.get_balance(&owner),
                    self.gateway.get_token_accounts(&owner),
                    fetch_stake_overview(&self.gateway, &owner),
                )
            })
            .await?;

        self.events.emit(WalletEvent::BalanceUpdated { pubkey: owner, lamports });
        Ok(Portfolio {
            wallet,
            lamports,
            tokens,
            stake,
            refreshed_at: Utc::now(),
        })
    }

    pub async fn get_stake_overview(&self, owner: &Pubkey) -> Result<StakeOverview> {
        fetch_stake_overview(&self.gateway, owner).await
    }

    /// Current and delinquent validators, for choosing or checking a delegation
    pub async fn get_validators(&self) -> Result<VoteAccounts> {
        self.gateway.get_vote_accounts().await
    }

    /// Build and review a transfer from the active wallet without sending it
    pub async fn preview_transfer(
        &self,
        to: Pubkey,
        kind: TransferKind,
        cancel: &CancelSignal,
    ) -> Result<TransactionReview> {
        let wallet = self.active_wallet().await?;
        let params = TransferParams {
            from: wallet.public_key,
            to,
            kind,
        };
        let (tx, _) = self.pipeline.build(&params, cancel).await?;
        self.pipeline.review(&tx, cancel).await
    }

    pub async fn send_native(&self, to: Pubkey, lamports: u64, cancel: &CancelSignal) -> Result<TransactionRecord> {
        let wallet = self.active_wallet().await?;
        self.send_transfer(&wallet, TransferParams::native(wallet.public_key, to, lamports), cancel)
            .await
    }

    pub async fn send_token(
        &self,
        to: Pubkey,
        mint: Pubkey,
        amount: u64,
        cancel: &CancelSignal,
    ) -> Result<TransactionRecord> {
        let wallet = self.active_wallet().await?;
        self.send_transfer(&wallet, TransferParams::token(wallet.public_key, to, mint, amount), cancel)
            .await
    }

    async fn send_transfer(
        &self,
        wallet: &WalletRef,
        params: TransferParams,
        cancel: &CancelSignal,
    ) -> Result<TransactionRecord> {
        let (tx, context) = self.pipeline.build(&params, cancel).await?;
        let (signed, review) = self.simulate_and_sign(wallet, tx, cancel).await?;
        let mut record = TransactionRecord::for_transfer(signed.signature(), &params, &review);
        self.submit_and_confirm(&signed, &context, &mut record, cancel).await?;
        Ok(record)
    }

    /// Simulate, review and sign. A failed simulation stops here; the review
    /// is only logged and carried on the record.
    async fn simulate_and_sign(
        &self,
        wallet: &WalletRef,
        tx: UnsignedTx,
        cancel: &CancelSignal,
    ) -> Result<(SignedTx, TransactionReview)> {
        let simulation = self.pipeline.simulate(&tx, cancel).await?.into_result()?;
        debug!(compute_units = ?simulation.compute_units, "simulation passed");

        let review = self.pipeline.review(&tx, cancel).await?;
        if review.risk > RiskLevel::Low {
            warn!(risk = ?review.risk, warnings = ?review.warnings, "transaction review flagged risk");
        }
        cancel.check()?;

        let index = wallet.index;
        let expected = wallet.public_key;
        let pipeline = &self.pipeline;
        let signed = self
            .vault
            .with_seed(&self.session_id, move |mnemonic| {
                let keypair = mnemonic.derive_keypair(index)?;
                if keypair.pubkey() != expected {
                    return Err(WalletError::Crypto(format!(
                        "Derived key for slot {} does not match the stored wallet",
                        index
                    )));
                }
                pipeline.sign(tx, keypair.signer())
            })
            .await?;
        Ok((signed, review))
    }

    async fn submit_and_confirm(
        &self,
        signed: &SignedTx,
        context: &TransactionContext,
        record: &mut TransactionRecord,
        cancel: &CancelSignal,
    ) -> Result<()> {
        self.pipeline.ensure_fresh(context, cancel).await?;
        let signature = self.pipeline.submit(signed).await?;
        record.signature = signature;
        self.events.emit(WalletEvent::TransactionSubmitted {
            signature,
            from: record.from,
        });

        let outcome = self.pipeline.confirm(&signature, context, cancel).await?;
        record.apply(&outcome);
        match &outcome {
            ConfirmationOutcome::Confirmed { slot } => {
                self.events.emit(WalletEvent::TransactionConfirmed { signature, slot: *slot });
            }
            ConfirmationOutcome::Expired => {
                self.events.emit(WalletEvent::TransactionFailed {
                    signature,
                    reason: "expired".to_string(),
                });
            }
            ConfirmationOutcome::Failed { reason } => {
                self.events.emit(WalletEvent::TransactionFailed {
                    signature,
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }

    pub async fn get_swap_quote(&self, request: &SwapRequest, cancel: &CancelSignal) -> Result<SwapQuote> {
        cancel.run(self.swaps.get_quote(request)).await
    }

    /// Consume a quote: build, simulate, sign, send and confirm
    pub async fn execute_swap(&self, quote: SwapQuote, cancel: &CancelSignal) -> Result<TransactionRecord> {
        let wallet = self.active_wallet().await?;
        if &quote.network != self.swaps.network() {
            return Err(WalletError::InvalidInput(
                "Quote was issued for a different network".to_string(),
            ));
        }

        let swap = cancel.run(self.swaps.build_swap_tx(quote, &wallet.public_key)).await?;
        let last_valid_height = match swap.last_valid_block_height {
            Some(height) => height,
            None => {
                warn!(quote_id = %swap.quote_id, "provider did not report a last valid height, estimating");
                cancel.run(self.gateway.get_block_height()).await? + MAX_PROCESSING_AGE as u64
            }
        };
        let mut context = TransactionContext::new(*swap.tx.recent_blockhash(), last_valid_height);
        context
            .extra
            .insert("quote_id".to_string(), swap.quote_id.to_string());

        let (signed, review) = self.simulate_and_sign(&wallet, swap.tx, cancel).await?;
        let mut record = TransactionRecord::new(signed.signature(), wallet.public_key, &review);
        self.submit_and_confirm(&signed, &context, &mut record, cancel).await?;
        Ok(record)
    }
}

impl Drop for WalletService {
    fn drop(&mut self) {
        self.health_cancel.cancel();
    }
}
