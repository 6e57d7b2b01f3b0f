//! Build → simulate → sign → submit → confirm.
//!
//! Each step is a separate call so callers can show a review between
//! simulation and signing. Nothing here retries a submission. Every network
//! step takes a [`CancelSignal`] and stops mid-retry when it fires.

use serde::Serialize;
use solana_sdk::{
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::ConfirmationConfig;
use crate::error::{Result, WalletError};
use crate::rpc::{RpcGateway, TransactionContext};
use crate::transaction::builder::{token_route, TransactionBuilder, TransferKind, TransferParams, UnsignedTx};
use crate::transaction::review::{review_transaction, TransactionReview};
use crate::transaction::simulate::{FeeEstimate, SimulationFailure, SimulationResult};

/// Transaction carrying its signature
#[derive(Debug, Clone)]
pub struct SignedTx {
    transaction: VersionedTransaction,
}

impl SignedTx {
    /// First signature, which identifies the transaction on chain
    pub fn signature(&self) -> Signature {
        self.transaction.signatures.first().copied().unwrap_or_default()
    }

    pub fn as_versioned(&self) -> &VersionedTransaction {
        &self.transaction
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&self.transaction)
            .map_err(|e| WalletError::InvalidInput(format!("Failed to serialize transaction: {}", e)))
    }
}

/// How a submitted transaction ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConfirmationOutcome {
    Confirmed { slot: u64 },
    /// The blockhash passed its last valid height before the signature landed
    Expired,
    Failed { reason: String },
}

pub struct TransactionPipeline {
    gateway: Arc<RpcGateway>,
    confirmation: ConfirmationConfig,
}

impl TransactionPipeline {
    pub fn new(gateway: Arc<RpcGateway>, confirmation: ConfirmationConfig) -> Self {
        Self { gateway, confirmation }
    }

    pub fn gateway(&self) -> &Arc<RpcGateway> {
        &self.gateway
    }

    /// Build an unsigned transfer
    ///
    /// Token transfers look up the recipient's associated token account and
    /// prepend its creation (paid by the sender) when it does not exist.
    pub async fn build(
        &self,
        params: &TransferParams,
        cancel: &CancelSignal,
    ) -> Result<(UnsignedTx, TransactionContext)> {
        params.validate()?;

        let builder = TransactionBuilder::new().fee_payer(params.from);
        let builder = match params.kind {
            TransferKind::Native { lamports } => builder.add_transfer(&params.from, &params.to, lamports),
            TransferKind::Token { mint, amount } => {
                let route = token_route(&params.from, &params.to, &mint);
                let recipient_account = cancel.run(self.gateway.get_account_info(&route.destination)).await?;
                let builder = if recipient_account.is_none() {
                    debug!(recipient = %params.to, %mint, "recipient token account missing, adding create instruction");
                    builder.add_create_ata(&params.from, &params.to, &mint)
                } else {
                    builder
                };
                builder.add_token_transfer(&route.source, &route.destination, &params.from, amount)?
            }
        };

        let context = cancel.run(self.gateway.get_latest_blockhash()).await?;
        let tx = builder.build(context.blockhash)?;
        debug!(
            from = %params.from,
            to = %params.to,
            instructions = tx.instruction_count(),
            last_valid_height = context.last_valid_height,
            "transaction built"
        );
        Ok((tx, context))
    }

    /// Simulate; an on-chain failure comes back as `success: false`, not as an error
    pub async fn simulate(&self, tx: &UnsignedTx, cancel: &CancelSignal) -> Result<SimulationResult> {
        let simulation = cancel.run(self.gateway.simulate_transaction(tx.as_versioned())).await?;
        if let Some(err) = &simulation.err {
            warn!(error = %err, logs = ?simulation.logs, "simulation reported failure");
        }
        Ok(SimulationResult::from_rpc(simulation))
    }

    /// Price the message. Node failures fall back to the per-signature fee; only cancellation errors
    pub async fn estimate_fee(&self, tx: &UnsignedTx, cancel: &CancelSignal) -> Result<FeeEstimate> {
        match cancel.run(self.gateway.get_fee_for_message(tx.message())).await {
            Ok(Some(lamports)) => Ok(FeeEstimate::exact(lamports)),
            Ok(None) => {
                warn!("node could not price message, using per-signature fallback");
                Ok(FeeEstimate::fallback(tx.required_signatures()))
            }
            Err(WalletError::Cancelled) => Err(WalletError::Cancelled),
            Err(e) => {
                warn!("fee lookup failed, using per-signature fallback: {}", e);
                Ok(FeeEstimate::fallback(tx.required_signatures()))
            }
        }
    }

    /// Fee estimate plus decoded instructions and risk annotation
    pub async fn review(&self, tx: &UnsignedTx, cancel: &CancelSignal) -> Result<TransactionReview> {
        let fee = self.estimate_fee(tx, cancel).await?;
        Ok(review_transaction(tx, fee))
    }

    pub fn sign(&self, tx: UnsignedTx, signer: &Keypair) -> Result<SignedTx> {
        let transaction = VersionedTransaction::try_new(tx.into_message(), &[signer])
            .map_err(|e| WalletError::Crypto(format!("Failed to sign transaction: {}", e)))?;
        Ok(SignedTx { transaction })
    }

    /// Fail with [`WalletError::Expired`] if the chain has passed the context's last valid height
    pub async fn ensure_fresh(&self, context: &TransactionContext, cancel: &CancelSignal) -> Result<()> {
        let height = cancel.run(self.gateway.get_block_height()).await?;
        if context.is_expired_at(height) {
            warn!(height, last_valid_height = context.last_valid_height, "refusing to submit with expired blockhash");
            return Err(WalletError::Expired);
        }
        Ok(())
    }

    /// Send once. Never retried
    pub async fn submit(&self, signed: &SignedTx) -> Result<Signature> {
        let raw = signed.to_bytes()?;
        let signature = self.gateway.send_raw_transaction(&raw).await?;
        info!(%signature, "transaction submitted");
        Ok(signature)
    }

    /// Poll until confirmed, returning early once the blockhash expires
    pub async fn confirm(
        &self,
        signature: &Signature,
        context: &TransactionContext,
        cancel: &CancelSignal,
    ) -> Result<ConfirmationOutcome> {
        let max_attempts = self.confirmation.max_attempts;

        for attempt in 1..=max_attempts {
            cancel.check()?;

            match self.gateway.get_signature_statuses(&[*signature], cancel).await {
                Ok(statuses) => {
                    if let Some(Some(status)) = statuses.into_iter().next() {
                        if let Some(err) = &status.err {
                            let reason = SimulationFailure::classify(err, &[]).user_message().to_string();
                            warn!(%signature, error = %err, "transaction failed on chain");
                            return Ok(ConfirmationOutcome::Failed { reason });
                        }
                        if status.is_confirmed() {
                            info!(%signature, slot = status.slot, attempt, "transaction confirmed");
                            return Ok(ConfirmationOutcome::Confirmed { slot: status.slot });
                        }
                    }
                }
                Err(WalletError::Cancelled) => return Err(WalletError::Cancelled),
                Err(e) => warn!(%signature, attempt, "status poll failed: {}", e),
            }

            if attempt >= self.confirmation.expiry_check_after {
                let height = tokio::select! {
                    _ = cancel.cancelled() => return Err(WalletError::Cancelled),
                    height = self.gateway.get_block_height() => height,
                };
                match height {
                    Ok(height) if context.is_expired_at(height) => {
                        warn!(%signature, height, last_valid_height = context.last_valid_height, "blockhash expired before confirmation");
                        return Ok(ConfirmationOutcome::Expired);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%signature, "block height check failed: {}", e),
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(WalletError::Cancelled),
                    _ = tokio::time::sleep(self.confirmation.poll_interval()) => {}
                }
            }
        }

        Ok(ConfirmationOutcome::Failed {
            reason: format!("not confirmed after {} attempts", max_attempts),
        })
    }
}
