use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};

use crate::transaction::builder::{TransferKind, TransferParams};
use crate::transaction::pipeline::ConfirmationOutcome;
use crate::transaction::review::{InstructionKind, RiskLevel, TransactionReview};
use crate::transaction::simulate::FeeEstimate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Expired,
    Failed(String),
}

impl From<&ConfirmationOutcome> for TransactionStatus {
    fn from(outcome: &ConfirmationOutcome) -> Self {
        match outcome {
            ConfirmationOutcome::Confirmed { .. } => TransactionStatus::Confirmed,
            ConfirmationOutcome::Expired => TransactionStatus::Expired,
            ConfirmationOutcome::Failed { reason } => TransactionStatus::Failed(reason.clone()),
        }
    }
}

/// A sent transaction as the wallet remembers it
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub signature: Signature,
    pub from: Pubkey,
    pub to: Option<Pubkey>,
    pub kind: Option<TransferKind>,
    pub fee: FeeEstimate,
    pub instructions: Vec<InstructionKind>,
    /// Advisory only; a high risk never stops the send
    pub risk: RiskLevel,
    pub warnings: Vec<String>,
    pub status: TransactionStatus,
    pub slot: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    /// Pending record carrying the pre-send review
    pub fn new(signature: Signature, from: Pubkey, review: &TransactionReview) -> Self {
        Self {
            signature,
            from,
            to: None,
            kind: None,
            fee: review.fee,
            instructions: review.instructions.clone(),
            risk: review.risk,
            warnings: review.warnings.clone(),
            status: TransactionStatus::Pending,
            slot: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_transfer(signature: Signature, params: &TransferParams, review: &TransactionReview) -> Self {
        Self {
            to: Some(params.to),
            kind: Some(params.kind),
            ..Self::new(signature, params.from, review)
        }
    }

    pub fn apply(&mut self, outcome: &ConfirmationOutcome) {
        self.status = outcome.into();
        if let ConfirmationOutcome::Confirmed { slot } = outcome {
            self.slot = Some(*slot);
        }
    }

    pub fn fee_in_sol(&self) -> f64 {
        self.fee.in_sol()
    }
}
