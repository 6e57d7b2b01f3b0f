use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, system_instruction::SystemInstruction};
use spl_token::instruction::TokenInstruction;
use std::fmt;

use crate::transaction::builder::UnsignedTx;
use crate::transaction::simulate::FeeEstimate;

/// Fee above which a warning is attached (SOL)
pub const FEE_WARNING_SOL: f64 = 0.01;
/// Fee above which the transaction is high risk regardless of warnings (SOL)
pub const FEE_HIGH_RISK_SOL: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Decoded instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstructionKind {
    SystemTransfer { from: Pubkey, to: Pubkey, lamports: u64 },
    TokenTransfer { source: Pubkey, destination: Pubkey, amount: u64 },
    /// Create associated token account
    CreateAssociatedAccount { owner: Pubkey, mint: Pubkey },
    ComputeBudget,
    /// Anything not recognised above
    Unknown { program_id: Pubkey },
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionKind::SystemTransfer { to, lamports, .. } => {
                write!(f, "Transfer {} SOL to {}", *lamports as f64 / 1_000_000_000.0, short(to))
            }
            InstructionKind::TokenTransfer { destination, amount, .. } => {
                write!(f, "Transfer {} token units to {}", amount, short(destination))
            }
            InstructionKind::CreateAssociatedAccount { owner, mint } => {
                write!(f, "Create token account for {} (mint {})", short(owner), short(mint))
            }
            InstructionKind::ComputeBudget => write!(f, "Set compute budget"),
            InstructionKind::Unknown { program_id } => write!(f, "Call program {}", short(program_id)),
        }
    }
}

fn short(key: &Pubkey) -> String {
    let s = key.to_string();
    format!("{}...", &s[..s.len().min(8)])
}

/// Pre-signing summary. Advisory: it never blocks a send
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReview {
    pub fee_payer: Option<Pubkey>,
    pub instructions: Vec<InstructionKind>,
    pub fee: FeeEstimate,
    pub warnings: Vec<String>,
    pub risk: RiskLevel,
}

/// `fee > 0.1 SOL` or more than two warnings is high; any warning is medium
pub fn assess_risk(fee_sol: f64, warning_count: usize) -> RiskLevel {
    if fee_sol > FEE_HIGH_RISK_SOL || warning_count > 2 {
        RiskLevel::High
    } else if warning_count >= 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Decode instructions and annotate risk
pub fn review_transaction(tx: &UnsignedTx, fee: FeeEstimate) -> TransactionReview {
    let message = tx.message();
    let keys = message.static_account_keys();

    let instructions: Vec<InstructionKind> = message
        .instructions()
        .iter()
        .map(|ix| {
            let program_id = keys
                .get(ix.program_id_index as usize)
                .copied()
                .unwrap_or_default();
            // Lookup-table accounts are not resolved here; they decode as default keys.
            let accounts: Vec<Pubkey> = ix
                .accounts
                .iter()
                .map(|&i| keys.get(i as usize).copied().unwrap_or_default())
                .collect();
            identify_instruction(&program_id, &accounts, &ix.data)
        })
        .collect();

    let mut warnings = Vec::new();
    for kind in &instructions {
        if let InstructionKind::Unknown { program_id } = kind {
            warnings.push(format!("Interacts with unrecognised program {}", program_id));
        }
    }
    if fee.in_sol() > FEE_WARNING_SOL {
        warnings.push(format!("High network fee: {} SOL", fee.in_sol()));
    }

    let risk = assess_risk(fee.in_sol(), warnings.len());
    TransactionReview {
        fee_payer: tx.fee_payer().copied(),
        instructions,
        fee,
        warnings,
        risk,
    }
}

/// Decode one instruction by program id
pub fn identify_instruction(program_id: &Pubkey, accounts: &[Pubkey], data: &[u8]) -> InstructionKind {
    let account = |i: usize| accounts.get(i).copied().unwrap_or_default();

    if program_id == &solana_sdk::system_program::id() {
        if let Ok(SystemInstruction::Transfer { lamports }) = bincode::deserialize(data) {
            return InstructionKind::SystemTransfer {
                from: account(0),
                to: account(1),
                lamports,
            };
        }
    } else if program_id == &spl_token::id() {
        match TokenInstruction::unpack(data) {
            Ok(TokenInstruction::Transfer { amount }) => {
                return InstructionKind::TokenTransfer {
                    source: account(0),
                    destination: account(1),
                    amount,
                };
            }
            Ok(TokenInstruction::TransferChecked { amount, .. }) => {
                return InstructionKind::TokenTransfer {
                    source: account(0),
                    destination: account(2),
                    amount,
                };
            }
            _ => {}
        }
    } else if program_id == &spl_associated_token_account::id() {
        // Create (empty or 0) and CreateIdempotent (1) share the account layout
        if data.is_empty() || data[0] <= 1 {
            return InstructionKind::CreateAssociatedAccount {
                owner: account(2),
                mint: account(3),
            };
        }
    } else if program_id == &solana_sdk::compute_budget::id() {
        return InstructionKind::ComputeBudget;
    }

    InstructionKind::Unknown {
        program_id: *program_id,
    }
}
