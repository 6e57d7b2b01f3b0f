use serde::Serialize;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};

use crate::error::{Result, WalletError};

/// What a transfer moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferKind {
    /// Native SOL, in lamports
    Native { lamports: u64 },
    /// SPL token, in base units
    Token { mint: Pubkey, amount: u64 },
}

/// Sender, recipient and amount of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferParams {
    pub from: Pubkey,
    pub to: Pubkey,
    pub kind: TransferKind,
}

impl TransferParams {
    pub fn native(from: Pubkey, to: Pubkey, lamports: u64) -> Self {
        Self {
            from,
            to,
            kind: TransferKind::Native { lamports },
        }
    }

    pub fn token(from: Pubkey, to: Pubkey, mint: Pubkey, amount: u64) -> Self {
        Self {
            from,
            to,
            kind: TransferKind::Token { mint, amount },
        }
    }

    pub fn amount(&self) -> u64 {
        match self.kind {
            TransferKind::Native { lamports } => lamports,
            TransferKind::Token { amount, .. } => amount,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount() == 0 {
            return Err(WalletError::InvalidInput("Amount must be greater than zero".to_string()));
        }
        if self.from == self.to {
            return Err(WalletError::InvalidInput("Cannot transfer to the sending address".to_string()));
        }
        Ok(())
    }
}

/// Compiled message awaiting a signature
///
/// Signature slots are zero-filled placeholders until [`sign`](crate::transaction::TransactionPipeline::sign).
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    transaction: VersionedTransaction,
}

impl UnsignedTx {
    pub fn from_message(message: VersionedMessage) -> Self {
        let required = message.header().num_required_signatures as usize;
        Self {
            transaction: VersionedTransaction {
                signatures: vec![Signature::default(); required],
                message,
            },
        }
    }

    /// Wrap a transaction produced elsewhere (e.g. a swap provider); existing signatures are discarded
    pub fn from_versioned(transaction: VersionedTransaction) -> Self {
        Self::from_message(transaction.message)
    }

    pub fn message(&self) -> &VersionedMessage {
        &self.transaction.message
    }

    pub fn as_versioned(&self) -> &VersionedTransaction {
        &self.transaction
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.transaction.message.static_account_keys().first()
    }

    pub fn recent_blockhash(&self) -> &Hash {
        self.transaction.message.recent_blockhash()
    }

    pub fn instruction_count(&self) -> usize {
        self.transaction.message.instructions().len()
    }

    pub fn required_signatures(&self) -> usize {
        self.transaction.message.header().num_required_signatures as usize
    }

    pub(crate) fn into_message(self) -> VersionedMessage {
        self.transaction.message
    }
}

/// Accumulates instructions for one fee payer
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    instructions: Vec<Instruction>,
    fee_payer: Option<Pubkey>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account that pays the network fee
    pub fn fee_payer(mut self, payer: Pubkey) -> Self {
        self.fee_payer = Some(payer);
        self
    }

    /// Append a system transfer
    pub fn add_transfer(mut self, from: &Pubkey, to: &Pubkey, lamports: u64) -> Self {
        self.instructions
            .push(system_instruction::transfer(from, to, lamports));
        self
    }

    /// Append creation of `owner`'s associated token account, paid by `payer`
    pub fn add_create_ata(mut self, payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Self {
        self.instructions.push(create_associated_token_account(
            payer,
            owner,
            mint,
            &spl_token::id(),
        ));
        self
    }

    /// Append an SPL token transfer
    pub fn add_token_transfer(
        mut self,
        source: &Pubkey,
        destination: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> Result<Self> {
        let instruction = spl_token::instruction::transfer(
            &spl_token::id(),
            source,
            destination,
            authority,
            &[],
            amount,
        )
        .map_err(|e| WalletError::InvalidInput(format!("Failed to build token transfer: {}", e)))?;
        self.instructions.push(instruction);
        Ok(self)
    }

    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Compile against `blockhash`
    pub fn build(self, blockhash: Hash) -> Result<UnsignedTx> {
        if self.instructions.is_empty() {
            return Err(WalletError::InvalidInput("No instructions to build transaction".to_string()));
        }
        let fee_payer = self
            .fee_payer
            .ok_or_else(|| WalletError::InvalidInput("Fee payer not set".to_string()))?;

        let message = Message::new_with_blockhash(&self.instructions, Some(&fee_payer), &blockhash);
        Ok(UnsignedTx::from_message(VersionedMessage::Legacy(message)))
    }
}

/// Token accounts a transfer moves between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRoute {
    pub source: Pubkey,
    pub destination: Pubkey,
}

pub fn token_route(from: &Pubkey, to: &Pubkey, mint: &Pubkey) -> TokenRoute {
    TokenRoute {
        source: get_associated_token_address(from, mint),
        destination: get_associated_token_address(to, mint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_transfer_has_one_instruction() {
        let from = Pubkey::new_unique();
        let tx = TransactionBuilder::new()
            .fee_payer(from)
            .add_transfer(&from, &Pubkey::new_unique(), 1_000)
            .build(Hash::new_unique())
            .unwrap();
        assert_eq!(tx.instruction_count(), 1);
        assert_eq!(tx.required_signatures(), 1);
        assert_eq!(tx.fee_payer(), Some(&from));
        assert_eq!(tx.as_versioned().signatures, vec![Signature::default()]);
    }

    #[test]
    fn test_empty_builder_rejected() {
        let result = TransactionBuilder::new()
            .fee_payer(Pubkey::new_unique())
            .build(Hash::default());
        assert!(matches!(result, Err(WalletError::InvalidInput(_))));

        let result = TransactionBuilder::new()
            .add_transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 1)
            .build(Hash::default());
        assert!(matches!(result, Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn test_params_validation() {
        let a = Pubkey::new_unique();
        assert!(TransferParams::native(a, Pubkey::new_unique(), 0).validate().is_err());
        assert!(TransferParams::native(a, a, 10).validate().is_err());
        assert!(TransferParams::token(a, Pubkey::new_unique(), Pubkey::new_unique(), 5)
            .validate()
            .is_ok());
    }
}
