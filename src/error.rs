//! Error types for the wallet core.
//!
//! Callers branch on the variant (and on [`RpcErrorKind`] for network
//! failures), never on message text. [`WalletError::user_message`] is the only
//! string meant for end users; everything else is for logs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::simulate::SimulationFailure;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, WalletError>;

/// Classification of a failed RPC exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcErrorKind {
    /// Connection refused, reset, DNS, 5xx, node unhealthy
    Network,
    /// Request or response exceeded its deadline
    Timeout,
    /// The node rejected the request shape or arguments
    InvalidParams,
    /// `sendTransaction` preflight simulation rejected the transaction
    PreflightFailure,
    /// HTTP 429 or provider-specific throttling
    RateLimited,
}

impl RpcErrorKind {
    /// Whether the gateway may retry a request that failed this way
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            RpcErrorKind::Network | RpcErrorKind::Timeout | RpcErrorKind::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RpcErrorKind::Network => "network",
            RpcErrorKind::Timeout => "timeout",
            RpcErrorKind::InvalidParams => "invalid_params",
            RpcErrorKind::PreflightFailure => "preflight_failure",
            RpcErrorKind::RateLimited => "rate_limited",
        }
    }

    /// Short, non-technical message for the UI layer
    pub fn user_message(self) -> &'static str {
        match self {
            RpcErrorKind::Network => "Unable to reach the network. Please check your connection.",
            RpcErrorKind::Timeout => "The network is taking too long to respond. Please try again.",
            RpcErrorKind::InvalidParams => "The request was invalid. Please check the details and try again.",
            RpcErrorKind::PreflightFailure => "The transaction was rejected before sending. Please review it.",
            RpcErrorKind::RateLimited => "Too many requests, please wait",
        }
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified RPC failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub kind: RpcErrorKind,
    /// Diagnostic message; may contain raw provider payloads
    pub message: String,
    /// JSON-RPC error code, when the node returned one
    pub code: Option<i64>,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "rpc error (class={}, code={}): {}", self.kind, code, self.message),
            None => write!(f, "rpc error (class={}): {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RpcError {}

/// Wallet core errors
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Classified RPC failure, surfaced after retries are exhausted
    #[error("{0}")]
    Network(#[from] RpcError),

    /// Wrong passphrase or tampered ciphertext
    #[error("Authentication failed: wrong passphrase or corrupted data")]
    AuthenticationFailed,

    /// All wallet slots are in use
    #[error("Wallet capacity exceeded: at most {max} wallets")]
    CapacityExceeded { max: u32 },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Simulation failed ({reason:?}): {detail}")]
    SimulationFailed {
        reason: SimulationFailure,
        detail: String,
    },

    /// The blockhash behind a transaction context is no longer valid
    #[error("Transaction expired: blockhash no longer valid")]
    Expired,

    /// Route data from one swap provider was handed to another
    #[error("Provider mismatch: quote from '{quote_provider}' used with '{provider}'")]
    ProviderMismatch {
        quote_provider: String,
        provider: String,
    },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Wallet not found at index {0}")]
    WalletNotFound(u32),

    /// Removing the wallet would leave the collection empty
    #[error("Cannot remove the last remaining wallet")]
    LastWallet,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// No seed has been created or imported yet
    #[error("Wallet not initialized")]
    NotInitialized,

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    /// Network error kind, if this is a classified RPC failure
    pub fn rpc_kind(&self) -> Option<RpcErrorKind> {
        match self {
            WalletError::Network(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        self.rpc_kind().map(RpcErrorKind::is_transient).unwrap_or(false)
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            WalletError::Network(e) => e.kind.user_message().to_string(),
            WalletError::AuthenticationFailed => {
                "Incorrect password. Please try again.".to_string()
            }
            WalletError::CapacityExceeded { max } => {
                format!("You can have at most {} wallets.", max)
            }
            WalletError::InsufficientFunds(_) => {
                "You don't have enough funds for this transaction.".to_string()
            }
            WalletError::AccountNotFound(_) => {
                "The account could not be found on the network.".to_string()
            }
            WalletError::SimulationFailed { reason, .. } => reason.user_message().to_string(),
            WalletError::Expired => {
                "The transaction expired before it was confirmed. Please try again.".to_string()
            }
            WalletError::ProviderMismatch { .. } => {
                "This quote can no longer be used. Please request a new quote.".to_string()
            }
            WalletError::NotSupported(_) => {
                "This operation is not available on the current network.".to_string()
            }
            WalletError::Cancelled => "The operation was cancelled.".to_string(),
            WalletError::WalletNotFound(_) => "That wallet no longer exists.".to_string(),
            WalletError::LastWallet => "You must keep at least one wallet.".to_string(),
            WalletError::InvalidInput(msg) => msg.clone(),
            WalletError::InvalidMnemonic(_) => {
                "The recovery phrase is invalid. Please check and try again.".to_string()
            }
            WalletError::NotInitialized => "Create or import a wallet first.".to_string(),
            WalletError::Crypto(_)
            | WalletError::Storage(_)
            | WalletError::Io(_)
            | WalletError::Serialization(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}
