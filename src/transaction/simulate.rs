use serde::Serialize;
use serde_json::Value;

use crate::error::WalletError;
use crate::rpc::RpcSimulation;

/// Lamports charged per required signature when the node cannot price a message
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Why a simulation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationFailure {
    InsufficientFunds,
    AccountNotFound,
    InvalidAddress,
    InvalidOwner,
    BlockhashNotFound,
    Other,
}

impl SimulationFailure {
    /// Structured error names first; log text only as a last resort
    pub fn classify(err: &Value, logs: &[String]) -> Self {
        Self::from_structured(err).unwrap_or_else(|| Self::from_text(err, logs))
    }

    fn from_structured(err: &Value) -> Option<Self> {
        match err {
            Value::String(name) => Self::from_error_name(name),
            Value::Object(map) => {
                // {"InstructionError": [index, "Name" | {"Custom": code}]}
                let detail = map.get("InstructionError")?.as_array()?.get(1)?;
                match detail {
                    Value::String(name) => Self::from_error_name(name),
                    Value::Object(custom) => match custom.get("Custom")?.as_u64()? {
                        // System ResultWithNegativeLamports and SPL token InsufficientFunds
                        1 => Some(Self::InsufficientFunds),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn from_error_name(name: &str) -> Option<Self> {
        match name {
            "InsufficientFundsForFee" | "InsufficientFundsForRent" | "InsufficientFunds" => {
                Some(Self::InsufficientFunds)
            }
            "AccountNotFound" | "ProgramAccountNotFound" | "InvalidAccountData" | "UninitializedAccount" => {
                Some(Self::AccountNotFound)
            }
            "InvalidArgument" | "InvalidAccountIndex" => Some(Self::InvalidAddress),
            "IllegalOwner" | "InvalidAccountOwner" | "IncorrectProgramId" => Some(Self::InvalidOwner),
            "BlockhashNotFound" => Some(Self::BlockhashNotFound),
            _ => None,
        }
    }

    fn from_text(err: &Value, logs: &[String]) -> Self {
        let mut haystack = match err {
            Value::String(s) => s.to_ascii_lowercase(),
            other => other.to_string().to_ascii_lowercase(),
        };
        for line in logs {
            haystack.push('\n');
            haystack.push_str(&line.to_ascii_lowercase());
        }

        if haystack.contains("insufficient") {
            Self::InsufficientFunds
        } else if haystack.contains("account not found") || haystack.contains("could not find account") {
            Self::AccountNotFound
        } else if haystack.contains("invalid base58")
            || haystack.contains("invalid pubkey")
            || haystack.contains("wrongsize")
        {
            Self::InvalidAddress
        } else if haystack.contains("owner does not match") {
            Self::InvalidOwner
        } else {
            Self::Other
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InsufficientFunds => "Insufficient funds to cover the amount and network fee",
            Self::AccountNotFound => "A required account was not found on chain",
            Self::InvalidAddress => "The recipient address is invalid",
            Self::InvalidOwner => "An account is owned by an unexpected program",
            Self::BlockhashNotFound => "The network did not recognise the recent blockhash",
            Self::Other => "The transaction would fail on chain",
        }
    }

    /// Error for a transaction that failed simulation; `detail` is for logs only
    pub fn into_error(self, detail: String) -> WalletError {
        match self {
            Self::InsufficientFunds => WalletError::InsufficientFunds(detail),
            Self::AccountNotFound => WalletError::AccountNotFound(detail),
            reason => WalletError::SimulationFailed { reason, detail },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub success: bool,
    pub logs: Vec<String>,
    pub compute_units: Option<u64>,
    pub failure: Option<SimulationFailure>,
    /// Raw node error, kept for diagnostics
    #[serde(skip)]
    pub detail: Option<String>,
}

impl SimulationResult {
    pub fn from_rpc(simulation: RpcSimulation) -> Self {
        let logs = simulation.logs.unwrap_or_default();
        let failure = simulation
            .err
            .as_ref()
            .map(|err| SimulationFailure::classify(err, &logs));
        Self {
            success: failure.is_none(),
            logs,
            compute_units: simulation.units_consumed,
            failure,
            detail: simulation.err.map(|err| err.to_string()),
        }
    }

    /// Short human-readable reason for a failed simulation
    pub fn error_message(&self) -> Option<&'static str> {
        self.failure.map(SimulationFailure::user_message)
    }

    /// `Ok(self)` when the simulation succeeded, the typed failure otherwise
    pub fn into_result(self) -> Result<Self, WalletError> {
        match self.failure {
            None => Ok(self),
            Some(failure) => Err(failure.into_error(self.detail.unwrap_or_default())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeEstimate {
    pub lamports: u64,
    /// True when derived from the per-signature fallback instead of the node
    pub approximate: bool,
}

impl FeeEstimate {
    pub fn exact(lamports: u64) -> Self {
        Self {
            lamports,
            approximate: false,
        }
    }

    pub fn fallback(signatures: usize) -> Self {
        Self {
            lamports: (signatures as u64).saturating_mul(LAMPORTS_PER_SIGNATURE),
            approximate: true,
        }
    }

    pub fn in_sol(&self) -> f64 {
        self.lamports as f64 / 1_000_000_000.0
    }
}
