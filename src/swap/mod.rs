//! Pluggable swap providers.
//!
//! A provider quotes a swap and turns its own quote into an unsigned
//! transaction. Quotes are single-use and bound to the provider that issued
//! them.

pub mod jupiter;
pub mod native_amm;
pub mod registry;

pub use jupiter::JupiterProvider;
pub use native_amm::NativeAmmProvider;
pub use registry::SwapProviderRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use uuid::Uuid;

use crate::error::{Result, WalletError};
use crate::rpc::SolanaNetwork;
use crate::transaction::UnsignedTx;

/// Wrapped SOL mint
pub const NATIVE_MINT: Pubkey = spl_token::native_mint::ID;

/// What the user wants to swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapRequest {
    pub from_mint: Pubkey,
    pub to_mint: Pubkey,
    pub amount_in: u64,
    /// Provider default applies when unset
    pub slippage_bps: Option<u16>,
}

impl SwapRequest {
    pub fn new(from_mint: Pubkey, to_mint: Pubkey, amount_in: u64) -> Self {
        Self {
            from_mint,
            to_mint,
            amount_in,
            slippage_bps: None,
        }
    }

    pub fn with_slippage_bps(mut self, bps: u16) -> Self {
        self.slippage_bps = Some(bps);
        self
    }

    /// Distinct mints and a positive amount
    pub fn is_well_formed(&self) -> bool {
        self.from_mint != self.to_mint && self.amount_in > 0
    }
}

/// Priced quote from one provider
///
/// Deliberately not `Clone`: building a transaction consumes the quote.
#[derive(Debug, Serialize)]
pub struct SwapQuote {
    pub id: Uuid,
    pub provider_id: String,
    pub from_mint: Pubkey,
    pub to_mint: Pubkey,
    pub amount_in: u64,
    pub amount_out: u64,
    pub min_amount_out: u64,
    pub price_impact_bps: u32,
    pub fees_lamports: u64,
    pub network: SolanaNetwork,
    /// Provider-private route payload, passed back unmodified
    pub opaque_route_data: Value,
    pub created_at: DateTime<Utc>,
}

/// Unsigned swap transaction plus the height it stays valid until, when the provider reports one
#[derive(Debug)]
pub struct SwapTransaction {
    pub quote_id: Uuid,
    pub tx: UnsignedTx,
    pub last_valid_block_height: Option<u64>,
}

#[async_trait]
pub trait SwapProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Whether this provider can serve `request` on `network`.
    /// Providers without execution support always answer `false`.
    fn supports(&self, network: &SolanaNetwork, request: &SwapRequest) -> bool;

    async fn get_quote(&self, network: &SolanaNetwork, request: &SwapRequest) -> Result<SwapQuote>;

    /// Build the unsigned transaction for a quote this provider issued
    async fn build_swap_tx(&self, quote: SwapQuote, signer: &Pubkey) -> Result<SwapTransaction>;
}

/// Reject quotes issued by another provider
pub fn ensure_provider(quote: &SwapQuote, provider_id: &str) -> Result<()> {
    if quote.provider_id != provider_id {
        return Err(WalletError::ProviderMismatch {
            quote_provider: quote.provider_id.clone(),
            provider: provider_id.to_string(),
        });
    }
    Ok(())
}
