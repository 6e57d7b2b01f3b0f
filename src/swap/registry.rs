use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SwapConfig;
use crate::error::{Result, WalletError};
use crate::rpc::SolanaNetwork;
use crate::swap::{JupiterProvider, NativeAmmProvider, SwapProvider, SwapQuote, SwapRequest, SwapTransaction};

/// Swap providers for one network
///
/// The network is detected once from the RPC endpoint string; providers are
/// consulted in registration order.
pub struct SwapProviderRegistry {
    network: SolanaNetwork,
    providers: Vec<Arc<dyn SwapProvider>>,
}

impl SwapProviderRegistry {
    pub fn new(endpoint: &str, providers: Vec<Arc<dyn SwapProvider>>) -> Self {
        let network = SolanaNetwork::detect(endpoint);
        debug!(network = network.name(), providers = providers.len(), "swap registry ready");
        Self { network, providers }
    }

    /// Jupiter first, then the native AMM when enabled
    pub fn from_config(endpoint: &str, config: &SwapConfig) -> Result<Self> {
        let mut providers: Vec<Arc<dyn SwapProvider>> = vec![Arc::new(JupiterProvider::new(
            config.aggregator_url.clone(),
            config.default_slippage_bps,
        )?)];
        if config.native_amm_enabled {
            providers.push(Arc::new(NativeAmmProvider::new()));
        }
        Ok(Self::new(endpoint, providers))
    }

    pub fn network(&self) -> &SolanaNetwork {
        &self.network
    }

    pub fn provider(&self, id: &str) -> Option<&Arc<dyn SwapProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    /// Quote from the first provider that supports the current network
    pub async fn get_quote(&self, request: &SwapRequest) -> Result<SwapQuote> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.supports(&self.network, request))
            .ok_or_else(|| {
                WalletError::NotSupported(format!("No swap provider available on {}", self.network.name()))
            })?;

        info!(provider = provider.id(), network = self.network.name(), amount_in = request.amount_in, "requesting swap quote");
        provider.get_quote(&self.network, request).await
    }

    /// Build with the provider that issued the quote
    pub async fn build_swap_tx(&self, quote: SwapQuote, signer: &Pubkey) -> Result<SwapTransaction> {
        let provider = self.provider(&quote.provider_id).ok_or_else(|| {
            WalletError::NotSupported(format!("Unknown swap provider {}", quote.provider_id))
        })?;
        provider.build_swap_tx(quote, signer).await
    }

    /// Build with an explicitly chosen provider; it rejects quotes it did not issue
    pub async fn build_swap_tx_with(
        &self,
        provider_id: &str,
        quote: SwapQuote,
        signer: &Pubkey,
    ) -> Result<SwapTransaction> {
        let provider = self
            .provider(provider_id)
            .ok_or_else(|| WalletError::NotSupported(format!("Unknown swap provider {}", provider_id)))?;
        provider.build_swap_tx(quote, signer).await
    }
}
