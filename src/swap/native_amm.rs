use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::{Result, WalletError};
use crate::rpc::SolanaNetwork;
use crate::swap::{ensure_provider, SwapProvider, SwapQuote, SwapRequest, SwapTransaction};

pub const PROVIDER_ID: &str = "native-amm";

/// On-chain AMM for custom and forked networks.
///
/// Registered so that fork endpoints resolve to a provider, but execution is
/// not implemented; `supports` is always false.
#[derive(Debug, Default)]
pub struct NativeAmmProvider;

impl NativeAmmProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SwapProvider for NativeAmmProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports(&self, _network: &SolanaNetwork, _request: &SwapRequest) -> bool {
        false
    }

    async fn get_quote(&self, network: &SolanaNetwork, _request: &SwapRequest) -> Result<SwapQuote> {
        Err(WalletError::NotSupported(format!(
            "Native AMM swaps are not available on {}",
            network.name()
        )))
    }

    async fn build_swap_tx(&self, quote: SwapQuote, _signer: &Pubkey) -> Result<SwapTransaction> {
        ensure_provider(&quote, PROVIDER_ID)?;
        Err(WalletError::NotSupported("Native AMM swap execution is not available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::tests::quote_from;
    use crate::swap::NATIVE_MINT;

    #[tokio::test]
    async fn test_never_supports() {
        let provider = NativeAmmProvider::new();
        let network = SolanaNetwork::Custom("https://fork.example".to_string());
        let request = SwapRequest::new(NATIVE_MINT, Pubkey::new_unique(), 100);
        assert!(!provider.supports(&network, &request));
        assert!(matches!(
            provider.get_quote(&network, &request).await,
            Err(WalletError::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_jupiter_quote() {
        let result = NativeAmmProvider::new()
            .build_swap_tx(quote_from("jupiter"), &Pubkey::new_unique())
            .await;
        assert!(matches!(result, Err(WalletError::ProviderMismatch { .. })));
    }
}
