use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, RpcError, RpcErrorKind, WalletError};
use crate::rpc::classify::{classify_http_status, classify_transport};
use crate::rpc::SolanaNetwork;
use crate::swap::{ensure_provider, SwapProvider, SwapQuote, SwapRequest, SwapTransaction, NATIVE_MINT};
use crate::transaction::UnsignedTx;

pub const PROVIDER_ID: &str = "jupiter";

/// Subset of the aggregator's quote response that the wallet reads.
/// The full response is kept verbatim as route data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    in_amount: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInfo {
    #[serde(default)]
    fee_amount: Option<String>,
    #[serde(default)]
    fee_mint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapBody<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    #[serde(default)]
    last_valid_block_height: Option<u64>,
}

/// Jupiter aggregator (mainnet)
pub struct JupiterProvider {
    http: reqwest::Client,
    base_url: String,
    default_slippage_bps: u16,
}

impl JupiterProvider {
    pub fn new(base_url: impl Into<String>, default_slippage_bps: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RpcError::new(RpcErrorKind::Network, format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_slippage_bps,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "aggregator {} request failed", what);
            return Err(classify_http_status(status, &body).into());
        }
        response
            .json::<T>()
            .await
            .map_err(|e| classify_transport(&e).into())
    }
}

fn parse_amount(field: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| WalletError::InvalidInput(format!("Aggregator returned malformed {}: {}", field, value)))
}

/// `priceImpactPct` is a fraction ("0.0012" = 12 bps)
fn price_impact_bps(pct: Option<&str>) -> u32 {
    pct.and_then(|p| p.parse::<f64>().ok())
        .map(|fraction| (fraction.abs() * 10_000.0).round() as u32)
        .unwrap_or(0)
}

fn native_fees(route_plan: &[RoutePlanStep]) -> u64 {
    let native = NATIVE_MINT.to_string();
    route_plan
        .iter()
        .filter(|step| step.swap_info.fee_mint.as_deref() == Some(native.as_str()))
        .filter_map(|step| step.swap_info.fee_amount.as_deref()?.parse::<u64>().ok())
        .sum()
}

#[async_trait]
impl SwapProvider for JupiterProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports(&self, network: &SolanaNetwork, request: &SwapRequest) -> bool {
        *network == SolanaNetwork::Mainnet && request.is_well_formed()
    }

    async fn get_quote(&self, network: &SolanaNetwork, request: &SwapRequest) -> Result<SwapQuote> {
        if !self.supports(network, request) {
            return Err(WalletError::NotSupported(format!(
                "Jupiter cannot quote this swap on {}",
                network.name()
            )));
        }

        let slippage = request.slippage_bps.unwrap_or(self.default_slippage_bps);
        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&[
                ("inputMint", request.from_mint.to_string()),
                ("outputMint", request.to_mint.to_string()),
                ("amount", request.amount_in.to_string()),
                ("slippageBps", slippage.to_string()),
            ])
            .send()
            .await
            .map_err(|e| WalletError::from(classify_transport(&e)))?;

        let raw: Value = Self::read_json(response, "quote").await?;
        let fields: QuoteFields = serde_json::from_value(raw.clone())?;

        let quote = SwapQuote {
            id: Uuid::new_v4(),
            provider_id: PROVIDER_ID.to_string(),
            from_mint: request.from_mint,
            to_mint: request.to_mint,
            amount_in: parse_amount("inAmount", &fields.in_amount)?,
            amount_out: parse_amount("outAmount", &fields.out_amount)?,
            min_amount_out: parse_amount("otherAmountThreshold", &fields.other_amount_threshold)?,
            price_impact_bps: price_impact_bps(fields.price_impact_pct.as_deref()),
            fees_lamports: native_fees(&fields.route_plan),
            network: network.clone(),
            opaque_route_data: raw,
            created_at: Utc::now(),
        };
        debug!(
            quote_id = %quote.id,
            amount_in = quote.amount_in,
            amount_out = quote.amount_out,
            price_impact_bps = quote.price_impact_bps,
            "jupiter quote received"
        );
        Ok(quote)
    }

    async fn build_swap_tx(&self, quote: SwapQuote, signer: &Pubkey) -> Result<SwapTransaction> {
        ensure_provider(&quote, PROVIDER_ID)?;

        let body = SwapBody {
            quote_response: &quote.opaque_route_data,
            user_public_key: signer.to_string(),
            wrap_and_unwrap_sol: true,
        };
        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::from(classify_transport(&e)))?;

        let swap: SwapResponse = Self::read_json(response, "swap").await?;
        let raw = BASE64
            .decode(swap.swap_transaction.as_bytes())
            .map_err(|e| WalletError::InvalidInput(format!("Swap transaction is not base64: {}", e)))?;
        let transaction: VersionedTransaction = bincode::deserialize(&raw)
            .map_err(|e| WalletError::InvalidInput(format!("Swap transaction is malformed: {}", e)))?;

        let tx = UnsignedTx::from_versioned(transaction);
        if tx.fee_payer() != Some(signer) {
            return Err(WalletError::InvalidInput(
                "Swap transaction fee payer does not match the wallet".to_string(),
            ));
        }

        debug!(quote_id = %quote.id, instructions = tx.instruction_count(), "jupiter swap transaction built");
        Ok(SwapTransaction {
            quote_id: quote.id,
            tx,
            last_valid_block_height: swap.last_valid_block_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::tests::quote_from;
    use crate::transaction::TransactionBuilder;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use solana_sdk::hash::Hash;

    fn quote_body(usdc: &Pubkey) -> Value {
        json!({
            "inputMint": NATIVE_MINT.to_string(),
            "inAmount": "1000000000",
            "outputMint": usdc.to_string(),
            "outAmount": "150250000",
            "otherAmountThreshold": "149498750",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.0012",
            "routePlan": [
                {"swapInfo": {"ammKey": "x", "feeAmount": "2500", "feeMint": NATIVE_MINT.to_string()}, "percent": 100}
            ]
        })
    }

    #[tokio::test]
    async fn test_quote_parsing() {
        let mut server = Server::new_async().await;
        let usdc = Pubkey::new_unique();
        let mock = server
            .mock("GET", "/quote")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("inputMint".into(), NATIVE_MINT.to_string()),
                Matcher::UrlEncoded("amount".into(), "1000000000".into()),
                Matcher::UrlEncoded("slippageBps".into(), "50".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(quote_body(&usdc).to_string())
            .create_async()
            .await;

        let provider = JupiterProvider::new(server.url(), 50).unwrap();
        let request = SwapRequest::new(NATIVE_MINT, usdc, 1_000_000_000);
        let quote = provider.get_quote(&SolanaNetwork::Mainnet, &request).await.unwrap();

        assert_eq!(quote.provider_id, PROVIDER_ID);
        assert_eq!(quote.amount_out, 150_250_000);
        assert_eq!(quote.min_amount_out, 149_498_750);
        assert_eq!(quote.price_impact_bps, 12);
        assert_eq!(quote.fees_lamports, 2_500);
        assert_eq!(quote.opaque_route_data, quote_body(&usdc));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_devnet_not_supported() {
        let provider = JupiterProvider::new("http://127.0.0.1:9", 50).unwrap();
        let request = SwapRequest::new(NATIVE_MINT, Pubkey::new_unique(), 10);
        assert!(!provider.supports(&SolanaNetwork::Devnet, &request));
        let result = provider.get_quote(&SolanaNetwork::Devnet, &request).await;
        assert!(matches!(result, Err(WalletError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_foreign_quote_rejected_before_request() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/swap").expect(0).create_async().await;

        let provider = JupiterProvider::new(server.url(), 50).unwrap();
        let result = provider
            .build_swap_tx(quote_from("native-amm"), &Pubkey::new_unique())
            .await;
        assert!(matches!(result, Err(WalletError::ProviderMismatch { .. })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_build_swap_tx() {
        let mut server = Server::new_async().await;
        let user = Pubkey::new_unique();
        let unsigned = TransactionBuilder::new()
            .fee_payer(user)
            .add_transfer(&user, &Pubkey::new_unique(), 1)
            .build(Hash::new_unique())
            .unwrap();
        let encoded = BASE64.encode(bincode::serialize(unsigned.as_versioned()).unwrap());

        let mock = server
            .mock("POST", "/swap")
            .match_body(Matcher::PartialJson(json!({
                "userPublicKey": user.to_string(),
                "wrapAndUnwrapSol": true,
                "quoteResponse": {"route": PROVIDER_ID}
            })))
            .with_header("content-type", "application/json")
            .with_body(json!({"swapTransaction": encoded, "lastValidBlockHeight": 999}).to_string())
            .create_async()
            .await;

        let provider = JupiterProvider::new(server.url(), 50).unwrap();
        let quote = quote_from(PROVIDER_ID);
        let quote_id = quote.id;
        let swap = provider.build_swap_tx(quote, &user).await.unwrap();

        assert_eq!(swap.quote_id, quote_id);
        assert_eq!(swap.last_valid_block_height, Some(999));
        assert_eq!(swap.tx.fee_payer(), Some(&user));
        mock.assert_async().await;
    }
}
