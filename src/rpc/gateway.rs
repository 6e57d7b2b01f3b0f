use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelSignal;
use crate::config::RpcConfig;
use crate::error::{Result, RpcError, RpcErrorKind, WalletError};
use crate::rpc::classify::{classify_http_status, classify_rpc_error, classify_transport};
use crate::rpc::types::{
    EpochInfo, JsonRpcRequest, JsonRpcResponse, KeyedAccount, RpcAccount, RpcBlockhash,
    RpcResponse, RpcSimulation, SignatureStatus, TokenBalance, TransactionContext, VoteAccounts,
};

/// 重试策略：指数退避 + 随机抖动
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RpcConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// `min(base·2^attempt + rand(0..=jitter), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        let capped = exp_ms
            .saturating_add(jitter)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

/// RPC 网关：主节点 + 可选备用节点
pub struct RpcGateway {
    http: reqwest::Client,
    primary: String,
    fallback: Option<String>,
    retry: RetryPolicy,
    pub(crate) health_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcGateway {
    /// 根据配置创建网关
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RpcError::new(RpcErrorKind::Network, format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            primary: config.primary_url.clone(),
            fallback: config.fallback_url.clone(),
            retry: RetryPolicy::from_config(config),
            health_timeout: config.health_timeout(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// 主节点地址
    pub fn endpoint(&self) -> &str {
        &self.primary
    }

    /// 备用节点地址
    pub fn fallback_endpoint(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// 调用主节点，瞬时错误自动重试
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.execute(&self.primary, method, &params, self.retry.max_retries, None)
            .await
    }

    /// 可取消的调用
    pub async fn call_cancellable<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        cancel: &CancelSignal,
    ) -> Result<T> {
        self.execute(&self.primary, method, &params, self.retry.max_retries, Some(cancel))
            .await
    }

    /// 显式调用备用节点；网关不会在重试循环中自动切换
    pub async fn call_fallback<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let fallback = self
            .fallback
            .as_deref()
            .ok_or_else(|| WalletError::NotSupported("No fallback endpoint configured".to_string()))?;
        self.execute(fallback, method, &params, self.retry.max_retries, None)
            .await
    }

    /// 单次调用，不重试
    pub async fn call_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.execute(&self.primary, method, &params, 0, None).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &Value,
        max_retries: u32,
        cancel: Option<&CancelSignal>,
    ) -> Result<T> {
        let total_attempts = max_retries.saturating_add(1);

        for attempt in 0..total_attempts {
            if let Some(cancel) = cancel {
                cancel.check()?;
            }

            let outcome = match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => return Err(WalletError::Cancelled),
                    outcome = self.send_request(url, method, params) => outcome,
                },
                None => self.send_request(url, method, params).await,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(method, attempt = attempt + 1, "rpc request succeeded after retries");
                    }
                    return Ok(serde_json::from_value(value)?);
                }
                Err(err) => err,
            };

            let retrying = err.kind.is_transient() && attempt + 1 < total_attempts;
            warn!(
                method,
                attempt = attempt + 1,
                attempts = total_attempts,
                error_class = err.kind.as_str(),
                retrying,
                "rpc request failed: {}",
                err
            );
            if !retrying {
                return Err(err.into());
            }

            let delay = self.retry.delay_for(attempt);
            debug!(method, backoff_ms = delay.as_millis() as u64, "backing off before retry");
            match cancel {
                Some(cancel) => tokio::select! {
                    _ = cancel.cancelled() => return Err(WalletError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }

        // 循环的每条路径都会返回，不存在零次尝试
        Err(RpcError::new(RpcErrorKind::Network, format!("{} failed without error detail", method)).into())
    }

    /// 发送一次 JSON-RPC 请求并分类错误
    pub(crate) async fn send_request(
        &self,
        url: &str,
        method: &str,
        params: &Value,
    ) -> std::result::Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(status, &body));
        }

        let envelope: JsonRpcResponse = response.json().await.map_err(|e| classify_transport(&e))?;

        if let Some(error) = envelope.error {
            debug!(method, code = error.code, data = ?error.data, "json-rpc error payload");
            return Err(classify_rpc_error(error.code, &error.message));
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }

    /// 获取账户余额（单位：lamports）
    pub async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        let response: RpcResponse<u64> = self
            .call("getBalance", json!([pubkey.to_string(), {"commitment": "confirmed"}]))
            .await?;
        Ok(response.value)
    }

    /// 获取 SPL 代币余额
    pub async fn get_token_accounts(&self, owner: &Pubkey) -> Result<Vec<TokenBalance>> {
        let response: RpcResponse<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    {"programId": spl_token::id().to_string()},
                    {"encoding": "jsonParsed", "commitment": "confirmed"}
                ]),
            )
            .await?;

        Ok(response
            .value
            .iter()
            .filter_map(|keyed| {
                let parsed = TokenBalance::from_keyed(keyed);
                if parsed.is_none() {
                    warn!(account = %keyed.pubkey, "skipping unparseable token account");
                }
                parsed
            })
            .collect())
    }

    /// 获取最新区块哈希及其有效高度
    pub async fn get_latest_blockhash(&self) -> Result<TransactionContext> {
        let response: RpcResponse<RpcBlockhash> = self
            .call("getLatestBlockhash", json!([{"commitment": "confirmed"}]))
            .await?;
        let blockhash = Hash::from_str(&response.value.blockhash).map_err(|e| {
            RpcError::new(RpcErrorKind::InvalidParams, format!("Malformed blockhash: {}", e))
        })?;

        let mut context = TransactionContext::new(blockhash, response.value.last_valid_block_height);
        context
            .extra
            .insert("slot".to_string(), response.context.slot.to_string());
        context
            .extra
            .insert("endpoint".to_string(), self.primary.clone());
        Ok(context)
    }

    /// 发送已签名交易的原始字节，只发送一次
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSendTransactionConfig::default()
        };
        let signature: String = self
            .call_once("sendTransaction", json!([BASE64.encode(raw), config]))
            .await?;
        Signature::from_str(&signature).map_err(|e| {
            RpcError::new(RpcErrorKind::InvalidParams, format!("Malformed signature: {}", e)).into()
        })
    }

    /// 模拟交易
    pub async fn simulate_transaction(&self, transaction: &VersionedTransaction) -> Result<RpcSimulation> {
        let raw = bincode::serialize(transaction)
            .map_err(|e| WalletError::InvalidInput(format!("Failed to serialize transaction: {}", e)))?;
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(CommitmentConfig::confirmed()),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };
        let response: RpcResponse<RpcSimulation> = self
            .call("simulateTransaction", json!([BASE64.encode(raw), config]))
            .await?;
        Ok(response.value)
    }

    /// 获取账户详细信息；账户不存在时返回 None
    pub async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<RpcAccount>> {
        let response: RpcResponse<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([pubkey.to_string(), {"encoding": "base64", "commitment": "confirmed"}]),
            )
            .await?;
        Ok(response.value)
    }

    /// 按过滤条件获取程序账户
    pub async fn get_program_accounts(&self, program_id: &Pubkey, filters: Value) -> Result<Vec<KeyedAccount>> {
        self.call(
            "getProgramAccounts",
            json!([
                program_id.to_string(),
                {"encoding": "base64", "commitment": "confirmed", "filters": filters}
            ]),
        )
        .await
    }

    pub async fn get_epoch_info(&self) -> Result<EpochInfo> {
        self.call("getEpochInfo", json!([{"commitment": "confirmed"}])).await
    }

    pub async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.call("getMinimumBalanceForRentExemption", json!([data_len]))
            .await
    }

    /// 获取验证者列表（当前与失联）
    pub async fn get_vote_accounts(&self) -> Result<VoteAccounts> {
        self.call("getVoteAccounts", json!([{"commitment": "confirmed"}]))
            .await
    }

    /// 获取最新区块高度
    pub async fn get_block_height(&self) -> Result<u64> {
        self.call("getBlockHeight", json!([{"commitment": "confirmed"}]))
            .await
    }

    /// 查询交易签名状态
    pub async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
        cancel: &CancelSignal,
    ) -> Result<Vec<Option<SignatureStatus>>> {
        let signatures: Vec<String> = signatures.iter().map(ToString::to_string).collect();
        let response: RpcResponse<Vec<Option<SignatureStatus>>> = self
            .call_cancellable(
                "getSignatureStatuses",
                json!([signatures, {"searchTransactionHistory": false}]),
                cancel,
            )
            .await?;
        Ok(response.value)
    }

    /// 查询消息手续费；节点无法计算时返回 None
    pub async fn get_fee_for_message(&self, message: &VersionedMessage) -> Result<Option<u64>> {
        let response: RpcResponse<Option<u64>> = self
            .call(
                "getFeeForMessage",
                json!([BASE64.encode(message.serialize()), {"commitment": "confirmed"}]),
            )
            .await?;
        Ok(response.value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            jitter: Duration::ZERO,
        }
    }

    pub(crate) fn test_gateway(url: String) -> RpcGateway {
        let config = RpcConfig {
            primary_url: url,
            ..RpcConfig::default()
        };
        RpcGateway::new(&config).unwrap().with_retry_policy(fast_policy(3))
    }

    pub(crate) fn rpc_result(result: Value) -> String {
        json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string()
    }

    pub(crate) fn method(name: &str) -> Matcher {
        Matcher::PartialJson(json!({ "method": name }))
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(10_000));
    }

    #[test]
    fn test_backoff_jitter_range() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for(1).as_millis();
            assert!((2_000..=3_000).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_get_balance() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(method("getBalance"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({"context": {"slot": 1}, "value": 5_000_000_000u64})))
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let balance = gateway.get_balance(&Pubkey::new_unique()).await.unwrap();
        assert_eq!(balance, 5_000_000_000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .expect(4)
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let err = gateway.get_block_height().await.unwrap_err();
        assert_eq!(err.rpc_kind(), Some(RpcErrorKind::Network));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_params_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_body(
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "Invalid param: WrongSize"}})
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let err = gateway.get_balance(&Pubkey::new_unique()).await.unwrap_err();
        assert_eq!(err.rpc_kind(), Some(RpcErrorKind::InvalidParams));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limited_is_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(429)
            .expect(4)
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let err = gateway.get_block_height().await.unwrap_err();
        assert_eq!(err.rpc_kind(), Some(RpcErrorKind::RateLimited));
        assert_eq!(err.user_message(), "Too many requests, please wait");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_attempt() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        // 第 1 次约 0ms，第 2 次约 200ms，第 3 次约 600ms 才会开始
        let gateway = test_gateway(server.url()).with_retry_policy(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(10_000),
            jitter: Duration::ZERO,
        });
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            trigger.cancel();
        });

        let result: Result<u64> = gateway
            .call_cancellable("getBlockHeight", json!([]), &cancel)
            .await;
        assert!(matches!(result, Err(WalletError::Cancelled)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(method("sendTransaction"))
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let err = gateway.send_raw_transaction(&[1, 2, 3]).await.unwrap_err();
        assert_eq!(err.rpc_kind(), Some(RpcErrorKind::Network));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_explicit_fallback() {
        let mut primary = Server::new_async().await;
        let mut secondary = Server::new_async().await;
        let primary_mock = primary
            .mock("POST", "/")
            .with_status(502)
            .expect(4)
            .create_async()
            .await;
        let secondary_mock = secondary
            .mock("POST", "/")
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!(1234)))
            .expect(1)
            .create_async()
            .await;

        let config = RpcConfig {
            primary_url: primary.url(),
            fallback_url: Some(secondary.url()),
            ..RpcConfig::default()
        };
        let gateway = RpcGateway::new(&config).unwrap().with_retry_policy(fast_policy(3));

        let primary_result: Result<u64> = gateway.call("getBlockHeight", json!([])).await;
        assert!(primary_result.is_err());
        let height: u64 = gateway.call_fallback("getBlockHeight", json!([])).await.unwrap();
        assert_eq!(height, 1234);

        primary_mock.assert_async().await;
        secondary_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_fallback() {
        let gateway = test_gateway("http://127.0.0.1:9".to_string());
        let result: Result<u64> = gateway.call_fallback("getBlockHeight", json!([])).await;
        assert!(matches!(result, Err(WalletError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_latest_blockhash_context() {
        let mut server = Server::new_async().await;
        let blockhash = Hash::new_unique();
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getLatestBlockhash"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({
                "context": {"slot": 77},
                "value": {"blockhash": blockhash.to_string(), "lastValidBlockHeight": 500}
            })))
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let context = gateway.get_latest_blockhash().await.unwrap();
        assert_eq!(context.blockhash, blockhash);
        assert_eq!(context.last_valid_height, 500);
        assert_eq!(context.extra.get("slot").map(String::as_str), Some("77"));
    }

    #[tokio::test]
    async fn test_missing_account_is_none() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getAccountInfo"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({"context": {"slot": 1}, "value": null})))
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let account = gateway.get_account_info(&Pubkey::new_unique()).await.unwrap();
        assert!(account.is_none());
    }

    #[tokio::test]
    async fn test_vote_accounts() {
        let mut server = Server::new_async().await;
        let delinquent = Pubkey::new_unique();
        let _mock = server
            .mock("POST", "/")
            .match_body(method("getVoteAccounts"))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({
                "current": [{
                    "votePubkey": Pubkey::new_unique().to_string(),
                    "nodePubkey": Pubkey::new_unique().to_string(),
                    "activatedStake": 42_000_000_000u64,
                    "commission": 7,
                    "epochVoteAccount": true,
                    "epochCredits": [],
                    "lastVote": 100,
                    "rootSlot": 90
                }],
                "delinquent": [{
                    "votePubkey": delinquent.to_string(),
                    "nodePubkey": Pubkey::new_unique().to_string(),
                    "activatedStake": 1,
                    "commission": 100,
                    "epochVoteAccount": false,
                    "epochCredits": [],
                    "lastVote": 1,
                    "rootSlot": 0
                }]
            })))
            .create_async()
            .await;

        let gateway = test_gateway(server.url());
        let votes = gateway.get_vote_accounts().await.unwrap();
        assert_eq!(votes.current.len(), 1);
        assert_eq!(votes.current[0].commission, 7);
        assert!(votes.is_delinquent(&delinquent));
        assert!(!votes.is_delinquent(&Pubkey::new_unique()));
    }
}
