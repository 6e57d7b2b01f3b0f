use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{hash::Hash, pubkey::Pubkey};
use solana_transaction_status::TransactionConfirmationStatus;
use std::collections::BTreeMap;
use std::str::FromStr;

/// JSON-RPC 2.0 请求信封
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
}

/// JSON-RPC 2.0 响应信封
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcContext {
    pub slot: u64,
}

/// `{context, value}` 形式的响应
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    pub context: RpcContext,
    pub value: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

/// 交易所依赖的区块哈希检查点
///
/// 链上区块高度超过 `last_valid_height` 后失效
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    pub blockhash: Hash,
    pub last_valid_height: u64,
    pub extra: BTreeMap<String, String>,
}

impl TransactionContext {
    pub fn new(blockhash: Hash, last_valid_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_height,
            extra: BTreeMap::new(),
        }
    }

    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_height
    }
}

/// 账户信息 (base64 编码)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcAccount {
    pub lamports: u64,
    pub owner: String,
    pub data: Value,
    #[serde(default)]
    pub executable: bool,
}

impl RpcAccount {
    /// 解码 `["<base64>", "base64"]` 形式的数据字段
    pub fn decode_data(&self) -> Option<Vec<u8>> {
        let encoded = self.data.get(0)?.as_str()?;
        BASE64.decode(encoded).ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: RpcAccount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub absolute_slot: u64,
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// `simulateTransaction` 的结果
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcSimulation {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    #[serde(default)]
    pub units_consumed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    #[serde(default)]
    pub confirmations: Option<u64>,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub confirmation_status: Option<TransactionConfirmationStatus>,
}

impl SignatureStatus {
    /// 已达到 confirmed 或 finalized 承诺级别
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status,
            Some(TransactionConfirmationStatus::Confirmed)
                | Some(TransactionConfirmationStatus::Finalized)
        ) || (self.confirmation_status.is_none() && self.confirmations.is_none())
    }
}

/// 验证者投票账户
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccountInfo {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    pub activated_stake: u64,
    pub commission: u8,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VoteAccounts {
    pub current: Vec<VoteAccountInfo>,
    pub delinquent: Vec<VoteAccountInfo>,
}

impl VoteAccounts {
    pub fn is_delinquent(&self, vote_pubkey: &Pubkey) -> bool {
        let key = vote_pubkey.to_string();
        self.delinquent.iter().any(|v| v.vote_pubkey == key)
    }
}

/// 某个所有者持有的 SPL 代币余额
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount: String,
}

impl TokenBalance {
    /// 解析 jsonParsed 格式 `getTokenAccountsByOwner` 结果中的一项
    pub fn from_keyed(keyed: &KeyedAccount) -> Option<Self> {
        let info = keyed.account.data.get("parsed")?.get("info")?;
        let token_amount = info.get("tokenAmount")?;
        Some(Self {
            account: Pubkey::from_str(&keyed.pubkey).ok()?,
            mint: Pubkey::from_str(info.get("mint")?.as_str()?).ok()?,
            amount: token_amount.get("amount")?.as_str()?.parse().ok()?,
            decimals: token_amount.get("decimals")?.as_u64()? as u8,
            ui_amount: token_amount
                .get("uiAmountString")
                .and_then(Value::as_str)
                .unwrap_or("0")
                .to_string(),
        })
    }
}
