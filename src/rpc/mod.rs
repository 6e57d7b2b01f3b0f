pub mod classify;
pub mod gateway;
pub mod health;
pub mod types;

pub use gateway::{RetryPolicy, RpcGateway};
pub use health::{spawn_health_check, HealthReport, HealthStatus};
pub use types::{
    EpochInfo, KeyedAccount, RpcAccount, RpcSimulation, SignatureStatus, TokenBalance,
    TransactionContext, VoteAccountInfo, VoteAccounts,
};

use serde::{Deserialize, Serialize};

/// Solana网络类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolanaNetwork {
    Mainnet,
    Devnet,
    Testnet,
    Localnet,
    Custom(String), // 自定义RPC URL
}

impl SolanaNetwork {
    /// 获取RPC端点URL
    pub fn rpc_url(&self) -> String {
        match self {
            SolanaNetwork::Mainnet => "https://api.mainnet-beta.solana.com".to_string(),
            SolanaNetwork::Devnet => "https://api.devnet.solana.com".to_string(),
            SolanaNetwork::Testnet => "https://api.testnet.solana.com".to_string(),
            SolanaNetwork::Localnet => "http://localhost:8899".to_string(),
            SolanaNetwork::Custom(url) => url.clone(),
        }
    }

    /// 获取网络名称
    pub fn name(&self) -> &str {
        match self {
            SolanaNetwork::Mainnet => "Mainnet Beta",
            SolanaNetwork::Devnet => "Devnet",
            SolanaNetwork::Testnet => "Testnet",
            SolanaNetwork::Localnet => "Localnet",
            SolanaNetwork::Custom(_) => "Custom",
        }
    }

    /// 根据端点字符串推断网络
    ///
    /// 仅按子串判断，无法识别的都归为 `Custom`
    pub fn detect(endpoint: &str) -> Self {
        let lower = endpoint.to_ascii_lowercase();
        if lower.contains("devnet") {
            SolanaNetwork::Devnet
        } else if lower.contains("testnet") {
            SolanaNetwork::Testnet
        } else if lower.contains("localhost") || lower.contains("127.0.0.1") {
            SolanaNetwork::Localnet
        } else if lower.contains("mainnet") || lower.contains("api.solana.com") {
            SolanaNetwork::Mainnet
        } else {
            SolanaNetwork::Custom(endpoint.to_string())
        }
    }
}
